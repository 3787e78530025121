//! Per-agent log files and the `logs` command backend.
//!
//! Agents and the registry write their stdout/stderr to files under
//! `~/.mcp_mesh/logs/{name}.log`; this module reads them back with optional
//! level filtering and follow mode.

use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CliError, CliResult};

/// Poll cadence for `--follow`.
const FOLLOW_INTERVAL: Duration = Duration::from_secs(1);

/// Directory holding per-process log files.
pub fn log_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MCP_MESH_LOG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp_mesh")
        .join("logs")
}

/// Path of one process's log file.
pub fn log_path(name: &str) -> PathBuf {
    log_dir().join(format!("{name}.log"))
}

/// Minimum level filter matching the conventional level tokens.
pub fn line_matches_level(line: &str, min_level: Option<&str>) -> bool {
    let Some(min_level) = min_level else { return true };
    let ranked = ["DEBUG", "INFO", "WARNING", "ERROR"];
    let Some(min_rank) = ranked.iter().position(|l| l.eq_ignore_ascii_case(min_level)) else {
        return true;
    };
    // A line with no recognizable level token is always shown.
    match ranked.iter().position(|l| line.contains(l)) {
        Some(rank) => rank >= min_rank,
        None => true,
    }
}

/// Last `limit` lines of a log file passing the level filter.
pub fn tail(name: &str, limit: usize, min_level: Option<&str>) -> CliResult<Vec<String>> {
    let path = log_path(name);
    let file = std::fs::File::open(&path)
        .map_err(|_| CliError::NotFound(format!("log file {}", path.display())))?;

    let lines: Vec<String> = BufReader::new(file)
        .lines()
        .map_while(Result::ok)
        .filter(|line| line_matches_level(line, min_level))
        .collect();
    let start = lines.len().saturating_sub(limit);
    Ok(lines[start..].to_vec())
}

/// Print the tail of a log and keep following appended lines until
/// interrupted.
pub async fn follow(name: &str, limit: usize, min_level: Option<&str>) -> CliResult<()> {
    for line in tail(name, limit, min_level)? {
        println!("{line}");
    }

    let path = log_path(name);
    let mut offset = std::fs::metadata(&path)?.len();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Err(CliError::Cancelled),
            _ = tokio::time::sleep(FOLLOW_INTERVAL) => {}
        }

        let len = match std::fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(_) => continue, // rotated away; wait for it to come back
        };
        if len < offset {
            offset = 0; // truncated
        }
        if len == offset {
            continue;
        }

        let mut file = std::fs::File::open(&path)?;
        file.seek(SeekFrom::Start(offset))?;
        for line in BufReader::new(&file).lines().map_while(Result::ok) {
            if line_matches_level(&line, min_level) {
                println!("{line}");
            }
        }
        offset = len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_filter_ranks_tokens() {
        assert!(line_matches_level("2026-08-01 ERROR boom", Some("WARNING")));
        assert!(line_matches_level("2026-08-01 WARNING careful", Some("WARNING")));
        assert!(!line_matches_level("2026-08-01 INFO fine", Some("WARNING")));
        assert!(line_matches_level("2026-08-01 INFO fine", None));
        assert!(line_matches_level("no level token here", Some("ERROR")));
    }
}
