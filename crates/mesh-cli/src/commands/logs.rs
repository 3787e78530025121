//! `meshctl logs` - read or follow per-process logs.

use crate::error::CliResult;
use crate::logs;
use crate::tracker::REGISTRY_PROCESS_NAME;

pub async fn run(
    agent: Option<String>,
    follow: bool,
    level: Option<String>,
    lines: usize,
) -> CliResult<()> {
    let name = agent.unwrap_or_else(|| REGISTRY_PROCESS_NAME.to_string());
    if follow {
        logs::follow(&name, lines, level.as_deref()).await
    } else {
        for line in logs::tail(&name, lines, level.as_deref())? {
            println!("{line}");
        }
        Ok(())
    }
}
