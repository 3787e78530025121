//! Terminal output helpers: status tables and JSON envelopes.

use colored::Colorize;
use comfy_table::{Cell, Table, presets::UTF8_FULL_CONDENSED};
use serde_json::{Value, json};

use crate::tracker::{HealthState, ProcessRecord};

/// Human-readable uptime, coarse on purpose.
pub fn format_uptime(duration: chrono::Duration) -> String {
    let secs = duration.num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    }
}

fn health_cell(health: HealthState) -> Cell {
    match health {
        HealthState::Healthy => Cell::new("healthy".green().to_string()),
        HealthState::Unhealthy => Cell::new("unhealthy".red().to_string()),
        HealthState::Unknown => Cell::new("unknown".yellow().to_string()),
    }
}

/// Render the tracked-process table for `status`.
pub fn process_table<'a, I: Iterator<Item = (&'a String, &'a ProcessRecord, bool)>>(
    rows: I,
) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["NAME", "PID", "STATUS", "UPTIME", "HEALTH", "TYPE"]);
    for (name, record, running) in rows {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(record.pid),
            if running {
                Cell::new("running".green().to_string())
            } else {
                Cell::new("stopped".red().to_string())
            },
            Cell::new(format_uptime(record.uptime())),
            health_cell(record.health_status),
            Cell::new(&record.service_type),
        ]);
    }
    table
}

/// JSON success envelope.
pub fn json_ok(payload: Value) -> String {
    let mut envelope = json!({ "status": "success" });
    if let (Value::Object(envelope), Value::Object(payload)) = (&mut envelope, payload) {
        envelope.extend(payload);
    }
    serde_json::to_string_pretty(&envelope).unwrap_or_else(|_| "{}".to_string())
}

/// JSON error envelope matching the human-readable failure lines.
pub fn json_error(component: &str, message: &str) -> String {
    serde_json::to_string_pretty(&json!({
        "status": "error",
        "component": component,
        "message": message,
    }))
    .unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formats_coarsely() {
        assert_eq!(format_uptime(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_uptime(chrono::Duration::seconds(62)), "1m2s");
        assert_eq!(format_uptime(chrono::Duration::seconds(3700)), "1h1m");
        assert_eq!(format_uptime(chrono::Duration::seconds(-5)), "0s");
    }

    #[test]
    fn json_envelopes_carry_status() {
        let ok = json_ok(json!({"count": 2}));
        assert!(ok.contains("\"success\""));
        assert!(ok.contains("\"count\": 2"));

        let err = json_error("registry", "unreachable");
        assert!(err.contains("\"error\""));
        assert!(err.contains("registry"));
    }
}
