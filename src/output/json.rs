//! JSON output formatting

use crate::output::formatter::Report;
use serde_json::{json, Value};

pub fn format_json(report: &Report) -> String {
    let data: Value = match report {
        Report::Targets(targets) => serde_json::to_value(targets).unwrap_or(json!([])),
        Report::Status(status) => serde_json::to_value(status).unwrap_or(json!(null)),
        Report::Rootfs(path) => json!({ "rootfs": path.display().to_string() }),
        Report::Message(msg) => json!({ "message": msg }),
    };

    serde_json::to_string_pretty(&data).unwrap_or_else(|_| "{}".to_string())
}
