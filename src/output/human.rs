//! Human-readable output formatting

use crate::container::Target;
use crate::output::formatter::Report;

pub fn format_human(report: &Report) -> String {
    match report {
        Report::Targets(targets) => format_targets(targets),
        Report::Status(status) => {
            let mut output = format!("Status: {}", status.status);
            if let Some(ref ipv4) = status.ipv4 {
                output.push_str(&format!("\nIPv4:   {}", ipv4));
            }
            output
        }
        Report::Rootfs(path) => path.display().to_string(),
        Report::Message(msg) => msg.clone(),
    }
}

fn format_targets(targets: &[Target]) -> String {
    if targets.is_empty() {
        return "No build targets found".to_string();
    }

    let width = targets
        .iter()
        .map(|t| t.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut output = format!("{:<width$}  {:<12}  {}\n", "NAME", "ARCHITECTURE", "FRAMEWORK", width = width);
    for target in targets {
        output.push_str(&format!(
            "{:<width$}  {:<12}  {}\n",
            target.name,
            target.architecture,
            target.framework,
            width = width
        ));
    }
    output.trim_end().to_string()
}
