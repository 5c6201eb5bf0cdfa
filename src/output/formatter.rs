//! Output formatting

use std::path::PathBuf;

use crate::container::{StatusReport, Target};
use crate::output::human::format_human;
use crate::output::json::format_json;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Something a command prints on stdout
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Targets(Vec<Target>),
    Status(StatusReport),
    Rootfs(PathBuf),
    Message(String),
}

pub fn format_output(report: &Report, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Human => format_human(report),
        OutputFormat::Json => format_json(report),
    }
}
