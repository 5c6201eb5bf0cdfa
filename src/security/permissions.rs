//! Permission checking

use crate::error::{Result, TargetError};
use crate::fixables::Fixable;

/// Check if the current process runs with root privileges
pub fn is_privileged() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() == 0 }
}

/// Refuse to start if any fixable needs root and the process is not privileged
pub fn require_privilege(fixables: &[Box<dyn Fixable>], privileged: bool) -> Result<()> {
    if privileged {
        return Ok(());
    }

    let needing: Vec<&str> = fixables
        .iter()
        .filter(|f| f.needs_root())
        .map(|f| f.name())
        .collect();

    if needing.is_empty() {
        return Ok(());
    }

    Err(TargetError::PermissionDenied(format!(
        "fixing {} requires root privileges",
        needing.join(", ")
    )))
}
