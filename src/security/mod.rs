//! Privilege checks for host side remediation

pub mod permissions;

pub use permissions::{is_privileged, require_privilege};
