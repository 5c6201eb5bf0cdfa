//! Reconciliation engine for usdk-target

pub mod readiness;
pub mod reconciler;

pub use readiness::{check_bridge, check_ready, LXD_BRIDGE_FILE};
pub use reconciler::Reconciler;
