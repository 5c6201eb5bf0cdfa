//! Fixables: idempotent check/repair modules for container drift
//!
//! Every module implements one per-container routine that runs in either
//! [`Mode::Check`] or [`Mode::Fix`]. Check is read-only and stops at the first
//! divergence it finds. Fix remediates exactly what Check would have
//! reported, so running it on a compliant container changes nothing.

pub mod devices;
pub mod dri;
pub mod nvidia;
pub mod rootfs;

use crate::backend::{Backend, WaitOptions};
use crate::container::{find_managed, ContainerInfo, DeviceDescriptor, DeviceType};
use crate::error::Result;
use crate::host::Host;

pub use devices::DevicesFixable;
pub use dri::DriFixable;
pub use nvidia::{NvidiaDriver, NvidiaFixable, NvidiaResolver};
pub use rootfs::RootfsFixable;

/// Supplementary group granting access to GPU render nodes
pub const VIDEO_GID: &str = "44";

/// Outcome of a check: success, or the violation/failure that stopped it
pub type CheckResult = Result<()>;
/// Outcome of a fix: success, or the hard error that stopped it
pub type FixResult = Result<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Check,
    Fix,
}

impl Mode {
    pub fn is_fix(self) -> bool {
        self == Mode::Fix
    }
}

/// Everything a fixable needs to look at and change a container
pub struct FixContext<'a> {
    pub backend: &'a dyn Backend,
    pub host: &'a Host,
    pub wait: WaitOptions,
    /// Whether the process can perform privileged host changes
    pub privileged: bool,
}

impl<'a> FixContext<'a> {
    pub fn new(backend: &'a dyn Backend, host: &'a Host) -> Self {
        Self {
            backend,
            host,
            wait: WaitOptions::default(),
            privileged: crate::security::is_privileged(),
        }
    }

    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }
}

pub trait Fixable {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Whether Fix needs root on the host
    fn needs_root(&self) -> bool;

    /// Check or fix a single container
    fn run(&self, ctx: &FixContext<'_>, container: &ContainerInfo, mode: Mode) -> Result<()>;

    fn check_container(&self, ctx: &FixContext<'_>, name: &str) -> CheckResult {
        let info = ctx.backend.container_info(name)?;
        self.run(ctx, &info, Mode::Check)
    }

    fn fix_container(&self, ctx: &FixContext<'_>, name: &str) -> FixResult {
        let info = ctx.backend.container_info(name)?;
        self.run(ctx, &info, Mode::Fix)
    }

    /// Check every managed container, stopping at the first failure
    fn check(&self, ctx: &FixContext<'_>) -> CheckResult {
        for target in find_managed(ctx.backend)? {
            self.run(ctx, &target.info, Mode::Check)?;
        }
        Ok(())
    }

    /// Fix every managed container, stopping at the first hard error
    fn fix(&self, ctx: &FixContext<'_>) -> FixResult {
        for target in find_managed(ctx.backend)? {
            self.run(ctx, &target.info, Mode::Fix)?;
        }
        Ok(())
    }
}

/// In-container path for a host node: the host path without its leading separator
pub(crate) fn node_container_path(node: &str) -> &str {
    node.trim_start_matches('/')
}

/// Descriptor passing a host character device node into a container
pub fn passthrough_device(node: &str) -> DeviceDescriptor {
    DeviceDescriptor::new(DeviceType::UnixChar)
        .with("path", node_container_path(node))
        .with("gid", VIDEO_GID)
}
