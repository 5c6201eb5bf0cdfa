//! Container rootfs accessibility
//!
//! The SDK tools read files straight out of a container's directory on the
//! host, so the directory must be world readable and traversable.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tracing::{debug, info};

use super::{FixContext, Fixable, Mode};
use crate::container::ContainerInfo;
use crate::error::{Result, TargetError, Violation};

/// Permission bits required on a container directory
pub const CONTAINER_DIR_MODE: u32 = 0o755;

#[derive(Debug, Default)]
pub struct RootfsFixable;

impl RootfsFixable {
    /// Host path of the container directory with any symlinks resolved
    fn resolve(&self, ctx: &FixContext<'_>, container: &str) -> Result<PathBuf> {
        let path = ctx.host.path(ctx.host.container_dir(container));
        let meta = fs::symlink_metadata(&path).map_err(|e| {
            TargetError::inspection(
                container,
                format!("failed to query access permissions of {}: {}", path.display(), e),
            )
        })?;

        if !meta.file_type().is_symlink() {
            return Ok(path);
        }

        fs::canonicalize(&path).map_err(|e| {
            TargetError::inspection(
                container,
                format!("failed to read container link {}: {}", path.display(), e),
            )
        })
    }
}

impl Fixable for RootfsFixable {
    fn name(&self) -> &'static str {
        "rootfs"
    }

    fn needs_root(&self) -> bool {
        true
    }

    fn run(&self, ctx: &FixContext<'_>, container: &ContainerInfo, mode: Mode) -> Result<()> {
        let path = self.resolve(ctx, &container.name)?;
        let meta = fs::metadata(&path).map_err(|e| {
            TargetError::inspection(
                &container.name,
                format!("failed to query access permissions of {}: {}", path.display(), e),
            )
        })?;

        let bits = meta.permissions().mode() & 0o7777;
        debug!(container = %container.name, path = %path.display(), mode = %format!("{:o}", bits), "container directory");

        if !meta.is_dir() {
            return Err(TargetError::inspection(
                &container.name,
                format!("{} is not a directory", path.display()),
            ));
        }

        if bits == CONTAINER_DIR_MODE {
            return Ok(());
        }

        if !mode.is_fix() {
            return Err(Violation::new(
                &container.name,
                path.display().to_string(),
                format!(
                    "wrong directory permissions {:o}, container rootfs is not accessible",
                    bits
                ),
            )
            .into());
        }

        info!("Making container {} accessible", container.name);
        fs::set_permissions(&path, fs::Permissions::from_mode(CONTAINER_DIR_MODE)).map_err(|e| {
            TargetError::remediation(
                &container.name,
                format!("failed to make {} readable: {}", path.display(), e),
            )
        })
    }
}
