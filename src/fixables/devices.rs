//! Broken device detection
//!
//! A device whose host resource has disappeared (a removed home directory, an
//! unplugged character device) keeps the container from starting. Such
//! devices are dropped from the container; the missing host resource is
//! never recreated.

use tracing::{debug, info};

use super::{FixContext, Fixable, Mode};
use crate::backend::remove_device_sync;
use crate::container::{ContainerInfo, DeviceDescriptor, DeviceType};
use crate::error::{Result, TargetError, Violation};

#[derive(Debug, Default)]
pub struct DevicesFixable;

/// Host path a device depends on, if it claims one
///
/// Optional devices claim nothing. A `unix-char` device without explicit
/// major/minor numbers is created from the host node at `/<path>`.
pub fn required_host_path(device: &DeviceDescriptor) -> Option<String> {
    if device.is_optional() {
        return None;
    }

    match device.device_type {
        DeviceType::Disk => device
            .get("source")
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        DeviceType::UnixChar => {
            if device.has("major") && device.has("minor") {
                return None;
            }
            device
                .get("path")
                .filter(|p| !p.is_empty())
                .map(|p| format!("/{}", p.trim_start_matches('/')))
        }
        _ => None,
    }
}

impl Fixable for DevicesFixable {
    fn name(&self) -> &'static str {
        "devices"
    }

    fn needs_root(&self) -> bool {
        false
    }

    fn run(&self, ctx: &FixContext<'_>, container: &ContainerInfo, mode: Mode) -> Result<()> {
        for (name, device) in container.devices.iter() {
            let Some(host_path) = required_host_path(device) else {
                continue;
            };

            let present = ctx.host.exists(&host_path).map_err(|e| {
                TargetError::inspection(
                    &container.name,
                    format!("failed to query device source {}: {}", host_path, e),
                )
            })?;
            if present {
                continue;
            }

            if !mode.is_fix() {
                return Err(Violation::new(
                    &container.name,
                    name.as_str(),
                    format!("device {} does not exist on the host", host_path),
                )
                .into());
            }

            info!(
                "Removing device {} from {}, {} does not exist on the host",
                name, container.name, host_path
            );
            remove_device_sync(ctx.backend, &container.name, name, &ctx.wait)?;
        }

        debug!("All devices of {} are present", container.name);
        Ok(())
    }
}
