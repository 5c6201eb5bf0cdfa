//! Synchronous wrappers around backend mutations
//!
//! Each helper issues one request and blocks until the backend reports the
//! resulting operation as finished. A failed operation is always an error.
//! Nothing here retries.

use tracing::info;

use super::{Backend, Operation, OperationStatus, WaitOptions};
use crate::container::DeviceDescriptor;
use crate::error::{Result, TargetError};

fn complete(backend: &dyn Backend, op: &Operation, options: &WaitOptions) -> Result<()> {
    match backend.wait(op, options)? {
        OperationStatus::Success => Ok(()),
        OperationStatus::Failure(message) => Err(TargetError::OperationFailed {
            operation: op.description().to_string(),
            message,
        }),
    }
}

/// Add a device to a container and wait for the change to land
pub fn add_device_sync(
    backend: &dyn Backend,
    container: &str,
    name: &str,
    device: &DeviceDescriptor,
    options: &WaitOptions,
) -> Result<()> {
    info!("Adding device {} to {}", name, container);
    let op = backend.add_device(container, name, device)?;
    complete(backend, &op, options)?;
    info!("Device {} added to {}", name, container);
    Ok(())
}

/// Remove a device from a container and wait for the change to land
pub fn remove_device_sync(
    backend: &dyn Backend,
    container: &str,
    name: &str,
    options: &WaitOptions,
) -> Result<()> {
    info!("Removing device {} from {}", name, container);
    let op = backend.remove_device(container, name)?;
    complete(backend, &op, options)?;
    info!("Device {} removed from {}", name, container);
    Ok(())
}

pub fn stop_container_sync(
    backend: &dyn Backend,
    container: &str,
    force: bool,
    options: &WaitOptions,
) -> Result<()> {
    let op = backend.stop_container(container, force)?;
    complete(backend, &op, options)
}

pub fn delete_container_sync(backend: &dyn Backend, container: &str, options: &WaitOptions) -> Result<()> {
    let op = backend.delete_container(container)?;
    complete(backend, &op, options)
}
