//! Container backend client
//!
//! The engine never talks to LXD directly. Everything it needs from the
//! orchestration service goes through the [`Backend`] trait: enumeration,
//! per-container info, device add/remove, stop/delete, and waiting for the
//! asynchronous operations those mutations start.

pub mod lxc;
pub mod memory;
pub mod sync;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::container::{ContainerInfo, DeviceDescriptor};
use crate::error::Result;

pub use lxc::LxcBackend;
pub use memory::{BackendCall, MemoryBackend};
pub use sync::{add_device_sync, delete_container_sync, remove_device_sync, stop_container_sync};

/// Handle to an in-flight backend request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    id: u64,
    description: String,
}

impl Operation {
    pub fn new(id: u64, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.description)
    }
}

/// Terminal state of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Success,
    Failure(String),
}

/// Shared flag used to abandon a pending wait
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How long and under which conditions to wait for an operation
///
/// The default waits forever and can only be interrupted through the token.
#[derive(Debug, Clone, Default)]
pub struct WaitOptions {
    pub timeout: Option<Duration>,
    pub cancel: CancelToken,
}

impl WaitOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Capability set the engine consumes from the orchestration service
pub trait Backend {
    /// All containers known to the backend, with configuration and devices
    fn list_containers(&self) -> Result<Vec<ContainerInfo>>;

    /// Detailed info for one container
    fn container_info(&self, name: &str) -> Result<ContainerInfo>;

    /// Request a new device on a container
    fn add_device(&self, container: &str, name: &str, device: &DeviceDescriptor) -> Result<Operation>;

    /// Request removal of a device from a container
    fn remove_device(&self, container: &str, name: &str) -> Result<Operation>;

    /// Request a container stop
    fn stop_container(&self, name: &str, force: bool) -> Result<Operation>;

    /// Request container deletion
    fn delete_container(&self, name: &str) -> Result<Operation>;

    /// Block until the operation reaches a terminal state
    fn wait(&self, op: &Operation, options: &WaitOptions) -> Result<OperationStatus>;
}
