//! In-process backend
//!
//! Holds a set of containers in memory and applies mutations when their
//! operation is waited on, the way LXD applies them asynchronously. Every
//! write request is recorded so callers can assert on what was asked of the
//! backend.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};

use super::{Backend, Operation, OperationStatus, WaitOptions};
use crate::container::{ContainerInfo, DeviceDescriptor};
use crate::error::{Result, TargetError};

/// A write request received by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    AddDevice {
        container: String,
        name: String,
        device: DeviceDescriptor,
    },
    RemoveDevice {
        container: String,
        name: String,
    },
    Stop {
        container: String,
        force: bool,
    },
    Delete {
        container: String,
    },
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    containers: RefCell<BTreeMap<String, ContainerInfo>>,
    calls: RefCell<Vec<BackendCall>>,
    pending: RefCell<HashMap<u64, BackendCall>>,
    next_id: Cell<u64>,
    unreachable: Cell<bool>,
    failure: RefCell<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, info: ContainerInfo) -> Self {
        self.insert(info);
        self
    }

    pub fn insert(&self, info: ContainerInfo) {
        self.containers.borrow_mut().insert(info.name.clone(), info);
    }

    /// Make every query fail as if the daemon were down
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.set(unreachable);
    }

    /// Make every operation resolve to a failure with the given message
    pub fn fail_operations(&self, message: Option<&str>) {
        *self.failure.borrow_mut() = message.map(str::to_string);
    }

    /// All write requests received so far
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn snapshot(&self, name: &str) -> Option<ContainerInfo> {
        self.containers.borrow().get(name).cloned()
    }

    fn reachable(&self) -> Result<()> {
        if self.unreachable.get() {
            return Err(TargetError::Connectivity("backend is unreachable".to_string()));
        }
        Ok(())
    }

    fn submit(&self, call: BackendCall, description: String) -> Result<Operation> {
        self.reachable()?;
        let container = match &call {
            BackendCall::AddDevice { container, .. }
            | BackendCall::RemoveDevice { container, .. }
            | BackendCall::Stop { container, .. }
            | BackendCall::Delete { container } => container,
        };
        if !self.containers.borrow().contains_key(container) {
            return Err(TargetError::ContainerNotFound(container.clone()));
        }

        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.calls.borrow_mut().push(call.clone());
        self.pending.borrow_mut().insert(id, call);
        Ok(Operation::new(id, description))
    }

    fn apply(&self, call: BackendCall) -> OperationStatus {
        let mut containers = self.containers.borrow_mut();
        match call {
            BackendCall::AddDevice {
                container,
                name,
                device,
            } => match containers.get_mut(&container) {
                Some(info) if info.devices.contains_name(&name) => {
                    OperationStatus::Failure(format!("device {} already exists", name))
                }
                Some(info) => {
                    info.devices.insert(name, device);
                    OperationStatus::Success
                }
                None => OperationStatus::Failure(format!("container {} not found", container)),
            },
            BackendCall::RemoveDevice { container, name } => {
                match containers.get_mut(&container).and_then(|c| c.devices.remove(&name)) {
                    Some(_) => OperationStatus::Success,
                    None => OperationStatus::Failure(format!("device {} does not exist", name)),
                }
            }
            BackendCall::Stop { container, .. } => match containers.get_mut(&container) {
                Some(info) => {
                    info.status = crate::container::ContainerStatus::Stopped;
                    info.ipv4 = None;
                    OperationStatus::Success
                }
                None => OperationStatus::Failure(format!("container {} not found", container)),
            },
            BackendCall::Delete { container } => match containers.remove(&container) {
                Some(_) => OperationStatus::Success,
                None => OperationStatus::Failure(format!("container {} not found", container)),
            },
        }
    }
}

impl Backend for MemoryBackend {
    fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        self.reachable()?;
        Ok(self.containers.borrow().values().cloned().collect())
    }

    fn container_info(&self, name: &str) -> Result<ContainerInfo> {
        self.reachable()?;
        self.snapshot(name)
            .ok_or_else(|| TargetError::ContainerNotFound(name.to_string()))
    }

    fn add_device(&self, container: &str, name: &str, device: &DeviceDescriptor) -> Result<Operation> {
        self.submit(
            BackendCall::AddDevice {
                container: container.to_string(),
                name: name.to_string(),
                device: device.clone(),
            },
            format!("add device {} to {}", name, container),
        )
    }

    fn remove_device(&self, container: &str, name: &str) -> Result<Operation> {
        self.submit(
            BackendCall::RemoveDevice {
                container: container.to_string(),
                name: name.to_string(),
            },
            format!("remove device {} from {}", name, container),
        )
    }

    fn stop_container(&self, name: &str, force: bool) -> Result<Operation> {
        self.submit(
            BackendCall::Stop {
                container: name.to_string(),
                force,
            },
            format!("stop {}", name),
        )
    }

    fn delete_container(&self, name: &str) -> Result<Operation> {
        self.submit(
            BackendCall::Delete {
                container: name.to_string(),
            },
            format!("delete {}", name),
        )
    }

    fn wait(&self, op: &Operation, options: &WaitOptions) -> Result<OperationStatus> {
        let call = self
            .pending
            .borrow_mut()
            .remove(&op.id())
            .ok_or_else(|| TargetError::Backend(format!("unknown operation {}", op)))?;

        if options.cancel.is_cancelled() {
            return Err(TargetError::OperationCancelled(op.description().to_string()));
        }

        if let Some(message) = self.failure.borrow().clone() {
            return Ok(OperationStatus::Failure(message));
        }

        Ok(self.apply(call))
    }
}
