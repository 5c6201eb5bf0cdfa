//! Container module for SDK build targets
//!
//! Containers are owned by the backend. This module holds the transient
//! views the engine works on, target discovery, and the manager that
//! inspects and destroys containers.

pub mod discovery;
mod manager;
mod types;

pub use discovery::{find_managed, find_targets};
pub use manager::{ContainerManager, StatusReport};
pub use types::{
    ContainerInfo, ContainerStatus, DeviceDescriptor, DeviceType, Devices, ManagedContainer,
    Target, ARCHITECTURE_KEY, FRAMEWORK_KEY,
};
