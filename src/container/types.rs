//! Container and device definitions
//!
//! These are transient views of what the backend reports. They are refreshed
//! on every query and never cached across invocations.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Config key holding the click architecture of an SDK target
pub const ARCHITECTURE_KEY: &str = "user.click-architecture";
/// Config key holding the click framework of an SDK target
pub const FRAMEWORK_KEY: &str = "user.click-framework";

/// Lifecycle state of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    Stopped,
    Running,
    Frozen,
    Other(String),
}

impl ContainerStatus {
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "stopped" => ContainerStatus::Stopped,
            "running" => ContainerStatus::Running,
            "frozen" => ContainerStatus::Frozen,
            _ => ContainerStatus::Other(status.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContainerStatus::Stopped => "Stopped",
            ContainerStatus::Running => "Running",
            ContainerStatus::Frozen => "Frozen",
            ContainerStatus::Other(s) => s,
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a backend device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceType {
    Disk,
    UnixChar,
    Nic,
    Other(String),
}

impl DeviceType {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "disk" => DeviceType::Disk,
            "unix-char" => DeviceType::UnixChar,
            "nic" => DeviceType::Nic,
            other => DeviceType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DeviceType::Disk => "disk",
            DeviceType::UnixChar => "unix-char",
            DeviceType::Nic => "nic",
            DeviceType::Other(s) => s,
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device attached to a container: its type plus a type dependent property bag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub device_type: DeviceType,
    pub properties: BTreeMap<String, String>,
}

impl DeviceDescriptor {
    pub fn new(device_type: DeviceType) -> Self {
        Self {
            device_type,
            properties: BTreeMap::new(),
        }
    }

    /// Builder style property setter
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Build a descriptor from the flat map the backend reports (`type` plus properties)
    pub fn from_raw(mut raw: BTreeMap<String, String>) -> Self {
        let device_type = raw
            .remove("type")
            .map(|t| DeviceType::parse(&t))
            .unwrap_or_else(|| DeviceType::Other(String::new()));
        Self {
            device_type,
            properties: raw,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(|s| s.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn is_optional(&self) -> bool {
        self.get("optional") == Some("true")
    }

    /// Properties rendered as `key=value` pairs, in key order
    pub fn property_args(&self) -> Vec<String> {
        self.properties
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

/// Ordered mapping of device name to descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Devices(BTreeMap<String, DeviceDescriptor>);

impl Devices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&DeviceDescriptor> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, device: DeviceDescriptor) {
        self.0.insert(name.into(), device);
    }

    pub fn remove(&mut self, name: &str) -> Option<DeviceDescriptor> {
        self.0.remove(name)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, DeviceDescriptor> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, DeviceDescriptor)> for Devices {
    fn from_iter<I: IntoIterator<Item = (String, DeviceDescriptor)>>(iter: I) -> Self {
        Devices(iter.into_iter().collect())
    }
}

/// The backend's view of one container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub name: String,
    pub status: ContainerStatus,
    /// Configuration tags (`user.*`, `security.*`, ...)
    pub config: BTreeMap<String, String>,
    /// Devices configured locally on the container
    pub devices: Devices,
    /// IPv4 address of `eth0`, when the container is running and has one
    pub ipv4: Option<String>,
}

impl ContainerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ContainerStatus::Stopped,
            config: BTreeMap::new(),
            devices: Devices::new(),
            ipv4: None,
        }
    }

    pub fn with_config(mut self, key: &str, value: impl Into<String>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    pub fn with_device(mut self, name: &str, device: DeviceDescriptor) -> Self {
        self.devices.insert(name, device);
        self
    }

    pub fn with_status(mut self, status: ContainerStatus) -> Self {
        self.status = status;
        self
    }

    /// Mark this container as an SDK target
    pub fn with_target(self, architecture: &str, framework: &str) -> Self {
        self.with_config(ARCHITECTURE_KEY, architecture)
            .with_config(FRAMEWORK_KEY, framework)
    }
}

/// Identity record of an SDK build target, as listed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub architecture: String,
    pub framework: String,
}

/// A container carrying both SDK marker tags
#[derive(Debug, Clone)]
pub struct ManagedContainer {
    pub architecture: String,
    pub framework: String,
    pub info: ContainerInfo,
}

impl ManagedContainer {
    /// Wrap a container if it carries both marker tags
    pub fn from_info(info: ContainerInfo) -> Option<Self> {
        let architecture = info.config.get(ARCHITECTURE_KEY)?.clone();
        let framework = info.config.get(FRAMEWORK_KEY)?.clone();
        Some(Self {
            architecture,
            framework,
            info,
        })
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn target(&self) -> Target {
        Target {
            name: self.info.name.clone(),
            architecture: self.architecture.clone(),
            framework: self.framework.clone(),
        }
    }
}
