//! Container manager for inspecting and tearing down build targets
//!
//! The ContainerManager answers the simple per-container questions the
//! command line asks (does it exist, where is its rootfs, is it running) and
//! performs the stop-then-delete sequence used to destroy a target.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::discovery::find_targets;
use super::types::{ContainerStatus, Target};
use crate::backend::{delete_container_sync, stop_container_sync, Backend, WaitOptions};
use crate::error::Result;
use crate::host::Host;

/// Lifecycle status of a container plus its primary address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
}

pub struct ContainerManager<'a> {
    backend: &'a dyn Backend,
    host: &'a Host,
    wait: WaitOptions,
}

impl<'a> ContainerManager<'a> {
    pub fn new(backend: &'a dyn Backend, host: &'a Host) -> Self {
        Self {
            backend,
            host,
            wait: WaitOptions::default(),
        }
    }

    pub fn with_wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// List all SDK targets
    pub fn list(&self) -> Result<Vec<Target>> {
        find_targets(self.backend)
    }

    /// Check if any container, managed or not, has this exact name
    pub fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.backend.list_containers()?.iter().any(|c| c.name == name))
    }

    /// Host path of the container's root filesystem
    pub fn rootfs(&self, name: &str) -> PathBuf {
        self.host.container_rootfs(name)
    }

    pub fn status(&self, name: &str) -> Result<StatusReport> {
        let info = self.backend.container_info(name)?;
        Ok(StatusReport {
            status: info.status.to_string(),
            ipv4: info.ipv4,
        })
    }

    /// Stop the container if needed, then delete it
    pub fn destroy(&self, name: &str) -> Result<()> {
        let info = self.backend.container_info(name)?;

        if info.status != ContainerStatus::Stopped {
            info!("Stopping container {}", name);
            stop_container_sync(self.backend, name, true, &self.wait)?;
        }

        info!("Deleting container {}", name);
        delete_container_sync(self.backend, name, &self.wait)
    }
}
