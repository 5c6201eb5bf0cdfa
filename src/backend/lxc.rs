//! Backend implementation driving the `lxc` client binary
//!
//! Queries run to completion synchronously. Mutations are spawned as child
//! processes and handed back as [`Operation`]s; the child's exit status is the
//! operation's terminal state.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use super::{Backend, Operation, OperationStatus, WaitOptions};
use crate::container::{ContainerInfo, ContainerStatus, DeviceDescriptor, Devices};
use crate::error::{Result, TargetError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Deserialize)]
struct LxcContainer {
    name: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    config: BTreeMap<String, String>,
    #[serde(default)]
    devices: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    state: Option<LxcState>,
}

#[derive(Debug, Deserialize)]
struct LxcState {
    #[serde(default)]
    network: Option<BTreeMap<String, LxcNetwork>>,
}

#[derive(Debug, Deserialize)]
struct LxcNetwork {
    #[serde(default)]
    addresses: Vec<LxcAddress>,
}

#[derive(Debug, Deserialize)]
struct LxcAddress {
    family: String,
    address: String,
}

impl From<LxcContainer> for ContainerInfo {
    fn from(raw: LxcContainer) -> Self {
        let ipv4 = raw
            .state
            .and_then(|s| s.network)
            .and_then(|mut n| n.remove("eth0"))
            .and_then(|eth0| {
                eth0.addresses
                    .into_iter()
                    .filter(|a| a.family == "inet")
                    .map(|a| a.address)
                    .last()
            });

        ContainerInfo {
            name: raw.name,
            status: ContainerStatus::parse(&raw.status),
            config: raw.config,
            devices: raw
                .devices
                .into_iter()
                .map(|(name, dev)| (name, DeviceDescriptor::from_raw(dev)))
                .collect::<Devices>(),
            ipv4,
        }
    }
}

/// Parse the output of `lxc list --format json`
pub fn parse_container_list(json: &str) -> Result<Vec<ContainerInfo>> {
    let raw: Vec<LxcContainer> = serde_json::from_str(json)
        .map_err(|e| TargetError::Backend(format!("could not parse container list: {}", e)))?;
    Ok(raw.into_iter().map(ContainerInfo::from).collect())
}

/// A running mutation and the reader draining its stderr
#[derive(Debug)]
struct Pending {
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

/// Backend talking to LXD through the `lxc` command line client
#[derive(Debug)]
pub struct LxcBackend {
    lxc: PathBuf,
    next_id: Cell<u64>,
    pending: RefCell<HashMap<u64, Pending>>,
}

impl LxcBackend {
    pub fn new(lxc: impl AsRef<Path>) -> Self {
        Self {
            lxc: lxc.as_ref().to_path_buf(),
            next_id: Cell::new(1),
            pending: RefCell::new(HashMap::new()),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.lxc);
        cmd.args(args);
        cmd
    }

    fn query(&self, args: &[&str]) -> Result<String> {
        debug!(lxc = %self.lxc.display(), ?args, "running backend query");
        let output = self.command(args).stdin(Stdio::null()).output().map_err(|e| {
            TargetError::Connectivity(format!("could not run {}: {}", self.lxc.display(), e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TargetError::Connectivity(format!(
                "{} {} failed: {}",
                self.lxc.display(),
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn spawn(&self, args: Vec<String>, description: String) -> Result<Operation> {
        debug!(lxc = %self.lxc.display(), ?args, "starting backend operation");
        let mut child = Command::new(&self.lxc)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TargetError::Connectivity(format!("could not run {}: {}", self.lxc.display(), e))
            })?;

        // Drain stderr concurrently, a full pipe blocks the child
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut out = String::new();
                let _ = pipe.read_to_string(&mut out);
                out
            })
        });

        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.pending.borrow_mut().insert(id, Pending { child, stderr });
        Ok(Operation::new(id, description))
    }

    fn abandon(mut pending: Pending) {
        let _ = pending.child.kill();
        let _ = pending.child.wait();
    }
}

impl Backend for LxcBackend {
    fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let out = self.query(&["list", "--format", "json"])?;
        parse_container_list(&out)
    }

    fn container_info(&self, name: &str) -> Result<ContainerInfo> {
        self.list_containers()?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| TargetError::ContainerNotFound(name.to_string()))
    }

    fn add_device(&self, container: &str, name: &str, device: &DeviceDescriptor) -> Result<Operation> {
        let mut args = vec![
            "config".to_string(),
            "device".to_string(),
            "add".to_string(),
            container.to_string(),
            name.to_string(),
            device.device_type.to_string(),
        ];
        args.extend(device.property_args());
        self.spawn(args, format!("add device {} to {}", name, container))
    }

    fn remove_device(&self, container: &str, name: &str) -> Result<Operation> {
        let args = ["config", "device", "remove", container, name]
            .iter()
            .map(|s| s.to_string())
            .collect();
        self.spawn(args, format!("remove device {} from {}", name, container))
    }

    fn stop_container(&self, name: &str, force: bool) -> Result<Operation> {
        let mut args = vec!["stop".to_string(), name.to_string()];
        if force {
            args.push("--force".to_string());
        }
        self.spawn(args, format!("stop {}", name))
    }

    fn delete_container(&self, name: &str) -> Result<Operation> {
        self.spawn(
            vec!["delete".to_string(), name.to_string()],
            format!("delete {}", name),
        )
    }

    fn wait(&self, op: &Operation, options: &WaitOptions) -> Result<OperationStatus> {
        let mut pending = self
            .pending
            .borrow_mut()
            .remove(&op.id())
            .ok_or_else(|| TargetError::Backend(format!("unknown operation {}", op)))?;

        let started = Instant::now();
        loop {
            if let Some(status) = pending.child.try_wait()? {
                let stderr = pending
                    .stderr
                    .take()
                    .and_then(|reader| reader.join().ok())
                    .unwrap_or_default();
                debug!(operation = %op, %status, "backend operation finished");

                return Ok(if status.success() {
                    OperationStatus::Success
                } else if stderr.trim().is_empty() {
                    OperationStatus::Failure(format!("lxc exited with {}", status))
                } else {
                    OperationStatus::Failure(stderr.trim().to_string())
                });
            }

            if options.cancel.is_cancelled() {
                Self::abandon(pending);
                return Err(TargetError::OperationCancelled(op.description().to_string()));
            }

            if let Some(timeout) = options.timeout {
                if started.elapsed() >= timeout {
                    Self::abandon(pending);
                    return Err(TargetError::OperationTimedOut {
                        operation: op.description().to_string(),
                        timeout,
                    });
                }
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::DeviceType;

    const LIST_JSON: &str = r#"[
      {
        "name": "build1",
        "status": "Running",
        "status_code": 103,
        "config": {
          "user.click-architecture": "armhf",
          "user.click-framework": "ubuntu-sdk-15.04"
        },
        "devices": {
          "home_of_alice": {"type": "disk", "source": "/home/alice", "path": "/home/alice"},
          "/dev/dri/card0": {"type": "unix-char", "path": "dev/dri/card0", "gid": "44"}
        },
        "state": {
          "network": {
            "eth0": {"addresses": [
              {"family": "inet6", "address": "fe80::1"},
              {"family": "inet", "address": "10.0.3.17"}
            ]},
            "lo": {"addresses": [{"family": "inet", "address": "127.0.0.1"}]}
          }
        }
      },
      {"name": "plain", "status": "Stopped", "config": {}, "devices": {}, "state": null}
    ]"#;

    #[test]
    fn test_parse_container_list() {
        let list = parse_container_list(LIST_JSON).unwrap();
        assert_eq!(list.len(), 2);

        let build1 = &list[0];
        assert_eq!(build1.status, ContainerStatus::Running);
        assert_eq!(build1.ipv4.as_deref(), Some("10.0.3.17"));
        assert_eq!(build1.devices.len(), 2);
        let home = build1.devices.get("home_of_alice").unwrap();
        assert_eq!(home.device_type, DeviceType::Disk);
        assert_eq!(home.get("source"), Some("/home/alice"));

        let plain = &list[1];
        assert_eq!(plain.status, ContainerStatus::Stopped);
        assert!(plain.ipv4.is_none());
        assert!(plain.devices.is_empty());
    }

    #[test]
    fn test_parse_garbage_is_backend_error() {
        let err = parse_container_list("not json").unwrap_err();
        assert!(matches!(err, TargetError::Backend(_)));
    }

    #[test]
    fn test_missing_binary_is_connectivity_error() {
        let backend = LxcBackend::new("/nonexistent/usdk-lxc");
        let err = backend.list_containers().unwrap_err();
        assert!(matches!(err, TargetError::Connectivity(_)));
    }

    #[test]
    fn test_operation_exit_status_is_terminal_state() {
        let dev = DeviceDescriptor::new(DeviceType::UnixChar).with("path", "dev/dri/card0");

        let ok = LxcBackend::new("true");
        let op = ok.add_device("build1", "/dev/dri/card0", &dev).unwrap();
        assert_eq!(ok.wait(&op, &WaitOptions::default()).unwrap(), OperationStatus::Success);

        let failing = LxcBackend::new("false");
        let op = failing.remove_device("build1", "/dev/dri/card0").unwrap();
        match failing.wait(&op, &WaitOptions::default()).unwrap() {
            OperationStatus::Failure(msg) => assert!(msg.contains("exited")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_wait_kills_operation() {
        let backend = LxcBackend::new("sleep");
        let op = backend.spawn(vec!["5".to_string()], "sleep".to_string()).unwrap();
        let options = WaitOptions::default();
        options.cancel.cancel();
        let err = backend.wait(&op, &options).unwrap_err();
        assert!(matches!(err, TargetError::OperationCancelled(_)));
    }

    #[test]
    fn test_wait_timeout() {
        let backend = LxcBackend::new("sleep");
        let op = backend.spawn(vec!["5".to_string()], "sleep".to_string()).unwrap();
        let options = WaitOptions::default().with_timeout(Duration::from_millis(100));
        let err = backend.wait(&op, &options).unwrap_err();
        assert!(matches!(err, TargetError::OperationTimedOut { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_large_stderr_does_not_block() {
        let backend = LxcBackend::new("sh");
        let script = "head -c 200000 /dev/zero | tr '\\0' x >&2; exit 3";
        let op = backend
            .spawn(vec!["-c".to_string(), script.to_string()], "chatty".to_string())
            .unwrap();
        let options = WaitOptions::default().with_timeout(Duration::from_secs(20));
        match backend.wait(&op, &options).unwrap() {
            OperationStatus::Failure(msg) => assert_eq!(msg.len(), 200000),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_operation() {
        let backend = LxcBackend::new("lxc");
        let op = Operation::new(42, "ghost");
        let err = backend.wait(&op, &WaitOptions::default()).unwrap_err();
        assert!(matches!(err, TargetError::Backend(_)));
    }
}
