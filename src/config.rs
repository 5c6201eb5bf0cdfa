//! Runtime configuration
//!
//! Collects the command line and environment settings into the pieces the
//! engine runs on: the host view, the backend client and the wait policy.

use std::path::PathBuf;
use std::time::Duration;

use crate::backend::{CancelToken, LxcBackend, WaitOptions};
use crate::engine::LXD_BRIDGE_FILE;
use crate::host::{Host, DEFAULT_LXD_DIR};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// `lxc` client binary
    pub lxc: PathBuf,
    pub lxd_dir: PathBuf,
    /// Root the host filesystem is resolved against
    pub host_root: PathBuf,
    pub wait_timeout: Option<Duration>,
    pub bridge_file: PathBuf,
    /// Running under snap confinement
    pub confined: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lxc: PathBuf::from("lxc"),
            lxd_dir: PathBuf::from(DEFAULT_LXD_DIR),
            host_root: PathBuf::from("/"),
            wait_timeout: None,
            bridge_file: PathBuf::from(LXD_BRIDGE_FILE),
            confined: false,
        }
    }
}

impl Config {
    pub fn host(&self) -> Host {
        Host::with_root(&self.host_root)
            .lxd_dir(&self.lxd_dir)
            .confined(self.confined)
    }

    pub fn backend(&self) -> LxcBackend {
        LxcBackend::new(&self.lxc)
    }

    pub fn wait_options(&self, cancel: CancelToken) -> WaitOptions {
        let wait = WaitOptions::default().with_cancel(cancel);
        match self.wait_timeout {
            Some(timeout) => wait.with_timeout(timeout),
            None => wait,
        }
    }

    /// Whether the `SNAP` environment marks a confined process
    pub fn detect_confinement() -> bool {
        std::env::var_os("SNAP").is_some_and(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_host_from_config() {
        let config = Config {
            host_root: PathBuf::from("/tmp/fakeroot"),
            lxd_dir: PathBuf::from("/srv/lxd"),
            confined: true,
            ..Config::default()
        };

        let host = config.host();
        assert_eq!(host.root(), Path::new("/tmp/fakeroot"));
        assert!(host.is_confined());
        assert_eq!(host.container_dir("build1"), PathBuf::from("/srv/lxd/containers/build1"));
    }

    #[test]
    fn test_wait_options() {
        let config = Config::default();
        assert!(config.wait_options(CancelToken::new()).timeout.is_none());

        let config = Config {
            wait_timeout: Some(Duration::from_secs(30)),
            ..Config::default()
        };
        let token = CancelToken::new();
        let wait = config.wait_options(token.clone());
        assert_eq!(wait.timeout, Some(Duration::from_secs(30)));
        token.cancel();
        assert!(wait.cancel.is_cancelled());
    }
}
