//! Host filesystem layout
//!
//! All host paths the engine looks at are fixed conventions (`/dev/dri`,
//! `/sys/module/nvidia/version`, the LXD data directory, ...). They are
//! written as absolute "logical" paths and resolved against a host root,
//! which is `/` everywhere except in tests.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::Result;

/// Default LXD data directory
pub const DEFAULT_LXD_DIR: &str = "/var/lib/lxd";

#[derive(Debug, Clone)]
pub struct Host {
    root: PathBuf,
    lxd_dir: PathBuf,
    confined: bool,
}

impl Default for Host {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            lxd_dir: PathBuf::from(DEFAULT_LXD_DIR),
            confined: false,
        }
    }
}

impl Host {
    /// A host whose filesystem lives under `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn lxd_dir(mut self, lxd_dir: impl Into<PathBuf>) -> Self {
        self.lxd_dir = lxd_dir.into();
        self
    }

    pub fn confined(mut self, confined: bool) -> Self {
        self.confined = confined;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether host device files are out of reach (running under snap confinement)
    pub fn is_confined(&self) -> bool {
        self.confined
    }

    /// Resolve a logical absolute path against the host root
    pub fn path(&self, logical: impl AsRef<Path>) -> PathBuf {
        let logical = logical.as_ref();
        let relative = logical.strip_prefix("/").unwrap_or(logical);
        self.root.join(relative)
    }

    /// Whether a logical path exists, following symlinks
    ///
    /// Only a missing path counts as absent. Any other stat failure, such as
    /// an unreadable parent or a symlink loop, is returned as an error.
    pub fn exists(&self, logical: impl AsRef<Path>) -> io::Result<bool> {
        match fs::metadata(self.path(logical)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Logical path of a container's directory in the LXD data directory
    pub fn container_dir(&self, container: &str) -> PathBuf {
        self.lxd_dir.join("containers").join(container)
    }

    /// Logical path of a container's root filesystem
    pub fn container_rootfs(&self, container: &str) -> PathBuf {
        self.container_dir(container).join("rootfs")
    }

    /// Entries of a logical directory whose file name matches `pattern`
    ///
    /// Returns logical paths, sorted. Directories are skipped and a missing
    /// directory yields nothing.
    pub fn find_nodes(&self, dir: &str, pattern: &Regex) -> Result<Vec<String>> {
        let entries = match fs::read_dir(self.path(dir)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut nodes = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !pattern.is_match(&name) || entry.file_type()?.is_dir() {
                continue;
            }
            nodes.push(format!("{}/{}", dir.trim_end_matches('/'), name));
        }
        nodes.sort();
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn test_path_resolution() {
        let host = Host::with_root("/tmp/fakeroot");
        assert_eq!(host.path("/dev/dri"), PathBuf::from("/tmp/fakeroot/dev/dri"));
        assert_eq!(Host::default().path("/dev/dri"), PathBuf::from("/dev/dri"));
    }

    #[test]
    fn test_container_paths() {
        let host = Host::default().lxd_dir("/srv/lxd");
        assert_eq!(host.container_dir("build1"), PathBuf::from("/srv/lxd/containers/build1"));
        assert_eq!(
            host.container_rootfs("build1"),
            PathBuf::from("/srv/lxd/containers/build1/rootfs")
        );
    }

    #[test]
    fn test_find_nodes() {
        let temp_dir = TempDir::new().unwrap();
        let dri = temp_dir.path().join("dev/dri");
        fs::create_dir_all(dri.join("by-path")).unwrap();
        File::create(dri.join("renderD128")).unwrap();
        File::create(dri.join("card0")).unwrap();
        File::create(dri.join("controlD64")).unwrap();

        let host = Host::with_root(temp_dir.path());
        let pattern = Regex::new(r"^(card|renderD)[0-9]+$").unwrap();
        let nodes = host.find_nodes("/dev/dri", &pattern).unwrap();
        assert_eq!(nodes, vec!["/dev/dri/card0", "/dev/dri/renderD128"]);
    }

    #[test]
    fn test_exists_distinguishes_missing_from_unreadable() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("home/bob")).unwrap();
        std::os::unix::fs::symlink("loop-b", temp_dir.path().join("loop-a")).unwrap();
        std::os::unix::fs::symlink("loop-a", temp_dir.path().join("loop-b")).unwrap();
        std::os::unix::fs::symlink("gone", temp_dir.path().join("dangling")).unwrap();

        let host = Host::with_root(temp_dir.path());
        assert!(host.exists("/home/bob").unwrap());
        assert!(!host.exists("/home/alice").unwrap());
        assert!(!host.exists("/dangling").unwrap());
        assert!(host.exists("/loop-a").is_err());
    }

    #[test]
    fn test_find_nodes_missing_dir() {
        let temp_dir = TempDir::new().unwrap();
        let host = Host::with_root(temp_dir.path());
        let pattern = Regex::new(".*").unwrap();
        assert!(host.find_nodes("/dev/dri", &pattern).unwrap().is_empty());
    }
}
