//! Nvidia proprietary driver support
//!
//! When the host runs the Nvidia kernel driver, containers need the matching
//! userspace libraries and the GPU device nodes. Four things are kept in sync
//! for every target:
//!
//! 1. the driver version and its host library directory (resolved once),
//! 2. the `nv-bin` disk device bind-mounting that directory,
//! 3. the dynamic linker configuration pointing at the mount,
//! 4. the `/dev/nvidia*` character devices.
//!
//! A host without the driver, or with a driver whose libraries cannot be
//! found, simply has no Nvidia support; that is not an error.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use super::{passthrough_device, FixContext, Fixable, Mode};
use crate::backend::{add_device_sync, remove_device_sync};
use crate::container::{ContainerInfo, DeviceDescriptor, DeviceType};
use crate::error::{Result, TargetError, Violation};
use crate::host::Host;

/// Present only while the Nvidia kernel module is loaded
pub const DRIVER_VERSION_FILE: &str = "/sys/module/nvidia/version";
/// Name of the bind-mount device carrying the driver libraries
pub const DRIVER_DEVICE: &str = "nv-bin";
/// Where the driver libraries are mounted inside the container
pub const DRIVER_MOUNT_PATH: &str = "/usr/lib/nvidia-gl";
/// Linker config, relative to the container rootfs
pub const LD_CONF_FILE: &str = "etc/ld.so.conf.d/01-nvidia.conf";

const LD_CONF_MODE: u32 = 0o664;

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([0-9]+).*$").expect("valid driver version pattern"))
}

fn node_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^nvidia").expect("valid nvidia node pattern"))
}

/// Facts about the loaded driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NvidiaDriver {
    /// Leading integer component of the driver version
    pub version: String,
    /// Host directory holding the matching userspace libraries
    pub lib_dir: String,
}

impl NvidiaDriver {
    /// Parse the contents of the driver version file
    ///
    /// Returns `None` when the version does not start with a number.
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = version_pattern().captures(raw.trim())?;
        let version = caps.get(1)?.as_str().to_string();
        Some(Self {
            lib_dir: format!("/usr/lib/nvidia-{}", version),
            version,
        })
    }
}

/// Resolves the loaded driver once and keeps the answer
///
/// The driver cannot change without a reboot, so a successful resolution is
/// never invalidated. Unsuccessful ones are retried on the next call.
#[derive(Debug, Default)]
pub struct NvidiaResolver {
    resolved: OnceLock<NvidiaDriver>,
}

impl NvidiaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, host: &Host) -> Result<Option<&NvidiaDriver>> {
        if let Some(driver) = self.resolved.get() {
            return Ok(Some(driver));
        }

        let raw = fs::read_to_string(host.path(DRIVER_VERSION_FILE))?;
        let Some(driver) = NvidiaDriver::parse(&raw) else {
            debug!("Unrecognised Nvidia driver version {:?}", raw.trim());
            return Ok(None);
        };

        if !host.exists(&driver.lib_dir)? {
            info!("Nvidia dir {} does not exist", driver.lib_dir);
            return Ok(None);
        }

        Ok(Some(self.resolved.get_or_init(|| driver)))
    }
}

#[derive(Debug, Default)]
pub struct NvidiaFixable {
    resolver: NvidiaResolver,
}

impl NvidiaFixable {
    pub fn new(resolver: NvidiaResolver) -> Self {
        Self { resolver }
    }

    fn sync_driver_mount(
        &self,
        ctx: &FixContext<'_>,
        container: &ContainerInfo,
        driver: &NvidiaDriver,
        mode: Mode,
    ) -> Result<()> {
        match container.devices.get(DRIVER_DEVICE) {
            Some(dev) if dev.get("source") == Some(driver.lib_dir.as_str()) => return Ok(()),
            Some(_) => {
                if !mode.is_fix() {
                    return Err(Violation::new(
                        &container.name,
                        DRIVER_DEVICE,
                        "Nvidia binary directory is not pointing to the currently used one",
                    )
                    .into());
                }
                remove_device_sync(ctx.backend, &container.name, DRIVER_DEVICE, &ctx.wait)?;
            }
            None => {
                if !mode.is_fix() {
                    return Err(Violation::new(
                        &container.name,
                        DRIVER_DEVICE,
                        "Nvidia binary directory is not mounted",
                    )
                    .into());
                }
            }
        }

        let mount = DeviceDescriptor::new(DeviceType::Disk)
            .with("source", driver.lib_dir.as_str())
            .with("path", DRIVER_MOUNT_PATH)
            .with("recursive", "true");
        add_device_sync(ctx.backend, &container.name, DRIVER_DEVICE, &mount, &ctx.wait)
    }

    fn sync_ld_conf(&self, ctx: &FixContext<'_>, container: &ContainerInfo, mode: Mode) -> Result<()> {
        let logical = ctx.host.container_rootfs(&container.name).join(LD_CONF_FILE);
        let present = ctx.host.exists(&logical).map_err(|e| {
            TargetError::inspection(
                &container.name,
                format!("failed to query {}: {}", logical.display(), e),
            )
        })?;
        if present {
            return Ok(());
        }

        if !mode.is_fix() {
            return Err(Violation::new(
                &container.name,
                logical.display().to_string(),
                "Nvidia loader config file is missing",
            )
            .into());
        }

        info!("Writing {}", logical.display());
        let path = ctx.host.path(&logical);
        fs::write(&path, format!("{}\n", DRIVER_MOUNT_PATH))
            .and_then(|_| fs::set_permissions(&path, fs::Permissions::from_mode(LD_CONF_MODE)))
            .map_err(|e| {
                TargetError::remediation(
                    &container.name,
                    format!("failed to write {}: {}", logical.display(), e),
                )
            })
    }

    fn sync_nodes(&self, ctx: &FixContext<'_>, container: &ContainerInfo, mode: Mode) -> Result<()> {
        for node in ctx.host.find_nodes("/dev", node_pattern())? {
            if container.devices.contains_name(&node) {
                continue;
            }

            if !mode.is_fix() {
                return Err(Violation::new(
                    &container.name,
                    node.as_str(),
                    format!("container is missing Nvidia device {}", node),
                )
                .into());
            }

            add_device_sync(ctx.backend, &container.name, &node, &passthrough_device(&node), &ctx.wait)?;
        }
        Ok(())
    }
}

impl Fixable for NvidiaFixable {
    fn name(&self) -> &'static str {
        "nvidia"
    }

    fn needs_root(&self) -> bool {
        false
    }

    fn run(&self, ctx: &FixContext<'_>, container: &ContainerInfo, mode: Mode) -> Result<()> {
        if !ctx.host.exists(DRIVER_VERSION_FILE)? {
            return Ok(());
        }

        let Some(driver) = self.resolver.resolve(ctx.host)? else {
            return Ok(());
        };

        self.sync_driver_mount(ctx, container, driver, mode)?;
        self.sync_ld_conf(ctx, container, mode)?;
        self.sync_nodes(ctx, container, mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, MemoryBackend};
    use std::fs::File;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(root: &Path, logical: &str, content: &str) {
        let path = root.join(logical.trim_start_matches('/'));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Host with driver 390 loaded, its libraries, two device nodes and one target
    fn nvidia_host(version: &str) -> (TempDir, Host, MemoryBackend) {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(root, DRIVER_VERSION_FILE, version);
        fs::create_dir_all(root.join("usr/lib/nvidia-390")).unwrap();
        fs::create_dir_all(root.join("dev/nvidia-caps")).unwrap();
        File::create(root.join("dev/nvidia0")).unwrap();
        File::create(root.join("dev/nvidiactl")).unwrap();
        File::create(root.join("dev/null")).unwrap();

        let host = Host::with_root(root);
        fs::create_dir_all(host.path(host.container_rootfs("build1")).join("etc/ld.so.conf.d")).unwrap();

        let backend = MemoryBackend::new()
            .with_container(ContainerInfo::new("build1").with_target("amd64", "ubuntu-sdk-16.04"));
        (temp_dir, host, backend)
    }

    #[test]
    fn test_parse_driver_version() {
        let driver = NvidiaDriver::parse("390.77\n").unwrap();
        assert_eq!(driver.version, "390");
        assert_eq!(driver.lib_dir, "/usr/lib/nvidia-390");

        assert!(NvidiaDriver::parse("unknown").is_none());
        assert!(NvidiaDriver::parse("").is_none());
    }

    #[test]
    fn test_resolver_caches_success() {
        let (tmp, host, _backend) = nvidia_host("390.77\n");
        let resolver = NvidiaResolver::new();
        assert_eq!(resolver.resolve(&host).unwrap().unwrap().lib_dir, "/usr/lib/nvidia-390");

        // The cached answer survives the version file going away
        fs::remove_file(host.path(DRIVER_VERSION_FILE)).unwrap();
        assert_eq!(resolver.resolve(&host).unwrap().unwrap().version, "390");
        drop(tmp);
    }

    #[test]
    fn test_missing_library_dir_is_unavailable() {
        let (_tmp, host, _backend) = nvidia_host("410.48\n");
        let resolver = NvidiaResolver::new();
        assert!(resolver.resolve(&host).unwrap().is_none());
    }

    #[test]
    fn test_unrecognised_version_is_noop() {
        let (_tmp, host, backend) = nvidia_host("unknown");
        let ctx = FixContext::new(&backend, &host);
        let fixable = NvidiaFixable::default();

        fixable.check(&ctx).unwrap();
        fixable.fix(&ctx).unwrap();
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_no_driver_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        File::create(temp_dir.path().join("nvidia0")).unwrap();
        let host = Host::with_root(temp_dir.path());
        let backend = MemoryBackend::new()
            .with_container(ContainerInfo::new("build1").with_target("amd64", "ubuntu-sdk-16.04"));
        let ctx = FixContext::new(&backend, &host);

        NvidiaFixable::default().fix(&ctx).unwrap();
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_unreadable_loader_config_is_not_a_violation() {
        let (_tmp, host, backend) = nvidia_host("390.77\n");
        let mount = DeviceDescriptor::new(DeviceType::Disk)
            .with("source", "/usr/lib/nvidia-390")
            .with("path", DRIVER_MOUNT_PATH)
            .with("recursive", "true");
        backend.insert(
            ContainerInfo::new("build1")
                .with_target("amd64", "ubuntu-sdk-16.04")
                .with_device(DRIVER_DEVICE, mount),
        );
        let conf = host.path(host.container_rootfs("build1").join(LD_CONF_FILE));
        std::os::unix::fs::symlink(&conf, &conf).unwrap();
        let ctx = FixContext::new(&backend, &host);

        let err = NvidiaFixable::default().check(&ctx).unwrap_err();
        assert!(matches!(err, TargetError::Inspection { .. }));

        let err = NvidiaFixable::default().fix(&ctx).unwrap_err();
        assert!(matches!(err, TargetError::Inspection { .. }));
        assert!(backend.calls().is_empty());
        assert!(fs::symlink_metadata(&conf).unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_check_fails_fast_on_missing_mount() {
        let (_tmp, host, backend) = nvidia_host("390.77\n");
        let ctx = FixContext::new(&backend, &host);
        let err = NvidiaFixable::default().check(&ctx).unwrap_err();
        let violation = err.violation().unwrap();
        assert_eq!(violation.resource, DRIVER_DEVICE);
        assert_eq!(violation.reason, "Nvidia binary directory is not mounted");
    }

    #[test]
    fn test_fix_converges_all_sub_checks() {
        let (_tmp, host, backend) = nvidia_host("390.77\n");
        let ctx = FixContext::new(&backend, &host);
        let fixable = NvidiaFixable::default();

        fixable.fix(&ctx).unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0],
            BackendCall::AddDevice {
                container: "build1".to_string(),
                name: DRIVER_DEVICE.to_string(),
                device: DeviceDescriptor::new(DeviceType::Disk)
                    .with("source", "/usr/lib/nvidia-390")
                    .with("path", "/usr/lib/nvidia-gl")
                    .with("recursive", "true"),
            }
        );
        assert_eq!(
            calls[1],
            BackendCall::AddDevice {
                container: "build1".to_string(),
                name: "/dev/nvidia0".to_string(),
                device: passthrough_device("/dev/nvidia0"),
            }
        );

        let ld_conf = host.path(host.container_rootfs("build1").join(LD_CONF_FILE));
        assert_eq!(fs::read_to_string(&ld_conf).unwrap(), "/usr/lib/nvidia-gl\n");

        fixable.check(&ctx).unwrap();

        backend.clear_calls();
        fixable.fix(&ctx).unwrap();
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn test_stale_mount_is_replaced() {
        let (_tmp, host, backend) = nvidia_host("390.77\n");
        backend.insert(
            ContainerInfo::new("build1")
                .with_target("amd64", "ubuntu-sdk-16.04")
                .with_device(
                    DRIVER_DEVICE,
                    DeviceDescriptor::new(DeviceType::Disk)
                        .with("source", "/usr/lib/nvidia-375")
                        .with("path", DRIVER_MOUNT_PATH)
                        .with("recursive", "true"),
                ),
        );
        let ctx = FixContext::new(&backend, &host);
        let fixable = NvidiaFixable::default();

        let err = fixable.check(&ctx).unwrap_err();
        assert_eq!(
            err.violation().unwrap().reason,
            "Nvidia binary directory is not pointing to the currently used one"
        );

        fixable.fix(&ctx).unwrap();
        let calls = backend.calls();
        assert_eq!(
            calls[0],
            BackendCall::RemoveDevice {
                container: "build1".to_string(),
                name: DRIVER_DEVICE.to_string(),
            }
        );
        let mounted = backend.snapshot("build1").unwrap();
        assert_eq!(
            mounted.devices.get(DRIVER_DEVICE).unwrap().get("source"),
            Some("/usr/lib/nvidia-390")
        );
    }

    #[test]
    fn test_mutation_failure_aborts_container() {
        let (_tmp, host, backend) = nvidia_host("390.77\n");
        backend.fail_operations(Some("device add refused"));
        let ctx = FixContext::new(&backend, &host);

        let err = NvidiaFixable::default().fix(&ctx).unwrap_err();
        assert!(matches!(err, TargetError::OperationFailed { .. }));
        // Linker config and device nodes were never reached
        assert_eq!(backend.calls().len(), 1);
        assert!(!host.path(host.container_rootfs("build1").join(LD_CONF_FILE)).exists());
    }
}
