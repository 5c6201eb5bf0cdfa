//! Readiness probe
//!
//! Answers "can the SDK use the container backend right now": the LXD bridge
//! has a subnet, the daemon answers, and no managed container needs fixing.
//! Each failure maps to its own exit code.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::info;

use super::reconciler::Reconciler;
use crate::error::{Result, TargetError};
use crate::fixables::FixContext;

/// Configuration of the LXD bridge
pub const LXD_BRIDGE_FILE: &str = "/etc/default/lxd-bridge";

/// Validate the contents of the bridge configuration file
pub fn check_bridge_config(contents: &str) -> Result<()> {
    let mut values: HashMap<&str, String> = HashMap::new();

    for line in contents.lines() {
        if line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split('=').collect();
        if parts.len() != 2 {
            continue;
        }

        let key = parts[0].trim();
        if key == "USE_LXD_BRIDGE" || key == "LXD_IPV4_ADDR" {
            let value = parts[1].trim().trim_matches('"').to_string();
            info!("Key {} has value \"{}\".", key, value);
            values.insert(key, value);
        }
    }

    let enabled = values.get("USE_LXD_BRIDGE").map(String::as_str) == Some("true");
    let has_subnet = values.get("LXD_IPV4_ADDR").is_some_and(|v| !v.is_empty());

    if !enabled || !has_subnet {
        return Err(TargetError::BridgeNotConfigured(
            "lxd-bridge needs USE_LXD_BRIDGE=\"true\" and an LXD_IPV4_ADDR".to_string(),
        ));
    }
    Ok(())
}

/// Validate the bridge configuration file at `path`
pub fn check_bridge(path: &Path) -> Result<()> {
    let contents = fs::read_to_string(path).map_err(|e| {
        TargetError::BridgeNotConfigured(format!("could not read {}: {}", path.display(), e))
    })?;
    check_bridge_config(&contents)
}

/// Full readiness probe; `bridge_file` of `None` skips the bridge check
pub fn check_ready(reconciler: &Reconciler, ctx: &FixContext<'_>, bridge_file: Option<&Path>) -> Result<()> {
    match bridge_file {
        Some(path) => {
            check_bridge(path)?;
            info!("LXD bridge is configured with a subnet.");
        }
        None => info!("Skipping bridge check."),
    }

    ctx.backend.list_containers()?;
    reconciler.check(ctx)?;

    info!("Container backend is ready.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::container::ContainerInfo;
    use crate::error::{EXIT_NEEDS_FIXING, EXIT_NO_ACCESS, EXIT_NO_BRIDGE};
    use crate::host::Host;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{NamedTempFile, TempDir};

    const CONFIGURED: &str = r#"# Whether to setup a new bridge or use an existing one
USE_LXD_BRIDGE="true"
LXD_BRIDGE="lxdbr0"
LXD_IPV4_ADDR="10.0.3.1"
LXD_IPV4_NETMASK="255.255.255.0"
"#;

    #[test]
    fn test_bridge_configured() {
        check_bridge_config(CONFIGURED).unwrap();
    }

    #[test]
    fn test_bridge_without_subnet() {
        let config = "USE_LXD_BRIDGE=\"true\"\nLXD_IPV4_ADDR=\"\"\n";
        let err = check_bridge_config(config).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_NO_BRIDGE);
    }

    #[test]
    fn test_bridge_disabled_or_commented() {
        assert!(check_bridge_config("USE_LXD_BRIDGE=\"false\"\nLXD_IPV4_ADDR=\"10.0.3.1\"\n").is_err());
        assert!(check_bridge_config("#USE_LXD_BRIDGE=\"true\"\nLXD_IPV4_ADDR=\"10.0.3.1\"\n").is_err());
    }

    #[test]
    fn test_bridge_file_missing() {
        let err = check_bridge(Path::new("/nonexistent/lxd-bridge")).unwrap_err();
        assert!(matches!(err, TargetError::BridgeNotConfigured(_)));
    }

    #[test]
    fn test_ready_exit_conditions() {
        let temp_dir = TempDir::new().unwrap();
        let host = Host::with_root(temp_dir.path());
        let mut bridge = NamedTempFile::new().unwrap();
        write!(bridge, "{}", CONFIGURED).unwrap();

        let backend = MemoryBackend::new();
        let reconciler = Reconciler::default();
        let ctx = FixContext::new(&backend, &host);
        check_ready(&reconciler, &ctx, Some(bridge.path())).unwrap();

        backend.set_unreachable(true);
        let err = check_ready(&reconciler, &ctx, None).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_NO_ACCESS);
        backend.set_unreachable(false);

        // Locked down container directory
        let dir = host.path(host.container_dir("build1"));
        fs::create_dir_all(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o700)).unwrap();
        backend.insert(ContainerInfo::new("build1").with_target("armhf", "ubuntu-sdk-15.04"));
        let err = check_ready(&reconciler, &ctx, None).unwrap_err();
        assert_eq!(err.exit_code(), EXIT_NEEDS_FIXING);
    }
}
