//! CLI argument parsing

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::engine::LXD_BRIDGE_FILE;
use crate::host::DEFAULT_LXD_DIR;

#[derive(Parser, Debug)]
#[command(name = "usdk-target")]
#[command(author, version, about = "Manage and repair LXD based SDK build targets", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubCommand,

    /// lxc client binary used to talk to the LXD daemon
    #[arg(long, global = true, env = "USDK_LXC", default_value = "lxc")]
    pub lxc: PathBuf,

    /// LXD data directory
    #[arg(long, global = true, env = "LXD_DIR", default_value = DEFAULT_LXD_DIR)]
    pub lxd_dir: PathBuf,

    /// Root the host filesystem is resolved against
    #[arg(long, global = true, env = "USDK_HOST_ROOT", default_value = "/", hide = true)]
    pub host_root: PathBuf,

    /// Give up waiting on a backend operation after this many seconds
    #[arg(long, global = true, env = "USDK_WAIT_TIMEOUT", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// LXD bridge configuration checked by `initialized`
    #[arg(long, global = true, default_value = LXD_BRIDGE_FILE)]
    pub bridge_file: PathBuf,

    /// Output format as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// List all SDK build targets
    List,

    /// Succeed if a container with this name exists
    Exists {
        name: String,
    },

    /// Print the host path of a container's root filesystem
    Rootfs {
        name: String,
    },

    /// Print the status and IPv4 address of a container
    Status {
        name: String,
    },

    /// Stop and delete a container
    Destroy {
        name: String,
    },

    /// Check that the container backend is ready for use
    Initialized {
        /// Skip the LXD bridge check
        #[arg(short = 'b', long = "ignore-bridge")]
        ignore_bridge: bool,
    },

    /// Fix all SDK build targets
    Autofix,

    /// Check one container, or every target when no name is given
    Check {
        name: Option<String>,
    },

    /// Fix one container, or every target when no name is given
    Fix {
        name: Option<String>,
    },
}

impl Args {
    pub fn config(&self) -> Config {
        Config {
            lxc: self.lxc.clone(),
            lxd_dir: self.lxd_dir.clone(),
            host_root: self.host_root.clone(),
            wait_timeout: self.timeout.map(Duration::from_secs),
            bridge_file: self.bridge_file.clone(),
            confined: Config::detect_confinement(),
        }
    }
}
