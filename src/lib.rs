//! usdk-target - LXD backed build targets for the Ubuntu SDK
//!
//! Build targets are LXD containers tagged with a click architecture and
//! framework. Over time they drift from what the SDK needs: the rootfs is
//! locked down by a daemon upgrade, a shared host directory disappears, the
//! GPU driver changes. The engine detects that drift with a set of fixables
//! and repairs it through the backend's device API.
//!
//! # Example
//!
//! ```no_run
//! use usdk_target::backend::LxcBackend;
//! use usdk_target::engine::Reconciler;
//! use usdk_target::fixables::FixContext;
//! use usdk_target::host::Host;
//!
//! let backend = LxcBackend::new("lxc");
//! let host = Host::default();
//! let ctx = FixContext::new(&backend, &host);
//! Reconciler::default().check(&ctx).unwrap();
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod fixables;
pub mod host;
pub mod output;
pub mod security;

pub use backend::{Backend, LxcBackend, MemoryBackend};
pub use config::Config;
pub use container::{ContainerManager, Target};
pub use engine::Reconciler;
pub use error::{Result, TargetError};
pub use output::{format_output, OutputFormat};
