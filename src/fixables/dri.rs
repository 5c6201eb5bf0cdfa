//! DRI device pass-through
//!
//! GPU card and render nodes of the host are passed into every target so
//! hardware accelerated tools work inside the container.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use super::{passthrough_device, FixContext, Fixable, Mode};
use crate::backend::add_device_sync;
use crate::container::ContainerInfo;
use crate::error::{Result, Violation};

const DRI_DIR: &str = "/dev/dri";

fn dri_node_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(card|renderD)[0-9]+$").expect("valid DRI node pattern"))
}

#[derive(Debug, Default)]
pub struct DriFixable;

impl Fixable for DriFixable {
    fn name(&self) -> &'static str {
        "dri"
    }

    fn needs_root(&self) -> bool {
        false
    }

    fn run(&self, ctx: &FixContext<'_>, container: &ContainerInfo, mode: Mode) -> Result<()> {
        // DRI nodes cannot be opened under snap confinement
        if ctx.host.is_confined() {
            warn!("Skipping {}/* devices under confinement", DRI_DIR);
            return Ok(());
        }

        for node in ctx.host.find_nodes(DRI_DIR, dri_node_pattern())? {
            if container.devices.contains_name(&node) {
                continue;
            }

            if !mode.is_fix() {
                return Err(Violation::new(
                    &container.name,
                    node.as_str(),
                    format!("container is missing device node {}", node),
                )
                .into());
            }

            info!("Passing {} into {}", node, container.name);
            add_device_sync(ctx.backend, &container.name, &node, &passthrough_device(&node), &ctx.wait)?;
        }

        Ok(())
    }
}
