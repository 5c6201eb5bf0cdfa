//! Target discovery
//!
//! SDK targets are ordinary LXD containers tagged with both
//! `user.click-architecture` and `user.click-framework`.

use tracing::debug;

use super::types::{ManagedContainer, Target};
use crate::backend::Backend;
use crate::error::Result;

/// All managed containers, in backend order
pub fn find_managed(backend: &dyn Backend) -> Result<Vec<ManagedContainer>> {
    let all = backend.list_containers()?;
    let total = all.len();
    let managed: Vec<ManagedContainer> = all
        .into_iter()
        .filter_map(ManagedContainer::from_info)
        .collect();
    debug!("{} of {} containers are SDK targets", managed.len(), total);
    Ok(managed)
}

/// Identity records of all SDK targets
pub fn find_targets(backend: &dyn Backend) -> Result<Vec<Target>> {
    Ok(find_managed(backend)?.iter().map(ManagedContainer::target).collect())
}
