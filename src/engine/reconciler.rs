//! Reconciliation driver
//!
//! Runs the fixables in a fixed order. Check stops at the first violation so
//! it can serve as a cheap readiness probe. Fix runs every module and stops
//! only on a hard error.

use tracing::info;

use crate::fixables::{
    CheckResult, DevicesFixable, DriFixable, FixContext, FixResult, Fixable, NvidiaFixable,
    NvidiaResolver, RootfsFixable,
};
use crate::security::require_privilege;

pub struct Reconciler {
    fixables: Vec<Box<dyn Fixable>>,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::standard(NvidiaResolver::new())
    }
}

impl Reconciler {
    pub fn new(fixables: Vec<Box<dyn Fixable>>) -> Self {
        Self { fixables }
    }

    /// The full module set: rootfs access, broken devices, DRI, Nvidia
    pub fn standard(resolver: NvidiaResolver) -> Self {
        Self::new(vec![
            Box::new(RootfsFixable),
            Box::new(DevicesFixable),
            Box::new(DriFixable),
            Box::new(NvidiaFixable::new(resolver)),
        ])
    }

    pub fn fixables(&self) -> &[Box<dyn Fixable>] {
        &self.fixables
    }

    /// Check all managed containers, stopping at the first violation
    pub fn check(&self, ctx: &FixContext<'_>) -> CheckResult {
        for fixable in &self.fixables {
            info!("Checking {}", fixable.name());
            fixable.check(ctx)?;
        }
        Ok(())
    }

    /// Fix all managed containers
    pub fn fix(&self, ctx: &FixContext<'_>) -> FixResult {
        require_privilege(&self.fixables, ctx.privileged)?;
        for fixable in &self.fixables {
            info!("Fixing possible {} problems", fixable.name());
            fixable.fix(ctx)?;
        }
        Ok(())
    }

    pub fn check_container(&self, ctx: &FixContext<'_>, name: &str) -> CheckResult {
        for fixable in &self.fixables {
            fixable.check_container(ctx, name)?;
        }
        Ok(())
    }

    pub fn fix_container(&self, ctx: &FixContext<'_>, name: &str) -> FixResult {
        require_privilege(&self.fixables, ctx.privileged)?;
        for fixable in &self.fixables {
            fixable.fix_container(ctx, name)?;
        }
        Ok(())
    }
}
