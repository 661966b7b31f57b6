//! The check lifecycle contract.

use std::fmt;

use pkgqa_core::{Entity, Finding, Scope};

use crate::error::CheckError;

pub type CheckResult = Result<Vec<Finding>, CheckError>;

/// A unit of analysis fed entities of one scope.
///
/// Hooks take `&self`: a runner may feed one check from several workers at
/// once, so per-scan state lives behind the check's own synchronization.
pub trait Check: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Scope of the entities this check consumes.
    fn scope(&self) -> Scope;

    /// Finding kinds this check can report.
    fn known_results(&self) -> &[&'static str] {
        &[]
    }

    fn start(&self) -> CheckResult {
        Ok(Vec::new())
    }

    fn feed(&self, entity: &Entity) -> CheckResult;

    fn finish(&self) -> CheckResult {
        Ok(Vec::new())
    }
}
