//! Check lifecycle runners.
//!
//! A runner pairs one source with the checks consuming its entities and drives
//! them through `start -> run* -> finish`. Metadata errors raised by any hook,
//! or collected by the source while streaming, become findings; each distinct
//! `(version, error)` pair is reported once for the life of the runner.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;
use pkgqa_core::{Cpv, Finding, MetadataError, Restriction, Scope};
use pkgqa_source::Source;

use crate::check::{Check, CheckResult};
use crate::error::{CheckError, PipelineError};

/// Lifecycle position of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Running,
    Finished,
}

impl Phase {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "not started",
            Self::Running => "running",
            Self::Finished => "finished",
        }
    }
}

pub struct CheckRunner {
    source: Source,
    checks: Arc<[Arc<dyn Check>]>,
    phase: Mutex<Phase>,
    reported: Mutex<HashSet<(Cpv, String)>>,
}

impl CheckRunner {
    /// Attach `checks` to `source`; every check must share the source's scope.
    pub fn new(source: Source, checks: Vec<Arc<dyn Check>>) -> Result<Self, PipelineError> {
        let source_scope = source.scope();
        if let Some(check) = checks.iter().find(|c| c.scope() != source_scope) {
            return Err(PipelineError::ScopeMismatch {
                check: check.name().to_string(),
                check_scope: check.scope(),
                source_scope,
            });
        }
        Ok(Self {
            source,
            checks: checks.into(),
            phase: Mutex::new(Phase::Start),
            reported: Mutex::new(HashSet::new()),
        })
    }

    #[must_use]
    pub fn scope(&self) -> Scope {
        self.source.scope()
    }

    #[must_use]
    pub const fn source(&self) -> &Source {
        &self.source
    }

    #[must_use]
    pub fn checks(&self) -> &[Arc<dyn Check>] {
        &self.checks
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    fn advance(&self, action: &'static str, from: Phase, to: Phase) -> Result<(), PipelineError> {
        let mut phase = self.phase.lock();
        if *phase != from {
            return Err(PipelineError::InvalidState {
                action,
                state: phase.as_str(),
            });
        }
        *phase = to;
        Ok(())
    }

    /// Run every check's start hook.
    pub fn start(&self) -> Result<Vec<Finding>, PipelineError> {
        self.advance("start", Phase::Start, Phase::Running)?;
        let mut findings = Vec::new();
        for check in self.checks.iter() {
            self.intercept(check.as_ref(), check.start(), &mut findings)?;
        }
        Ok(findings)
    }

    /// Feed every entity matching `restriction` to every check, then report
    /// the metadata errors the source collected along the way.
    ///
    /// May be called several times, concurrently, between `start` and `finish`.
    pub fn run(&self, restriction: Option<&Restriction>) -> Result<Vec<Finding>, PipelineError> {
        let phase = self.phase();
        if phase != Phase::Running {
            return Err(PipelineError::InvalidState {
                action: "run",
                state: phase.as_str(),
            });
        }

        let mut findings = Vec::new();
        for entity in self.source.stream(restriction.unwrap_or(&Restriction::All)) {
            for check in self.checks.iter() {
                self.intercept(check.as_ref(), check.feed(&entity), &mut findings)?;
            }
        }
        for err in self.source.take_metadata_errors() {
            self.report(&err, &mut findings);
        }
        Ok(findings)
    }

    /// Run every check's finish hook.
    pub fn finish(&self) -> Result<Vec<Finding>, PipelineError> {
        self.advance("finish", Phase::Running, Phase::Finished)?;
        let mut findings = Vec::new();
        for check in self.checks.iter() {
            self.intercept(check.as_ref(), check.finish(), &mut findings)?;
        }
        Ok(findings)
    }

    fn intercept(
        &self,
        check: &dyn Check,
        result: CheckResult,
        out: &mut Vec<Finding>,
    ) -> Result<(), PipelineError> {
        match result {
            Ok(findings) => out.extend(findings),
            Err(CheckError::Metadata(err)) => self.report(&err, out),
            Err(CheckError::Failed(message)) => {
                return Err(PipelineError::Check {
                    check: check.name().to_string(),
                    message,
                });
            }
        }
        Ok(())
    }

    fn report(&self, err: &MetadataError, out: &mut Vec<Finding>) {
        if self.reported.lock().insert(err.dedup_key()) {
            out.push(Finding::metadata_error(err));
        }
    }

    fn identity(&self) -> BTreeSet<usize> {
        self.checks.iter().map(|c| Arc::as_ptr(c).cast::<()>().addr()).collect()
    }
}

/// Runners are equal when they wrap the same check instances, whatever
/// their source.
impl PartialEq for CheckRunner {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for CheckRunner {}

impl Hash for CheckRunner {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for CheckRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.checks.iter().map(|c| c.name()).collect();
        names.sort_unstable();
        write!(f, "CheckRunner({})", names.join(", "))
    }
}
