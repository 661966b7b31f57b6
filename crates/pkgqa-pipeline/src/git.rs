use std::sync::Arc;

use pkgqa_source::Source;

use crate::check::Check;
use crate::error::PipelineError;
use crate::results::ResultsSender;
use crate::runner::CheckRunner;

/// Commit-scope scans: a single runner over a commit source, run start to
/// finish on the calling thread.
#[derive(Debug)]
pub struct GitPipeline {
    runner: CheckRunner,
}

impl GitPipeline {
    pub fn new(source: Source, checks: Vec<Arc<dyn Check>>) -> Result<Self, PipelineError> {
        Ok(Self {
            runner: CheckRunner::new(source, checks)?,
        })
    }

    pub fn run(&self, results: &ResultsSender) -> Result<(), PipelineError> {
        tracing::debug!(runner = ?self.runner, "scanning commits");
        results.push(self.runner.start()?)?;
        results.push(self.runner.run(None)?)?;
        results.push(self.runner.finish()?)?;
        results.done()
    }
}
