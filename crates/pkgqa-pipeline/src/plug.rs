use std::collections::BTreeMap;
use std::sync::Arc;

use pkgqa_core::Scope;
use pkgqa_source::Source;

use crate::check::Check;
use crate::error::PipelineError;
use crate::runner::CheckRunner;

/// Runners grouped by the scope of their source.
pub type Pipes = BTreeMap<Scope, Vec<Arc<CheckRunner>>>;

/// Wire sources to their checks.
///
/// Fails on the first check whose scope differs from its source's. A runner
/// wrapping the same check instances as one already plugged is dropped.
pub fn plug<I>(pipes: I) -> Result<Pipes, PipelineError>
where
    I: IntoIterator<Item = (Source, Vec<Arc<dyn Check>>)>,
{
    let mut plugged = Pipes::new();
    for (source, checks) in pipes {
        if checks.is_empty() {
            continue;
        }
        let runner = CheckRunner::new(source, checks)?;
        let runners = plugged.entry(runner.scope()).or_default();
        if runners.iter().any(|existing| **existing == runner) {
            tracing::debug!(?runner, "dropping duplicate runner");
            continue;
        }
        runners.push(Arc::new(runner));
    }
    Ok(plugged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgqa_core::Entity;

    use crate::check::CheckResult;

    #[derive(Debug)]
    struct Noop(Scope);

    impl Check for Noop {
        fn name(&self) -> &str {
            "Noop"
        }

        fn scope(&self) -> Scope {
            self.0
        }

        fn feed(&self, _entity: &Entity) -> CheckResult {
            Ok(Vec::new())
        }
    }

    #[test]
    fn groups_by_scope_and_merges_duplicates() {
        let version: Arc<dyn Check> = Arc::new(Noop(Scope::Version));
        let eclass: Arc<dyn Check> = Arc::new(Noop(Scope::Eclass));
        let pipes = plug([
            (Source::Empty(Scope::Version), vec![version.clone()]),
            (Source::Empty(Scope::Version), vec![version]),
            (Source::Empty(Scope::Eclass), vec![eclass]),
            (Source::Empty(Scope::Package), Vec::new()),
        ])
        .unwrap();
        assert_eq!(pipes.keys().copied().collect::<Vec<_>>(), [Scope::Eclass, Scope::Version]);
        assert_eq!(pipes[&Scope::Version].len(), 1);
    }

    #[test]
    fn rejects_scope_mismatch() {
        let err = plug([(
            Source::Empty(Scope::Package),
            vec![Arc::new(Noop(Scope::Version)) as Arc<dyn Check>],
        )])
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ScopeMismatch {
                check_scope: Scope::Version,
                source_scope: Scope::Package,
                ..
            }
        ));
    }
}
