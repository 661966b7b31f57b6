//! The scan scheduler.
//!
//! A scan runs every runner's start hook, then the main phase under one of
//! three strategies picked from the scan scope and job count, then every
//! finish hook, and finally closes the results stream:
//!
//! | scan scope            | jobs            | strategy                       |
//! |-----------------------|-----------------|--------------------------------|
//! | eclass, version       | any             | serial                         |
//! | package               | unset           | serial (configurable)          |
//! | package               | set             | worker pool, task per package  |
//! | category or coarser   | any             | producer feeding worker queue  |
//!
//! Findings from different entities may interleave under the concurrent
//! strategies, but start findings always precede main-phase findings, which
//! always precede finish findings.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel as chan;
use parking_lot::Mutex;
use pkgqa_config::{ScanConfig, VersionFilter};
use pkgqa_core::{Entity, Finding, PackageKey, Restriction, Scope};
use pkgqa_source::{Repository, Source};

use crate::error::PipelineError;
use crate::plug::Pipes;
use crate::results::{ResultsReceiver, ResultsSender, results_channel};
use crate::runner::CheckRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Requested workers; `None` leaves package scans serial and sizes pools
    /// to the host.
    pub jobs: Option<usize>,
    pub serial_package_scope: bool,
    /// Apply the latest-slot reducer to repository sources.
    pub latest: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            jobs: None,
            serial_package_scope: true,
            latest: false,
        }
    }
}

impl From<&ScanConfig> for PipelineOptions {
    fn from(config: &ScanConfig) -> Self {
        Self {
            jobs: config.jobs,
            serial_package_scope: config.serial_package_scope,
            latest: config.filter == Some(VersionFilter::Latest),
        }
    }
}

impl PipelineOptions {
    #[must_use]
    pub fn workers(&self) -> usize {
        self.jobs.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Default source feeding `scope` checks from `repo`.
    #[must_use]
    pub fn source(&self, repo: Arc<dyn Repository>, scope: Scope) -> Option<Source> {
        Source::scoped(repo, scope, self.latest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Serial,
    WorkerPool,
    ProducerQueue,
}

pub struct Pipeline {
    pipes: Pipes,
    scan_scope: Scope,
    restriction: Restriction,
    identities: Source,
    options: PipelineOptions,
}

impl Pipeline {
    /// Schedule `pipes` for a scan of `scan_scope`; package identities for
    /// the concurrent strategies are enumerated from `repo`.
    #[must_use]
    pub fn new(
        pipes: Pipes,
        scan_scope: Scope,
        restriction: Restriction,
        repo: Arc<dyn Repository>,
    ) -> Self {
        Self {
            pipes,
            scan_scope,
            restriction,
            identities: Source::raw(repo).unversioned(),
            options: PipelineOptions::default(),
        }
    }

    #[must_use]
    pub const fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        match self.scan_scope {
            Scope::Eclass | Scope::Version => Strategy::Serial,
            Scope::Package if self.options.jobs.is_none() && self.options.serial_package_scope => {
                Strategy::Serial
            }
            Scope::Package => Strategy::WorkerPool,
            Scope::Category | Scope::Repository | Scope::Commit => Strategy::ProducerQueue,
        }
    }

    fn runners(&self) -> impl Iterator<Item = &Arc<CheckRunner>> {
        self.pipes.values().flatten()
    }

    /// Run the scan, pushing findings to `results` and closing the stream.
    ///
    /// On failure the end marker is not sent, so consumers see a truncated
    /// stream.
    pub fn run(&self, results: &ResultsSender) -> Result<(), PipelineError> {
        let strategy = self.strategy();
        tracing::debug!(
            scope = %self.scan_scope,
            jobs = ?self.options.jobs,
            ?strategy,
            "scheduling scan"
        );

        let mut started = Vec::new();
        for runner in self.runners() {
            started.extend(runner.start()?);
        }
        results.push(started)?;

        match strategy {
            Strategy::Serial => {
                let runners: Vec<_> = self.runners().cloned().collect();
                results.push(run_all(&runners, &self.restriction)?)?;
            }
            Strategy::WorkerPool => self.run_worker_pool(results)?,
            Strategy::ProducerQueue => {
                let (granular, coarse): (Vec<_>, Vec<_>) = self
                    .runners()
                    .cloned()
                    .partition(|r| r.scope().is_package_granular());
                if !granular.is_empty() {
                    self.run_producer_queue(&granular, results)?;
                }
                results.push(run_all(&coarse, &self.restriction)?)?;
            }
        }

        let mut finished = Vec::new();
        for runner in self.runners() {
            finished.extend(runner.finish()?);
        }
        results.push(finished)?;
        results.done()
    }

    /// Run the scan on a background thread.
    #[must_use]
    pub fn spawn(self) -> (thread::JoinHandle<Result<(), PipelineError>>, ResultsReceiver) {
        let (tx, rx) = results_channel();
        let handle = thread::spawn(move || self.run(&tx));
        (handle, rx)
    }

    fn package_restriction(&self, key: PackageKey) -> Restriction {
        self.restriction.clone().and(Restriction::Package(key))
    }

    /// One task per package identity for version runners plus one task per
    /// remaining runner over the whole restriction; batches are pushed in
    /// completion order.
    ///
    /// Every task is joined before returning. After a failure, tasks that
    /// have not started yet return without feeding anything.
    fn run_worker_pool(&self, results: &ResultsSender) -> Result<(), PipelineError> {
        let (per_version, whole): (Vec<_>, Vec<_>) = self
            .runners()
            .cloned()
            .partition(|r| r.scope() == Scope::Version);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers())
            .thread_name(|i| format!("pkgqa-worker-{i}"))
            .build()?;
        let failure = Failure::default();

        pool.scope(|s| {
            let (failure, per_version) = (&failure, per_version.as_slice());

            for runner in &whole {
                s.spawn(move |_| {
                    let outcome = guarded(|| failure.run(std::slice::from_ref(runner), &self.restriction))
                        .and_then(|batch| results.push(batch));
                    if let Err(e) = outcome {
                        failure.record(e);
                    }
                });
            }

            if per_version.is_empty() {
                return;
            }
            for entity in self.identities.stream(&self.restriction) {
                if failure.is_set() {
                    break;
                }
                let Entity::Key(key) = entity else {
                    continue;
                };
                let restriction = self.package_restriction(key);
                s.spawn(move |_| {
                    let outcome = guarded(|| failure.run(per_version, &restriction))
                        .and_then(|batch| results.push(batch));
                    if let Err(e) = outcome {
                        failure.record(e);
                    }
                });
            }
        });

        failure.into_result()
    }

    /// A producer enumerates package identities into a bounded queue ending
    /// with one sentinel per worker; each worker runs `runners` per identity
    /// until it takes its sentinel.
    ///
    /// After a failure, workers keep draining without running anything so
    /// the producer never blocks on a full queue.
    fn run_producer_queue(
        &self,
        runners: &[Arc<CheckRunner>],
        results: &ResultsSender,
    ) -> Result<(), PipelineError> {
        let workers = self.options.workers();
        let (queue_tx, queue_rx) = chan::bounded::<Option<PackageKey>>(workers * 2);
        let failure = Failure::default();

        thread::scope(|s| {
            let failure = &failure;

            s.spawn(move || {
                let produced = panic::catch_unwind(AssertUnwindSafe(|| {
                    for entity in self.identities.stream(&self.restriction) {
                        if failure.is_set() {
                            break;
                        }
                        let Entity::Key(key) = entity else {
                            continue;
                        };
                        if queue_tx.send(Some(key)).is_err() {
                            break;
                        }
                    }
                }));
                for _ in 0..workers {
                    if queue_tx.send(None).is_err() {
                        break;
                    }
                }
                if let Err(payload) = produced {
                    failure.record(PipelineError::WorkerPanic(panic_message(payload.as_ref())));
                }
            });

            for _ in 0..workers {
                let rx = queue_rx.clone();
                s.spawn(move || {
                    while let Ok(Some(key)) = rx.recv() {
                        if failure.is_set() {
                            continue;
                        }
                        let restriction = self.package_restriction(key);
                        let outcome = guarded(|| failure.run(runners, &restriction))
                            .and_then(|batch| results.push(batch));
                        if let Err(e) = outcome {
                            failure.record(e);
                        }
                    }
                });
            }
        });

        failure.into_result()
    }
}

/// First failure of a concurrent phase. Once one is recorded, pending work
/// is skipped.
#[derive(Default)]
struct Failure {
    aborted: AtomicBool,
    first: Mutex<Option<PipelineError>>,
}

impl Failure {
    fn is_set(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn record(&self, err: PipelineError) {
        tracing::error!(error = %err, "scan worker failed");
        self.aborted.store(true, Ordering::SeqCst);
        self.first.lock().get_or_insert(err);
    }

    /// Run `runners` in turn, stopping before the next one once a failure
    /// has been recorded anywhere.
    fn run(&self, runners: &[Arc<CheckRunner>], restriction: &Restriction) -> Result<Vec<Finding>, PipelineError> {
        let mut findings = Vec::new();
        for runner in runners {
            if self.is_set() {
                break;
            }
            findings.extend(runner.run(Some(restriction))?);
        }
        Ok(findings)
    }

    fn into_result(self) -> Result<(), PipelineError> {
        self.first.into_inner().map_or(Ok(()), Err)
    }
}

fn run_all(runners: &[Arc<CheckRunner>], restriction: &Restriction) -> Result<Vec<Finding>, PipelineError> {
    let mut findings = Vec::new();
    for runner in runners {
        findings.extend(runner.run(Some(restriction))?);
    }
    Ok(findings)
}

/// Run `task`, turning a panic into [`PipelineError::WorkerPanic`].
fn guarded<T>(task: impl FnOnce() -> Result<T, PipelineError>) -> Result<T, PipelineError> {
    panic::catch_unwind(AssertUnwindSafe(task))
        .unwrap_or_else(|payload| Err(PipelineError::WorkerPanic(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}
