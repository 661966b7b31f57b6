//! Profile cache reuse and invalidation.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use pkgqa_addons::{ProfileAddon, ProfileEvaluator, ProfileRecord, ProfileSpec, ProfileTree};
use pkgqa_cache::CacheStore;
use pkgqa_source::MemoryRepo;
use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use tempfile::TempDir;

/// Records evaluations and derives a record from the stack's `use.mask` files.
#[derive(Default)]
struct CountingEvaluator {
    calls: AtomicUsize,
}

impl ProfileEvaluator for CountingEvaluator {
    fn evaluate(&self, profile: &ProfileSpec) -> Result<ProfileRecord, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if profile.path.contains("broken") {
            return Err("invalid parent".into());
        }
        let mut record = ProfileRecord::default();
        for node in &profile.stack {
            if let Ok(text) = std::fs::read_to_string(node.join("use.mask")) {
                record
                    .masked_use
                    .extend(text.split_whitespace().map(str::to_string));
            }
        }
        Ok(record)
    }
}

struct Fixture {
    repo: TempDir,
    cache: TempDir,
}

impl Fixture {
    fn profiles(&self) -> std::path::PathBuf {
        self.repo.path().join("profiles")
    }

    fn tree(&self) -> ProfileTree {
        let profiles = self.profiles();
        let spec = |path: &str, arch: &str| ProfileSpec {
            path: path.into(),
            arch: arch.into(),
            status: "stable".into(),
            deprecated: false,
            stack: vec![profiles.join("base"), profiles.join(path)],
        };
        ProfileTree {
            repo: Arc::new(MemoryRepo::new(self.repo.path(), [])),
            known_arches: ["amd64".to_string(), "x86".to_string()].into(),
            profiles: vec![spec("default/amd64", "amd64"), spec("default/x86", "x86")],
        }
    }

    fn addon(&self) -> ProfileAddon {
        ProfileAddon::new(CacheStore::new(self.cache.path()), true)
    }
}

fn touch(path: &Path) {
    let when = SystemTime::now() + Duration::from_secs(120);
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(when)
        .unwrap();
}

#[fixture]
fn fx() -> Fixture {
    let repo = tempfile::tempdir().unwrap();
    let profiles = repo.path().join("profiles");
    for (dir, mask) in [("base", "doc"), ("default/amd64", "x32"), ("default/x86", "")] {
        std::fs::create_dir_all(profiles.join(dir)).unwrap();
        std::fs::write(profiles.join(dir).join("use.mask"), mask).unwrap();
    }
    Fixture {
        repo,
        cache: tempfile::tempdir().unwrap(),
    }
}

#[rstest]
fn second_scan_reuses_cached_profiles(fx: Fixture) {
    let evaluator = CountingEvaluator::default();
    let first = fx.addon().update_cache(&[fx.tree()], &evaluator, false).unwrap();
    assert_eq!(first.evaluated, ["default/amd64", "default/x86"]);
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 2);

    let mut addon = fx.addon();
    let second = addon.update_cache(&[fx.tree()], &evaluator, false).unwrap();
    assert!(second.evaluated.is_empty());
    assert_eq!(second.reused, ["default/amd64", "default/x86"]);
    assert_eq!(evaluator.calls.load(Ordering::SeqCst), 2);

    let amd64 = &addon.get("amd64")[0];
    assert_eq!(
        amd64.record.masked_use,
        BTreeSet::from(["doc".to_string(), "x32".to_string()])
    );
}

#[rstest]
fn touching_one_file_invalidates_only_its_profile(fx: Fixture) {
    let evaluator = CountingEvaluator::default();
    fx.addon().update_cache(&[fx.tree()], &evaluator, false).unwrap();

    touch(&fx.profiles().join("default/x86/use.mask"));
    let update = fx.addon().update_cache(&[fx.tree()], &evaluator, false).unwrap();
    assert_eq!(update.evaluated, ["default/x86"]);
    assert_eq!(update.reused, ["default/amd64"]);
}

#[rstest]
fn new_file_in_shared_parent_invalidates_all(fx: Fixture) {
    let evaluator = CountingEvaluator::default();
    fx.addon().update_cache(&[fx.tree()], &evaluator, false).unwrap();

    std::fs::write(fx.profiles().join("base/package.mask"), "dev-libs/a\n").unwrap();
    touch(&fx.profiles().join("base/package.mask"));
    let update = fx.addon().update_cache(&[fx.tree()], &evaluator, false).unwrap();
    assert_eq!(update.evaluated.len(), 2);
    assert!(update.reused.is_empty());
}

#[rstest]
fn failing_profiles_are_skipped(fx: Fixture) {
    let evaluator = CountingEvaluator::default();
    let mut tree = fx.tree();
    let mut broken = tree.profiles[0].clone();
    broken.path = "default/broken".into();
    broken.stack.truncate(1);
    tree.profiles.push(broken);

    let mut addon = fx.addon();
    let update = addon.update_cache(&[tree], &evaluator, false).unwrap();
    assert_eq!(update.skipped, ["default/broken"]);
    assert_eq!(addon.get("amd64").len(), 1);
    assert_eq!(addon.get("~amd64").len(), 1);
}

#[rstest]
fn arch_selection_limits_evaluation(fx: Fixture) {
    let evaluator = CountingEvaluator::default();
    let mut addon = fx.addon().with_arches(["x86"]);
    let update = addon.update_cache(&[fx.tree()], &evaluator, false).unwrap();
    assert_eq!(update.evaluated, ["default/x86"]);
    assert!(addon.get("amd64").is_empty());
    assert_eq!(addon.evaluate_groups("~x86").len(), 1);
}
