//! Composed source behavior over an in-memory repository.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use pkgqa_core::{
    Cpv, Eclass, Entity, GitCommit, Package, PackageKey, Restriction, Scope, SyntaxParser,
    SyntaxTree,
};
use pkgqa_source::{GroupKey, MemoryRepo, Repository, Source};
use pretty_assertions::assert_eq;
use rstest::rstest;

fn repo() -> Arc<dyn Repository> {
    let pkg = |cat: &str, name: &str, ver: &str, slot: &str| {
        Package::new(Cpv::new(cat, name, ver), slot)
    };
    Arc::new(MemoryRepo::new(
        "/repo",
        [
            pkg("app", "a", "1", "1"),
            pkg("app", "a", "2", "1"),
            pkg("app", "a", "1.5", "2"),
            pkg("app", "b", "1", "0"),
            pkg("dev", "c", "1", "0"),
            pkg("dev", "c", "9999", "0").live(true),
        ],
    ))
}

fn labels(source: &Source, restriction: &Restriction) -> Vec<String> {
    source
        .stream(restriction)
        .map(|entity| match entity {
            Entity::Version(item) => item.pkg().to_string(),
            Entity::Package(items) | Entity::Category(items) => items
                .iter()
                .map(|i| i.pkg().to_string())
                .collect::<Vec<_>>()
                .join(","),
            Entity::Key(key) => key.to_string(),
            Entity::Cpv(cpv) => cpv.to_string(),
            Entity::Eclass(eclass) => eclass.name,
            Entity::Commit(commit) => commit.hash,
            Entity::Change(change) => change.atom.to_string(),
        })
        .collect()
}

#[rstest]
#[case(Scope::Version, Some(Scope::Version))]
#[case(Scope::Package, Some(Scope::Package))]
#[case(Scope::Category, Some(Scope::Category))]
#[case(Scope::Repository, Some(Scope::Repository))]
#[case(Scope::Eclass, None)]
#[case(Scope::Commit, None)]
fn scoped_sources_declare_their_scope(#[case] scope: Scope, #[case] expected: Option<Scope>) {
    assert_eq!(Source::scoped(repo(), scope, false).map(|s| s.scope()), expected);
}

#[test]
fn latest_filter_on_repository() {
    let source = Source::repo(repo()).latest(false);
    assert_eq!(
        labels(&source, &Restriction::All),
        ["app/a-2", "app/a-1.5", "app/b-1", "dev/c-1", "dev/c-9999"]
    );
}

#[test]
fn stream_can_be_repeated_with_other_restrictions() {
    let source = Source::repo(repo()).grouped(GroupKey::Package);
    assert_eq!(labels(&source, &Restriction::All).len(), 3);
    let only_c = Restriction::Package(PackageKey::new("dev", "c"));
    assert_eq!(labels(&source, &only_c), ["dev/c-1,dev/c-9999"]);
    assert_eq!(labels(&source, &Restriction::All).len(), 3);
}

#[test]
fn restricted_ands_with_caller_restriction() {
    let source = Source::repo(repo()).restricted(Restriction::Category("app".into()));
    assert_eq!(labels(&source, &Restriction::All).len(), 4);
    let other = Restriction::Category("dev".into());
    assert!(labels(&source, &other).is_empty());
}

#[test]
fn unversioned_and_versioned_dedup() {
    let raw = Arc::new(
        MemoryRepo::new("/repo", [Package::new(Cpv::new("app", "a", "1"), "0")])
            .with_raw([Cpv::new("app", "a", "1"), Cpv::new("app", "b", "x")]),
    );
    let unversioned = Source::raw(raw.clone()).unversioned();
    assert_eq!(unversioned.scope(), Scope::Package);
    assert_eq!(labels(&unversioned, &Restriction::All), ["app/a", "app/b"]);

    let versioned = Source::raw(raw).versioned();
    assert_eq!(labels(&versioned, &Restriction::All), ["app/a-1", "app/b-x"]);
}

#[test]
fn eclass_source_filters_by_name() {
    let eclasses: BTreeMap<String, Eclass> = ["git-r3", "cmake"]
        .into_iter()
        .map(|n| (n.to_string(), Eclass::new(n, format!("/nonexistent/{n}.eclass"))))
        .collect();
    let source = Source::eclasses(eclasses);
    assert_eq!(source.scope(), Scope::Eclass);
    assert_eq!(labels(&source, &Restriction::All), ["cmake", "git-r3"]);
    assert_eq!(labels(&source, &Restriction::eclasses(["cmake"])), ["cmake"]);
    assert!(labels(&source, &Restriction::Category("app".into())).is_empty());
}

#[test]
fn commit_source_matches_touched_packages() {
    let commit = |hash: &str, cpv: Cpv| GitCommit {
        hash: hash.into(),
        commit_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        author: "dev".into(),
        committer: "dev".into(),
        message: vec!["bump".into()],
        pkgs: vec![cpv],
    };
    let source = Source::commits(vec![
        commit("aaa", Cpv::new("app", "a", "2")),
        commit("bbb", Cpv::new("dev", "c", "1")),
    ]);
    assert_eq!(labels(&source, &Restriction::All), ["aaa", "bbb"]);
    assert_eq!(labels(&source, &Restriction::Category("dev".into())), ["bbb"]);
}

#[derive(Debug)]
struct CountingParser;

impl SyntaxParser for CountingParser {
    fn parse(&self, data: &[u8]) -> Result<SyntaxTree, String> {
        Ok(SyntaxTree::leaf("program", 0..data.len()))
    }
}

#[test]
fn injected_content_is_lazy() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a-1.ebuild");
    std::fs::write(&path, "EAPI=8\n").unwrap();
    let repo: Arc<dyn Repository> = Arc::new(MemoryRepo::new(
        dir.path(),
        [Package::new(Cpv::new("app", "a", "1"), "0").with_path(&path)],
    ));

    let lines = Source::repo(repo.clone()).with_lines();
    let entity = lines.stream(&Restriction::All).next().unwrap();
    let item = entity.as_version().unwrap();
    assert!(!item.content_loaded());
    assert_eq!(item.lines().unwrap().len(), 1);

    let parsed = Source::repo(repo).grouped(GroupKey::Package).parsed(Arc::new(CountingParser));
    assert_eq!(parsed.scope(), Scope::Package);
    let entity = parsed.stream(&Restriction::All).next().unwrap();
    let item = &entity.versions()[0];
    assert!(!item.content_loaded());
    assert_eq!(item.tree().unwrap().bytes, 0..7);
}

#[test]
fn metadata_errors_forwarded_through_wrappers() {
    let err = pkgqa_core::MetadataError::new(Cpv::new("app", "a", "1"), "depend", "boom");
    let repo: Arc<dyn Repository> = Arc::new(
        MemoryRepo::new("/repo", [Package::new(Cpv::new("app", "a", "1"), "0")])
            .with_metadata_errors([err.clone()]),
    );
    let source = Source::repo(repo).latest(true).grouped(GroupKey::Category);
    let _ = source.stream(&Restriction::All).count();
    assert_eq!(source.take_metadata_errors(), vec![err]);
    assert!(source.take_metadata_errors().is_empty());
}
