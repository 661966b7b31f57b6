//! Parsing of framed `git log --name-status` output.

use chrono::NaiveDate;
use pkgqa_core::{ChangeStatus, Cpv, GitCommit, GitPkgChange};

use crate::error::AddonError;

pub(crate) const COMMIT_MARKER: &str = "# BEGIN COMMIT";
pub(crate) const MESSAGE_END: &str = "# END MESSAGE BODY";

/// `--pretty` lines for package change walks.
pub(crate) const PKG_FORMAT: &[&str] = &[COMMIT_MARKER, "%h", "%cd"];

/// `--pretty` lines for full commit walks.
pub(crate) const COMMIT_FORMAT: &[&str] = &[
    COMMIT_MARKER,
    "%h",
    "%cd",
    "%an <%ae>",
    "%cn <%ce>",
    "%B",
    MESSAGE_END,
];

/// A package file change from one `--name-status` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Single { status: ChangeStatus, cpv: Cpv },
    Rename { old: Cpv, new: Cpv },
}

/// Identity of an ebuild path `category/package/package-version.ebuild`.
///
/// Paths of any other shape, or whose file name does not start with the
/// package directory name, are ignored.
#[must_use]
pub fn ebuild_cpv(path: &str) -> Option<Cpv> {
    let mut parts = path.split('/');
    let (category, package, file) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || category.is_empty() || package.is_empty() {
        return None;
    }
    let version = file
        .strip_suffix(".ebuild")?
        .strip_prefix(package)?
        .strip_prefix('-')?;
    version
        .starts_with(|c: char| c.is_ascii_digit())
        .then(|| Cpv::new(category, package, version))
}

/// Parse one `--name-status` line, keeping ebuild changes only.
#[must_use]
pub fn parse_change_line(line: &str) -> Option<FileChange> {
    let mut fields = line.split('\t');
    let status = fields.next()?;
    match status.chars().next()? {
        'R' if status[1..].chars().all(|c| c.is_ascii_digit()) => {
            let old = ebuild_cpv(fields.next()?)?;
            let new = ebuild_cpv(fields.next()?)?;
            fields.next().is_none().then_some(FileChange::Rename { old, new })
        }
        c if status.len() == 1 => {
            let status = ChangeStatus::from_char(c).filter(|s| *s != ChangeStatus::Renamed)?;
            let cpv = ebuild_cpv(fields.next()?)?;
            fields.next().is_none().then_some(FileChange::Single { status, cpv })
        }
        _ => None,
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, AddonError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| AddonError::Git(format!("invalid commit date {value:?}: {e}")))
}

struct Framed<I: Iterator> {
    lines: std::iter::Peekable<I>,
}

impl<'a, I: Iterator<Item = &'a str>> Framed<I> {
    fn new(lines: I) -> Self {
        let mut lines = lines.peekable();
        // leading marker of the first commit
        lines.next_if(|l| *l == COMMIT_MARKER);
        Self { lines }
    }

    fn field(&mut self, name: &str) -> Result<&'a str, AddonError> {
        self.lines
            .next()
            .ok_or_else(|| AddonError::Git(format!("truncated git log: missing {name}")))
    }

    fn changes(&mut self) -> Vec<FileChange> {
        let mut changes = Vec::new();
        for line in self.lines.by_ref() {
            if line == COMMIT_MARKER {
                break;
            }
            changes.extend(parse_change_line(line));
        }
        changes
    }

    fn done(&mut self) -> bool {
        self.lines.peek().is_none()
    }
}

/// Package changes per commit, newest commit first.
///
/// Upstream walks split a rename into an addition of the new identity and a
/// removal of the old one; local walks keep it as one rename change.
pub fn parse_pkg_changes<'a>(
    lines: impl Iterator<Item = &'a str>,
    local: bool,
) -> Result<Vec<GitPkgChange>, AddonError> {
    let mut framed = Framed::new(lines);
    let mut out = Vec::new();
    while !framed.done() {
        let commit = framed.field("hash")?.to_string();
        let commit_date = parse_date(framed.field("date")?)?;
        let change = |atom: Cpv, status, old| GitPkgChange {
            atom,
            status,
            commit: commit.clone(),
            commit_date,
            old,
        };
        for file_change in framed.changes() {
            match file_change {
                FileChange::Single { status, cpv } => out.push(change(cpv, status, None)),
                FileChange::Rename { old, new } if local => {
                    out.push(change(new, ChangeStatus::Renamed, Some(old)));
                }
                FileChange::Rename { old, new } => {
                    out.push(change(new, ChangeStatus::Added, None));
                    out.push(change(old, ChangeStatus::Removed, None));
                }
            }
        }
    }
    Ok(out)
}

/// Full commits with the package versions each one touched.
pub fn parse_commits<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Vec<GitCommit>, AddonError> {
    let mut framed = Framed::new(lines);
    let mut out = Vec::new();
    while !framed.done() {
        let hash = framed.field("hash")?.to_string();
        let commit_date = parse_date(framed.field("date")?)?;
        let author = framed.field("author")?.to_string();
        let committer = framed.field("committer")?.to_string();
        let mut message = Vec::new();
        loop {
            let line = framed.field("message end")?;
            if line == MESSAGE_END {
                break;
            }
            message.push(line.to_string());
        }
        while message.last().is_some_and(String::is_empty) {
            message.pop();
        }
        let pkgs = framed
            .changes()
            .into_iter()
            .flat_map(|change| match change {
                FileChange::Single { cpv, .. } => vec![cpv],
                FileChange::Rename { old, new } => vec![old, new],
            })
            .collect();
        out.push(GitCommit {
            hash,
            commit_date,
            author,
            committer,
            message,
            pkgs,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("dev-libs/foo/foo-1.2.ebuild", Some(Cpv::new("dev-libs", "foo", "1.2")))]
    #[case("dev-libs/foo-bar/foo-bar-2-r1.ebuild", Some(Cpv::new("dev-libs", "foo-bar", "2-r1")))]
    #[case("dev-libs/foo/Manifest", None)]
    #[case("dev-libs/foo/bar-1.ebuild", None)]
    #[case("dev-libs/foo/files/foo-1.ebuild", None)]
    #[case("eclass/foo.eclass", None)]
    fn ebuild_paths(#[case] path: &str, #[case] expected: Option<Cpv>) {
        assert_eq!(ebuild_cpv(path), expected);
    }

    #[test]
    fn change_lines() {
        assert_eq!(
            parse_change_line("M\tcat/a/a-1.ebuild"),
            Some(FileChange::Single {
                status: ChangeStatus::Modified,
                cpv: Cpv::new("cat", "a", "1")
            })
        );
        assert_eq!(
            parse_change_line("R097\tcat/a/a-1.ebuild\tcat/b/b-1.ebuild"),
            Some(FileChange::Rename {
                old: Cpv::new("cat", "a", "1"),
                new: Cpv::new("cat", "b", "1")
            })
        );
        assert_eq!(parse_change_line("C100\tcat/a/a-1.ebuild\tcat/a/a-2.ebuild"), None);
        assert_eq!(parse_change_line("R\tcat/a/a-1.ebuild"), None);
        assert_eq!(parse_change_line(""), None);
    }

    const PKG_LOG: &str = "# BEGIN COMMIT
abc1234
2024-03-02

A\tcat/a/a-2.ebuild
M\tcat/a/metadata.xml
R100\tcat/b/b-1.ebuild\tcat/c/c-1.ebuild
# BEGIN COMMIT
def5678
2024-03-01

D\tcat/a/a-1.ebuild";

    #[test]
    fn upstream_renames_split() {
        let changes = parse_pkg_changes(PKG_LOG.lines(), false).unwrap();
        let summary: Vec<String> = changes
            .iter()
            .map(|c| format!("{} {} {}", c.status, c.atom, c.commit))
            .collect();
        assert_eq!(
            summary,
            [
                "A cat/a-2 abc1234",
                "A cat/c-1 abc1234",
                "D cat/b-1 abc1234",
                "D cat/a-1 def5678",
            ]
        );
        assert_eq!(changes[3].commit_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn local_renames_kept() {
        let changes = parse_pkg_changes(PKG_LOG.lines(), true).unwrap();
        let rename = &changes[1];
        assert_eq!(rename.status, ChangeStatus::Renamed);
        assert_eq!(rename.atom, Cpv::new("cat", "c", "1"));
        assert_eq!(rename.old, Some(Cpv::new("cat", "b", "1")));
    }

    #[test]
    fn bad_date_is_error() {
        let log = "# BEGIN COMMIT\nabc\nyesterday\n";
        assert!(matches!(parse_pkg_changes(log.lines(), false), Err(AddonError::Git(_))));
    }

    #[test]
    fn empty_log() {
        assert!(parse_pkg_changes("".lines(), false).unwrap().is_empty());
        assert!(parse_commits("".lines()).unwrap().is_empty());
    }

    #[test]
    fn commits_with_messages() {
        let log = "# BEGIN COMMIT
abc1234
2024-03-02
Jane Dev <jane@example.org>
Jane Dev <jane@example.org>
cat/a: add 2

Bug: https://bugs.example.org/1

# END MESSAGE BODY

A\tcat/a/a-2.ebuild
# BEGIN COMMIT
def5678
2024-03-01
Sam Dev <sam@example.org>
Jane Dev <jane@example.org>
eclass: tweak
# END MESSAGE BODY
";
        let commits = parse_commits(log.lines()).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(
            commits[0].message,
            ["cat/a: add 2", "", "Bug: https://bugs.example.org/1"]
        );
        assert_eq!(commits[0].pkgs, [Cpv::new("cat", "a", "2")]);
        assert_eq!(commits[1].author, "Sam Dev <sam@example.org>");
        assert!(commits[1].pkgs.is_empty());
    }
}
