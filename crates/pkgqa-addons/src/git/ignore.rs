use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

/// Matcher over a repository's `.gitignore` and `.git/info/exclude`.
#[derive(Debug)]
pub struct GitIgnore {
    root: PathBuf,
    matcher: Gitignore,
}

impl GitIgnore {
    /// Load ignore rules from `root`; missing or unreadable files add no rules.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let mut builder = GitignoreBuilder::new(&root);
        for file in [root.join(".gitignore"), root.join(".git/info/exclude")] {
            if !file.is_file() {
                continue;
            }
            if let Some(e) = builder.add(&file) {
                tracing::debug!(file = %file.display(), error = %e, "skipping invalid ignore rules");
            }
        }
        let matcher = builder.build().unwrap_or_else(|e| {
            tracing::debug!(root = %root.display(), error = %e, "ignore rules unusable");
            Gitignore::empty()
        });
        Self { root, matcher }
    }

    /// Whether `path` is ignored; absolute paths outside the repository never are.
    #[must_use]
    pub fn matched(&self, path: &Path) -> bool {
        let relative = if path.is_absolute() {
            match path.strip_prefix(&self.root) {
                Ok(rel) => rel,
                Err(_) => return false,
            }
        } else {
            path
        };
        if relative.as_os_str().is_empty() {
            return false;
        }
        let is_dir = self.root.join(relative).is_dir();
        self.matcher
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_rules_from_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join(".gitignore"), "*.swp\ndistfiles/\n").unwrap();
        std::fs::create_dir_all(root.join(".git/info")).unwrap();
        std::fs::write(root.join(".git/info/exclude"), "local.conf\n").unwrap();
        std::fs::create_dir_all(root.join("distfiles")).unwrap();

        let ignore = GitIgnore::new(root);
        assert!(ignore.matched(Path::new("cat/a/a-1.ebuild.swp")));
        assert!(ignore.matched(&root.join("distfiles/foo.tar.gz")));
        assert!(ignore.matched(Path::new("local.conf")));
        assert!(!ignore.matched(Path::new("cat/a/a-1.ebuild")));
        assert!(!ignore.matched(Path::new("/elsewhere/x.swp")));
    }

    #[test]
    fn no_rules() {
        let dir = tempfile::tempdir().unwrap();
        let ignore = GitIgnore::new(dir.path());
        assert!(!ignore.matched(Path::new("anything")));
    }
}
