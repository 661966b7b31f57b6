//! Restrictions selecting which entities a source yields.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::entity::{Cpv, Eclass, Package, PackageKey};

/// A predicate over packages and eclasses.
///
/// Package-shaped restrictions never match eclasses and [`Restriction::Eclass`]
/// never matches packages; only [`Restriction::All`] spans both.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Restriction {
    #[default]
    All,
    Category(String),
    Package(PackageKey),
    Version(Cpv),
    Eclass(BTreeSet<String>),
    And(Vec<Restriction>),
    Or(Vec<Restriction>),
    Not(Box<Restriction>),
}

impl Restriction {
    #[must_use]
    pub fn eclasses<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Eclass(names.into_iter().map(Into::into).collect())
    }

    /// Combine with another restriction, flattening trivial cases.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::All, r) | (r, Self::All) => r,
            (Self::And(mut a), Self::And(b)) => {
                a.extend(b);
                Self::And(a)
            }
            (Self::And(mut a), r) => {
                a.push(r);
                Self::And(a)
            }
            (l, r) => Self::And(vec![l, r]),
        }
    }

    #[must_use]
    pub fn matches_pkg(&self, pkg: &Package) -> bool {
        self.matches_cpv(&pkg.cpv)
    }

    #[must_use]
    pub fn matches_cpv(&self, cpv: &Cpv) -> bool {
        match self {
            Self::All => true,
            Self::Category(cat) => cpv.category == *cat,
            Self::Package(key) => cpv.category == key.category && cpv.package == key.package,
            Self::Version(v) => v == cpv,
            Self::Eclass(_) => false,
            Self::And(rs) => rs.iter().all(|r| r.matches_cpv(cpv)),
            Self::Or(rs) => rs.iter().any(|r| r.matches_cpv(cpv)),
            Self::Not(r) => !r.matches_cpv(cpv),
        }
    }

    /// Whether any version of `key` could match.
    #[must_use]
    pub fn matches_key(&self, key: &PackageKey) -> bool {
        match self {
            Self::All => true,
            Self::Category(cat) => key.category == *cat,
            Self::Package(k) => k == key,
            Self::Version(cpv) => cpv.category == key.category && cpv.package == key.package,
            Self::Eclass(_) => false,
            Self::And(rs) => rs.iter().all(|r| r.matches_key(key)),
            Self::Or(rs) => rs.iter().any(|r| r.matches_key(key)),
            // a negated version restriction still leaves other versions
            Self::Not(r) => match r.as_ref() {
                Self::Version(_) => true,
                other => !other.matches_key(key),
            },
        }
    }

    #[must_use]
    pub fn matches_eclass(&self, eclass: &Eclass) -> bool {
        match self {
            Self::All => true,
            Self::Eclass(names) => names.contains(&eclass.name),
            Self::Category(_) | Self::Package(_) | Self::Version(_) => false,
            Self::And(rs) => rs.iter().all(|r| r.matches_eclass(eclass)),
            Self::Or(rs) => rs.iter().any(|r| r.matches_eclass(eclass)),
            Self::Not(r) => !r.matches_eclass(eclass),
        }
    }
}

impl From<PackageKey> for Restriction {
    fn from(key: PackageKey) -> Self {
        Self::Package(key)
    }
}

impl From<Cpv> for Restriction {
    fn from(cpv: Cpv) -> Self {
        Self::Version(cpv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(cat: &str, name: &str, ver: &str) -> Package {
        Package::new(Cpv::new(cat, name, ver), "0")
    }

    #[test]
    fn package_restrictions_ignore_eclasses() {
        let eclass = Eclass::new("foo", "/nonexistent/foo.eclass");
        assert!(Restriction::All.matches_eclass(&eclass));
        assert!(!Restriction::Category("cat".into()).matches_eclass(&eclass));
        assert!(Restriction::eclasses(["foo"]).matches_eclass(&eclass));
        assert!(!Restriction::eclasses(["foo"]).matches_pkg(&pkg("cat", "foo", "1")));
    }

    #[test]
    fn and_flattens() {
        let r = Restriction::All
            .and(Restriction::Category("cat".into()))
            .and(Restriction::Not(Box::new(Restriction::Version(Cpv::new("cat", "a", "1")))));
        assert!(matches!(&r, Restriction::And(rs) if rs.len() == 2));
        assert!(r.matches_pkg(&pkg("cat", "a", "2")));
        assert!(!r.matches_pkg(&pkg("cat", "a", "1")));
        assert!(!r.matches_pkg(&pkg("dev", "a", "2")));
    }

    #[test]
    fn key_matching() {
        let key = PackageKey::new("cat", "a");
        assert!(Restriction::Version(Cpv::new("cat", "a", "1")).matches_key(&key));
        assert!(!Restriction::Package(PackageKey::new("cat", "b")).matches_key(&key));
        assert!(
            Restriction::Not(Box::new(Restriction::Version(Cpv::new("cat", "a", "1"))))
                .matches_key(&key)
        );
        assert!(!Restriction::Not(Box::new(Restriction::Category("cat".into()))).matches_key(&key));
    }
}
