//! # pkgqa-core
//!
//! Core types shared by every pkgqa crate.
//!
//! This crate provides the vocabulary the scan engine is written in:
//! - [`Scope`], the granularity a check or source works at
//! - Entities streamed through pipelines (versions, package and category groups,
//!   eclasses, commits, package changes)
//! - [`Restriction`], the predicate selecting which entities a source yields
//! - [`Finding`] and [`MetadataError`], what checks report
//! - [`ProtectedSet`], the overlay set shared between sibling profile lookups
//! - Syntax tree types handed out by parse-injecting sources
//!
//! Package-format semantics (version comparison, mask algebra) live outside
//! the engine; entities arrive here already parsed and ordered.

pub mod containers;
pub mod entity;
pub mod errors;
pub mod finding;
pub mod restrict;
pub mod scope;
pub mod syntax;

pub use containers::{Contains, ProtectedSet};
pub use entity::{
    ChangeStatus, Cpv, Eclass, Entity, GitCommit, GitPkgChange, Package, PackageKey, PkgItem,
};
pub use errors::CoreError;
pub use finding::{Finding, MetadataError, Severity, Target};
pub use restrict::Restriction;
pub use scope::Scope;
pub use syntax::{SyntaxParser, SyntaxTree};
