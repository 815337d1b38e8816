// src/packages/mod.rs

//! Package model for GooGet
//!
//! This module provides the identifier algebra (`name.arch.version`,
//! requests and wildcard patterns), the [`PkgSpec`] description published by
//! repositories, and the `.goo` archive format.

pub mod archive;
pub mod ident;
pub mod spec;

pub use ident::{Arch, IdentPattern, PackageIdent, PackageKey, PackageRequest};
pub use spec::{DependencyRequest, PkgSpec, Script};
