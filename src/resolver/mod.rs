// src/resolver/mod.rs

//! Dependency resolution
//!
//! This module decides what an operation will do before anything is
//! touched: latest-version selection across prioritized repositories,
//! update computation, install closures with topological ordering, and the
//! replacement, conflict and cascade rules that turn a closure into a
//! [`Plan`].

pub mod graph;
pub mod plan;
pub mod selector;
pub mod update;

pub use graph::{DependencyGraph, ResolvedPackage};
pub use plan::{Plan, PlannedInstall, Resolver};
pub use selector::{Candidate, select_latest, select_request};
pub use update::{Update, compute_updates};
