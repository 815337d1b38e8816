// src/lib.rs

//! GooGet package manager core
//!
//! Resolves install, update and remove requests against prioritized
//! repositories, keeps a durable SQLite record of what is installed, and
//! drives each package through download, verification, scripts and
//! recording.
//!
//! # Architecture
//!
//! - Explicit environment: paths and settings live in one [`config::Environment`] value
//! - Plans before effects: the resolver decides everything before the first mutation
//! - Serial installs: archives download in parallel, packages install one at a time
//! - Durable records: each package is recorded in its own SQLite transaction

pub mod cache;
pub mod cancel;
pub mod clean;
pub mod config;
pub mod db;
mod error;
pub mod filesystem;
pub mod hash;
pub mod lock;
pub mod manager;
pub mod packages;
pub mod repository;
pub mod resolver;
pub mod scriptlet;
pub mod transaction;
pub mod version;

pub use error::{Error, Result};
pub use manager::Manager;
