//! kiln - dependency resolution and matrix builds for native libraries
//!
//! A root module request is resolved into a cycle-free graph ([`resolve`]),
//! then every node is built once per matrix variant in dependency order
//! ([`schedule`]), with results kept in a per-key cache ([`cache`]).
//! Formulas ([`formula`]) supply the per-module discovery and build hooks.

pub mod adapter;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod formula;
pub mod journal;
pub mod manifest;
pub mod module;
pub mod resolve;
pub mod schedule;
pub mod ui;
pub mod version;
pub mod workspace;

pub use error::{KilnError, KilnResult, ResolutionError};
pub use module::{CacheKey, DepSpec, MatrixVariant, ModuleRef};
