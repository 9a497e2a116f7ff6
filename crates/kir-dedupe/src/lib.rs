//! Duplicate-record resolution for the KIR registry.
//!
//! [`DuplicateResolver::scan`] groups the households of a partition by their
//! normalised national ID. [`DuplicateResolver::merge`] collapses one group
//! into its oldest member in a single atomic batch: merged attributes,
//! re-pointed related documents, index cleanup and deletion of the losers.

pub mod config;
pub mod error;
pub mod group;
pub mod merge;
pub mod report;
pub mod resolver;

pub use config::ResolverConfig;
pub use error::{Error, Result};
pub use group::DuplicateGroup;
pub use resolver::DuplicateResolver;

#[cfg(test)]
mod tests;
