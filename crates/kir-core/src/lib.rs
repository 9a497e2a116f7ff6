//! Core types and trait definitions for the KIR household registry.
//!
//! No HTTP or database dependencies. Storage backends implement
//! [`store::RecordStore`]; the dedupe engine and the API depend only on that
//! abstraction.

pub mod batch;
pub mod error;
pub mod etag;
pub mod household;
pub mod related;
pub mod store;

pub use error::{Error, Result};
