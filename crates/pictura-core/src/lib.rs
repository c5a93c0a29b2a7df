//! Shared types for Pictura
//!
//! The generation record and its lifecycle, plus the storage seams the
//! generator depends on: a keyed record store and a path-addressed blob store

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod error;
mod record;
mod store;

pub use error::{StoreError, TransitionError};
pub use record::{Artifact, Completion, GenerationRecord, GenerationStatus, Options, round_cost};
pub use store::{BlobStore, ProviderUsage, RecordFilter, RecordStore};
