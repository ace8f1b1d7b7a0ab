//! Typed pipeline errors.
//!
//! Functions across the crate return [`anyhow::Result`]; the failures a
//! caller may want to react to are raised as the types below and can be
//! recovered with `err.downcast_ref::<T>()`.

use thiserror::Error;

use crate::models::PlaceId;

/// The review source reported an error before any review was collected.
#[derive(Debug, Error)]
#[error("review source error for place {place_id} on page {page}: {message}")]
pub struct UpstreamError {
    pub place_id: PlaceId,
    pub page: u32,
    pub message: String,
}

/// Reading or writing a cached review set failed.
#[derive(Debug, Error)]
#[error("review cache I/O failed for place {place_id}: {source}")]
pub struct CacheIoError {
    pub place_id: PlaceId,
    #[source]
    pub source: anyhow::Error,
}

/// Reading or writing a persisted vector index failed.
#[derive(Debug, Error)]
#[error("vector index I/O failed for place {place_id}: {source}")]
pub struct IndexIoError {
    pub place_id: PlaceId,
    #[source]
    pub source: anyhow::Error,
}

/// A question was asked before any place was selected.
#[derive(Debug, Error)]
#[error("no place selected; select a place before asking questions")]
pub struct NoPlaceSelected;
