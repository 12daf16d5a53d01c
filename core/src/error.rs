//! Error kinds shared across the engine, per the error-handling design in
//! the spec's error-kind table: each variant is owned by one layer and
//! propagates (or doesn't) exactly as documented there.

use thiserror::Error;

/// Errors that can cross a component boundary in the alert pipeline.
#[derive(Debug, Error)]
pub enum AlertError {
    /// The referenced resource does not exist in the backing store.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique-index conflict in the backing store.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Input failed validation before reaching the store.
    #[error("validation error: {0}")]
    Validation(String),

    /// An id string failed to parse as the store's id type.
    #[error("bad object id: {0}")]
    BadObjectId(String),

    /// The backing store failed unexpectedly (not a not-found/duplicate).
    #[error("internal store error: {0}")]
    InternalDb(String),

    /// A notification sink failed to deliver. Logged by the fan-out layer;
    /// never propagated out of it.
    #[error("sink delivery failed: {0}")]
    SinkDelivery(String),

    /// A history-store write failed during ingest. Logged; the in-memory
    /// transition proceeds regardless.
    #[error("history write failed: {0}")]
    HistoryWrite(String),

    /// A snapshot write or read failed. Logged; retried on the next tick.
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// The on-call resolver could not produce any staff. Surfaced as a
    /// synthetic critical alert re-injected into the send channel, never
    /// as a propagated error.
    #[error("caller could not resolve on-call staff: {0}")]
    CallerFailureEscalation(String),
}

pub type Result<T> = std::result::Result<T, AlertError>;
