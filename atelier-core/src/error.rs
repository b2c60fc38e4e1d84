//! Error types for Atelier data-access operations

use thiserror::Error;

use crate::TokenId;

/// Store layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Save failed for stats row {token_id}: {reason}")]
    SaveFailed { token_id: TokenId, reason: String },

    #[error("Aggregate query failed: {reason}")]
    AggregateFailed { reason: String },

    #[error("Store connection lost: {reason}")]
    ConnectionLost { reason: String },
}

/// Batch loader errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoaderError {
    #[error("Batch function returned {got} results for {expected} keys")]
    BatchShape { expected: usize, got: usize },

    #[error("Batch dispatch failed: {reason}")]
    DispatchFailed { reason: String },
}

/// Master error type for the data-access core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarketError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),
}

/// Result type alias for data-access operations.
pub type MarketResult<T> = Result<T, MarketError>;

// =============================================================================
// TESTS
// =============================================================================
