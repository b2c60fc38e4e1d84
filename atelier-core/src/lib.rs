//! Atelier Core - Data Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no query logic, no caching policy.

pub mod error;
pub mod filter;
pub mod market;

pub use error::{LoaderError, MarketError, MarketResult, StoreError};
pub use filter::{FilterExpr, FilterOperator};
pub use market::{
    ActionKind, ActionRecord, EditionTrait, MarketStats, OfferAggregate, TraitCount,
    TraitHistogram, ValueCount,
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Token identifier using UUIDv7 for timestamp-sortable IDs.
pub type TokenId = Uuid;

/// Edition identifier (one minted instance of a token).
pub type EditionId = Uuid;

/// Action identifier (sale, mint, transfer records).
pub type ActionId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 token id (timestamp-sortable).
pub fn new_token_id() -> TokenId {
    Uuid::now_v7()
}

/// Generate a new UUIDv7 edition id.
pub fn new_edition_id() -> EditionId {
    Uuid::now_v7()
}
