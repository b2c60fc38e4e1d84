//! Market entity types: cached statistics, aggregate rows, actions, traits.
//!
//! `MarketStats` is the materialized per-token statistics record. It is
//! created lazily on first request, mutated only by the recompute pass,
//! and carries an explicit dirty flag (`requires_update`) set by mutation
//! events outside this core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Timestamp, TokenId};

// ============================================================================
// MARKET STATISTICS
// ============================================================================

/// Materialized market statistics for one token.
///
/// All price fields are denominated in the marketplace's base currency.
/// Nullable fields are `None` when the token has no active offers
/// (`floor`, `median`) or no settled sales (`highest_sold`, `lowest_sold`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    /// Token this record belongs to.
    pub token_id: TokenId,
    /// Minimum active offer price.
    pub floor: Option<f64>,
    /// Continuous median (interpolated percentile) of active offer prices.
    pub median: Option<f64>,
    /// Count of active offers.
    pub total_listing: i64,
    /// Highest settled sale price.
    pub highest_sold: Option<f64>,
    /// Lowest settled sale price.
    pub lowest_sold: Option<f64>,
    /// Sum of mint-time sale prices.
    pub primary_total: f64,
    /// Sum of settled secondary sale prices.
    pub secondary_volume: f64,
    /// Count of settled secondary sales.
    pub secondary_volume_count: i64,
    /// Secondary sale volume over the trailing 24 hours.
    pub secondary_volume_24h: f64,
    /// Secondary sale count over the trailing 24 hours.
    pub secondary_volume_count_24h: i64,
    /// When this record was last recomputed.
    pub updated_at: Timestamp,
    /// Dirty flag set by mutation events (new offer, accepted offer, sale).
    pub requires_update: bool,
}

impl MarketStats {
    /// Zero-valued record for a token with no stats row yet.
    ///
    /// Marked `requires_update` so the next recompute pass picks it up.
    pub fn zeroed(token_id: TokenId) -> Self {
        Self {
            token_id,
            floor: None,
            median: None,
            total_listing: 0,
            highest_sold: None,
            lowest_sold: None,
            primary_total: 0.0,
            secondary_volume: 0.0,
            secondary_volume_count: 0,
            secondary_volume_24h: 0.0,
            secondary_volume_count_24h: 0,
            updated_at: DateTime::<Utc>::MIN_UTC,
            requires_update: true,
        }
    }

    /// Age of this record relative to `now`.
    pub fn age(&self, now: Timestamp) -> chrono::Duration {
        now.signed_duration_since(self.updated_at)
    }
}

// ============================================================================
// AGGREGATE ROW SHAPES
// ============================================================================

/// One row of the grouped offer aggregate query.
///
/// The store computes these per token over active offers only:
/// min price, continuous 0.5 percentile, and row count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferAggregate {
    pub token_id: TokenId,
    pub floor: Option<f64>,
    pub median: Option<f64>,
    pub total_listing: i64,
}

/// Kind of action record relevant to stats recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// A secondary sale that settled.
    SaleSettled,
    /// A mint that happened through a primary sale.
    MintedFromSale,
}

/// A sale or mint action row as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub token_id: TokenId,
    pub kind: ActionKind,
    pub price: f64,
    pub occurred_at: Timestamp,
}

// ============================================================================
// TRAIT HISTOGRAMS
// ============================================================================

/// A single named attribute-value pair on an edition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditionTrait {
    pub name: String,
    pub value: String,
}

impl EditionTrait {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Occurrence count for one trait value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub occurrence: u64,
}

/// All observed values for one trait name, in first-appearance order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitCount {
    pub name: String,
    pub values: Vec<ValueCount>,
}

/// Per-token trait histogram, recomputed on demand and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitHistogram {
    pub token_id: TokenId,
    pub traits: Vec<TraitCount>,
}

impl TraitHistogram {
    /// Empty histogram for a token with no editions.
    pub fn empty(token_id: TokenId) -> Self {
        Self {
            token_id,
            traits: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
