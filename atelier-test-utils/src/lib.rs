//! Atelier Test Utilities
//!
//! Centralized test infrastructure for the Atelier workspace:
//! - Fixture builders for stats rows, actions, and edition traits
//! - Proptest generators for key sets and price lists
//! - Small helpers shared by integration tests

// Re-export core types for convenience
pub use atelier_core::{
    ActionKind, ActionRecord, EditionTrait, FilterExpr, FilterOperator, MarketError,
    MarketResult, MarketStats, OfferAggregate, TokenId, TraitCount, TraitHistogram, ValueCount,
    new_edition_id, new_token_id,
};

use chrono::{Duration, Utc};
use proptest::prelude::*;

// ============================================================================
// FIXTURE BUILDERS
// ============================================================================

/// A fresh stats row: recomputed just now, dirty flag clear.
pub fn fresh_stats(token_id: TokenId) -> MarketStats {
    MarketStats {
        updated_at: Utc::now(),
        requires_update: false,
        ..MarketStats::zeroed(token_id)
    }
}

/// A stats row last recomputed `hours` hours ago, dirty flag clear.
pub fn aged_stats(token_id: TokenId, hours: i64) -> MarketStats {
    MarketStats {
        updated_at: Utc::now() - Duration::hours(hours),
        requires_update: false,
        ..MarketStats::zeroed(token_id)
    }
}

/// A settled secondary sale `hours_ago` hours in the past.
pub fn settled_sale(token_id: TokenId, price: f64, hours_ago: i64) -> ActionRecord {
    ActionRecord {
        token_id,
        kind: ActionKind::SaleSettled,
        price,
        occurred_at: Utc::now() - Duration::hours(hours_ago),
    }
}

/// A mint-time primary sale `hours_ago` hours in the past.
pub fn mint_sale(token_id: TokenId, price: f64, hours_ago: i64) -> ActionRecord {
    ActionRecord {
        token_id,
        kind: ActionKind::MintedFromSale,
        price,
        occurred_at: Utc::now() - Duration::hours(hours_ago),
    }
}

/// Shorthand for a trait list.
pub fn traits(pairs: &[(&str, &str)]) -> Vec<EditionTrait> {
    pairs
        .iter()
        .map(|(name, value)| EditionTrait::new(*name, *value))
        .collect()
}

/// A token attribute document for mock-store collection queries.
pub fn token_doc(
    pairs: &[(&str, serde_json::Value)],
) -> serde_json::Map<String, serde_json::Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Small key lists with repeats, for loader dedup/ordering laws.
pub fn arb_key_list() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(0u8..16, 0..32)
}

/// Positive price lists for aggregate checks.
pub fn arb_prices() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.01f64..10_000.0, 0..20)
}
