//! Atelier Storage - Store Seam and Data-Access Subsystems
//!
//! Defines the async store abstraction consumed by the stats cache, the
//! feature aggregator, and the collection resolver, plus an in-memory
//! mock implementation used across the workspace's tests. The actual
//! database-backed implementation lives outside this core.

pub mod features;
pub mod loader;
pub mod query;
pub mod resolver;
pub mod stats;

pub use features::FeatureAggregator;
pub use loader::{BatchFetch, BatchLoader};
pub use query::{CollectionQuery, FilterCompiler, OrderBy, TraitFilter, TraitGroup};
pub use resolver::{
    CollectionParams, CollectionResolver, EditionsByParent, RelationKey, SearchIndex, SortSpec,
};
pub use stats::{StatsCache, StatsCacheConfig};

use ::async_trait::async_trait;
use atelier_core::{
    ActionRecord, EditionId, EditionTrait, MarketResult, MarketStats, OfferAggregate, TokenId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Async store seam for the data-access core.
///
/// Implementations must support set-membership filters and grouped
/// aggregates (min, continuous percentile, count, sum). Every `_by_ids`
/// style method is positional: the result has exactly one entry per input
/// id, with missing entities as explicit absent markers, never a shorter
/// array.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch stats rows for the given token ids, positionally aligned.
    async fn find_stats_by_ids(
        &self,
        ids: &[TokenId],
    ) -> MarketResult<Vec<Option<MarketStats>>>;

    /// Persist one recomputed stats row.
    async fn save_stats(&self, stats: &MarketStats) -> MarketResult<()>;

    /// Grouped aggregate over active offers for the given tokens:
    /// min price, continuous 0.5 percentile, count. Tokens with no active
    /// offers may be omitted from the result.
    async fn aggregate_offers(&self, ids: &[TokenId]) -> MarketResult<Vec<OfferAggregate>>;

    /// Sale/mint action rows (kinds sale-settled and minted-from-sale)
    /// for the given tokens, unordered.
    async fn find_sale_actions(&self, ids: &[TokenId]) -> MarketResult<Vec<ActionRecord>>;

    /// `(token_id, traits)` for every edition belonging to any of the
    /// given tokens.
    async fn find_edition_traits(
        &self,
        ids: &[TokenId],
    ) -> MarketResult<Vec<(TokenId, Vec<EditionTrait>)>>;

    /// Token ids matching a compiled collection query, ordered and paged.
    async fn find_tokens(&self, query: &CollectionQuery) -> MarketResult<Vec<TokenId>>;

    /// Edition ids per parent token under one query shape, positionally
    /// aligned to `parent_ids` (parents with no matching editions yield
    /// an empty list).
    async fn find_editions(
        &self,
        parent_ids: &[TokenId],
        query: &CollectionQuery,
    ) -> MarketResult<Vec<Vec<EditionId>>>;

    /// Set `requires_update` on a token's stats row. Called by mutation
    /// event sources (new offer, accepted offer, new sale); this core
    /// only reads and clears the flag.
    async fn mark_stats_dirty(&self, token_id: TokenId) -> MarketResult<()>;
}

// ============================================================================
// MOCK STORE
// ============================================================================

/// Per-method call counters, used by tests to assert round-trip bounds.
#[derive(Debug, Default)]
pub struct StoreCallCounts {
    pub stats_lookups: AtomicUsize,
    pub stats_saves: AtomicUsize,
    pub offer_aggregates: AtomicUsize,
    pub action_fetches: AtomicUsize,
    pub trait_fetches: AtomicUsize,
    pub token_queries: AtomicUsize,
    pub edition_queries: AtomicUsize,
}

/// An active offer held by the mock store.
#[derive(Debug, Clone)]
struct MockOffer {
    price: f64,
    active: bool,
}

/// One edition row held by the mock store.
#[derive(Debug, Clone)]
struct MockEdition {
    edition_id: EditionId,
    traits: Vec<EditionTrait>,
}

/// In-memory store for tests and local development.
///
/// Aggregates are computed with the same semantics the store seam
/// promises (continuous percentile median, active offers only).
#[derive(Default)]
pub struct MockStore {
    stats: RwLock<HashMap<TokenId, MarketStats>>,
    offers: RwLock<HashMap<TokenId, Vec<MockOffer>>>,
    actions: RwLock<HashMap<TokenId, Vec<ActionRecord>>>,
    editions: RwLock<HashMap<TokenId, Vec<MockEdition>>>,
    /// Queryable token attribute documents for `find_tokens`.
    tokens: RwLock<Vec<(TokenId, serde_json::Map<String, serde_json::Value>)>>,
    /// Last aggregate id sets, recorded for recompute-scope assertions.
    last_aggregate_ids: RwLock<Vec<TokenId>>,
    pub calls: StoreCallCounts,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token with queryable attributes.
    pub fn insert_token(
        &self,
        token_id: TokenId,
        attributes: serde_json::Map<String, serde_json::Value>,
    ) {
        self.tokens.write().unwrap().push((token_id, attributes));
    }

    /// Seed a stats row directly.
    pub fn insert_stats(&self, stats: MarketStats) {
        self.stats.write().unwrap().insert(stats.token_id, stats);
    }

    /// Read back a stats row (test inspection).
    pub fn stats_row(&self, token_id: TokenId) -> Option<MarketStats> {
        self.stats.read().unwrap().get(&token_id).cloned()
    }

    /// Add an offer for a token.
    pub fn insert_offer(&self, token_id: TokenId, price: f64, active: bool) {
        self.offers
            .write()
            .unwrap()
            .entry(token_id)
            .or_default()
            .push(MockOffer { price, active });
    }

    /// Add a sale/mint action row.
    pub fn insert_action(&self, action: ActionRecord) {
        self.actions
            .write()
            .unwrap()
            .entry(action.token_id)
            .or_default()
            .push(action);
    }

    /// Add an edition with its traits.
    pub fn insert_edition(&self, token_id: TokenId, edition_id: EditionId, traits: Vec<EditionTrait>) {
        self.editions
            .write()
            .unwrap()
            .entry(token_id)
            .or_default()
            .push(MockEdition { edition_id, traits });
    }

    /// The id set passed to the most recent `aggregate_offers` call.
    pub fn last_aggregate_ids(&self) -> Vec<TokenId> {
        self.last_aggregate_ids.read().unwrap().clone()
    }

}

/// Continuous 0.5 percentile over a sorted, non-empty slice.
///
/// Matches `percentile_cont(0.5)`: midpoint interpolation for even-sized
/// sets, exact middle element for odd-sized sets.
fn median_cont(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

#[async_trait]
impl Store for MockStore {
    async fn find_stats_by_ids(
        &self,
        ids: &[TokenId],
    ) -> MarketResult<Vec<Option<MarketStats>>> {
        self.calls.stats_lookups.fetch_add(1, Ordering::SeqCst);
        let stats = self.stats.read().unwrap();
        Ok(ids.iter().map(|id| stats.get(id).cloned()).collect())
    }

    async fn save_stats(&self, stats: &MarketStats) -> MarketResult<()> {
        self.calls.stats_saves.fetch_add(1, Ordering::SeqCst);
        self.stats
            .write()
            .unwrap()
            .insert(stats.token_id, stats.clone());
        Ok(())
    }

    async fn aggregate_offers(&self, ids: &[TokenId]) -> MarketResult<Vec<OfferAggregate>> {
        self.calls.offer_aggregates.fetch_add(1, Ordering::SeqCst);
        *self.last_aggregate_ids.write().unwrap() = ids.to_vec();

        let offers = self.offers.read().unwrap();
        let mut rows = Vec::new();
        for id in ids {
            let mut prices: Vec<f64> = offers
                .get(id)
                .map(|v| v.iter().filter(|o| o.active).map(|o| o.price).collect())
                .unwrap_or_default();
            if prices.is_empty() {
                continue;
            }
            prices.sort_by(|a, b| a.total_cmp(b));
            rows.push(OfferAggregate {
                token_id: *id,
                floor: Some(prices[0]),
                median: Some(median_cont(&prices)),
                total_listing: prices.len() as i64,
            });
        }
        Ok(rows)
    }

    async fn find_sale_actions(&self, ids: &[TokenId]) -> MarketResult<Vec<ActionRecord>> {
        self.calls.action_fetches.fetch_add(1, Ordering::SeqCst);
        let actions = self.actions.read().unwrap();
        Ok(ids
            .iter()
            .flat_map(|id| actions.get(id).cloned().unwrap_or_default())
            .collect())
    }

    async fn find_edition_traits(
        &self,
        ids: &[TokenId],
    ) -> MarketResult<Vec<(TokenId, Vec<EditionTrait>)>> {
        self.calls.trait_fetches.fetch_add(1, Ordering::SeqCst);
        let editions = self.editions.read().unwrap();
        let mut rows = Vec::new();
        for id in ids {
            if let Some(eds) = editions.get(id) {
                for ed in eds {
                    rows.push((*id, ed.traits.clone()));
                }
            }
        }
        Ok(rows)
    }

    async fn find_tokens(&self, query: &CollectionQuery) -> MarketResult<Vec<TokenId>> {
        self.calls.token_queries.fetch_add(1, Ordering::SeqCst);

        // Snapshot matching rows with their docs, then release the locks
        // before ordering.
        let mut matched: Vec<(TokenId, serde_json::Map<String, serde_json::Value>)> = {
            let editions = self.editions.read().unwrap();
            let tokens = self.tokens.read().unwrap();
            tokens
                .iter()
                .filter(|(id, doc)| {
                    query
                        .candidates
                        .as_ref()
                        .map_or(true, |c| c.contains(id))
                        && query.filters.iter().all(|f| query::doc_matches(doc, f))
                        && (query.traits.is_empty()
                            || editions.get(id).is_some_and(|eds| {
                                eds.iter().any(|ed| query.traits.matches(&ed.traits))
                            }))
                })
                .cloned()
                .collect()
        };

        match &query.order {
            OrderBy::Unordered => {}
            OrderBy::Field { name, descending } => {
                matched.sort_by(|(_, da), (_, db)| {
                    let ord = query::compare_values(da.get(name), db.get(name));
                    if *descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                });
            }
            OrderBy::Ranked(ranked) => {
                matched.sort_by_key(|(id, _)| {
                    ranked
                        .iter()
                        .position(|r| r == id)
                        .unwrap_or(usize::MAX)
                });
            }
        }

        Ok(matched
            .into_iter()
            .map(|(id, _)| id)
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn find_editions(
        &self,
        parent_ids: &[TokenId],
        query: &CollectionQuery,
    ) -> MarketResult<Vec<Vec<EditionId>>> {
        self.calls.edition_queries.fetch_add(1, Ordering::SeqCst);
        let editions = self.editions.read().unwrap();
        Ok(parent_ids
            .iter()
            .map(|id| {
                editions
                    .get(id)
                    .map(|eds| {
                        eds.iter()
                            .filter(|ed| {
                                query.traits.is_empty() || query.traits.matches(&ed.traits)
                            })
                            .map(|ed| ed.edition_id)
                            .skip(query.offset)
                            .take(query.limit.unwrap_or(usize::MAX))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect())
    }

    async fn mark_stats_dirty(&self, token_id: TokenId) -> MarketResult<()> {
        let mut stats = self.stats.write().unwrap();
        let row = stats
            .entry(token_id)
            .or_insert_with(|| MarketStats::zeroed(token_id));
        // updated_at untouched: the dirty flag alone triggers recompute.
        row.requires_update = true;
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
