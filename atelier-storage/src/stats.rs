//! Materialized market-statistics cache.
//!
//! Stats rows are expensive to recompute (grouped aggregates over offers
//! plus a fold over the sale history), so they are persisted per token and
//! refreshed only when stale: the row is missing, its dirty flag is set,
//! or it is older than the freshness window. The recompute path is bounded
//! to exactly two store round trips regardless of how many tokens are
//! stale, on top of the single unconditional lookup.
//!
//! Two concurrent requests may observe the same row as stale and both
//! recompute it. That race is accepted: recomputed values are a
//! deterministic function of store state at query time, and the last
//! write wins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use atelier_core::{
    ActionKind, ActionRecord, MarketResult, MarketStats, StoreError, Timestamp, TokenId,
};
use chrono::Utc;
use tracing::{debug, warn};

use crate::Store;

/// Staleness policy for the stats cache.
///
/// `min_recompute_interval` is the backpressure bound for rows that are
/// repeatedly marked dirty under write contention: a row refreshed within
/// that interval is served as-is even if its dirty flag is set again.
#[derive(Debug, Clone)]
pub struct StatsCacheConfig {
    /// Maximum age before a row is stale absent an explicit dirty flag.
    pub freshness_window: Duration,
    /// Minimum interval between recomputes of the same row.
    pub min_recompute_interval: Duration,
}

impl Default for StatsCacheConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(3600), // 1 hour
            min_recompute_interval: Duration::from_secs(5),
        }
    }
}

impl StatsCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the freshness window.
    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Set the minimum recompute interval.
    pub fn with_min_recompute_interval(mut self, interval: Duration) -> Self {
        self.min_recompute_interval = interval;
        self
    }
}

/// Per-token fold of sale/mint action rows.
#[derive(Debug, Clone, Default, PartialEq)]
struct ActionFold {
    highest_sold: Option<f64>,
    lowest_sold: Option<f64>,
    primary_total: f64,
    secondary_volume: f64,
    secondary_volume_count: i64,
    secondary_volume_24h: f64,
    secondary_volume_count_24h: i64,
}

/// Fold action rows into per-token sale statistics.
///
/// Secondary figures come from settled sales, primary from mint-time
/// sales; the 24h figures restrict settled sales to the trailing day
/// relative to `now`.
fn fold_actions(actions: &[ActionRecord], now: Timestamp) -> HashMap<TokenId, ActionFold> {
    let day_ago = now - chrono::Duration::hours(24);
    let mut folds: HashMap<TokenId, ActionFold> = HashMap::new();

    for action in actions {
        let fold = folds.entry(action.token_id).or_default();
        match action.kind {
            ActionKind::SaleSettled => {
                fold.highest_sold = Some(match fold.highest_sold {
                    Some(h) => h.max(action.price),
                    None => action.price,
                });
                fold.lowest_sold = Some(match fold.lowest_sold {
                    Some(l) => l.min(action.price),
                    None => action.price,
                });
                fold.secondary_volume += action.price;
                fold.secondary_volume_count += 1;
                if action.occurred_at >= day_ago {
                    fold.secondary_volume_24h += action.price;
                    fold.secondary_volume_count_24h += 1;
                }
            }
            ActionKind::MintedFromSale => {
                fold.primary_total += action.price;
            }
        }
    }
    folds
}

/// Materialized statistics cache over a [`Store`].
pub struct StatsCache<S: Store> {
    store: Arc<S>,
    config: StatsCacheConfig,
}

impl<S: Store> StatsCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, StatsCacheConfig::default())
    }

    pub fn with_config(store: Arc<S>, config: StatsCacheConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &StatsCacheConfig {
        &self.config
    }

    /// Fetch stats for the given tokens, recomputing the stale subset.
    ///
    /// Order-preserving: the result has exactly one entry per input id,
    /// in input order (duplicates included). Missing rows are synthesized
    /// as zeroed dirty records and recomputed in the same pass.
    pub async fn get_stats(&self, ids: &[TokenId]) -> MarketResult<Vec<MarketStats>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut distinct: Vec<TokenId> = Vec::new();
        for id in ids {
            if !distinct.contains(id) {
                distinct.push(*id);
            }
        }

        let rows = self.store.find_stats_by_ids(&distinct).await?;
        if rows.len() != distinct.len() {
            // The lookup is positional; a short or long result would
            // silently misalign records, so fail loudly instead.
            return Err(StoreError::QueryFailed {
                reason: format!(
                    "stats lookup returned {} rows for {} ids",
                    rows.len(),
                    distinct.len()
                ),
            }
            .into());
        }
        let now = Utc::now();

        let mut records: HashMap<TokenId, MarketStats> = HashMap::new();
        let mut stale: Vec<TokenId> = Vec::new();
        for (id, row) in distinct.iter().zip(rows) {
            let record = row.unwrap_or_else(|| MarketStats::zeroed(*id));
            if !self.is_fresh(&record, now) {
                stale.push(*id);
            }
            records.insert(*id, record);
        }

        if !stale.is_empty() {
            debug!(
                stale = stale.len(),
                requested = distinct.len(),
                "recomputing market stats"
            );
            self.recompute(&mut records, &stale, now).await?;
        }

        Ok(ids
            .iter()
            .map(|id| records[id].clone())
            .collect())
    }

    /// Mark a token's stats row dirty. The side channel mutation event
    /// sources call on any write that changes a token's offers or sales.
    pub async fn mark_dirty(&self, token_id: TokenId) -> MarketResult<()> {
        self.store.mark_stats_dirty(token_id).await
    }

    /// Freshness check for one row at `now`.
    ///
    /// A row inside the minimum recompute interval is fresh regardless of
    /// its dirty flag (backpressure under write contention); otherwise a
    /// set dirty flag or an exceeded freshness window makes it stale.
    fn is_fresh(&self, record: &MarketStats, now: Timestamp) -> bool {
        let age = record.age(now);
        if age < chrono::Duration::from_std(self.config.min_recompute_interval)
            .unwrap_or(chrono::Duration::zero())
        {
            return true;
        }
        if record.requires_update {
            return false;
        }
        age <= chrono::Duration::from_std(self.config.freshness_window)
            .unwrap_or(chrono::Duration::zero())
    }

    /// Recompute and persist the stale subset. Exactly two store round
    /// trips: the grouped offer aggregate and the sale/mint action fetch.
    async fn recompute(
        &self,
        records: &mut HashMap<TokenId, MarketStats>,
        stale: &[TokenId],
        now: Timestamp,
    ) -> MarketResult<()> {
        let aggregates = self.store.aggregate_offers(stale).await?;
        let actions = self.store.find_sale_actions(stale).await?;

        let mut by_token: HashMap<TokenId, _> = aggregates
            .into_iter()
            .map(|a| (a.token_id, a))
            .collect();
        let mut folds = fold_actions(&actions, now);

        for id in stale {
            let record = records
                .get_mut(id)
                .expect("stale id synthesized before recompute");

            match by_token.remove(id) {
                Some(agg) => {
                    record.floor = agg.floor;
                    record.median = agg.median;
                    record.total_listing = agg.total_listing;
                }
                None => {
                    // No active offers for this token.
                    record.floor = None;
                    record.median = None;
                    record.total_listing = 0;
                }
            }

            let fold = folds.remove(id).unwrap_or_default();
            record.highest_sold = fold.highest_sold;
            record.lowest_sold = fold.lowest_sold;
            record.primary_total = fold.primary_total;
            record.secondary_volume = fold.secondary_volume;
            record.secondary_volume_count = fold.secondary_volume_count;
            record.secondary_volume_24h = fold.secondary_volume_24h;
            record.secondary_volume_count_24h = fold.secondary_volume_count_24h;
            record.requires_update = false;
            record.updated_at = now;

            if let Err(err) = self.store.save_stats(record).await {
                // The recomputed value was not committed; the caller must
                // retry, at which point the row still reads as stale.
                warn!(token_id = %id, error = %err, "stats persistence failed");
                return Err(err);
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
