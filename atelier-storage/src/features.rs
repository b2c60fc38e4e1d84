//! Per-token trait histograms.
//!
//! A histogram is a read-time aggregation over the current edition trait
//! data of a token. It is recomputed on demand and never persisted: one
//! store round trip reads `(token_id, traits)` for every edition of every
//! requested token, then a pure fold counts occurrences. The fold is kept
//! as plain data manipulation so its correctness is verifiable without a
//! store.

use std::collections::HashMap;
use std::sync::Arc;

use atelier_core::{
    EditionTrait, MarketResult, TokenId, TraitCount, TraitHistogram, ValueCount,
};

use crate::Store;

/// On-demand trait histogram aggregation over a [`Store`].
pub struct FeatureAggregator<S: Store> {
    store: Arc<S>,
}

impl<S: Store> FeatureAggregator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Aggregate trait histograms for the given tokens, order-preserving.
    ///
    /// Tokens with no editions yield an empty histogram entry, never an
    /// absent one. Empty input yields an empty result without touching
    /// the store.
    pub async fn aggregate(&self, ids: &[TokenId]) -> MarketResult<Vec<TraitHistogram>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut distinct: Vec<TokenId> = Vec::new();
        for id in ids {
            if !distinct.contains(id) {
                distinct.push(*id);
            }
        }

        let rows = self.store.find_edition_traits(&distinct).await?;

        let mut histograms: HashMap<TokenId, Vec<TraitCount>> =
            distinct.iter().map(|id| (*id, Vec::new())).collect();
        for (token_id, traits) in &rows {
            if let Some(counts) = histograms.get_mut(token_id) {
                fold_traits(counts, traits);
            }
        }

        Ok(ids
            .iter()
            .map(|id| TraitHistogram {
                token_id: *id,
                traits: histograms.get(id).cloned().unwrap_or_default(),
            })
            .collect())
    }
}

/// Count one edition's traits into a `name -> value -> occurrence` table.
///
/// Names and values keep first-appearance order; trait lists per token are
/// small, so linear scans beat the bookkeeping of index maps here.
fn fold_traits(counts: &mut Vec<TraitCount>, traits: &[EditionTrait]) {
    for t in traits {
        let idx = match counts.iter().position(|c| c.name == t.name) {
            Some(i) => i,
            None => {
                counts.push(TraitCount {
                    name: t.name.clone(),
                    values: Vec::new(),
                });
                counts.len() - 1
            }
        };
        let trait_count = &mut counts[idx];
        match trait_count.values.iter_mut().find(|v| v.value == t.value) {
            Some(vc) => vc.occurrence += 1,
            None => trait_count.values.push(ValueCount {
                value: t.value.clone(),
                occurrence: 1,
            }),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockStore;
    use atelier_core::{new_edition_id, new_token_id};

    #[tokio::test]
    async fn test_histogram_counts_values_in_first_appearance_order() {
        let store = Arc::new(MockStore::new());
        let token = new_token_id();
        for _ in 0..3 {
            store.insert_edition(
                token,
                new_edition_id(),
                vec![EditionTrait::new("bg", "red")],
            );
        }
        store.insert_edition(
            token,
            new_edition_id(),
            vec![EditionTrait::new("bg", "blue")],
        );

        let aggregator = FeatureAggregator::new(store);
        let histograms = aggregator.aggregate(&[token]).await.unwrap();

        assert_eq!(
            histograms,
            vec![TraitHistogram {
                token_id: token,
                traits: vec![TraitCount {
                    name: "bg".to_string(),
                    values: vec![
                        ValueCount {
                            value: "red".to_string(),
                            occurrence: 3
                        },
                        ValueCount {
                            value: "blue".to_string(),
                            occurrence: 1
                        },
                    ],
                }],
            }]
        );
    }

    #[tokio::test]
    async fn test_editionless_token_yields_empty_histogram() {
        let store = Arc::new(MockStore::new());
        let with_editions = new_token_id();
        let without = new_token_id();
        store.insert_edition(
            with_editions,
            new_edition_id(),
            vec![EditionTrait::new("size", "small")],
        );

        let aggregator = FeatureAggregator::new(store);
        let histograms = aggregator
            .aggregate(&[without, with_editions])
            .await
            .unwrap();

        assert_eq!(histograms.len(), 2);
        assert!(histograms[0].is_empty());
        assert_eq!(histograms[0].token_id, without);
        assert!(!histograms[1].is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_skips_the_store() {
        let store = Arc::new(MockStore::new());
        let aggregator = FeatureAggregator::new(Arc::clone(&store));

        let histograms = aggregator.aggregate(&[]).await.unwrap();
        assert!(histograms.is_empty());
        assert_eq!(
            store
                .calls
                .trait_fetches
                .load(std::sync::atomic::Ordering::SeqCst),
            0
        );
    }

    #[tokio::test]
    async fn test_single_round_trip_for_many_tokens() {
        let store = Arc::new(MockStore::new());
        let tokens: Vec<_> = (0..5).map(|_| new_token_id()).collect();
        for t in &tokens {
            store.insert_edition(*t, new_edition_id(), vec![EditionTrait::new("bg", "red")]);
        }

        let aggregator = FeatureAggregator::new(Arc::clone(&store));
        aggregator.aggregate(&tokens).await.unwrap();

        assert_eq!(
            store
                .calls
                .trait_fetches
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[test]
    fn test_fold_traits_multiple_names() {
        let mut counts = Vec::new();
        fold_traits(
            &mut counts,
            &[
                EditionTrait::new("bg", "red"),
                EditionTrait::new("size", "small"),
            ],
        );
        fold_traits(&mut counts, &[EditionTrait::new("bg", "red")]);

        assert_eq!(counts.len(), 2);
        assert_eq!(counts[0].name, "bg");
        assert_eq!(counts[0].values[0].occurrence, 2);
        assert_eq!(counts[1].name, "size");
        assert_eq!(counts[1].values[0].occurrence, 1);
    }
}
