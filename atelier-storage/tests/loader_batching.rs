//! Integration tests for batch loading over the mock store: coalescing
//! stats-row lookups into single round trips, absent-entity markers, and
//! per-request memo isolation.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use atelier_core::{MarketResult, MarketStats, TokenId};
use atelier_storage::{BatchFetch, BatchLoader, MockStore, Store};
use atelier_test_utils::{fresh_stats, new_token_id};

/// Batch fetch for raw stats rows, one store round trip per window.
struct StatsRowFetch {
    store: Arc<MockStore>,
}

#[async_trait]
impl BatchFetch for StatsRowFetch {
    type Key = TokenId;
    type Value = Option<MarketStats>;

    async fn fetch_batch(&self, keys: &[TokenId]) -> MarketResult<Vec<Option<MarketStats>>> {
        self.store.find_stats_by_ids(keys).await
    }
}

fn loader(store: &Arc<MockStore>) -> BatchLoader<StatsRowFetch> {
    BatchLoader::new(StatsRowFetch {
        store: Arc::clone(store),
    })
}

#[tokio::test]
async fn concurrent_loads_coalesce_into_one_store_query() {
    let store = Arc::new(MockStore::new());
    let a = new_token_id();
    let b = new_token_id();
    let c = new_token_id();
    for id in [a, b, c] {
        store.insert_stats(fresh_stats(id));
    }

    let l = loader(&store);
    let (ra, rb, rc) = futures_util::join!(l.load(a), l.load(b), l.load(c));
    assert_eq!(ra.unwrap().unwrap().token_id, a);
    assert_eq!(rb.unwrap().unwrap().token_id, b);
    assert_eq!(rc.unwrap().unwrap().token_id, c);

    assert_eq!(store.calls.stats_lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_entity_is_an_explicit_none_at_its_position() {
    let store = Arc::new(MockStore::new());
    let present = new_token_id();
    let missing = new_token_id();
    store.insert_stats(fresh_stats(present));

    let l = loader(&store);
    let rows = l.load_many(&[missing, present]).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].is_none());
    assert!(rows[1].is_some());
}

#[tokio::test]
async fn memo_spans_windows_within_one_request_scope() {
    let store = Arc::new(MockStore::new());
    let a = new_token_id();
    store.insert_stats(fresh_stats(a));

    let l = loader(&store);
    l.load(a).await.unwrap();
    l.load(a).await.unwrap();
    l.load_many(&[a]).await.unwrap();

    assert_eq!(store.calls.stats_lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn a_new_request_uses_a_new_loader_and_sees_current_state() {
    let store = Arc::new(MockStore::new());
    let a = new_token_id();

    // Request one observes the row as missing.
    let first = loader(&store);
    assert!(first.load(a).await.unwrap().is_none());

    // The row appears between requests.
    store.insert_stats(fresh_stats(a));

    // Request one keeps its memoized absence; request two sees the row.
    assert!(first.load(a).await.unwrap().is_none());
    let second = loader(&store);
    assert!(second.load(a).await.unwrap().is_some());
}

#[tokio::test]
async fn keys_requested_during_a_dispatch_form_the_next_window() {
    let store = Arc::new(MockStore::new());
    let a = new_token_id();
    let b = new_token_id();
    store.insert_stats(fresh_stats(a));
    store.insert_stats(fresh_stats(b));

    let l = Arc::new(loader(&store));

    // Force the first window closed, then issue a second load.
    l.load(a).await.unwrap();
    l.load(b).await.unwrap();

    assert_eq!(l.dispatch_count(), 2);
    assert_eq!(store.calls.stats_lookups.load(Ordering::SeqCst), 2);
}
