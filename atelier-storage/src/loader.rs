//! Per-request batched, memoized keyed loader.
//!
//! A `BatchLoader` coalesces many single-key `load` calls issued during
//! one logical request into a small number of bulk fetches. Keys register
//! synchronously into the open batch window at `load()` call time; the
//! window dispatches when the first returned future is awaited (or
//! immediately, if a caller awaits before registering anything else).
//! Results are memoized per key for the lifetime of the loader instance.
//!
//! One instance per logical request: the memo table is never invalidated
//! mid-scope, and a new request must construct a new loader. Within a
//! request the loader is safe to share across cooperatively scheduled
//! futures (`&self` methods only).

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use atelier_core::{LoaderError, MarketResult};
use tracing::debug;

/// Batch fetch seam supplied by the caller.
///
/// Invariant: `fetch_batch` must return exactly one value per input key,
/// positionally aligned. Missing entities are represented by an explicit
/// absent marker in the value type (`Option`, empty `Vec`), never by a
/// shorter result. A shape violation fails every caller of the window
/// with [`LoaderError::BatchShape`].
#[async_trait]
pub trait BatchFetch: Send + Sync {
    type Key: Eq + Hash + Clone + Debug + Send + Sync;
    type Value: Clone + Send + Sync;

    async fn fetch_batch(&self, keys: &[Self::Key]) -> MarketResult<Vec<Self::Value>>;
}

struct LoaderState<K, V> {
    /// Distinct keys of the open window, in first-request order.
    pending: Vec<K>,
    /// Resolved (or failed) keys for the lifetime of this instance.
    memo: HashMap<K, MarketResult<V>>,
}

impl<K, V> Default for LoaderState<K, V> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            memo: HashMap::new(),
        }
    }
}

/// Batched, memoized keyed loader scoped to one logical request.
pub struct BatchLoader<F: BatchFetch> {
    fetch: F,
    state: Mutex<LoaderState<F::Key, F::Value>>,
    /// Serializes dispatches; keys registered while a dispatch is in
    /// flight form the next window.
    dispatch_gate: tokio::sync::Mutex<()>,
    dispatches: AtomicUsize,
}

impl<F: BatchFetch> BatchLoader<F> {
    pub fn new(fetch: F) -> Self {
        Self {
            fetch,
            state: Mutex::new(LoaderState::default()),
            dispatch_gate: tokio::sync::Mutex::new(()),
            dispatches: AtomicUsize::new(0),
        }
    }

    /// Number of batch dispatches performed so far.
    pub fn dispatch_count(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    /// Request the value for `key`.
    ///
    /// The key joins the open window synchronously, before the returned
    /// future is first polled; awaiting the future forces the window to
    /// dispatch. A key already memoized returns its cached result without
    /// re-entering any window; a key already pending shares the window's
    /// result with its earlier requester.
    pub fn load(&self, key: F::Key) -> impl Future<Output = MarketResult<F::Value>> + '_ {
        self.enqueue(&key);
        self.resolve(key)
    }

    /// Request values for many keys, returned in input key order.
    pub async fn load_many(&self, keys: &[F::Key]) -> MarketResult<Vec<F::Value>> {
        for key in keys {
            self.enqueue(key);
        }
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.resolve(key.clone()).await?);
        }
        Ok(out)
    }

    fn enqueue(&self, key: &F::Key) {
        let mut state = self.state.lock().unwrap();
        if !state.memo.contains_key(key) && !state.pending.contains(key) {
            state.pending.push(key.clone());
        }
    }

    async fn resolve(&self, key: F::Key) -> MarketResult<F::Value> {
        loop {
            if let Some(result) = self.state.lock().unwrap().memo.get(&key) {
                return result.clone();
            }

            let _gate = self.dispatch_gate.lock().await;

            // A dispatch that ran while we waited for the gate may have
            // resolved our key already.
            if let Some(result) = self.state.lock().unwrap().memo.get(&key) {
                return result.clone();
            }

            let window: Vec<F::Key> = {
                let mut state = self.state.lock().unwrap();
                let taken = std::mem::take(&mut state.pending);
                // A key requested while its own dispatch was in flight
                // lands back in `pending` (the window was already taken);
                // by now it is memoized and must not re-enter a window,
                // or its memoized result would be overwritten.
                taken
                    .into_iter()
                    .filter(|k| !state.memo.contains_key(k))
                    .collect()
            };
            debug_assert!(window.contains(&key));

            self.dispatches.fetch_add(1, Ordering::SeqCst);
            debug!(window = window.len(), "dispatching batch window");

            let outcome = self.fetch.fetch_batch(&window).await;
            let mut state = self.state.lock().unwrap();
            match outcome {
                Ok(values) if values.len() == window.len() => {
                    for (k, v) in window.into_iter().zip(values) {
                        state.memo.insert(k, Ok(v));
                    }
                }
                Ok(values) => {
                    let err: atelier_core::MarketError = LoaderError::BatchShape {
                        expected: window.len(),
                        got: values.len(),
                    }
                    .into();
                    for k in window {
                        state.memo.insert(k, Err(err.clone()));
                    }
                }
                Err(err) => {
                    // Every pending caller of this window sees the same
                    // failure; later windows are unaffected.
                    for k in window {
                        state.memo.insert(k, Err(err.clone()));
                    }
                }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
