//! Thin collection-resolution layer.
//!
//! Assembles parent-to-children queries from compiled filter predicates,
//! an optional search-index pre-filter, and a composite-key batch loader
//! for 1:N relationship loads. All real work happens in the store, the
//! compiler, and the loader; this layer only wires them together per
//! request.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use atelier_core::{EditionId, MarketResult, TokenId};

use crate::loader::{BatchFetch, BatchLoader};
use crate::query::{CollectionQuery, FilterCompiler, OrderBy};
use crate::Store;

/// Search index collaborator: relevance-ordered candidate ids for a
/// free-text query. Consumed, not implemented, by this core.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> MarketResult<Vec<TokenId>>;
}

/// Requested sort for a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortSpec {
    /// Store-default ordering.
    Default,
    /// Order by a token field.
    Field { name: String, descending: bool },
    /// Search-index rank order; only meaningful with a search query.
    Relevance,
}

/// Unresolved collection request parameters, as the transport layer
/// hands them over.
#[derive(Debug, Clone, Default)]
pub struct CollectionParams {
    pub search: Option<String>,
    pub filter: serde_json::Map<String, serde_json::Value>,
    pub trait_selections: Vec<(String, Vec<String>)>,
    pub sort: Option<SortSpec>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Per-endpoint collection resolver.
pub struct CollectionResolver<S: Store, I: SearchIndex> {
    store: Arc<S>,
    index: Arc<I>,
    compiler: FilterCompiler,
    /// Candidate cap for search pre-filtering.
    search_limit: usize,
}

impl<S: Store, I: SearchIndex> CollectionResolver<S, I> {
    pub fn new(store: Arc<S>, index: Arc<I>, compiler: FilterCompiler) -> Self {
        Self {
            store,
            index,
            compiler,
            search_limit: 1000,
        }
    }

    /// Resolve token ids for a collection request.
    ///
    /// A search query pre-filters candidates through the index; with a
    /// relevance sort the index order is carried through rank-preserving.
    pub async fn resolve_tokens(&self, params: &CollectionParams) -> MarketResult<Vec<TokenId>> {
        let query = self.build_query(params).await?;
        if matches!(&query.candidates, Some(c) if c.is_empty()) {
            // The index found nothing; no point asking the store.
            return Ok(Vec::new());
        }
        self.store.find_tokens(&query).await
    }

    /// Compile request parameters into a store query.
    async fn build_query(&self, params: &CollectionParams) -> MarketResult<CollectionQuery> {
        let candidates = match &params.search {
            Some(q) => Some(self.index.search(q, self.search_limit).await?),
            None => None,
        };

        let order = match (&params.sort, &candidates) {
            (Some(SortSpec::Relevance), Some(ids)) => OrderBy::Ranked(ids.clone()),
            (Some(SortSpec::Field { name, descending }), _) => OrderBy::Field {
                name: name.clone(),
                descending: *descending,
            },
            _ => OrderBy::Unordered,
        };

        Ok(CollectionQuery {
            filters: self.compiler.compile(&params.filter),
            traits: FilterCompiler::compile_grouped(&params.trait_selections),
            candidates,
            order,
            limit: params.limit,
            offset: params.offset,
        })
    }

    /// A fresh editions-by-parent loader for one logical request.
    ///
    /// All `load` calls that share a query shape coalesce into one store
    /// round trip; different shapes dispatch separately within the same
    /// window.
    pub fn edition_loader(&self) -> BatchLoader<EditionsByParent<S>> {
        BatchLoader::new(EditionsByParent {
            store: Arc::clone(&self.store),
        })
    }
}

// ============================================================================
// RELATIONSHIP LOADING
// ============================================================================

/// Composite loader key for a 1:N relationship load: the parent id plus
/// the full query shape (filters, sort, pagination).
///
/// Two keys are the same only under full structural equality of parent
/// and shape; equality and hashing go through a canonical serialization
/// of the query, so two differently-shaped loads of the same parent
/// never share a batch slot.
#[derive(Debug, Clone)]
pub struct RelationKey {
    pub parent_id: TokenId,
    pub query: CollectionQuery,
    shape: String,
}

impl RelationKey {
    pub fn new(parent_id: TokenId, query: CollectionQuery) -> Self {
        let shape = serde_json::to_string(&query).unwrap_or_default();
        Self {
            parent_id,
            query,
            shape,
        }
    }

    /// Canonical shape discriminator.
    pub fn shape(&self) -> &str {
        &self.shape
    }
}

impl PartialEq for RelationKey {
    fn eq(&self, other: &Self) -> bool {
        self.parent_id == other.parent_id && self.shape == other.shape
    }
}

impl Eq for RelationKey {}

impl Hash for RelationKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.parent_id.hash(state);
        self.shape.hash(state);
    }
}

/// Batch fetch for editions grouped under parent tokens.
pub struct EditionsByParent<S: Store> {
    store: Arc<S>,
}

#[async_trait]
impl<S: Store> BatchFetch for EditionsByParent<S> {
    type Key = RelationKey;
    type Value = Vec<EditionId>;

    async fn fetch_batch(&self, keys: &[RelationKey]) -> MarketResult<Vec<Vec<EditionId>>> {
        // Group same-shaped keys into one store query each, then scatter
        // the grouped results back to their positions.
        let mut groups: Vec<(&str, Vec<usize>)> = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            match groups.iter_mut().find(|(shape, _)| *shape == key.shape()) {
                Some((_, indices)) => indices.push(i),
                None => groups.push((key.shape(), vec![i])),
            }
        }

        let mut out: Vec<Vec<EditionId>> = vec![Vec::new(); keys.len()];
        for (_, indices) in &groups {
            let parents: Vec<TokenId> = indices.iter().map(|&i| keys[i].parent_id).collect();
            let results = self
                .store
                .find_editions(&parents, &keys[indices[0]].query)
                .await?;
            for (&i, editions) in indices.iter().zip(results) {
                out[i] = editions;
            }
        }
        Ok(out)
    }
}

// =============================================================================
// TESTS
// =============================================================================
