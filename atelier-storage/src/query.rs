//! Dynamic filter/sort compilation.
//!
//! Client filter objects arrive as flat maps whose keys carry an operator
//! suffix (`price_gte: 2.5`, `status_in: ["active"]`). The compiler turns
//! them into allow-listed [`FilterExpr`] predicates; anything it does not
//! recognize is dropped, never an error, so a stray filter key can not
//! fail a whole collection query.
//!
//! Multi-valued trait filters compile separately: all selected values of
//! one trait are OR'd, different traits are AND'd.

use atelier_core::{EditionTrait, FilterExpr, FilterOperator, TokenId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::debug;

// ============================================================================
// FILTER COMPILER
// ============================================================================

/// Compiles suffix-encoded filter objects against a per-endpoint field
/// allow-list.
#[derive(Debug, Clone)]
pub struct FilterCompiler {
    allowed_fields: Vec<String>,
}

impl FilterCompiler {
    pub fn new<I, S>(allowed_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_fields: allowed_fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Compile a filter object into allow-listed predicates.
    ///
    /// Each key is `<field>_<operator>`; an unknown operator suffix makes
    /// the whole key the field name with an `Eq` operator. Fields outside
    /// the allow-list are dropped silently.
    pub fn compile(&self, filter: &serde_json::Map<String, Value>) -> Vec<FilterExpr> {
        let mut predicates = Vec::new();
        for (key, value) in filter {
            let (field, operator) = split_filter_key(key);
            if !self.allowed_fields.iter().any(|f| f == field) {
                debug!(field, "dropping non-allow-listed filter field");
                continue;
            }
            predicates.push(FilterExpr::new(field, operator, value.clone()));
        }
        predicates
    }

    /// Compile multi-valued trait selections into a grouped filter:
    /// values of the same trait OR'd, different traits AND'd. Traits with
    /// no selected values are dropped.
    pub fn compile_grouped<N, V>(selections: &[(N, Vec<V>)]) -> TraitFilter
    where
        N: AsRef<str>,
        V: AsRef<str>,
    {
        TraitFilter {
            groups: selections
                .iter()
                .filter(|(_, values)| !values.is_empty())
                .map(|(name, values)| TraitGroup {
                    name: name.as_ref().to_string(),
                    values: values.iter().map(|v| v.as_ref().to_string()).collect(),
                })
                .collect(),
        }
    }
}

/// Split a `<field>_<op>` filter key. Unknown suffixes fold the whole key
/// into the field name with `Eq`.
fn split_filter_key(key: &str) -> (&str, FilterOperator) {
    if let Some((field, suffix)) = key.rsplit_once('_') {
        if let Some(op) = FilterOperator::parse_suffix(suffix) {
            return (field, op);
        }
    }
    (key, FilterOperator::Eq)
}

// ============================================================================
// GROUPED TRAIT FILTERS
// ============================================================================

/// One trait name with its selected values (matched with OR).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitGroup {
    pub name: String,
    pub values: Vec<String>,
}

/// Grouped trait filter: every group must match (AND across traits).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TraitFilter {
    pub groups: Vec<TraitGroup>,
}

impl TraitFilter {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether an edition's trait list satisfies every group.
    pub fn matches(&self, traits: &[EditionTrait]) -> bool {
        self.groups.iter().all(|group| {
            traits
                .iter()
                .any(|t| t.name == group.name && group.values.contains(&t.value))
        })
    }
}

// ============================================================================
// COLLECTION QUERIES
// ============================================================================

/// Result ordering for a collection query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum OrderBy {
    #[default]
    Unordered,
    /// Order by a token field.
    Field { name: String, descending: bool },
    /// Explicit rank-preserving order, as produced by the search index
    /// for relevance sorts.
    Ranked(Vec<TokenId>),
}

/// A compiled collection query: predicates, grouped trait clauses,
/// ordering, and pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CollectionQuery {
    pub filters: Vec<FilterExpr>,
    pub traits: TraitFilter,
    /// Candidate id pre-filter, as supplied by the search index.
    pub candidates: Option<Vec<TokenId>>,
    pub order: OrderBy,
    pub limit: Option<usize>,
    pub offset: usize,
}

// ============================================================================
// IN-MEMORY PREDICATE EVALUATION
// ============================================================================

/// Evaluate one predicate against a token attribute document.
///
/// Used by the mock store; a database-backed store translates the same
/// predicates to SQL instead.
pub fn doc_matches(doc: &serde_json::Map<String, Value>, filter: &FilterExpr) -> bool {
    let actual = doc.get(&filter.field);
    match filter.operator {
        FilterOperator::Eq => actual == Some(&filter.value),
        FilterOperator::Ne => actual != Some(&filter.value),
        FilterOperator::Gt => {
            compare_values(actual, Some(&filter.value)) == Ordering::Greater
        }
        FilterOperator::Gte => {
            compare_values(actual, Some(&filter.value)) != Ordering::Less
        }
        FilterOperator::Lt => compare_values(actual, Some(&filter.value)) == Ordering::Less,
        FilterOperator::Lte => {
            compare_values(actual, Some(&filter.value)) != Ordering::Greater
        }
        FilterOperator::In => match &filter.value {
            Value::Array(candidates) => {
                actual.is_some_and(|a| candidates.iter().any(|c| c == a))
            }
            _ => false,
        },
    }
}

/// Total order over optional JSON values for sorting and range filters.
/// Numbers compare numerically, strings lexically; absent values sort
/// first; mixed types compare by type name for stability.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(va), Some(vb)) => match (va, vb) {
            (Value::Number(na), Value::Number(nb)) => {
                let fa = na.as_f64().unwrap_or(f64::NAN);
                let fb = nb.as_f64().unwrap_or(f64::NAN);
                fa.total_cmp(&fb)
            }
            (Value::String(sa), Value::String(sb)) => sa.cmp(sb),
            (Value::Bool(ba), Value::Bool(bb)) => ba.cmp(bb),
            _ => type_rank(va).cmp(&type_rank(vb)),
        },
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_compile_parses_operator_suffixes() {
        let compiler = FilterCompiler::new(["price", "status"]);
        let filter = obj(&[
            ("price_gte", json!(2.5)),
            ("status_in", json!(["active", "pending"])),
        ]);

        let predicates = compiler.compile(&filter);
        assert_eq!(predicates.len(), 2);
        assert_eq!(predicates[0].field, "price");
        assert_eq!(predicates[0].operator, FilterOperator::Gte);
        assert_eq!(predicates[1].field, "status");
        assert_eq!(predicates[1].operator, FilterOperator::In);
    }

    #[test]
    fn test_compile_unknown_suffix_defaults_to_eq() {
        // "mint_price" ends in "_price", not an operator: the whole key
        // is the field name.
        let compiler = FilterCompiler::new(["mint_price"]);
        let filter = obj(&[("mint_price", json!(1.0))]);

        let predicates = compiler.compile(&filter);
        assert_eq!(predicates.len(), 1);
        assert_eq!(predicates[0].field, "mint_price");
        assert_eq!(predicates[0].operator, FilterOperator::Eq);
    }

    #[test]
    fn test_compile_underscored_field_with_operator() {
        let compiler = FilterCompiler::new(["mint_price"]);
        let filter = obj(&[("mint_price_lte", json!(9.0))]);

        let predicates = compiler.compile(&filter);
        assert_eq!(predicates[0].field, "mint_price");
        assert_eq!(predicates[0].operator, FilterOperator::Lte);
    }

    #[test]
    fn test_compile_drops_non_allow_listed_fields() {
        let compiler = FilterCompiler::new(["price"]);
        let filter = obj(&[
            ("price_gt", json!(1)),
            ("secret_eq", json!("x")),
            ("owner", json!("y")),
        ]);

        let predicates = compiler.compile(&filter);
        assert_eq!(predicates.len(), 1);
        assert_eq!(predicates[0].field, "price");
    }

    #[test]
    fn test_compile_empty_filter() {
        let compiler = FilterCompiler::new(["price"]);
        assert!(compiler.compile(&obj(&[])).is_empty());
    }

    #[test]
    fn test_grouped_same_trait_is_or_across_traits_is_and() {
        let filter = FilterCompiler::compile_grouped(&[
            ("bg", vec!["red", "blue"]),
            ("size", vec!["small"]),
        ]);

        let red_small = [
            EditionTrait::new("bg", "red"),
            EditionTrait::new("size", "small"),
        ];
        let blue_small = [
            EditionTrait::new("bg", "blue"),
            EditionTrait::new("size", "small"),
        ];
        let red_large = [
            EditionTrait::new("bg", "red"),
            EditionTrait::new("size", "large"),
        ];
        let green_small = [
            EditionTrait::new("bg", "green"),
            EditionTrait::new("size", "small"),
        ];

        assert!(filter.matches(&red_small));
        assert!(filter.matches(&blue_small));
        assert!(!filter.matches(&red_large));
        assert!(!filter.matches(&green_small));
    }

    #[test]
    fn test_grouped_drops_empty_value_lists() {
        let filter =
            FilterCompiler::compile_grouped(&[("bg", vec!["red"]), ("size", Vec::<&str>::new())]);
        assert_eq!(filter.groups.len(), 1);
    }

    #[test]
    fn test_empty_trait_filter_matches_everything() {
        let filter = TraitFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&[]));
        assert!(filter.matches(&[EditionTrait::new("bg", "red")]));
    }

    #[test]
    fn test_doc_matches_operators() {
        let doc = obj(&[("price", json!(5.0)), ("status", json!("active"))]);

        assert!(doc_matches(&doc, &FilterExpr::eq("status", json!("active"))));
        assert!(!doc_matches(&doc, &FilterExpr::eq("status", json!("sold"))));
        assert!(doc_matches(
            &doc,
            &FilterExpr::new("price", FilterOperator::Gt, json!(4))
        ));
        assert!(!doc_matches(
            &doc,
            &FilterExpr::new("price", FilterOperator::Lt, json!(5))
        ));
        assert!(doc_matches(
            &doc,
            &FilterExpr::new("price", FilterOperator::Lte, json!(5))
        ));
        assert!(doc_matches(
            &doc,
            &FilterExpr::is_in("status", json!(["active", "pending"]))
        ));
        assert!(!doc_matches(
            &doc,
            &FilterExpr::is_in("status", json!(["sold"]))
        ));
    }

    #[test]
    fn test_doc_matches_missing_field() {
        let doc = obj(&[]);
        assert!(!doc_matches(&doc, &FilterExpr::eq("price", json!(1))));
        // Ne against a missing field matches: the value is not equal.
        assert!(doc_matches(
            &doc,
            &FilterExpr::new("price", FilterOperator::Ne, json!(1))
        ));
    }

    #[test]
    fn test_compare_values_numeric_vs_absent() {
        assert_eq!(
            compare_values(Some(&json!(2)), Some(&json!(10))),
            Ordering::Less
        );
        assert_eq!(compare_values(None, Some(&json!(0))), Ordering::Less);
        assert_eq!(
            compare_values(Some(&json!("b")), Some(&json!("a"))),
            Ordering::Greater
        );
    }
}
