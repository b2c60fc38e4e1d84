//! Filter expressions for dynamic collection queries.
//!
//! Client filters arrive as a flat object whose keys carry an operator
//! suffix (`price_gte`, `status_in`). This module provides the parsed,
//! closed form: a field name, an operator from a fixed enumeration, and a
//! JSON value. Suffix parsing happens once at decode time; an unknown
//! suffix is folded into the field name with an `Eq` operator rather than
//! becoming a runtime dispatch surprise.

use serde::{Deserialize, Serialize};

/// Filter operator for field comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Greater than or equal
    Gte,
    /// Less than
    Lt,
    /// Less than or equal
    Lte,
    /// In list of values
    In,
}

impl FilterOperator {
    /// Parse an operator suffix (the part after the last underscore of a
    /// filter key). Returns `None` for unrecognized suffixes, in which
    /// case the caller treats the whole key as a field name with `Eq`.
    pub fn parse_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            "in" => Some(Self::In),
            _ => None,
        }
    }
}

/// A compiled filter predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterExpr {
    /// Field to filter on
    pub field: String,
    /// Operator to apply
    pub operator: FilterOperator,
    /// Value to compare against (JSON value for flexibility)
    pub value: serde_json::Value,
}

impl FilterExpr {
    /// Create a new filter expression.
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: serde_json::Value,
    ) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Create an equality filter.
    pub fn eq(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(field, FilterOperator::Eq, value)
    }

    /// Create a membership filter.
    pub fn is_in(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::new(field, FilterOperator::In, value)
    }
}
