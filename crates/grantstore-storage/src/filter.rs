//! List filters over document fields.
//!
//! Filters are conjunctions of predicates. A predicate with no values is
//! ignored, so callers can build a filter straight from optional request
//! fields without special-casing the empty ones.

use serde_json::Value;

/// A single predicate over one document field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The array field contains every one of `values` (intersection).
    AllOf {
        /// Array-of-strings field, e.g. `scopes`.
        field: String,
        /// Values that must all be present.
        values: Vec<String>,
    },
    /// The array field contains at least one of `values` (union).
    AnyOf {
        /// Array-of-strings field, e.g. `grantedScopes`.
        field: String,
        /// Values of which one must be present.
        values: Vec<String>,
    },
    /// The field equals `value` exactly.
    Equals {
        /// Scalar field, e.g. `clientId`.
        field: String,
        /// Expected value.
        value: Value,
    },
}

impl Predicate {
    /// Returns `true` if this predicate constrains nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        match self {
            Self::AllOf { values, .. } | Self::AnyOf { values, .. } => values.is_empty(),
            Self::Equals { .. } => false,
        }
    }

    /// Evaluates the predicate against a document.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        match self {
            Self::AllOf { field, values } => {
                let present = string_set(document, field);
                values.iter().all(|v| present.contains(&v.as_str()))
            }
            Self::AnyOf { field, values } => {
                let present = string_set(document, field);
                values.is_empty() || values.iter().any(|v| present.contains(&v.as_str()))
            }
            Self::Equals { field, value } => document.get(field) == Some(value),
        }
    }
}

fn string_set<'a>(document: &'a Value, field: &str) -> Vec<&'a str> {
    document
        .get(field)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// A conjunction of predicates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    predicates: Vec<Predicate>,
}

impl DocumentFilter {
    /// Creates an empty filter matching every document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `field` to contain all of `values`.
    #[must_use]
    pub fn all_of<I, S>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(Predicate::AllOf {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// Requires `field` to contain at least one of `values`.
    #[must_use]
    pub fn any_of<I, S>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.with(Predicate::AnyOf {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// Requires `field` to equal `value`.
    #[must_use]
    pub fn equals(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with(Predicate::Equals {
            field: field.into(),
            value: value.into(),
        })
    }

    /// Requires `field` to equal `value` when one is given.
    #[must_use]
    pub fn equals_opt(self, field: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(v) => self.equals(field, v),
            None => self,
        }
    }

    fn with(mut self, predicate: Predicate) -> Self {
        if !predicate.is_noop() {
            self.predicates.push(predicate);
        }
        self
    }

    /// Returns the effective predicates.
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Returns `true` if the filter matches everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Evaluates the filter against a document.
    #[must_use]
    pub fn matches(&self, document: &Value) -> bool {
        self.predicates.iter().all(|p| p.matches(document))
    }
}
