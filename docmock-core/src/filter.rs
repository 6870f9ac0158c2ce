//! Declarative filter expressions.
//!
//! A [`Filter`] is an ordered mapping from field names (or logical operator keys such as
//! `$and`) to constraints. Most filters are plain BSON documents and convert with
//! `Filter::from(doc! { ... })`, but a constraint may also be a Rust closure or a
//! [`ValueMatcher`], which is how test code expresses conditions the operator vocabulary
//! cannot.
//!
//! # Example
//!
//! ```ignore
//! use docmock::filter::Filter;
//! use bson::doc;
//!
//! // Plain document filter
//! let by_status: Filter = doc! { "status": "active", "age": { "$gte": 18 } }.into();
//!
//! // Builder with a predicate and a logical group
//! let filter = Filter::new()
//!     .predicate("name", |value| value.and_then(|v| v.as_str()).is_some_and(|s| s.len() > 3))
//!     .or([
//!         Filter::new().field("role", "admin"),
//!         Filter::new().field("role", "owner"),
//!     ]);
//! ```

use bson::{Bson, Document};
use std::{fmt, sync::Arc};

use crate::error::{CollectionError, CollectionResult};

/// A caller-supplied predicate over a resolved field value.
///
/// The argument is `None` when the field is missing from the document.
pub type Predicate = Arc<dyn Fn(Option<&Bson>) -> bool + Send + Sync>;

/// A reusable, self-describing condition over a resolved field value.
///
/// This is the counterpart of an assertion-library constraint object: anything that can
/// evaluate a value on its own can be dropped into a filter with [`Filter::matcher`].
pub trait ValueMatcher: Send + Sync + fmt::Debug {
    /// Returns `true` if the value satisfies this matcher. `None` means the field is missing.
    fn evaluate(&self, value: Option<&Bson>) -> bool;

    /// Human readable description used in logs.
    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

/// The right-hand side of a single filter entry.
#[derive(Clone)]
pub enum FilterValue {
    /// A BSON constraint: a literal, an operator document, or (for logical keys) an array
    /// of sub-filter documents.
    Value(Bson),
    /// A closure evaluated against the resolved field value.
    Predicate(Predicate),
    /// A [`ValueMatcher`] evaluated against the resolved field value.
    Matcher(Arc<dyn ValueMatcher>),
    /// Sub-filters for a logical key (`$and`, `$or`, `$nor`) that may themselves
    /// contain predicates or matchers.
    Filters(Vec<Filter>),
}

impl fmt::Debug for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            FilterValue::Predicate(_) => f.write_str("Predicate(<fn>)"),
            FilterValue::Matcher(matcher) => f.debug_tuple("Matcher").field(&matcher.describe()).finish(),
            FilterValue::Filters(filters) => f.debug_tuple("Filters").field(filters).finish(),
        }
    }
}

impl PartialEq for FilterValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FilterValue::Value(a), FilterValue::Value(b)) => a == b,
            (FilterValue::Predicate(a), FilterValue::Predicate(b)) => Arc::ptr_eq(a, b),
            (FilterValue::Matcher(a), FilterValue::Matcher(b)) => Arc::ptr_eq(a, b),
            (FilterValue::Filters(a), FilterValue::Filters(b)) => a == b,
            _ => false,
        }
    }
}

/// An ordered filter expression.
///
/// Keys keep their insertion order, and setting a key that is already present replaces
/// its constraint in place, mirroring document semantics. An empty filter matches every
/// document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    entries: Vec<(String, FilterValue)>,
}

impl Filter {
    /// Creates an empty filter that matches every document.
    pub fn new() -> Self {
        Filter { entries: Vec::new() }
    }

    /// Sets `key` to a BSON constraint (literal or operator document).
    pub fn field(self, key: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with(key, FilterValue::Value(value.into()))
    }

    /// Sets `key` to a closure constraint.
    pub fn predicate<F>(self, key: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(Option<&Bson>) -> bool + Send + Sync + 'static,
    {
        self.with(key, FilterValue::Predicate(Arc::new(predicate)))
    }

    /// Sets `key` to a [`ValueMatcher`] constraint.
    pub fn matcher(self, key: impl Into<String>, matcher: impl ValueMatcher + 'static) -> Self {
        self.with(key, FilterValue::Matcher(Arc::new(matcher)))
    }

    /// Adds an `$and` group: every sub-filter must match.
    pub fn and(self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.with("$and", FilterValue::Filters(filters.into_iter().collect()))
    }

    /// Adds an `$or` group: at least one sub-filter must match.
    pub fn or(self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.with("$or", FilterValue::Filters(filters.into_iter().collect()))
    }

    /// Adds a `$nor` group: no sub-filter may match.
    pub fn nor(self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.with("$nor", FilterValue::Filters(filters.into_iter().collect()))
    }

    /// Sets `key` to an arbitrary [`FilterValue`].
    pub fn with(mut self, key: impl Into<String>, value: FilterValue) -> Self {
        self.insert(key, value);
        self
    }

    /// Sets `key` in place, replacing an existing entry with the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: FilterValue) {
        let key = key.into();

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Returns the constraint for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converts this filter back into a plain BSON document.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::UnsupportedFilter`] if any entry (at any depth) is a
    /// predicate or matcher, since those have no document representation.
    pub fn to_document(&self) -> CollectionResult<Document> {
        let mut document = Document::new();

        for (key, value) in &self.entries {
            let bson = match value {
                FilterValue::Value(value) => value.clone(),
                FilterValue::Filters(filters) => Bson::Array(
                    filters
                        .iter()
                        .map(|filter| filter.to_document().map(Bson::Document))
                        .collect::<CollectionResult<Vec<_>>>()?,
                ),
                FilterValue::Predicate(_) | FilterValue::Matcher(_) => {
                    return Err(CollectionError::UnsupportedFilter(format!(
                        "field '{key}' uses a predicate, which has no document form"
                    )));
                }
            };

            document.insert(key.clone(), bson);
        }

        Ok(document)
    }
}

impl From<Document> for Filter {
    fn from(document: Document) -> Self {
        Filter {
            entries: document
                .into_iter()
                .map(|(k, v)| (k, FilterValue::Value(v)))
                .collect(),
        }
    }
}

impl<K: Into<String>> FromIterator<(K, FilterValue)> for Filter {
    fn from_iter<I: IntoIterator<Item = (K, FilterValue)>>(iter: I) -> Self {
        let mut filter = Filter::new();
        for (key, value) in iter {
            filter.insert(key, value);
        }
        filter
    }
}
