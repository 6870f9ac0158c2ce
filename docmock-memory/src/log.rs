//! Call history recorded by [`MockCollection`](crate::MockCollection).

use docmock_core::{
    filter::{Filter, FilterValue},
    index::{IndexKeys, IndexOptions},
    options::FindOptions,
};

use crate::compare::loose_eq;

/// A `find` or `find_one` call.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryLog {
    pub filter: Filter,
    pub options: Option<FindOptions>,
}

impl QueryLog {
    /// Returns `true` if this call was made with `filter` and `options`.
    ///
    /// Top-level filter keys may appear in any order, `None` options equal default options,
    /// and a [`ValueMatcher`](docmock_core::filter::ValueMatcher) in `filter` is evaluated
    /// against the logged value instead of being compared.
    pub fn satisfies(&self, filter: &Filter, options: Option<&FindOptions>) -> bool {
        let logged_options = self.options.clone().unwrap_or_default();
        let wanted_options = options.cloned().unwrap_or_default();

        logged_options == wanted_options && filters_match(filter, &self.filter)
    }
}

fn filters_match(expected: &Filter, logged: &Filter) -> bool {
    expected.len() == logged.len()
        && expected.iter().all(|(key, wanted)| {
            logged
                .get(key)
                .is_some_and(|actual| values_match(wanted, actual))
        })
}

fn values_match(expected: &FilterValue, logged: &FilterValue) -> bool {
    match (expected, logged) {
        (FilterValue::Matcher(matcher), FilterValue::Value(value)) => matcher.evaluate(Some(value)),
        (FilterValue::Value(a), FilterValue::Value(b)) => a == b || loose_eq(a, b),
        (FilterValue::Filters(a), FilterValue::Filters(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| filters_match(a, b))
        }
        (a, b) => a == b,
    }
}

/// A `create_index` call. Indexes are keyed by name: creating an index with an existing
/// name replaces the entry.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexLog {
    pub name: String,
    pub keys: IndexKeys,
    pub options: IndexOptions,
}

impl IndexLog {
    /// Returns `true` if this index was created with `keys` and `options`.
    pub fn satisfies(&self, keys: &IndexKeys, options: &IndexOptions) -> bool {
        self.keys.to_document() == keys.to_document() && self.options == *options
    }
}
