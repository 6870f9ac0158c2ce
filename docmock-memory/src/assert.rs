//! Assertions over a [`MockCollection`]'s history and contents.
//!
//! ```ignore
//! use docmock::prelude::*;
//! use docmock::memory::assert::{any_value, equal_to};
//! use bson::doc;
//!
//! let users = MockCollection::new("users");
//! users.find(doc! { "email": "alice@example.com", "active": true }.into(), None).await?;
//!
//! assert!(users.has_executed_query(doc! { "active": true, "email": "alice@example.com" }, None).await);
//! assert!(
//!     users
//!         .has_executed_query(Filter::new().matcher("email", any_value()).field("active", true), None)
//!         .await
//! );
//! ```

use bson::Bson;

use docmock_core::{
    collection::CollectionApi,
    error::CollectionResult,
    filter::{Filter, ValueMatcher},
    index::{IndexKeys, IndexOptions},
    options::FindOptions,
};

use crate::{collection::MockCollection, compare::loose_eq};

impl MockCollection {
    /// Returns `true` if `find` or `find_one` was called with `filter` and `options`.
    pub async fn has_executed_query(&self, filter: impl Into<Filter>, options: Option<FindOptions>) -> bool {
        let filter = filter.into();

        self.state
            .read()
            .await
            .queries
            .iter()
            .any(|query| query.satisfies(&filter, options.as_ref()))
    }

    /// Returns `true` if an index with `keys` and `options` was created.
    pub async fn has_index(&self, keys: impl Into<IndexKeys>, options: IndexOptions) -> bool {
        let keys = keys.into();

        self.state
            .read()
            .await
            .indexes
            .iter()
            .any(|index| index.satisfies(&keys, &options))
    }

    /// Returns `true` if at least one document matches `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if `filter` does not compile.
    pub async fn has_document(&self, filter: impl Into<Filter>) -> CollectionResult<bool> {
        Ok(self.count(filter.into()).await? > 0)
    }
}

/// Matches values loosely equal to an expected value.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualTo(pub Bson);

impl ValueMatcher for EqualTo {
    fn evaluate(&self, value: Option<&Bson>) -> bool {
        value.is_some_and(|value| loose_eq(value, &self.0))
    }

    fn describe(&self) -> String {
        format!("is equal to {}", self.0)
    }
}

/// Matches any value, including a missing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnyValue;

impl ValueMatcher for AnyValue {
    fn evaluate(&self, _value: Option<&Bson>) -> bool {
        true
    }

    fn describe(&self) -> String {
        "is anything".to_string()
    }
}

pub fn equal_to(value: impl Into<Bson>) -> EqualTo {
    EqualTo(value.into())
}

pub fn any_value() -> AnyValue {
    AnyValue
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmock_core::{index::IndexModel, options::FindOptions};

    #[tokio::test]
    async fn test_has_executed_query() {
        let collection = MockCollection::new("users");
        let options = FindOptions::builder().limit(1).build();

        collection
            .find(doc! { "foo": "bar", "n": 1 }.into(), Some(options.clone()))
            .await
            .unwrap();

        assert!(collection.has_executed_query(doc! { "n": 1, "foo": "bar" }, Some(options.clone())).await);
        assert!(!collection.has_executed_query(doc! { "n": 1, "foo": "bar" }, None).await);
        assert!(
            collection
                .has_executed_query(
                    Filter::new().matcher("foo", any_value()).matcher("n", equal_to(1.0)),
                    Some(options),
                )
                .await
        );
    }

    #[tokio::test]
    async fn test_has_index() {
        let collection = MockCollection::new("users");

        collection
            .create_index(IndexModel::new(doc! { "foo": 1 }).with_options(IndexOptions::unique()))
            .await
            .unwrap();

        assert!(collection.has_index(doc! { "foo": 1 }, IndexOptions::unique()).await);
        assert!(!collection.has_index("foo", IndexOptions::default()).await);
    }

    #[tokio::test]
    async fn test_has_document() {
        let collection = MockCollection::new("users");
        collection.insert_one(doc! { "foo": "bar" }).await.unwrap();

        assert!(collection.has_document(doc! { "foo": "bar" }).await.unwrap());
        assert!(!collection.has_document(doc! { "foo": "baz" }).await.unwrap());
    }

    #[test]
    fn test_matchers() {
        assert!(equal_to(3).evaluate(Some(&Bson::Double(3.0))));
        assert!(!equal_to(3).evaluate(None));
        assert!(any_value().evaluate(None));
        assert_eq!(any_value().describe(), "is anything");
    }
}
