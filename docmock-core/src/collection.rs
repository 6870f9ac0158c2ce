//! The shared collection interface.
//!
//! [`CollectionApi`] describes the operation set calling code depends on. The in-memory
//! mock implements it, and so does a thin wrapper over the real driver, so code written
//! against the trait can be pointed at either one.
//!
//! # Example
//!
//! ```ignore
//! use docmock::prelude::*;
//! use bson::doc;
//!
//! async fn deactivate<C: CollectionApi>(users: &C, email: &str) -> CollectionResult<u64> {
//!     let result = users
//!         .update_many(
//!             doc! { "email": email }.into(),
//!             doc! { "$set": { "active": false } },
//!             None,
//!         )
//!         .await?;
//!
//!     Ok(result.modified_count)
//! }
//! ```

use async_trait::async_trait;
use bson::Document;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;

use crate::{
    cursor::Cursor,
    document::DocumentExt,
    error::CollectionResult,
    filter::Filter,
    index::{IndexInfo, IndexModel},
    options::{FindOneAndUpdateOptions, FindOptions, UpdateOptions},
    results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult},
};

/// Abstract interface of a document collection.
///
/// # Error Handling
///
/// Operations return [`CollectionResult<T>`](crate::error::CollectionResult). Malformed
/// filters and updates are reported before any document is touched.
#[async_trait]
pub trait CollectionApi: Send + Sync + Debug {
    /// Returns the name of this collection.
    fn name(&self) -> &str;

    /// Inserts a document, generating an `_id` if it has none.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::DuplicateKey`](crate::error::CollectionError::DuplicateKey)
    /// if a document with the same `_id` is already stored.
    async fn insert_one(&self, document: Document) -> CollectionResult<InsertOneResult>;

    /// Inserts documents one by one. A failure stops at the offending document; documents
    /// inserted before it stay in the collection.
    async fn insert_many(&self, documents: Vec<Document>) -> CollectionResult<InsertManyResult>;

    /// Returns every document matching `filter`, sorted, skipped and limited per `options`.
    async fn find(&self, filter: Filter, options: Option<FindOptions>) -> CollectionResult<Cursor>;

    /// Returns the first document `find` would return.
    async fn find_one(
        &self,
        filter: Filter,
        options: Option<FindOptions>,
    ) -> CollectionResult<Option<Document>>;

    /// Applies `update` to the first matching document.
    async fn update_one(
        &self,
        filter: Filter,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> CollectionResult<UpdateResult>;

    /// Applies `update` to every matching document.
    async fn update_many(
        &self,
        filter: Filter,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> CollectionResult<UpdateResult>;

    /// Applies `update` to the first matching document and returns it, either as it was
    /// before the update or as it is after.
    async fn find_one_and_update(
        &self,
        filter: Filter,
        update: Document,
        options: Option<FindOneAndUpdateOptions>,
    ) -> CollectionResult<Option<Document>>;

    /// Removes the first matching document.
    async fn delete_one(&self, filter: Filter) -> CollectionResult<DeleteResult>;

    /// Removes every matching document.
    async fn delete_many(&self, filter: Filter) -> CollectionResult<DeleteResult>;

    /// Counts the matching documents.
    async fn count(&self, filter: Filter) -> CollectionResult<u64>;

    /// Creates an index and returns its name.
    async fn create_index(&self, model: IndexModel) -> CollectionResult<String>;

    /// Creates several indexes and returns their names.
    async fn create_indexes(&self, models: Vec<IndexModel>) -> CollectionResult<Vec<String>> {
        let mut names = Vec::with_capacity(models.len());
        for model in models {
            names.push(self.create_index(model).await?);
        }
        Ok(names)
    }

    /// Lists the indexes of this collection.
    async fn list_indexes(&self) -> CollectionResult<Vec<IndexInfo>>;

    /// Removes every document of this collection.
    async fn drop(&self) -> CollectionResult<()>;
}

/// Typed convenience methods, automatically available on every [`CollectionApi`].
#[async_trait]
pub trait CollectionExt: CollectionApi {
    /// Serializes `value` and inserts it.
    async fn insert_serialized<T>(&self, value: &T) -> CollectionResult<InsertOneResult>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        self.insert_one(value.to_document()?).await
    }

    /// Runs `find` and deserializes every result into `T`.
    async fn find_as<T>(&self, filter: Filter, options: Option<FindOptions>) -> CollectionResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.find(filter, options).await?.deserialize()
    }

    /// Returns every document in insertion order.
    async fn all(&self) -> CollectionResult<Vec<Document>> {
        Ok(self.find(Filter::new(), None).await?.to_vec())
    }
}

impl<C: CollectionApi + ?Sized> CollectionExt for C {}
