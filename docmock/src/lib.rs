//! In-memory stand-ins for document database collections.
//!
//! This crate is the primary entry point of docmock. It re-exports the shared collection
//! interface and the in-memory mock, and optionally a MongoDB-backed implementation of
//! the same interface.
//!
//! # Features
//!
//! - **Drop-in collection interface** - Code written against [`CollectionApi`](prelude::CollectionApi) runs on the mock and on a server
//! - **Query engine** - Comparison, logical, array and pattern operators plus Rust predicates
//! - **Update engine** - `$set`, `$unset`, `$inc`, `$push`, `$setOnInsert` and upserts
//! - **Assertions** - Recorded queries and indexes for test assertions
//!
//! # Quick Start
//!
//! ```ignore
//! use docmock::{prelude::*, memory::MockDatabase};
//! use bson::doc;
//!
//! async fn register<C: CollectionApi>(users: &C, email: &str) -> CollectionResult<()> {
//!     users
//!         .update_one(
//!             doc! { "email": email }.into(),
//!             doc! { "$setOnInsert": { "active": true }, "$inc": { "logins": 1 } },
//!             Some(UpdateOptions::upsert()),
//!         )
//!         .await?;
//!
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> CollectionResult<()> {
//!     let database = MockDatabase::new("app");
//!     let users = database.collection("users").await;
//!
//!     register(&users, "alice@example.com").await?;
//!     register(&users, "alice@example.com").await?;
//!
//!     let alice = users
//!         .find_one(doc! { "email": "alice@example.com" }.into(), None)
//!         .await?
//!         .unwrap();
//!
//!     assert_eq!(alice.get_i32("logins").unwrap(), 2);
//!     assert!(users.has_document(doc! { "active": true }).await?);
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - The in-memory mock
//! - [`mongodb`] - A MongoDB collection behind the same interface (requires the `mongodb` feature)

pub mod prelude;

pub use docmock_core::{collection, cursor, document, error, filter, index, options, results};

// Re-export BSON types for convenience
pub use bson;

/// The in-memory mock.
pub mod memory {
    pub use docmock_memory::{
        CollectionInfo, CollectionOptions, IndexLog, MockCollection, MockCollectionBuilder,
        MockDatabase, MockDatabaseBuilder, QueryLog, assert,
    };
}

/// MongoDB-backed collections.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmock_mongodb::{MongoCollection, MongoCollectionBuilder};
}
