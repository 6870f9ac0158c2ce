//! In-memory mock collections for docmock.
//!
//! This crate provides [`MockCollection`], an implementation of
//! [`CollectionApi`](docmock_core::collection::CollectionApi) that keeps documents in
//! memory and evaluates filters and updates itself, and [`MockDatabase`], a named container
//! of collections. Calls are recorded so tests can assert on the queries and indexes their
//! code issued.
//!
//! # Features
//!
//! - **Query engine** - Field paths, comparison and logical operators, `$elemMatch`,
//!   `$regex`, `$type`, custom operators, Rust predicates and matchers
//! - **Update engine** - `$set`, `$unset`, `$inc`, `$push`, `$setOnInsert` and upserts
//! - **Result shaping** - Multi-key stable sort, skip, limit and type maps
//! - **Call history** - Query and index logs with assertion helpers
//!
//! # Quick Start
//!
//! ```ignore
//! use docmock::prelude::*;
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> CollectionResult<()> {
//!     let robots = MockCollection::new("robots");
//!
//!     robots.insert_many(vec![
//!         doc! { "name": "R2-D2", "height": 96 },
//!         doc! { "name": "C-3PO", "height": 167 },
//!     ]).await?;
//!
//!     robots.update_one(
//!         doc! { "name": "R2-D2" }.into(),
//!         doc! { "$set": { "owner.name": "Luke" }, "$inc": { "repairs": 1 } },
//!         None,
//!     ).await?;
//!
//!     let tall = robots
//!         .find(doc! { "height": { "$gt": 100 } }.into(), None)
//!         .await?
//!         .to_vec();
//!
//!     assert_eq!(tall.len(), 1);
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmock_memory;

pub mod assert;
pub mod collection;
pub mod compare;
pub mod constraint;
pub mod database;
pub mod evaluator;
pub mod log;
pub mod path;
pub mod pipeline;
pub mod update;

pub use collection::{MockCollection, MockCollectionBuilder};
pub use database::{CollectionInfo, CollectionOptions, MockDatabase, MockDatabaseBuilder};
pub use log::{IndexLog, QueryLog};
