//! MongoDB-backed collections for docmock.
//!
//! This crate provides [`MongoCollection`], an implementation of the
//! [`CollectionApi`](docmock_core::collection::CollectionApi) trait over a real MongoDB
//! collection. Code written against the trait can run on the in-memory mock in tests and
//! on a server in production.
//!
//! To use it, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmock = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docmock::{prelude::*, mongodb::MongoCollection};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> CollectionResult<()> {
//!     let users = MongoCollection::builder("mongodb://localhost:27017", "app", "users")
//!         .build()
//!         .await?;
//!
//!     users.insert_one(doc! { "name": "Alice" }).await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmock_mongodb;

pub mod collection;

pub use collection::{MongoCollection, MongoCollectionBuilder};
