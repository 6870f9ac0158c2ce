//! Shared types for docmock, an in-memory stand-in for document database collections.
//!
//! This crate is the core of the docmock project and provides:
//!
//! - **Shared collection interface** ([`collection`]) - The async trait implemented by the mock and by real clients
//! - **Filters** ([`filter`]) - Declarative filter expressions, including predicate and matcher constraints
//! - **Options** ([`options`]) - Find, update and type-projection options
//! - **Results** ([`results`]) - Insert, update and delete outcome objects
//! - **Indexes** ([`index`]) - Index key specifications and derived names
//! - **Cursors** ([`cursor`]) - Eager result sets and their materialization
//! - **Documents** ([`document`]) - Identifier helpers and typed conversions
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docmock::{prelude::*, memory::MockCollection};
//! use bson::doc;
//!
//! #[tokio::main]
//! async fn main() -> CollectionResult<()> {
//!     let users = MockCollection::new("users");
//!     users.insert_one(doc! { "name": "Alice", "age": 30 }).await?;
//!
//!     let adults = users.count(doc! { "age": { "$gte": 18 } }.into()).await?;
//!     assert_eq!(adults, 1);
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmock_core;

pub mod collection;
pub mod cursor;
pub mod document;
pub mod error;
pub mod filter;
pub mod index;
pub mod options;
pub mod results;
