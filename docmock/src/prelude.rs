//! Convenient re-exports of commonly used types from docmock.
//!
//! ```ignore
//! use docmock::prelude::*;
//! ```
//!
//! This provides access to:
//! - The collection interface and its typed extension
//! - Filters, options and results
//! - The in-memory mock collection and database
//! - Error types

pub use docmock_core::{
    collection::{CollectionApi, CollectionExt},
    cursor::{Cursor, Materialized},
    document::DocumentExt,
    error::{CollectionError, CollectionResult},
    filter::{Filter, FilterValue, ValueMatcher},
    index::{IndexInfo, IndexKeys, IndexModel, IndexOptions},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, Shape, TypeMap, UpdateOptions},
    results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult},
};
pub use docmock_memory::{MockCollection, MockDatabase};
