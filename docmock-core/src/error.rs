//! Error types and result types for collection operations.
//!
//! Every failure in docmock is a local, synchronous caller error: a malformed filter, a
//! malformed update or a write that would break the unique identifier invariant. None of
//! them are transient, so none of them are retried. Use [`CollectionResult<T>`] as the
//! return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when working with a collection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollectionError {
    /// A document with the given identifier already exists in the collection.
    /// The first argument is the identifier, the second is the collection name.
    #[error("Duplicate key: document {0} already exists in collection {1}")]
    DuplicateKey(String, String),
    /// The update expression contains top-level keys outside the supported operators.
    #[error("Unsupported update operators found: {}", .0.join(", "))]
    UnsupportedUpdateOperators(Vec<String>),
    /// `$set` and `$setOnInsert` both target the same fields during an upsert.
    #[error("Conflicting upsert fields in $set and $setOnInsert: {}", .0.join(", "))]
    ConflictingUpsertFields(Vec<String>),
    /// A logical operator (`$and`, `$or`, `$nor`) was given a missing, empty or
    /// non-array operand.
    #[error("{0} expression must be a nonempty array")]
    MalformedLogicalFilter(String),
    /// A `$regex` operand could not be compiled.
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern as supplied by the caller.
        pattern: String,
        /// The compiler's explanation.
        reason: String,
    },
    /// A filter used an operator key outside the known table.
    #[error("Constraint operator '{0}' is not supported")]
    UnsupportedOperator(String),
    /// A known operator was given an operand of the wrong shape.
    #[error("Invalid operand for {operator}: {reason}")]
    InvalidOperand {
        /// The operator key.
        operator: String,
        /// What was wrong with the operand.
        reason: String,
    },
    /// An update could not be applied to a document (e.g. descending through a scalar).
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),
    /// A collection with the given name already exists in the database.
    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),
    /// The filter cannot be expressed for this backend (e.g. a predicate sent to a server).
    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),
    /// Serialization/deserialization error when converting between BSON, JSON and Rust types.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// An error reported by a real database backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for collection operations.
pub type CollectionResult<T> = Result<T, CollectionError>;

impl CollectionError {
    /// Shorthand for [`CollectionError::InvalidOperand`].
    pub fn invalid_operand(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        CollectionError::InvalidOperand {
            operator: operator.into(),
            reason: reason.into(),
        }
    }
}

impl From<BsonError> for CollectionError {
    fn from(err: BsonError) -> Self {
        CollectionError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for CollectionError {
    fn from(err: SerdeJsonError) -> Self {
        CollectionError::Serialization(err.to_string())
    }
}
