//! Outcome objects returned by write operations.
//!
//! All results are acknowledged: there is no unacknowledged write concern in a local store.

use bson::Bson;

/// Result of `insert_one`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertOneResult {
    /// Identifier of the inserted document (generated if the document had none).
    pub inserted_id: Bson,
}

impl InsertOneResult {
    pub fn inserted_count(&self) -> u64 {
        1
    }
}

/// Result of `insert_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertManyResult {
    /// Identifiers in insertion order.
    pub inserted_ids: Vec<Bson>,
}

impl InsertManyResult {
    pub fn inserted_count(&self) -> u64 {
        self.inserted_ids.len() as u64
    }
}

/// Result of `update_one` and `update_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    /// Number of documents the filter selected.
    pub matched_count: u64,
    /// Number of selected documents whose content actually changed.
    pub modified_count: u64,
    /// Identifiers of documents inserted by an upsert.
    pub upserted_ids: Vec<Bson>,
}

impl UpdateResult {
    pub fn upserted_count(&self) -> u64 {
        self.upserted_ids.len() as u64
    }

    /// The single upserted identifier, if any.
    pub fn upserted_id(&self) -> Option<&Bson> {
        self.upserted_ids.first()
    }
}

/// Result of `delete_one` and `delete_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteResult {
    /// Number of documents the filter selected.
    pub matched_count: u64,
    /// Identifiers of the removed documents.
    pub deleted_ids: Vec<Bson>,
}

impl DeleteResult {
    pub fn deleted_count(&self) -> u64 {
        self.deleted_ids.len() as u64
    }
}
