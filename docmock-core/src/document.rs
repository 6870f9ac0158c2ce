//! Document identifiers and typed conversions.
//!
//! Stored documents are plain `bson::Document`s. Every stored document carries an
//! identifier under [`ID_FIELD`]; when a caller inserts a document without one, an
//! `ObjectId` is generated and placed first, the way a server would.

use bson::{
    Bson, Document,
    de::deserialize_from_document,
    oid::ObjectId,
    ser::serialize_to_document,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::CollectionResult;

/// Name of the identifier field.
pub const ID_FIELD: &str = "_id";

/// Returns the identifier of `document`, generating and prepending an `ObjectId` if it
/// has none.
pub fn ensure_id(document: Document) -> (Bson, Document) {
    if let Some(id) = document.get(ID_FIELD) {
        return (id.clone(), document);
    }

    let id = Bson::ObjectId(ObjectId::new());
    let mut with_id = Document::new();
    with_id.insert(ID_FIELD, id.clone());

    for (key, value) in document {
        with_id.insert(key, value);
    }

    (id, with_id)
}

/// Canonical string form of an identifier, used for cross-representation equality
/// (an `ObjectId` and its hex string are the same identifier).
pub fn identifier_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Conversion helpers between Rust types and BSON documents.
///
/// This trait is automatically implemented for every type that is both `Serialize` and
/// `DeserializeOwned`.
pub trait DocumentExt: Sized {
    /// Serializes this value into a BSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not serialize to a document (e.g. a bare integer).
    fn to_document(&self) -> CollectionResult<Document>;

    /// Deserializes a value from a BSON document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not have the expected structure.
    fn from_document(document: Document) -> CollectionResult<Self>;
}

impl<T: Serialize + DeserializeOwned> DocumentExt for T {
    fn to_document(&self) -> CollectionResult<Document> {
        Ok(serialize_to_document(self)?)
    }

    fn from_document(document: Document) -> CollectionResult<Self> {
        Ok(deserialize_from_document(document)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        age: i32,
    }

    #[test]
    fn test_ensure_id_prepends_object_id() {
        let (id, document) = ensure_id(doc! { "foo": "bar" });

        assert!(matches!(id, Bson::ObjectId(_)));
        assert_eq!(document.keys().next().map(String::as_str), Some(ID_FIELD));
        assert_eq!(document.get("foo"), Some(&Bson::String("bar".into())));
    }

    #[test]
    fn test_ensure_id_keeps_existing_id() {
        let (id, document) = ensure_id(doc! { "foo": "bar", "_id": 42 });

        assert_eq!(id, Bson::Int32(42));
        assert_eq!(document, doc! { "foo": "bar", "_id": 42 });
    }

    #[test]
    fn test_identifier_string_matches_hex() {
        let oid = ObjectId::new();

        assert_eq!(identifier_string(&Bson::ObjectId(oid)), oid.to_hex());
        assert_eq!(identifier_string(&Bson::String(oid.to_hex())), oid.to_hex());
    }

    #[test]
    fn test_typed_round_trip() {
        let user = User { name: "Alice".into(), age: 30 };
        let document = user.to_document().unwrap();

        assert_eq!(document, doc! { "name": "Alice", "age": 30 });
        assert_eq!(User::from_document(document).unwrap(), user);
    }
}
