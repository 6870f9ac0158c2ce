//! Eager result sets.
//!
//! A [`Cursor`] owns a snapshot of the matching documents, computed in full before the
//! query returns. Later writes to the collection never change a cursor that was already
//! handed out, and mutating a document taken from a cursor never touches the store.

use bson::{Bson, Document, deserialize_from_document};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::{
    error::CollectionResult,
    options::{Shape, TypeMap},
};

/// A result document rendered according to a [`TypeMap`].
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    Bson(Document),
    Json(Value),
}

impl Materialized {
    pub fn as_bson(&self) -> Option<&Document> {
        match self {
            Materialized::Bson(document) => Some(document),
            Materialized::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Materialized::Json(value) => Some(value),
            Materialized::Bson(_) => None,
        }
    }
}

/// An eagerly computed, ordered set of result documents.
#[derive(Debug, Clone)]
pub struct Cursor {
    documents: std::vec::IntoIter<Document>,
    type_map: TypeMap,
}

impl Cursor {
    pub fn new(documents: Vec<Document>, type_map: TypeMap) -> Self {
        Cursor {
            documents: documents.into_iter(),
            type_map,
        }
    }

    /// The effective type map of the query that produced this cursor.
    pub fn type_map(&self) -> &TypeMap {
        &self.type_map
    }

    /// Collects the remaining documents.
    pub fn to_vec(self) -> Vec<Document> {
        self.documents.collect()
    }

    /// Deserializes the remaining documents into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if any document does not deserialize into `T`.
    pub fn deserialize<T: DeserializeOwned>(self) -> CollectionResult<Vec<T>> {
        self.documents
            .map(|document| Ok(deserialize_from_document(document)?))
            .collect()
    }

    /// Renders the remaining documents according to the cursor's type map.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be rendered as JSON.
    pub fn materialize(self) -> CollectionResult<Vec<Materialized>> {
        let type_map = self.type_map;

        self.documents
            .map(|document| match type_map.root_shape() {
                Shape::Bson => Ok(Materialized::Bson(document)),
                Shape::Json => Ok(Materialized::Json(json_document(&document, &type_map)?)),
            })
            .collect()
    }
}

impl Iterator for Cursor {
    type Item = Document;

    fn next(&mut self) -> Option<Self::Item> {
        self.documents.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.documents.size_hint()
    }
}

impl ExactSizeIterator for Cursor {}

fn json_document(document: &Document, type_map: &TypeMap) -> CollectionResult<Value> {
    let mut map = Map::new();
    for (key, value) in document {
        map.insert(key.clone(), json_value(value, type_map)?);
    }
    Ok(Value::Object(map))
}

fn json_value(value: &Bson, type_map: &TypeMap) -> CollectionResult<Value> {
    Ok(match value {
        Bson::Document(document) => match type_map.document_shape() {
            Shape::Json => json_document(document, type_map)?,
            Shape::Bson => canonical(value)?,
        },
        Bson::Array(items) => match type_map.array_shape() {
            Shape::Json => Value::Array(
                items
                    .iter()
                    .map(|item| json_value(item, type_map))
                    .collect::<CollectionResult<Vec<_>>>()?,
            ),
            Shape::Bson => canonical(value)?,
        },
        Bson::Int32(v) => json!(v),
        Bson::Int64(v) => json!(v),
        Bson::Double(v) => json!(v),
        Bson::String(v) => json!(v),
        Bson::Boolean(v) => json!(v),
        Bson::Null => Value::Null,
        other => serde_json::to_value(other)?,
    })
}

/// Type-preserving extended JSON: numbers carry their BSON width.
fn canonical(value: &Bson) -> CollectionResult<Value> {
    Ok(match value {
        Bson::Int32(v) => json!({ "$numberInt": v.to_string() }),
        Bson::Int64(v) => json!({ "$numberLong": v.to_string() }),
        Bson::Double(v) => json!({ "$numberDouble": v.to_string() }),
        Bson::Document(document) => {
            let mut map = Map::new();
            for (key, value) in document {
                map.insert(key.clone(), canonical(value)?);
            }
            Value::Object(map)
        }
        Bson::Array(items) => Value::Array(
            items
                .iter()
                .map(canonical)
                .collect::<CollectionResult<Vec<_>>>()?,
        ),
        other => serde_json::to_value(other)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectionError;
    use bson::doc;

    #[test]
    fn test_iterates_in_order() {
        let cursor = Cursor::new(vec![doc! { "n": 1 }, doc! { "n": 2 }], TypeMap::default());

        assert_eq!(cursor.len(), 2);
        assert_eq!(cursor.to_vec(), vec![doc! { "n": 1 }, doc! { "n": 2 }]);
    }

    #[test]
    fn test_deserialize_into_read_only_types() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct Reading {
            sensor: String,
            value: i32,
        }

        let cursor = Cursor::new(
            vec![doc! { "sensor": "a", "value": 1 }, doc! { "sensor": "b", "value": 2 }],
            TypeMap::default(),
        );

        assert_eq!(
            cursor.deserialize::<Reading>().unwrap(),
            vec![
                Reading { sensor: "a".into(), value: 1 },
                Reading { sensor: "b".into(), value: 2 },
            ]
        );

        let malformed = Cursor::new(vec![doc! { "sensor": 1 }], TypeMap::default());
        assert!(matches!(
            malformed.deserialize::<Reading>(),
            Err(CollectionError::Serialization(_))
        ));
    }

    #[test]
    fn test_materialize_defaults_to_bson() {
        let cursor = Cursor::new(vec![doc! { "foo": [1, 2] }], TypeMap::default());
        let rendered = cursor.materialize().unwrap();

        assert_eq!(rendered, vec![Materialized::Bson(doc! { "foo": [1, 2] })]);
    }

    #[test]
    fn test_materialize_plain_json() {
        let cursor = Cursor::new(
            vec![doc! { "foo": [[1, 2, 3], 2, 3], "bar": { "baz": "qux" } }],
            TypeMap::json(),
        );
        let rendered = cursor.materialize().unwrap();

        assert_eq!(
            rendered[0].as_json(),
            Some(&json!({ "foo": [[1, 2, 3], 2, 3], "bar": { "baz": "qux" } }))
        );
    }

    #[test]
    fn test_materialize_bson_levels_under_json_root() {
        let cursor = Cursor::new(
            vec![doc! { "foo": [1], "n": 2 }],
            TypeMap::new().root(Shape::Json),
        );
        let rendered = cursor.materialize().unwrap();

        assert_eq!(
            rendered[0].as_json(),
            Some(&json!({ "foo": [{ "$numberInt": "1" }], "n": 2 }))
        );
    }
}
