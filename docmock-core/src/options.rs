//! Options for find, update and projection.
//!
//! Options are plain structs with public fields and fluent builders, in the same way the
//! query types are built:
//!
//! ```ignore
//! use docmock::options::FindOptions;
//! use bson::doc;
//!
//! let options = FindOptions::builder()
//!     .sort(doc! { "created_at": -1, "name": 1 })
//!     .skip(10)
//!     .limit(5)
//!     .build();
//! ```

use bson::Document;

/// Container shape a level of a result document is materialized into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Shape {
    /// Keep BSON containers (`bson::Document` / array). At nested levels of a JSON root
    /// this renders type-preserving canonical extended JSON.
    #[default]
    Bson,
    /// Plain `serde_json` objects and arrays.
    Json,
}

/// Per-level container shapes for materialized results.
///
/// Unset levels fall back to the next layer: per-call map, then collection default, then
/// [`Shape::Bson`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TypeMap {
    /// Shape of each top-level result.
    pub root: Option<Shape>,
    /// Shape of embedded documents.
    pub document: Option<Shape>,
    /// Shape of arrays.
    pub array: Option<Shape>,
}

impl TypeMap {
    pub fn new() -> Self {
        TypeMap::default()
    }

    /// A type map that renders every level as plain JSON.
    pub fn json() -> Self {
        TypeMap {
            root: Some(Shape::Json),
            document: Some(Shape::Json),
            array: Some(Shape::Json),
        }
    }

    pub fn root(mut self, shape: Shape) -> Self {
        self.root = Some(shape);
        self
    }

    pub fn document(mut self, shape: Shape) -> Self {
        self.document = Some(shape);
        self
    }

    pub fn array(mut self, shape: Shape) -> Self {
        self.array = Some(shape);
        self
    }

    /// Returns a copy of `self` with every level set in `overrides` replaced.
    pub fn merged_with(&self, overrides: &TypeMap) -> TypeMap {
        TypeMap {
            root: overrides.root.or(self.root),
            document: overrides.document.or(self.document),
            array: overrides.array.or(self.array),
        }
    }

    pub fn root_shape(&self) -> Shape {
        self.root.unwrap_or_default()
    }

    pub fn document_shape(&self) -> Shape {
        self.document.unwrap_or_default()
    }

    pub fn array_shape(&self) -> Shape {
        self.array.unwrap_or_default()
    }
}

/// Options for `find` and `find_one`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    /// Ordered sort specification, `field -> direction` (positive ascending, negative descending).
    pub sort: Option<Document>,
    /// Number of matching documents to skip, applied after sorting.
    pub skip: Option<u64>,
    /// Maximum number of documents to return. Zero means no limit.
    pub limit: Option<i64>,
    /// Per-call type map override.
    pub type_map: Option<TypeMap>,
}

impl FindOptions {
    pub fn builder() -> FindOptionsBuilder {
        FindOptionsBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptionsBuilder {
    options: FindOptions,
}

impl FindOptionsBuilder {
    /// Sets the ordered sort specification.
    pub fn sort(mut self, sort: Document) -> Self {
        self.options.sort = Some(sort);
        self
    }

    /// Sets the number of documents to skip.
    pub fn skip(mut self, skip: u64) -> Self {
        self.options.skip = Some(skip);
        self
    }

    /// Sets the maximum number of documents to return (zero means no limit).
    pub fn limit(mut self, limit: i64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    /// Sets the per-call type map override.
    pub fn type_map(mut self, type_map: TypeMap) -> Self {
        self.options.type_map = Some(type_map);
        self
    }

    pub fn build(self) -> FindOptions {
        self.options
    }
}

/// Options for `update_one` and `update_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    /// Insert a document synthesized from the filter and update when nothing matches.
    pub upsert: Option<bool>,
}

impl UpdateOptions {
    /// Options with `upsert` enabled.
    pub fn upsert() -> Self {
        UpdateOptions { upsert: Some(true) }
    }

    pub fn is_upsert(&self) -> bool {
        self.upsert.unwrap_or(false)
    }
}

/// Which version of the document `find_one_and_update` returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReturnDocument {
    /// The document as it was before the update.
    #[default]
    Before,
    /// The document as it is after the update.
    After,
}

/// Options for `find_one_and_update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndUpdateOptions {
    pub return_document: Option<ReturnDocument>,
    pub upsert: Option<bool>,
    /// Picks which document is updated when several match.
    pub sort: Option<Document>,
}

impl FindOneAndUpdateOptions {
    pub fn builder() -> FindOneAndUpdateOptionsBuilder {
        FindOneAndUpdateOptionsBuilder::default()
    }

    pub fn is_upsert(&self) -> bool {
        self.upsert.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOneAndUpdateOptionsBuilder {
    options: FindOneAndUpdateOptions,
}

impl FindOneAndUpdateOptionsBuilder {
    pub fn return_document(mut self, return_document: ReturnDocument) -> Self {
        self.options.return_document = Some(return_document);
        self
    }

    pub fn upsert(mut self, upsert: bool) -> Self {
        self.options.upsert = Some(upsert);
        self
    }

    pub fn sort(mut self, sort: Document) -> Self {
        self.options.sort = Some(sort);
        self
    }

    pub fn build(self) -> FindOneAndUpdateOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_map_merge_prefers_overrides() {
        let defaults = TypeMap::new().root(Shape::Json).array(Shape::Json);
        let merged = defaults.merged_with(&TypeMap::new().array(Shape::Bson));

        assert_eq!(merged.root_shape(), Shape::Json);
        assert_eq!(merged.array_shape(), Shape::Bson);
        assert_eq!(merged.document_shape(), Shape::Bson);
    }
}
