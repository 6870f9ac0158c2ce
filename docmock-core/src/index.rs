//! Index descriptors.
//!
//! Indexes are bookkeeping only: nothing in the mock consults them when matching or
//! inserting. They exist so calling code that creates indexes can be asserted against.

use bson::{Bson, Document};

/// Key specification of an index: a single field name or an ordered `field -> direction`
/// document.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexKeys {
    Field(String),
    Fields(Document),
}

impl IndexKeys {
    /// Derives the index name: each field contributes `field_1`, joined with `_`.
    ///
    /// The direction is not part of the name, so `{foo: 1, bar: -1}` is `foo_1_bar_1`.
    pub fn derived_name(&self) -> String {
        match self {
            IndexKeys::Field(field) => format!("{field}_1"),
            IndexKeys::Fields(fields) => fields
                .keys()
                .map(|field| format!("{field}_1"))
                .collect::<Vec<_>>()
                .join("_"),
        }
    }

    /// Document form of the key specification (`Field(f)` becomes `{f: 1}`).
    pub fn to_document(&self) -> Document {
        match self {
            IndexKeys::Field(field) => {
                let mut document = Document::new();
                document.insert(field.clone(), Bson::Int32(1));
                document
            }
            IndexKeys::Fields(fields) => fields.clone(),
        }
    }
}

impl From<&str> for IndexKeys {
    fn from(field: &str) -> Self {
        IndexKeys::Field(field.to_string())
    }
}

impl From<String> for IndexKeys {
    fn from(field: String) -> Self {
        IndexKeys::Field(field)
    }
}

impl From<Document> for IndexKeys {
    fn from(fields: Document) -> Self {
        IndexKeys::Fields(fields)
    }
}

/// Options of an index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexOptions {
    pub unique: Option<bool>,
    /// Explicit name, overriding the derived one.
    pub name: Option<String>,
}

impl IndexOptions {
    pub fn unique() -> Self {
        IndexOptions {
            unique: Some(true),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// An index to create: keys plus options.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexModel {
    pub keys: IndexKeys,
    pub options: IndexOptions,
}

impl IndexModel {
    pub fn new(keys: impl Into<IndexKeys>) -> Self {
        IndexModel {
            keys: keys.into(),
            options: IndexOptions::default(),
        }
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    /// The explicit name if one was given, otherwise the derived name.
    pub fn name(&self) -> String {
        self.options
            .name
            .clone()
            .unwrap_or_else(|| self.keys.derived_name())
    }
}

/// An entry returned by `list_indexes`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    /// Index format version, always `1`.
    pub v: i32,
    pub key: IndexKeys,
    pub name: String,
    pub unique: bool,
    /// `database.collection`, or just the collection name outside a database.
    pub ns: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use rstest::rstest;

    #[rstest]
    #[case(IndexKeys::from("foo"), "foo_1")]
    #[case(IndexKeys::from(doc! { "foo": 1, "bar": -1 }), "foo_1_bar_1")]
    #[case(IndexKeys::from(doc! { "a.b": 1 }), "a.b_1")]
    fn test_derived_name(#[case] keys: IndexKeys, #[case] expected: &str) {
        assert_eq!(keys.derived_name(), expected);
    }

    #[test]
    fn test_explicit_name_wins() {
        let model = IndexModel::new("foo").with_options(IndexOptions::unique().named("by_foo"));

        assert_eq!(model.name(), "by_foo");
    }
}
