//! A named container of mock collections.

use std::sync::Arc;
use bson::Bson;
use mea::rwlock::RwLock;
use tracing::debug;

use docmock_core::{
    error::{CollectionError, CollectionResult},
    options::TypeMap,
};

use crate::{
    collection::{MockCollection, MockCollectionBuilder},
    constraint::OperatorRegistry,
};

/// Per-collection overrides of the database defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionOptions {
    pub type_map: Option<TypeMap>,
    pub in_operand_patterns: Option<bool>,
}

/// An entry returned by [`MockDatabase::list_collections`].
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    /// `database.collection`.
    pub name: String,
    pub options: CollectionOptions,
}

#[derive(Debug)]
struct DatabaseSettings {
    name: String,
    defaults: CollectionOptions,
    operators: OperatorRegistry,
}

#[derive(Debug)]
struct CollectionEntry {
    collection: MockCollection,
    options: CollectionOptions,
}

/// An in-memory database: collections by name, created on demand.
///
/// Options given to the database builder are inherited by every collection it creates;
/// options given when creating a collection override them.
///
/// # Example
///
/// ```ignore
/// use docmock::memory::MockDatabase;
///
/// let database = MockDatabase::builder("factory").build();
/// let robots = database.collection("robots").await;
///
/// assert_eq!(robots.namespace(), "factory.robots");
/// ```
#[derive(Clone, Debug)]
pub struct MockDatabase {
    settings: Arc<DatabaseSettings>,
    collections: Arc<RwLock<Vec<(String, CollectionEntry)>>>,
}

impl MockDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        MockDatabase::builder(name).build()
    }

    pub fn builder(name: impl Into<String>) -> MockDatabaseBuilder {
        MockDatabaseBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Options inherited by new collections.
    pub fn options(&self) -> &CollectionOptions {
        &self.settings.defaults
    }

    fn register(
        &self,
        collections: &mut Vec<(String, CollectionEntry)>,
        name: &str,
        options: CollectionOptions,
    ) -> MockCollection {
        let collection = MockCollectionBuilder::new(name)
            .database(self.settings.name.clone())
            .options(&self.settings.defaults)
            .operators(&self.settings.operators)
            .options(&options)
            .build();

        collections.push((
            name.to_string(),
            CollectionEntry {
                collection: collection.clone(),
                options,
            },
        ));

        collection
    }

    /// Creates a collection.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::CollectionAlreadyExists`] if `name` is taken.
    pub async fn create_collection(
        &self,
        name: &str,
        options: Option<CollectionOptions>,
    ) -> CollectionResult<MockCollection> {
        let options = options.unwrap_or_default();
        let mut collections = self.collections.write().await;

        if collections.iter().any(|(existing, _)| existing == name) {
            return Err(CollectionError::CollectionAlreadyExists(format!(
                "{}.{name}",
                self.settings.name
            )));
        }

        let collection = self.register(&mut collections, name, options);

        debug!(database = %self.settings.name, collection = name, "created collection");
        Ok(collection)
    }

    /// Returns the collection called `name`, creating it with `options` if it does not
    /// exist yet. `options` are ignored for an existing collection.
    pub async fn select_collection(&self, name: &str, options: Option<CollectionOptions>) -> MockCollection {
        let mut collections = self.collections.write().await;

        if let Some((_, entry)) = collections.iter().find(|(existing, _)| existing == name) {
            return entry.collection.clone();
        }

        let collection = self.register(&mut collections, name, options.unwrap_or_default());

        debug!(database = %self.settings.name, collection = name, "created collection on first use");
        collection
    }

    /// Returns the collection called `name`, creating it if needed.
    pub async fn collection(&self, name: &str) -> MockCollection {
        self.select_collection(name, None).await
    }

    /// Lists collections in creation order.
    pub async fn list_collections(&self) -> Vec<CollectionInfo> {
        self.collections
            .read()
            .await
            .iter()
            .map(|(name, entry)| CollectionInfo {
                name: format!("{}.{name}", self.settings.name),
                options: entry.options.clone(),
            })
            .collect()
    }

    /// Removes a collection from the database and drops its documents. Returns `false` if
    /// there was no such collection.
    pub async fn drop_collection(&self, name: &str) -> bool {
        let removed = {
            let mut collections = self.collections.write().await;
            collections
                .iter()
                .position(|(existing, _)| existing == name)
                .map(|position| collections.remove(position))
        };

        match removed {
            Some((_, entry)) => {
                let mut state = entry.collection.state.write().await;
                state.documents.clear();
                state.dropped = true;
                true
            }
            None => false,
        }
    }
}

/// Builder for [`MockDatabase`].
#[derive(Debug)]
pub struct MockDatabaseBuilder {
    name: String,
    defaults: CollectionOptions,
    operators: OperatorRegistry,
}

impl MockDatabaseBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        MockDatabaseBuilder {
            name: name.into(),
            defaults: CollectionOptions::default(),
            operators: OperatorRegistry::default(),
        }
    }

    /// Default type map of every collection.
    pub fn type_map(mut self, type_map: TypeMap) -> Self {
        self.defaults.type_map = Some(type_map);
        self
    }

    /// Default `$in` pattern behaviour of every collection.
    pub fn in_operand_patterns(mut self, enabled: bool) -> Self {
        self.defaults.in_operand_patterns = Some(enabled);
        self
    }

    /// Registers a custom constraint operator for every collection.
    pub fn operator<F>(mut self, name: impl Into<String>, operator: F) -> Self
    where
        F: Fn(Option<&Bson>, &Bson) -> bool + Send + Sync + 'static,
    {
        self.operators.insert(name, Arc::new(operator));
        self
    }

    pub fn build(self) -> MockDatabase {
        MockDatabase {
            settings: Arc::new(DatabaseSettings {
                name: self.name,
                defaults: self.defaults,
                operators: self.operators,
            }),
            collections: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for MockDatabaseBuilder {
    fn default() -> Self {
        MockDatabaseBuilder::new("database")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docmock_core::{collection::CollectionApi, options::Shape};

    #[tokio::test]
    async fn test_create_collection_twice_fails() {
        let database = MockDatabase::new("db");

        database.create_collection("foo", None).await.unwrap();
        let result = database.create_collection("foo", None).await;

        assert!(matches!(result, Err(CollectionError::CollectionAlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_select_collection_returns_the_same_collection() {
        let database = MockDatabase::new("db");

        database.collection("foo").await.insert_one(doc! { "a": 1 }).await.unwrap();
        let count = database.collection("foo").await.count(doc! {}.into()).await.unwrap();

        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_list_collections_uses_namespaces() {
        let database = MockDatabase::new("db");
        let options = CollectionOptions {
            in_operand_patterns: Some(false),
            ..CollectionOptions::default()
        };

        database.create_collection("foo", Some(options.clone())).await.unwrap();
        database.collection("bar").await;

        assert_eq!(
            database.list_collections().await,
            vec![
                CollectionInfo { name: "db.foo".into(), options },
                CollectionInfo { name: "db.bar".into(), options: CollectionOptions::default() },
            ]
        );
    }

    #[tokio::test]
    async fn test_collections_inherit_database_options() {
        let database = MockDatabase::builder("db")
            .type_map(TypeMap::new().root(Shape::Json))
            .build();

        let inherited = database.collection("foo").await;
        let overridden = database
            .create_collection(
                "bar",
                Some(CollectionOptions {
                    type_map: Some(TypeMap::new().root(Shape::Bson)),
                    ..CollectionOptions::default()
                }),
            )
            .await
            .unwrap();

        assert_eq!(inherited.type_map().root_shape(), Shape::Json);
        assert_eq!(overridden.type_map().root_shape(), Shape::Bson);
        assert_eq!(inherited.database_name(), Some("db"));
    }

    #[tokio::test]
    async fn test_drop_collection() {
        let database = MockDatabase::new("db");
        let foo = database.collection("foo").await;
        foo.insert_one(doc! { "a": 1 }).await.unwrap();

        assert!(database.drop_collection("foo").await);
        assert!(!database.drop_collection("foo").await);
        assert!(foo.is_dropped().await);
        assert!(database.list_collections().await.is_empty());
    }
}
