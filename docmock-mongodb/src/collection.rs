use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Bson, Document, doc};
use mongodb::{
    Client, Collection,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{
        ClientOptions, FindOneAndUpdateOptions as DriverFindOneAndUpdateOptions,
        FindOptions as DriverFindOptions, IndexOptions as DriverIndexOptions,
        ReturnDocument as DriverReturnDocument,
    },
};
use tracing::debug;

use docmock_core::{
    collection::CollectionApi,
    cursor::Cursor,
    document::{ID_FIELD, ensure_id, identifier_string},
    error::{CollectionError, CollectionResult},
    filter::Filter,
    index::{IndexInfo, IndexKeys, IndexModel},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, TypeMap, UpdateOptions},
    results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult},
};

/// Server error code of a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// A [`CollectionApi`] implementation backed by a real MongoDB collection.
///
/// Filters are sent to the server as documents, so predicate and matcher constraints are
/// rejected with [`CollectionError::UnsupportedFilter`].
#[derive(Debug, Clone)]
pub struct MongoCollection {
    collection: Collection<Document>,
    type_map: TypeMap,
}

impl MongoCollection {
    pub fn new(collection: Collection<Document>) -> Self {
        Self {
            collection,
            type_map: TypeMap::default(),
        }
    }

    pub fn builder(dsn: &str, database: &str, collection: &str) -> MongoCollectionBuilder {
        MongoCollectionBuilder::new(dsn, database, collection)
    }

    /// Sets the collection-level default type map.
    pub fn with_type_map(mut self, type_map: TypeMap) -> Self {
        self.type_map = type_map;
        self
    }

    /// The driver collection this wraps.
    pub fn inner(&self) -> &Collection<Document> {
        &self.collection
    }

    /// `database.collection`.
    pub fn namespace(&self) -> String {
        let namespace = self.collection.namespace();
        format!("{}.{}", namespace.db, namespace.coll)
    }

    fn backend_error(&self, error: MongoError, id: Option<&Bson>) -> CollectionError {
        match id {
            Some(id) if is_duplicate_key(&error) => {
                CollectionError::DuplicateKey(identifier_string(id), self.collection.name().to_string())
            }
            _ => CollectionError::Backend(error.to_string()),
        }
    }

    async fn matching_ids(&self, filter: Document, limit: Option<i64>) -> CollectionResult<Vec<Bson>> {
        let mut options = DriverFindOptions::default();
        options.projection = Some(doc! { ID_FIELD: 1 });
        options.limit = limit;

        Ok(self
            .collection
            .find(filter)
            .with_options(options)
            .await
            .map_err(|e| self.backend_error(e, None))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| self.backend_error(e, None))?
            .into_iter()
            .filter_map(|document| document.get(ID_FIELD).cloned())
            .collect())
    }

    async fn delete_matching(&self, filter: Filter, limit: Option<i64>) -> CollectionResult<DeleteResult> {
        let ids = self.matching_ids(filter.to_document()?, limit).await?;

        if ids.is_empty() {
            return Ok(DeleteResult::default());
        }

        self.collection
            .delete_many(doc! { ID_FIELD: { "$in": ids.clone() } })
            .await
            .map_err(|e| self.backend_error(e, None))?;

        debug!(collection = %self.collection.name(), deleted = ids.len(), "deleted documents");
        Ok(DeleteResult {
            matched_count: ids.len() as u64,
            deleted_ids: ids,
        })
    }

    async fn update(
        &self,
        filter: Filter,
        update: Document,
        options: Option<UpdateOptions>,
        multi: bool,
    ) -> CollectionResult<UpdateResult> {
        let filter = filter.to_document()?;
        let upsert = options.is_some_and(|options| options.is_upsert());

        let result = match multi {
            true => self.collection.update_many(filter, update).upsert(upsert).await,
            false => self.collection.update_one(filter, update).upsert(upsert).await,
        }
        .map_err(|e| self.backend_error(e, None))?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_ids: result.upserted_id.into_iter().collect(),
        })
    }
}

fn is_duplicate_key(error: &MongoError) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(failure)) => failure.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

fn find_options(options: &FindOptions) -> DriverFindOptions {
    let mut driver = DriverFindOptions::default();
    driver.sort = options.sort.clone();
    driver.skip = options.skip;
    driver.limit = options.limit.map(i64::abs).filter(|limit| *limit != 0);
    driver
}

fn index_model(model: &IndexModel) -> mongodb::IndexModel {
    let mut options = DriverIndexOptions::default();
    options.unique = model.options.unique;
    options.name = Some(model.name());

    mongodb::IndexModel::builder()
        .keys(model.keys.to_document())
        .options(options)
        .build()
}

fn index_info(model: mongodb::IndexModel, namespace: &str) -> IndexInfo {
    let options = model.options.unwrap_or_default();

    IndexInfo {
        v: 1,
        name: options
            .name
            .unwrap_or_else(|| IndexKeys::from(model.keys.clone()).derived_name()),
        key: IndexKeys::from(model.keys),
        unique: options.unique.unwrap_or(false),
        ns: namespace.to_string(),
    }
}

#[async_trait]
impl CollectionApi for MongoCollection {
    fn name(&self) -> &str {
        self.collection.name()
    }

    async fn insert_one(&self, document: Document) -> CollectionResult<InsertOneResult> {
        let (inserted_id, document) = ensure_id(document);

        self.collection
            .insert_one(document)
            .await
            .map_err(|e| self.backend_error(e, Some(&inserted_id)))?;

        debug!(collection = %self.collection.name(), id = %inserted_id, "inserted document");
        Ok(InsertOneResult { inserted_id })
    }

    async fn insert_many(&self, documents: Vec<Document>) -> CollectionResult<InsertManyResult> {
        let mut inserted_ids = Vec::with_capacity(documents.len());

        for document in documents {
            inserted_ids.push(self.insert_one(document).await?.inserted_id);
        }

        Ok(InsertManyResult { inserted_ids })
    }

    async fn find(&self, filter: Filter, options: Option<FindOptions>) -> CollectionResult<Cursor> {
        let options = options.unwrap_or_default();
        let type_map = self.type_map.merged_with(&options.type_map.unwrap_or_default());

        let documents = self
            .collection
            .find(filter.to_document()?)
            .with_options(find_options(&options))
            .await
            .map_err(|e| self.backend_error(e, None))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| self.backend_error(e, None))?;

        Ok(Cursor::new(documents, type_map))
    }

    async fn find_one(
        &self,
        filter: Filter,
        options: Option<FindOptions>,
    ) -> CollectionResult<Option<Document>> {
        let mut options = options.unwrap_or_default();
        options.limit = Some(1);

        Ok(self.find(filter, Some(options)).await?.next())
    }

    async fn update_one(
        &self,
        filter: Filter,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> CollectionResult<UpdateResult> {
        self.update(filter, update, options, false).await
    }

    async fn update_many(
        &self,
        filter: Filter,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> CollectionResult<UpdateResult> {
        self.update(filter, update, options, true).await
    }

    async fn find_one_and_update(
        &self,
        filter: Filter,
        update: Document,
        options: Option<FindOneAndUpdateOptions>,
    ) -> CollectionResult<Option<Document>> {
        let options = options.unwrap_or_default();

        let mut driver = DriverFindOneAndUpdateOptions::default();
        driver.upsert = options.upsert;
        driver.sort = options.sort;
        driver.return_document = Some(match options.return_document.unwrap_or_default() {
            ReturnDocument::Before => DriverReturnDocument::Before,
            ReturnDocument::After => DriverReturnDocument::After,
        });

        self.collection
            .find_one_and_update(filter.to_document()?, update)
            .with_options(driver)
            .await
            .map_err(|e| self.backend_error(e, None))
    }

    async fn delete_one(&self, filter: Filter) -> CollectionResult<DeleteResult> {
        self.delete_matching(filter, Some(1)).await
    }

    async fn delete_many(&self, filter: Filter) -> CollectionResult<DeleteResult> {
        self.delete_matching(filter, None).await
    }

    async fn count(&self, filter: Filter) -> CollectionResult<u64> {
        self.collection
            .count_documents(filter.to_document()?)
            .await
            .map_err(|e| self.backend_error(e, None))
    }

    async fn create_index(&self, model: IndexModel) -> CollectionResult<String> {
        let result = self
            .collection
            .create_index(index_model(&model))
            .await
            .map_err(|e| self.backend_error(e, None))?;

        debug!(collection = %self.collection.name(), index = %result.index_name, "created index");
        Ok(result.index_name)
    }

    async fn list_indexes(&self) -> CollectionResult<Vec<IndexInfo>> {
        let namespace = self.namespace();

        Ok(self
            .collection
            .list_indexes()
            .await
            .map_err(|e| self.backend_error(e, None))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| self.backend_error(e, None))?
            .into_iter()
            .map(|model| index_info(model, &namespace))
            .collect())
    }

    async fn drop(&self) -> CollectionResult<()> {
        self.collection
            .drop()
            .await
            .map_err(|e| self.backend_error(e, None))
    }
}

/// Connects to a server and opens one collection.
///
/// # Example
///
/// ```ignore
/// use docmock::mongodb::MongoCollection;
///
/// let users = MongoCollection::builder("mongodb://localhost:27017", "app", "users")
///     .build()
///     .await?;
/// ```
pub struct MongoCollectionBuilder {
    dsn: String,
    database: String,
    collection: String,
    type_map: TypeMap,
}

impl MongoCollectionBuilder {
    pub fn new(dsn: &str, database: &str, collection: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
            collection: collection.to_string(),
            type_map: TypeMap::default(),
        }
    }

    pub fn type_map(mut self, type_map: TypeMap) -> Self {
        self.type_map = type_map;
        self
    }

    /// # Errors
    ///
    /// Returns [`CollectionError::Backend`] if the connection string is invalid.
    pub async fn build(self) -> CollectionResult<MongoCollection> {
        let client = Client::with_options(
            ClientOptions::parse(&self.dsn)
                .await
                .map_err(|e| CollectionError::Backend(e.to_string()))?,
        )
        .map_err(|e| CollectionError::Backend(e.to_string()))?;

        Ok(MongoCollection::new(client.database(&self.database).collection(&self.collection))
            .with_type_map(self.type_map))
    }
}
