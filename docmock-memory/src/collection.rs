//! The in-memory collection.
//!
//! [`MockCollection`] keeps an ordered list of documents and implements
//! [`CollectionApi`] over it with the query engine of this crate. Every operation takes
//! the collection lock once and runs to completion while holding it, so an operation
//! never observes another one half done.

use std::{collections::HashSet, sync::Arc};
use async_trait::async_trait;
use bson::{Bson, Document};
use mea::rwlock::RwLock;
use tracing::{debug, warn};

use docmock_core::{
    collection::CollectionApi,
    cursor::Cursor,
    document::{ID_FIELD, ensure_id, identifier_string},
    error::{CollectionError, CollectionResult},
    filter::Filter,
    index::{IndexInfo, IndexModel},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, TypeMap, UpdateOptions},
    results::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult},
};

use crate::{
    compare::strict_eq,
    constraint::{CompilerOptions, OperatorRegistry},
    database::CollectionOptions,
    evaluator::{CompiledQuery, QueryCompiler},
    log::{IndexLog, QueryLog},
    pipeline,
    update::UpdateExpression,
};

#[derive(Debug, Default)]
pub(crate) struct CollectionState {
    pub(crate) documents: Vec<Document>,
    pub(crate) queries: Vec<QueryLog>,
    pub(crate) indexes: Vec<IndexLog>,
    pub(crate) dropped: bool,
}

#[derive(Debug)]
struct CollectionSettings {
    name: String,
    database: Option<String>,
    type_map: TypeMap,
    compiler: CompilerOptions,
}

/// An in-memory stand-in for a database collection.
///
/// `MockCollection` is cheap to clone; clones share the same documents and logs.
///
/// # Example
///
/// ```ignore
/// use docmock::prelude::*;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> CollectionResult<()> {
///     let users = MockCollection::new("users");
///
///     users.insert_one(doc! { "name": "Alice", "age": 30 }).await?;
///     let adult = users.find_one(doc! { "age": { "$gte": 18 } }.into(), None).await?;
///
///     assert!(adult.is_some());
///     assert!(users.has_executed_query(doc! { "age": { "$gte": 18 } }, None).await);
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct MockCollection {
    settings: Arc<CollectionSettings>,
    pub(crate) state: Arc<RwLock<CollectionState>>,
}

impl MockCollection {
    /// Creates an empty collection outside of any database.
    pub fn new(name: impl Into<String>) -> Self {
        MockCollection::builder(name).build()
    }

    pub fn builder(name: impl Into<String>) -> MockCollectionBuilder {
        MockCollectionBuilder::new(name)
    }

    /// Name of the owning database, if the collection belongs to one.
    pub fn database_name(&self) -> Option<&str> {
        self.settings.database.as_deref()
    }

    /// `database.collection`, or the bare collection name outside a database.
    pub fn namespace(&self) -> String {
        match &self.settings.database {
            Some(database) => format!("{database}.{}", self.settings.name),
            None => self.settings.name.clone(),
        }
    }

    /// The collection-level default type map.
    pub fn type_map(&self) -> TypeMap {
        self.settings.type_map
    }

    /// Every `find` and `find_one` call made so far, oldest first.
    pub async fn queries(&self) -> Vec<QueryLog> {
        self.state.read().await.queries.clone()
    }

    /// Every index created so far, in creation order.
    pub async fn indexes(&self) -> Vec<IndexLog> {
        self.state.read().await.indexes.clone()
    }

    /// Returns `true` once `drop` has been called.
    pub async fn is_dropped(&self) -> bool {
        self.state.read().await.dropped
    }

    fn compile(&self, filter: &Filter) -> CollectionResult<CompiledQuery> {
        QueryCompiler::new(&self.settings.compiler).compile(filter)
    }

    fn insert_locked(&self, state: &mut CollectionState, document: Document) -> CollectionResult<Bson> {
        let (id, document) = ensure_id(document);

        let duplicate = state
            .documents
            .iter()
            .filter_map(|existing| existing.get(ID_FIELD))
            .any(|existing| same_identifier(existing, &id));

        if duplicate {
            warn!(collection = %self.settings.name, id = %id, "rejected duplicate key");
            return Err(CollectionError::DuplicateKey(
                identifier_string(&id),
                self.settings.name.clone(),
            ));
        }

        state.documents.push(document);
        Ok(id)
    }

    fn query_locked(
        &self,
        state: &mut CollectionState,
        filter: Filter,
        options: Option<FindOptions>,
    ) -> CollectionResult<(Vec<Document>, TypeMap)> {
        state.queries.push(QueryLog {
            filter: filter.clone(),
            options: options.clone(),
        });

        let query = self.compile(&filter)?;
        let options = options.unwrap_or_default();
        let type_map = self
            .settings
            .type_map
            .merged_with(&options.type_map.unwrap_or_default());

        let matched = query.filter_documents(&state.documents);
        Ok((pipeline::apply(matched, &options), type_map))
    }

    fn update_locked(
        &self,
        state: &mut CollectionState,
        filter: Filter,
        update: Document,
        upsert: bool,
        multi: bool,
    ) -> CollectionResult<UpdateResult> {
        let expression = UpdateExpression::parse(&update)?;
        let query = self.compile(&filter)?;

        let mut targets = matching_positions(&query, &state.documents);
        if !multi {
            targets.truncate(1);
        }

        if targets.is_empty() {
            if !upsert {
                return Ok(UpdateResult::default());
            }

            let document = expression.upsert_document(&filter)?;
            let id = self.insert_locked(state, document)?;
            debug!(collection = %self.settings.name, id = %id, "upserted document");

            return Ok(UpdateResult {
                upserted_ids: vec![id],
                ..UpdateResult::default()
            });
        }

        // Staged on copies so a failure part way through leaves every document untouched.
        let mut staged = Vec::with_capacity(targets.len());
        for position in &targets {
            let mut document = state.documents[*position].clone();
            if expression.apply(&mut document)? {
                staged.push((*position, document));
            }
        }

        let modified_count = staged.len() as u64;
        for (position, document) in staged {
            state.documents[position] = document;
        }

        Ok(UpdateResult {
            matched_count: targets.len() as u64,
            modified_count,
            upserted_ids: Vec::new(),
        })
    }

    fn delete_locked(&self, state: &mut CollectionState, filter: Filter, multi: bool) -> CollectionResult<DeleteResult> {
        let query = self.compile(&filter)?;

        let mut targets = matching_positions(&query, &state.documents);
        if !multi {
            targets.truncate(1);
        }

        let removed = targets.iter().copied().collect::<HashSet<_>>();
        let deleted_ids = targets
            .iter()
            .filter_map(|position| state.documents[*position].get(ID_FIELD).cloned())
            .collect::<Vec<_>>();

        let mut position = 0;
        state.documents.retain(|_| {
            let keep = !removed.contains(&position);
            position += 1;
            keep
        });

        Ok(DeleteResult {
            matched_count: targets.len() as u64,
            deleted_ids,
        })
    }
}

fn matching_positions(query: &CompiledQuery, documents: &[Document]) -> Vec<usize> {
    documents
        .iter()
        .enumerate()
        .filter(|(_, document)| query.matches(document))
        .map(|(position, _)| position)
        .collect()
}

/// Identifier equality: an `ObjectId` and its hex string are the same identifier, every
/// other kind compares strictly.
fn same_identifier(left: &Bson, right: &Bson) -> bool {
    match (left, right) {
        (Bson::ObjectId(_) | Bson::String(_), Bson::ObjectId(_) | Bson::String(_)) => {
            identifier_string(left) == identifier_string(right)
        }
        _ => strict_eq(left, right),
    }
}

#[async_trait]
impl CollectionApi for MockCollection {
    fn name(&self) -> &str {
        &self.settings.name
    }

    async fn insert_one(&self, document: Document) -> CollectionResult<InsertOneResult> {
        let mut state = self.state.write().await;
        let inserted_id = self.insert_locked(&mut state, document)?;

        debug!(collection = %self.settings.name, id = %inserted_id, "inserted document");
        Ok(InsertOneResult { inserted_id })
    }

    async fn insert_many(&self, documents: Vec<Document>) -> CollectionResult<InsertManyResult> {
        let mut state = self.state.write().await;
        let mut inserted_ids = Vec::with_capacity(documents.len());

        for document in documents {
            inserted_ids.push(self.insert_locked(&mut state, document)?);
        }

        debug!(collection = %self.settings.name, count = inserted_ids.len(), "inserted documents");
        Ok(InsertManyResult { inserted_ids })
    }

    async fn find(&self, filter: Filter, options: Option<FindOptions>) -> CollectionResult<Cursor> {
        let mut state = self.state.write().await;
        let (documents, type_map) = self.query_locked(&mut state, filter, options)?;

        debug!(collection = %self.settings.name, returned = documents.len(), "find");
        Ok(Cursor::new(documents, type_map))
    }

    async fn find_one(
        &self,
        filter: Filter,
        options: Option<FindOptions>,
    ) -> CollectionResult<Option<Document>> {
        let mut state = self.state.write().await;
        let (documents, _) = self.query_locked(&mut state, filter, options)?;

        debug!(collection = %self.settings.name, found = !documents.is_empty(), "find_one");
        Ok(documents.into_iter().next())
    }

    async fn update_one(
        &self,
        filter: Filter,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> CollectionResult<UpdateResult> {
        let upsert = options.is_some_and(|options| options.is_upsert());
        let mut state = self.state.write().await;
        let result = self.update_locked(&mut state, filter, update, upsert, false)?;

        debug!(collection = %self.settings.name, ?result, "update_one");
        Ok(result)
    }

    async fn update_many(
        &self,
        filter: Filter,
        update: Document,
        options: Option<UpdateOptions>,
    ) -> CollectionResult<UpdateResult> {
        let upsert = options.is_some_and(|options| options.is_upsert());
        let mut state = self.state.write().await;
        let result = self.update_locked(&mut state, filter, update, upsert, true)?;

        debug!(collection = %self.settings.name, ?result, "update_many");
        Ok(result)
    }

    async fn find_one_and_update(
        &self,
        filter: Filter,
        update: Document,
        options: Option<FindOneAndUpdateOptions>,
    ) -> CollectionResult<Option<Document>> {
        let options = options.unwrap_or_default();
        let expression = UpdateExpression::parse(&update)?;
        let query = self.compile(&filter)?;

        let mut state = self.state.write().await;
        let mut candidates = matching_positions(&query, &state.documents)
            .into_iter()
            .map(|position| (position, state.documents[position].clone()))
            .collect::<Vec<_>>();

        if let Some(spec) = &options.sort {
            pipeline::sort_by(&mut candidates, spec, |(_, document)| document);
        }

        let return_after = options.return_document == Some(ReturnDocument::After);

        let Some((position, before)) = candidates.into_iter().next() else {
            if !options.is_upsert() {
                return Ok(None);
            }

            let document = expression.upsert_document(&filter)?;
            let id = self.insert_locked(&mut state, document)?;
            debug!(collection = %self.settings.name, id = %id, "upserted document");

            return Ok(match return_after {
                true => state.documents.last().cloned(),
                false => None,
            });
        };

        let document = &mut state.documents[position];
        expression.apply(document)?;

        debug!(collection = %self.settings.name, position, "find_one_and_update");
        Ok(Some(if return_after { document.clone() } else { before }))
    }

    async fn delete_one(&self, filter: Filter) -> CollectionResult<DeleteResult> {
        let mut state = self.state.write().await;
        let result = self.delete_locked(&mut state, filter, false)?;

        debug!(collection = %self.settings.name, deleted = result.deleted_count(), "delete_one");
        Ok(result)
    }

    async fn delete_many(&self, filter: Filter) -> CollectionResult<DeleteResult> {
        let mut state = self.state.write().await;
        let result = self.delete_locked(&mut state, filter, true)?;

        debug!(collection = %self.settings.name, deleted = result.deleted_count(), "delete_many");
        Ok(result)
    }

    async fn count(&self, filter: Filter) -> CollectionResult<u64> {
        let query = self.compile(&filter)?;
        let state = self.state.read().await;

        Ok(state
            .documents
            .iter()
            .filter(|document| query.matches(document))
            .count() as u64)
    }

    async fn create_index(&self, model: IndexModel) -> CollectionResult<String> {
        let name = model.name();
        let entry = IndexLog {
            name: name.clone(),
            keys: model.keys,
            options: model.options,
        };

        let mut state = self.state.write().await;
        match state.indexes.iter_mut().find(|index| index.name == name) {
            Some(existing) => *existing = entry,
            None => state.indexes.push(entry),
        }

        debug!(collection = %self.settings.name, index = %name, "created index");
        Ok(name)
    }

    async fn list_indexes(&self) -> CollectionResult<Vec<IndexInfo>> {
        let namespace = self.namespace();
        let state = self.state.read().await;

        Ok(state
            .indexes
            .iter()
            .map(|index| IndexInfo {
                v: 1,
                key: index.keys.clone(),
                name: index.name.clone(),
                unique: index.options.unique.unwrap_or(false),
                ns: namespace.clone(),
            })
            .collect())
    }

    async fn drop(&self) -> CollectionResult<()> {
        let mut state = self.state.write().await;
        state.documents.clear();
        state.dropped = true;

        debug!(collection = %self.settings.name, "dropped collection");
        Ok(())
    }
}

/// Builder for [`MockCollection`].
///
/// # Example
///
/// ```ignore
/// use docmock::memory::MockCollection;
/// use docmock::options::TypeMap;
///
/// let collection = MockCollection::builder("robots")
///     .database("factory")
///     .type_map(TypeMap::json())
///     .in_operand_patterns(false)
///     .operator("$even", |value, _| matches!(value, Some(bson::Bson::Int32(n)) if n % 2 == 0))
///     .build();
/// ```
#[derive(Debug)]
pub struct MockCollectionBuilder {
    name: String,
    database: Option<String>,
    type_map: TypeMap,
    compiler: CompilerOptions,
}

impl MockCollectionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        MockCollectionBuilder {
            name: name.into(),
            database: None,
            type_map: TypeMap::default(),
            compiler: CompilerOptions::default(),
        }
    }

    /// Name of the owning database, used for the namespace.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Default type map of query results.
    pub fn type_map(mut self, type_map: TypeMap) -> Self {
        self.type_map = type_map;
        self
    }

    /// Whether `$in` string operands written as `/pattern/flags` match as regular
    /// expressions. Enabled by default.
    pub fn in_operand_patterns(mut self, enabled: bool) -> Self {
        self.compiler.in_operand_patterns = enabled;
        self
    }

    /// Registers a custom constraint operator. `name` includes the leading `$`.
    pub fn operator<F>(mut self, name: impl Into<String>, operator: F) -> Self
    where
        F: Fn(Option<&Bson>, &Bson) -> bool + Send + Sync + 'static,
    {
        self.compiler.operators.insert(name, Arc::new(operator));
        self
    }

    pub(crate) fn operators(mut self, operators: &OperatorRegistry) -> Self {
        self.compiler.operators.extend_from(operators);
        self
    }

    /// Applies the overrides set in `options`.
    pub fn options(mut self, options: &CollectionOptions) -> Self {
        if let Some(type_map) = &options.type_map {
            self.type_map = self.type_map.merged_with(type_map);
        }
        if let Some(enabled) = options.in_operand_patterns {
            self.compiler.in_operand_patterns = enabled;
        }
        self
    }

    pub fn build(self) -> MockCollection {
        MockCollection {
            settings: Arc::new(CollectionSettings {
                name: self.name,
                database: self.database,
                type_map: self.type_map,
                compiler: self.compiler,
            }),
            state: Arc::new(RwLock::new(CollectionState::default())),
        }
    }
}

impl Default for MockCollectionBuilder {
    fn default() -> Self {
        MockCollectionBuilder::new("collection")
    }
}
