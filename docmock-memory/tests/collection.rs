use bson::{Bson, Document, doc, oid::ObjectId};
use rstest::rstest;
use serde::{Deserialize, Serialize};
use serde_json::json;

use docmock_core::{
    collection::{CollectionApi, CollectionExt},
    cursor::Materialized,
    error::CollectionError,
    filter::Filter,
    index::{IndexKeys, IndexModel, IndexOptions},
    options::{FindOneAndUpdateOptions, FindOptions, ReturnDocument, Shape, TypeMap, UpdateOptions},
};
use docmock_memory::{
    MockCollection, MockDatabase,
    assert::{any_value, equal_to},
};

async fn seeded(documents: Vec<Document>) -> MockCollection {
    let collection = MockCollection::new("test");
    collection.insert_many(documents).await.unwrap();
    collection
}

fn field_values(documents: &[Document], field: &str) -> Vec<Bson> {
    documents
        .iter()
        .filter_map(|document| document.get(field).cloned())
        .collect()
}

#[tokio::test]
async fn test_generated_id_round_trips() {
    let collection = MockCollection::new("test");
    let original = doc! { "name": "Alice", "tags": ["a", "b"] };

    let result = collection.insert_one(original.clone()).await.unwrap();
    let found = collection
        .find_one(doc! { "_id": result.inserted_id.clone() }.into(), None)
        .await
        .unwrap()
        .unwrap();

    let mut expected = doc! { "_id": result.inserted_id };
    expected.extend(original);
    assert_eq!(found, expected);
}

#[tokio::test]
async fn test_duplicate_insert_leaves_count_unchanged() {
    let collection = MockCollection::new("test");
    collection.insert_one(doc! { "_id": 1, "a": 1 }).await.unwrap();

    let result = collection.insert_one(doc! { "_id": 1, "a": 2 }).await;

    assert_eq!(
        result,
        Err(CollectionError::DuplicateKey("1".into(), "test".into()))
    );
    assert_eq!(collection.count(Filter::new()).await.unwrap(), 1);
    assert_eq!(collection.all().await.unwrap(), vec![doc! { "_id": 1, "a": 1 }]);
}

#[tokio::test]
async fn test_insert_many_keeps_documents_before_a_duplicate() {
    let collection = MockCollection::new("test");

    let result = collection
        .insert_many(vec![
            doc! { "_id": 1 },
            doc! { "_id": 2 },
            doc! { "_id": 1 },
            doc! { "_id": 3 },
        ])
        .await;

    assert!(matches!(result, Err(CollectionError::DuplicateKey(_, _))));
    assert_eq!(
        field_values(&collection.all().await.unwrap(), "_id"),
        vec![Bson::Int32(1), Bson::Int32(2)]
    );
}

#[rstest]
#[case(doc! {})]
#[case(doc! { "bar": { "$gt": 1 } })]
#[case(doc! { "foo": { "$in": ["bar", "/^q/"] } })]
#[case(doc! { "tags": "x" })]
#[case(doc! { "$or": [{ "bar": 1 }, { "tags": { "$size": 0 } }] })]
#[case(doc! { "missing": null })]
#[tokio::test]
async fn test_count_equals_find_length(#[case] filter: Document) {
    let collection = seeded(vec![
        doc! { "foo": "bar", "bar": 1, "tags": ["x", "y"] },
        doc! { "foo": "qux", "bar": 2, "tags": [] },
        doc! { "foo": "baz", "bar": 3 },
    ])
    .await;

    let count = collection.count(filter.clone().into()).await.unwrap();
    let found = collection.find(filter.into(), None).await.unwrap().to_vec();

    assert_eq!(count, found.len() as u64);
}

#[tokio::test]
async fn test_exists_partitions_documents() {
    let collection = seeded(vec![
        doc! { "_id": 1, "foo": 1 },
        doc! { "_id": 2, "foo": null },
        doc! { "_id": 3 },
        doc! { "_id": 4, "foo": { "bar": 1 } },
    ])
    .await;

    let present = collection
        .find(doc! { "foo": { "$exists": true } }.into(), None)
        .await
        .unwrap()
        .to_vec();
    let absent = collection
        .find(doc! { "foo": { "$exists": false } }.into(), None)
        .await
        .unwrap()
        .to_vec();

    assert_eq!(
        field_values(&present, "_id"),
        vec![Bson::Int32(1), Bson::Int32(2), Bson::Int32(4)]
    );
    assert_eq!(field_values(&absent, "_id"), vec![Bson::Int32(3)]);
}

#[tokio::test]
async fn test_set_then_unset_removes_the_field() {
    let collection = seeded(vec![doc! { "_id": 1, "foo": "bar" }]).await;

    collection
        .update_one(doc! { "_id": 1 }.into(), doc! { "$set": { "baz": { "a": [1, 2] } } }, None)
        .await
        .unwrap();
    collection
        .update_one(doc! { "_id": 1 }.into(), doc! { "$unset": { "baz": "" } }, None)
        .await
        .unwrap();

    assert_eq!(collection.all().await.unwrap(), vec![doc! { "_id": 1, "foo": "bar" }]);
}

#[rstest]
#[case(1, vec![1, 2, 3])]
#[case(-1, vec![3, 2, 1])]
#[tokio::test]
async fn test_sort(#[case] direction: i32, #[case] expected: Vec<i32>) {
    let collection = seeded(vec![doc! { "bar": 3 }, doc! { "bar": 1 }, doc! { "bar": 2 }]).await;
    let options = FindOptions::builder().sort(doc! { "bar": direction }).build();

    let bars = collection
        .find(Filter::new(), Some(options))
        .await
        .unwrap()
        .filter_map(|document| document.get_i32("bar").ok())
        .collect::<Vec<_>>();

    assert_eq!(bars, expected);
}

#[tokio::test]
async fn test_skip_after_sort_and_zero_limit() {
    let collection = seeded((1..=5).rev().map(|n| doc! { "n": n }).collect()).await;
    let options = FindOptions::builder().sort(doc! { "n": 1 }).skip(1).limit(0).build();

    let found = collection.find(Filter::new(), Some(options)).await.unwrap().to_vec();

    assert_eq!(
        field_values(&found, "n"),
        vec![Bson::Int32(2), Bson::Int32(3), Bson::Int32(4), Bson::Int32(5)]
    );
}

#[tokio::test]
async fn test_upsert_is_not_idempotent_across_calls() {
    let collection = MockCollection::new("test");

    for name in ["first", "second"] {
        let result = collection
            .update_many(
                doc! { "name": name, "age": { "$gt": 100 } }.into(),
                doc! { "$set": { "x": 1 } },
                Some(UpdateOptions::upsert()),
            )
            .await
            .unwrap();

        assert_eq!(result.matched_count, 0);
        assert_eq!(result.upserted_count(), 1);
    }

    let documents = collection.find(doc! { "x": 1 }.into(), None).await.unwrap().to_vec();
    assert_eq!(documents.len(), 2);
    assert_ne!(documents[0].get("_id"), documents[1].get("_id"));
    assert_eq!(
        field_values(&documents, "name"),
        vec![Bson::String("first".into()), Bson::String("second".into())]
    );
    assert!(documents.iter().all(|document| !document.contains_key("age")));
}

#[tokio::test]
async fn test_upsert_conflict_leaves_store_untouched() {
    let collection = MockCollection::new("test");

    let result = collection
        .update_one(
            doc! { "foo": "bar" }.into(),
            doc! { "$set": { "a": 1, "b": 1 }, "$setOnInsert": { "a": 2, "b": 2 } },
            Some(UpdateOptions::upsert()),
        )
        .await;

    assert_eq!(
        result,
        Err(CollectionError::ConflictingUpsertFields(vec!["a".into(), "b".into()]))
    );
    assert_eq!(collection.count(Filter::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_literal_update_is_inserted_on_upsert_and_rejected_otherwise() {
    let collection = MockCollection::new("test");

    collection
        .update_one(doc! { "foo": "bar" }.into(), doc! { "foo": "baz", "n": 1 }, Some(UpdateOptions::upsert()))
        .await
        .unwrap();

    let stored = collection.find_one(doc! { "foo": "baz" }.into(), None).await.unwrap().unwrap();
    assert_eq!(stored.get_i32("n").unwrap(), 1);

    let result = collection
        .update_one(doc! { "foo": "baz" }.into(), doc! { "foo": "qux", "n": 2 }, None)
        .await;

    assert_eq!(
        result.unwrap_err().to_string(),
        "Unsupported update operators found: foo, n"
    );
}

#[tokio::test]
async fn test_update_counts_only_real_modifications() {
    let collection = seeded(vec![
        doc! { "_id": 1, "status": "active" },
        doc! { "_id": 2, "status": "inactive" },
    ])
    .await;

    let result = collection
        .update_many(Filter::new(), doc! { "$set": { "status": "active" } }, None)
        .await
        .unwrap();

    assert_eq!(result.matched_count, 2);
    assert_eq!(result.modified_count, 1);
}

#[tokio::test]
async fn test_failed_update_many_leaves_every_document_untouched() {
    let documents = vec![
        doc! { "_id": 1, "size": { "h": 14 } },
        doc! { "_id": 2, "size": 10 },
        doc! { "_id": 3, "size": { "h": 8 } },
    ];
    let collection = seeded(documents.clone()).await;

    let result = collection
        .update_many(Filter::new(), doc! { "$set": { "size.uom": "cm", "checked": true } }, None)
        .await;

    assert!(matches!(result, Err(CollectionError::InvalidUpdate(_))));
    assert_eq!(collection.all().await.unwrap(), documents);
}

#[tokio::test]
async fn test_set_rejects_far_array_indexes() {
    let collection = seeded(vec![doc! { "_id": 1, "arr": [1] }]).await;

    let result = collection
        .update_one(doc! { "_id": 1 }.into(), doc! { "$set": { "arr.50000000": 1 } }, None)
        .await;

    assert!(matches!(result, Err(CollectionError::InvalidUpdate(_))));
    assert_eq!(collection.all().await.unwrap(), vec![doc! { "_id": 1, "arr": [1] }]);
}

#[tokio::test]
async fn test_inc_and_push() {
    let collection = seeded(vec![doc! { "_id": 1, "n": 1, "tags": ["a"], "label": "x" }]).await;

    collection
        .update_one(
            doc! { "_id": 1 }.into(),
            doc! {
                "$inc": { "n": 2, "fresh": 5, "label": 1 },
                "$push": { "tags": "b", "missing": "c" },
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(
        collection.all().await.unwrap(),
        vec![doc! { "_id": 1, "n": 3, "tags": ["a", "b"], "label": "x", "fresh": 5 }]
    );
}

#[tokio::test]
async fn test_nor_matches_only_the_first_document() {
    let collection = seeded(vec![
        doc! { "foo": "foo", "bar": 3 },
        doc! { "foo": "bar", "bar": 1 },
        doc! { "foo": "baz", "bar": 2 },
    ])
    .await;

    let filter = doc! {
        "$nor": [
            { "foo": { "$eq": "bar" } },
            { "foo": { "$eq": "baz" } },
            { "bar": { "$lt": 3 } },
        ]
    };
    let found = collection.find(filter.into(), None).await.unwrap().to_vec();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get_str("foo").unwrap(), "foo");
}

#[tokio::test]
async fn test_elem_match_on_array_of_documents() {
    let collection = seeded(vec![
        doc! { "_id": 1, "bar": [{ "foobar": 1 }, { "foobar": 2 }] },
        doc! { "_id": 2, "bar": [{ "foobar": 4 }] },
    ])
    .await;

    let found = collection
        .find(doc! { "bar": { "$elemMatch": { "foobar": { "$in": [1, 3] } } } }.into(), None)
        .await
        .unwrap()
        .to_vec();

    assert_eq!(field_values(&found, "_id"), vec![Bson::Int32(1)]);
}

#[rstest]
#[case(doc! { "$or": [{ "foobar": 1 }, { "foobar": 3 }] }, vec![1])]
#[case(doc! { "$and": [{ "foobar": { "$gte": 2 } }, { "foobar": { "$lt": 5 } }] }, vec![1, 2])]
#[tokio::test]
async fn test_elem_match_with_logical_operators(#[case] operand: Document, #[case] expected: Vec<i32>) {
    let collection = seeded(vec![
        doc! { "_id": 1, "bar": [{ "foobar": 1 }, { "foobar": 2 }] },
        doc! { "_id": 2, "bar": [{ "foobar": 4 }] },
        doc! { "_id": 3, "bar": [{ "foobar": 7 }] },
    ])
    .await;

    let found = collection
        .find(doc! { "bar": { "$elemMatch": operand } }.into(), None)
        .await
        .unwrap()
        .to_vec();

    assert_eq!(
        field_values(&found, "_id"),
        expected.into_iter().map(Bson::Int32).collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_returned_documents_are_independent_copies() {
    let collection = seeded(vec![doc! { "_id": 1, "foo": "bar" }]).await;

    let mut first = collection.find_one(doc! { "_id": 1 }.into(), None).await.unwrap().unwrap();
    first.insert("foo", "changed");
    let second = collection.find_one(doc! { "_id": 1 }.into(), None).await.unwrap().unwrap();

    assert_eq!(second, doc! { "_id": 1, "foo": "bar" });
}

#[tokio::test]
async fn test_cursor_is_a_snapshot() {
    let collection = seeded(vec![doc! { "_id": 1 }]).await;

    let cursor = collection.find(Filter::new(), None).await.unwrap();
    collection.insert_one(doc! { "_id": 2 }).await.unwrap();

    assert_eq!(cursor.len(), 1);
}

#[tokio::test]
async fn test_filter_with_predicate_and_matcher() {
    let collection = seeded(vec![
        doc! { "name": "Al", "age": 30 },
        doc! { "name": "Alice", "age": 30 },
        doc! { "name": "Bob", "age": 20 },
    ])
    .await;

    let filter = Filter::new()
        .predicate("name", |value| {
            value.and_then(Bson::as_str).is_some_and(|name| name.len() > 2)
        })
        .matcher("age", equal_to(30.0));

    let found = collection.find(filter, None).await.unwrap().to_vec();

    assert_eq!(field_values(&found, "name"), vec![Bson::String("Alice".into())]);
}

#[tokio::test]
async fn test_custom_operator_from_database() {
    let database = MockDatabase::builder("app")
        .operator("$divisibleBy", |value, operand| {
            match (value.and_then(Bson::as_i32), operand.as_i32()) {
                (Some(value), Some(divisor)) if divisor != 0 => value % divisor == 0,
                _ => false,
            }
        })
        .build();
    let numbers = database.collection("numbers").await;
    numbers
        .insert_many((1..=6).map(|n| doc! { "n": n }).collect())
        .await
        .unwrap();

    let count = numbers
        .count(doc! { "n": { "$divisibleBy": 3 } }.into())
        .await
        .unwrap();

    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_find_one_and_update_return_documents() {
    let collection = seeded(vec![
        doc! { "_id": 1, "n": 5, "group": "a" },
        doc! { "_id": 2, "n": 1, "group": "a" },
    ])
    .await;

    let before = collection
        .find_one_and_update(
            doc! { "group": "a" }.into(),
            doc! { "$inc": { "n": 1 } },
            Some(FindOneAndUpdateOptions::builder().sort(doc! { "n": 1 }).build()),
        )
        .await
        .unwrap();
    assert_eq!(before, Some(doc! { "_id": 2, "n": 1, "group": "a" }));

    let after = collection
        .find_one_and_update(
            doc! { "_id": 1 }.into(),
            doc! { "$set": { "n": 10 } },
            Some(FindOneAndUpdateOptions::builder().return_document(ReturnDocument::After).build()),
        )
        .await
        .unwrap();
    assert_eq!(after, Some(doc! { "_id": 1, "n": 10, "group": "a" }));
}

#[rstest]
#[case(ReturnDocument::Before, false)]
#[case(ReturnDocument::After, true)]
#[tokio::test]
async fn test_find_one_and_update_upsert(#[case] return_document: ReturnDocument, #[case] returned: bool) {
    let collection = MockCollection::new("test");
    let options = FindOneAndUpdateOptions::builder()
        .upsert(true)
        .return_document(return_document)
        .build();

    let result = collection
        .find_one_and_update(doc! { "name": "new" }.into(), doc! { "$set": { "n": 1 } }, Some(options))
        .await
        .unwrap();

    assert_eq!(result.is_some(), returned);
    if let Some(document) = result {
        assert_eq!(document.get_str("name").unwrap(), "new");
        assert_eq!(document.get_i32("n").unwrap(), 1);
    }
    assert_eq!(collection.count(Filter::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_delete_one_and_many() {
    let collection = seeded(vec![
        doc! { "_id": 1, "kind": "a" },
        doc! { "_id": 2, "kind": "b" },
        doc! { "_id": 3, "kind": "a" },
        doc! { "_id": 4, "kind": "a" },
    ])
    .await;

    let one = collection.delete_one(doc! { "kind": "a" }.into()).await.unwrap();
    assert_eq!(one.matched_count, 1);
    assert_eq!(one.deleted_ids, vec![Bson::Int32(1)]);

    let many = collection.delete_many(doc! { "kind": "a" }.into()).await.unwrap();
    assert_eq!(many.deleted_count(), 2);
    assert_eq!(
        field_values(&collection.all().await.unwrap(), "_id"),
        vec![Bson::Int32(2)]
    );
}

#[tokio::test]
async fn test_malformed_filters_are_reported() {
    let collection = seeded(vec![doc! { "foo": 1 }]).await;

    let empty_or = collection.count(doc! { "$or": [] }.into()).await;
    let unknown = collection.count(doc! { "foo": { "$near": 1 } }.into()).await;
    let bad_regex = collection.count(doc! { "foo": { "$regex": "(" } }.into()).await;

    assert_eq!(empty_or, Err(CollectionError::MalformedLogicalFilter("$or".into())));
    assert_eq!(unknown, Err(CollectionError::UnsupportedOperator("$near".into())));
    assert!(matches!(bad_regex, Err(CollectionError::InvalidPattern { .. })));
}

#[tokio::test]
async fn test_indexes() {
    let database = MockDatabase::new("app");
    let collection = database.collection("users").await;

    let names = collection
        .create_indexes(vec![
            IndexModel::new("email").with_options(IndexOptions::unique()),
            IndexModel::new(doc! { "last": 1, "first": -1 }),
        ])
        .await
        .unwrap();
    assert_eq!(names, vec!["email_1".to_string(), "last_1_first_1".to_string()]);

    let indexes = collection.list_indexes().await.unwrap();
    assert_eq!(indexes.len(), 2);
    assert_eq!(indexes[0].key, IndexKeys::from("email"));
    assert!(indexes[0].unique);
    assert!(!indexes[1].unique);
    assert!(indexes.iter().all(|index| index.v == 1 && index.ns == "app.users"));

    assert!(collection.has_index(doc! { "email": 1 }, IndexOptions::unique()).await);
    assert!(!collection.has_index("first", IndexOptions::default()).await);
}

#[tokio::test]
async fn test_query_log_records_find_calls_in_order() {
    let collection = MockCollection::new("test");
    let options = FindOptions::builder().limit(5).build();

    collection.find(doc! { "a": 1, "b": "x" }.into(), None).await.unwrap();
    collection
        .find_one(doc! { "c": { "$gt": 2 } }.into(), Some(options.clone()))
        .await
        .unwrap();
    collection.count(doc! { "d": 1 }.into()).await.unwrap();

    let queries = collection.queries().await;
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[1].options, Some(options.clone()));

    assert!(collection.has_executed_query(doc! { "b": "x", "a": 1 }, None).await);
    assert!(
        collection
            .has_executed_query(Filter::new().matcher("c", any_value()), Some(options))
            .await
    );
    assert!(!collection.has_executed_query(doc! { "d": 1 }, None).await);
}

#[tokio::test]
async fn test_failed_query_is_still_logged() {
    let collection = MockCollection::new("test");

    let result = collection.find(doc! { "$where": "true" }.into(), None).await;

    assert!(result.is_err());
    assert!(collection.has_executed_query(doc! { "$where": "true" }, None).await);
}

#[tokio::test]
async fn test_type_map_materializes_json() {
    let collection = MockCollection::builder("test").type_map(TypeMap::json()).build();
    collection
        .insert_one(doc! { "_id": 1, "foo": [[1, 2], 3], "bar": { "baz": "qux" } })
        .await
        .unwrap();

    let json_results = collection.find(Filter::new(), None).await.unwrap().materialize().unwrap();
    assert_eq!(
        json_results,
        vec![Materialized::Json(json!({ "_id": 1, "foo": [[1, 2], 3], "bar": { "baz": "qux" } }))]
    );

    let options = FindOptions::builder().type_map(TypeMap::new().root(Shape::Bson)).build();
    let bson_results = collection.find(Filter::new(), Some(options)).await.unwrap().materialize().unwrap();
    assert!(bson_results[0].as_bson().is_some());
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Robot {
    name: String,
    height: i32,
}

#[tokio::test]
async fn test_typed_documents() {
    let collection = MockCollection::new("robots");

    collection
        .insert_serialized(&Robot { name: "R2-D2".into(), height: 96 })
        .await
        .unwrap();
    collection
        .insert_serialized(&Robot { name: "C-3PO".into(), height: 167 })
        .await
        .unwrap();

    let options = FindOptions::builder().sort(doc! { "height": -1 }).build();
    let robots = collection.find_as::<Robot>(Filter::new(), Some(options)).await.unwrap();

    assert_eq!(
        robots,
        vec![
            Robot { name: "C-3PO".into(), height: 167 },
            Robot { name: "R2-D2".into(), height: 96 },
        ]
    );
}

#[tokio::test]
async fn test_object_id_filters_match_hex_strings() {
    let id = ObjectId::new();
    let collection = seeded(vec![doc! { "_id": id, "n": 1 }]).await;

    let found = collection
        .find_one(doc! { "_id": id.to_hex() }.into(), None)
        .await
        .unwrap();

    assert!(found.is_some());
}

#[tokio::test]
async fn test_drop_clears_documents() {
    let collection = seeded(vec![doc! { "a": 1 }]).await;
    collection.create_index(IndexModel::new("a")).await.unwrap();

    collection.drop().await.unwrap();

    assert!(collection.is_dropped().await);
    assert_eq!(collection.count(Filter::new()).await.unwrap(), 0);
    assert_eq!(collection.list_indexes().await.unwrap().len(), 1);
}
