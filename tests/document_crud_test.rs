use serde_json::{json, Value};
use std::sync::Arc;
use weftdb::engine::nosql::{DocumentStore, Filter, NoSqlEngine};
use weftdb::engine::{
    parse_relations, CrudFilter, CrudOperations, DocumentCrud, MemoryCache, Row, Scalar, Sort, TableOptions, Weaver,
};

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn store(dir: &tempfile::TempDir) -> Arc<dyn DocumentStore> {
    Arc::new(NoSqlEngine::open_or_create(&dir.path().join("docs")).unwrap())
}

async fn seeded_users(store: &Arc<dyn DocumentStore>) -> DocumentCrud {
    let users = DocumentCrud::new(store.clone(), TableOptions::new("user"));
    users
        .insert_many(vec![
            row(json!({"_id": 1, "name": "ann", "age": 31})),
            row(json!({"_id": 2, "name": "bob", "age": 25})),
            row(json!({"_id": 3, "name": "cid", "age": 40, "banned": true})),
        ])
        .await
        .unwrap();
    users
}

fn names(rows: &[Row]) -> Vec<&str> {
    rows.iter().map(|r| r["name"].as_str().unwrap()).collect()
}

#[tokio::test]
async fn test_insert_assigns_ids_in_input_order() {
    let dir = tempfile::tempdir().unwrap();
    let users = DocumentCrud::new(store(&dir), TableOptions::new("user").with_stamping(true));

    let rows = users
        .insert_many(vec![row(json!({"name": "ann"})), row(json!({"_id": "fixed", "name": "bob"}))])
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], json!("ann"));
    assert!(rows[0]["_id"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(rows[1]["_id"], json!("fixed"));
    assert!(rows[1]["created_at"].is_string());

    let duplicate = users.insert(row(json!({"_id": "fixed", "name": "eve"}))).await;
    assert!(duplicate.is_err());
    assert_eq!(users.count(&CrudFilter::new()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_filters_sort_and_paging() {
    let dir = tempfile::tempdir().unwrap();
    let users = seeded_users(&store(&dir)).await;

    let filter = CrudFilter::new().include("_id", vec![1, 2, 3]).exclude("_id", vec![2]);
    let rows = users.select(&filter, &[Sort::desc("age")], &[]).await.unwrap();
    assert_eq!(names(&rows), vec!["cid", "ann"]);

    let not_banned: CrudFilter = serde_json::from_value(json!({"include": {"banned": null}})).unwrap();
    assert_eq!(users.count(&not_banned).await.unwrap(), 2);

    let paged = CrudFilter::new().offset(1).limit(1);
    let rows = users.select(&paged, &[Sort::asc("age")], &[]).await.unwrap();
    assert_eq!(names(&rows), vec!["ann"]);

    let unsatisfiable = CrudFilter::new().include("_id", Vec::<i64>::new());
    assert!(users.select(&unsatisfiable, &[], &[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_id_range_is_numeric() {
    let dir = tempfile::tempdir().unwrap();
    let items = DocumentCrud::new(store(&dir), TableOptions::new("item"));
    items
        .insert_many(vec![
            row(json!({"_id": 3, "name": "three"})),
            row(json!({"_id": 10, "name": "ten"})),
            row(json!({"_id": 20, "name": "twenty"})),
        ])
        .await
        .unwrap();

    assert_eq!(items.count(&CrudFilter::new().min(3).max(25)).await.unwrap(), 3);
    assert_eq!(items.count(&CrudFilter::new().min(10)).await.unwrap(), 2);
    assert_eq!(items.count(&CrudFilter::new().max(10)).await.unwrap(), 1);

    let rows = items.select(&CrudFilter::new(), &[Sort::asc("_id")], &[]).await.unwrap();
    assert_eq!(names(&rows), vec!["three", "ten", "twenty"]);
}

#[tokio::test]
async fn test_custom_condition_is_appended() {
    let dir = tempfile::tempdir().unwrap();
    let users = seeded_users(&store(&dir)).await;

    let filter = CrudFilter::new()
        .exclude("_id", 1)
        .custom_condition(Filter::contains("name", "i"));
    let rows = users.select(&filter, &[], &[]).await.unwrap();
    assert_eq!(names(&rows), vec!["cid"]);
}

#[tokio::test]
async fn test_update_and_delete_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let users = seeded_users(&store(&dir)).await;

    assert_eq!(users.update_by_id(Scalar::Int(2), row(json!({"age": 26}))).await.unwrap(), 1);
    let bob = users.select_by_id(Scalar::Int(2), &[]).await.unwrap().unwrap();
    assert_eq!(bob["age"], json!(26));
    assert_eq!(bob["name"], json!("bob"));

    let everyone = CrudFilter::new();
    assert_eq!(users.update(&everyone, row(json!({"active": true}))).await.unwrap(), 3);

    assert_eq!(users.delete_by_id(Scalar::parse("3")).await.unwrap(), 1);
    assert!(!users.exist(&CrudFilter::new().include("_id", 3)).await.unwrap());
    assert_eq!(users.count(&everyone).await.unwrap(), 2);
}

#[tokio::test]
async fn test_missing_collection_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let ghosts = DocumentCrud::new(store(&dir), TableOptions::new("ghost"));

    assert!(ghosts.select(&CrudFilter::new(), &[], &[]).await.unwrap().is_empty());
    assert_eq!(ghosts.count(&CrudFilter::new()).await.unwrap(), 0);
    assert_eq!(ghosts.delete(&CrudFilter::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_weave_across_collections() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    seeded_users(&store).await;

    let weaver = Weaver::document(store.clone(), Some(Arc::new(MemoryCache::new())));
    let posts = DocumentCrud::new(store, TableOptions::new("post")).with_weaver(weaver.clone());
    posts
        .insert_many(vec![
            row(json!({"_id": 10, "title": "hello", "userId": "1"})),
            row(json!({"_id": 11, "title": "again", "userId": "2"})),
        ])
        .await
        .unwrap();

    let relations = parse_relations("user._id@author").unwrap();
    let rows = posts
        .select(&CrudFilter::new(), &[Sort::asc("title")], &relations)
        .await
        .unwrap();
    assert_eq!(rows[0]["author"]["name"], json!("bob"));
    assert_eq!(rows[1]["author"]["name"], json!("ann"));
    weaver.drain_cache_writes().await;

    let missing = parse_relations("userId=nobody").unwrap();
    assert!(posts.select(&CrudFilter::new(), &[], &missing).await.is_err());
}

#[tokio::test]
async fn test_weave_integer_fk_onto_text_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    seeded_users(&store).await;

    let weaver = Weaver::document(store.clone(), Some(Arc::new(MemoryCache::new())));
    let posts = DocumentCrud::new(store, TableOptions::new("post")).with_weaver(weaver.clone());
    posts
        .insert_many(vec![
            row(json!({"_id": "p1", "title": "hello", "userId": 1})),
            row(json!({"_id": "p2", "title": "again", "userId": "1"})),
            row(json!({"_id": "p3", "title": "later", "userId": 3})),
        ])
        .await
        .unwrap();

    let relations = parse_relations("user._id@author").unwrap();
    for _ in 0..2 {
        let rows = posts
            .select(&CrudFilter::new(), &[Sort::asc("title")], &relations)
            .await
            .unwrap();
        assert_eq!(rows[0]["author"]["name"], json!("ann"));
        assert_eq!(rows[1]["author"]["name"], json!("ann"));
        assert_eq!(rows[2]["author"]["name"], json!("cid"));
        weaver.drain_cache_writes().await;
    }

    let stat = weaver.cache_stat();
    assert_eq!(stat.miss, 2);
    assert_eq!(stat.hit, 2);
}
