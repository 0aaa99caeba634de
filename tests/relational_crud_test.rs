use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use weftdb::engine::adapter::{
    AdapterError, AdapterResult, Condition, RelationalStore, SelectQuery, SqlDialect, SqlValue, SqliteAdapter,
    TransactionHandle,
};
use weftdb::engine::{
    parse_relations, parse_sorts, CrudFilter, CrudOperations, MemoryCache, RelationalCrud, Row, Scalar, Sort,
    TableOptions, Weaver,
};

fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap()
}

fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter().map(|r| r["id"].as_i64().unwrap()).collect()
}

const SCHEMA: [&str; 2] = [
    "CREATE TABLE user (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)",
    "CREATE TABLE post (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL, userId INTEGER, \
     created_at TEXT, updated_at TEXT)",
];

async fn store() -> Arc<dyn RelationalStore> {
    let store: Arc<dyn RelationalStore> = Arc::new(SqliteAdapter::in_memory().unwrap());
    for sql in SCHEMA {
        store.execute(sql, &[]).await.unwrap();
    }
    store
}

async fn seeded_posts(store: &Arc<dyn RelationalStore>) -> RelationalCrud {
    let posts = RelationalCrud::new(store.clone(), TableOptions::new("post"));
    posts
        .insert_many(vec![
            row(json!({"title": "alpha", "userId": 1})),
            row(json!({"title": "alpine", "userId": 2})),
            row(json!({"title": "beta", "userId": 1})),
            row(json!({"title": "gamma", "userId": null})),
        ])
        .await
        .unwrap();
    posts
}

/// Counts every call and answers with nothing.
#[derive(Default)]
struct CountingStore {
    calls: AtomicUsize,
}

#[async_trait]
impl RelationalStore for CountingStore {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn select(&self, _query: &SelectQuery) -> AdapterResult<Vec<Row>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn count(&self, _table: &str, _conditions: &[Condition]) -> AdapterResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }

    async fn insert(&self, _table: &str, _id_column: &str, _rows: &[Row]) -> AdapterResult<Vec<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn update(&self, _table: &str, _conditions: &[Condition], _data: &Row) -> AdapterResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }

    async fn delete(&self, _table: &str, _conditions: &[Condition]) -> AdapterResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }

    async fn execute(&self, _sql: &str, _params: &[SqlValue]) -> AdapterResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }

    async fn begin(&self) -> AdapterResult<Arc<dyn TransactionHandle>> {
        Err(AdapterError::Transaction("not supported".into()))
    }
}

#[tokio::test]
async fn test_empty_include_list_never_reaches_store() {
    let store = Arc::new(CountingStore::default());
    let posts = RelationalCrud::new(store.clone(), TableOptions::new("post"));
    let filter = CrudFilter::new().include("id", Vec::<i64>::new());

    assert!(posts.select(&filter, &[], &[]).await.unwrap().is_empty());
    assert_eq!(posts.count(&filter).await.unwrap(), 0);
    assert_eq!(posts.update(&filter, row(json!({"title": "x"}))).await.unwrap(), 0);
    assert_eq!(posts.delete(&filter).await.unwrap(), 0);
    assert!(!posts.exist(&filter).await.unwrap());
    assert_eq!(store.calls.load(Ordering::SeqCst), 0);

    posts.select(&CrudFilter::new(), &[], &[]).await.unwrap();
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_include_minus_exclude() {
    let store = store().await;
    let posts = seeded_posts(&store).await;

    let filter = CrudFilter::new().include("id", vec![1, 2, 3]).exclude("id", vec![2]);
    let rows = posts.select(&filter, &[Sort::asc("id")], &[]).await.unwrap();
    assert_eq!(ids(&rows), vec![1, 3]);
    assert_eq!(posts.count(&filter).await.unwrap(), 2);
}

#[tokio::test]
async fn test_null_and_range_filters() {
    let store = store().await;
    let posts = seeded_posts(&store).await;

    let contradiction = CrudFilter::new().include("userId", 1).exclude("userId", 1);
    assert!(posts.select(&contradiction, &[], &[]).await.unwrap().is_empty());

    let orphan: CrudFilter = serde_json::from_value(json!({"include": {"userId": null}})).unwrap();
    assert_eq!(ids(&posts.select(&orphan, &[], &[]).await.unwrap()), vec![4]);

    let owned: CrudFilter = serde_json::from_value(json!({"exclude": {"userId": null}})).unwrap();
    assert_eq!(posts.count(&owned).await.unwrap(), 3);

    let range = CrudFilter::new().min(2).max(4);
    let rows = posts.select(&range, &parse_sorts("-id").unwrap(), &[]).await.unwrap();
    assert_eq!(ids(&rows), vec![3, 2]);
}

#[tokio::test]
async fn test_contain_filters() {
    let store = store().await;
    let posts = seeded_posts(&store).await;
    let sorts = [Sort::asc("id")];

    let rows = posts.select(&CrudFilter::new().contain("title", "alp"), &sorts, &[]).await.unwrap();
    assert_eq!(ids(&rows), vec![1, 2]);

    let rows = posts.select(&CrudFilter::new().left_contain("title", "ta"), &sorts, &[]).await.unwrap();
    assert_eq!(ids(&rows), vec![3]);

    let rows = posts.select(&CrudFilter::new().full_contain("title", "amm"), &sorts, &[]).await.unwrap();
    assert_eq!(ids(&rows), vec![4]);
}

#[tokio::test]
async fn test_paging_and_projection() {
    let store = store().await;
    let posts = seeded_posts(&store).await;

    let filter = CrudFilter::new().offset(1).limit(2).projection(&["id", "title"]);
    let rows = posts.select(&filter, &[Sort::asc("id")], &[]).await.unwrap();
    assert_eq!(ids(&rows), vec![2, 3]);
    assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["id", "title"]);

    // zero means "no limit"
    let rows = posts.select(&CrudFilter::new().limit(0), &[], &[]).await.unwrap();
    assert_eq!(rows.len(), 4);
}

#[tokio::test]
async fn test_by_id_operations() {
    let store = store().await;
    let posts = seeded_posts(&store).await;

    let post = posts.select_by_id(Scalar::Int(2), &[]).await.unwrap().unwrap();
    assert_eq!(post["title"], json!("alpine"));

    assert_eq!(
        posts.update_by_id(Scalar::Int(2), row(json!({"title": "renamed"}))).await.unwrap(),
        1
    );
    let post = posts.select_by_id(Scalar::Int(2), &[]).await.unwrap().unwrap();
    assert_eq!(post["title"], json!("renamed"));

    assert_eq!(posts.delete_by_id(Scalar::Int(2)).await.unwrap(), 1);
    assert!(posts.select_by_id(Scalar::Int(2), &[]).await.unwrap().is_none());
    assert_eq!(posts.delete_by_id(Scalar::Int(2)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_insert_returns_rows_in_input_order_with_timestamps() {
    let store = store().await;
    let posts = RelationalCrud::new(store, TableOptions::new("post").with_stamping(true));

    let rows = posts
        .insert_many(vec![
            row(json!({"id": 10, "title": "ten"})),
            row(json!({"title": "next"})),
            row(json!({"title": "dated", "created_at": "2020-01-01 00:00:00"})),
        ])
        .await
        .unwrap();

    assert_eq!(ids(&rows), vec![10, 11, 12]);
    assert!(rows[0]["created_at"].is_string());
    assert!(rows[1]["updated_at"].is_string());
    assert_eq!(rows[2]["created_at"], json!("2020-01-01 00:00:00"));

    let one = posts.insert(row(json!({"title": "single"}))).await.unwrap().unwrap();
    assert_eq!(one["id"], json!(13));
}

/// Replica that has not caught up with the primary yet.
struct LaggingReplica;

#[async_trait]
impl RelationalStore for LaggingReplica {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn select(&self, _query: &SelectQuery) -> AdapterResult<Vec<Row>> {
        Ok(Vec::new())
    }

    async fn count(&self, _table: &str, _conditions: &[Condition]) -> AdapterResult<u64> {
        Ok(0)
    }

    async fn insert(&self, _table: &str, _id_column: &str, _rows: &[Row]) -> AdapterResult<Vec<Value>> {
        Err(AdapterError::Query("replica is read-only".into()))
    }

    async fn update(&self, _table: &str, _conditions: &[Condition], _data: &Row) -> AdapterResult<u64> {
        Err(AdapterError::Query("replica is read-only".into()))
    }

    async fn delete(&self, _table: &str, _conditions: &[Condition]) -> AdapterResult<u64> {
        Err(AdapterError::Query("replica is read-only".into()))
    }

    async fn execute(&self, _sql: &str, _params: &[SqlValue]) -> AdapterResult<u64> {
        Err(AdapterError::Query("replica is read-only".into()))
    }

    async fn begin(&self) -> AdapterResult<Arc<dyn TransactionHandle>> {
        Err(AdapterError::Transaction("replica is read-only".into()))
    }
}

#[tokio::test]
async fn test_insert_reads_back_from_primary() {
    let primary = store().await;
    let posts = RelationalCrud::new(primary, TableOptions::new("post")).with_replica(Arc::new(LaggingReplica));

    let inserted = posts.insert(row(json!({"title": "fresh"}))).await.unwrap().unwrap();
    assert_eq!(inserted["title"], json!("fresh"));

    // plain reads go to the replica
    assert!(posts.select_by_id(Scalar::Int(1), &[]).await.unwrap().is_none());
    assert_eq!(posts.update_by_id(Scalar::Int(1), row(json!({"title": "x"}))).await.unwrap(), 1);
}

#[tokio::test]
async fn test_select_weaves_relations() {
    let store = store().await;
    let users = RelationalCrud::new(store.clone(), TableOptions::new("user"));
    users
        .insert_many(vec![row(json!({"name": "ann"})), row(json!({"name": "bob"}))])
        .await
        .unwrap();

    let weaver = Weaver::relational(store.clone(), Some(Arc::new(MemoryCache::new())));
    let posts = seeded_posts(&store).await.with_weaver(weaver.clone());

    let rows = posts
        .select(&CrudFilter::new(), &[Sort::asc("id")], &parse_relations("user").unwrap())
        .await
        .unwrap();
    assert_eq!(rows[0]["user"]["name"], json!("ann"));
    assert_eq!(rows[1]["user"]["name"], json!("bob"));
    assert_eq!(rows[2]["user"]["name"], json!("ann"));
    assert!(!rows[3].contains_key("user"));

    let post = posts
        .select_by_id(Scalar::Int(2), &parse_relations("writer=user@author").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(!post.contains_key("author"));
    weaver.drain_cache_writes().await;
}

#[tokio::test]
async fn test_transacting_commit_and_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn RelationalStore> = Arc::new(SqliteAdapter::new(&dir.path().join("app.db"), 4).unwrap());
    for sql in SCHEMA {
        store.execute(sql, &[]).await.unwrap();
    }
    let posts = RelationalCrud::new(store.clone(), TableOptions::new("post"));

    let tx = posts.begin().await.unwrap();
    let in_tx = posts.transacting(tx.clone());
    in_tx.insert(row(json!({"title": "kept"}))).await.unwrap();
    assert_eq!(in_tx.count(&CrudFilter::new()).await.unwrap(), 1);
    tx.commit().await.unwrap();
    assert_eq!(posts.count(&CrudFilter::new()).await.unwrap(), 1);

    let tx = posts.begin().await.unwrap();
    let in_tx = posts.transacting(tx.clone());
    in_tx.insert(row(json!({"title": "dropped"}))).await.unwrap();
    tx.rollback().await.unwrap();
    assert_eq!(posts.count(&CrudFilter::new()).await.unwrap(), 1);

    assert!(tx.commit().await.is_err());
}
