//! Registry lifecycle, full caches, typed entities and the native client

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use velosurf::api::native::NativeClient;
use velosurf::config::Config;
use velosurf::contract::Result;
use velosurf::domain::{row_to_struct, struct_to_row};
use velosurf::{
    CachingPolicy, Registry, Row, RowBackedObject, UserContext, VelosurfApi, VelosurfError,
};

mod common;
use common::{init_tracing, library, row};

const EMPTY: &str = r#"
database:
  url: "sqlite::memory:"
schema:
  root:
    attributes:
      - name: two
        result: scalar
        query: "select 1 + 1"
"#;

// ===== Registry =====

#[tokio::test]
async fn test_open_is_idempotent_per_key() {
    init_tracing();
    let registry = Registry::new();
    let config = Config::from_yaml_str(EMPTY).unwrap();

    let first = registry.open("main", &config).await.unwrap();
    let second = registry.open("main", &config).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    registry.open("reports", &config).await.unwrap();
    assert_eq!(registry.keys(), vec!["main".to_string(), "reports".to_string()]);

    registry.shutdown().await.unwrap();
    assert!(registry.keys().is_empty());
}

#[tokio::test]
async fn test_client_and_close() {
    init_tracing();
    let registry = Registry::new();
    let config = Config::from_yaml_str(EMPTY).unwrap();
    registry.open("main", &config).await.unwrap();

    let client = registry.client("main").unwrap();
    let ctx = UserContext::new();
    let two = client.evaluate(None, "two", &Row::new(), &ctx).await.unwrap();
    assert_eq!(two, json!(2));

    assert!(matches!(
        registry.require("other"),
        Err(VelosurfError::UnknownDatabase(ref key)) if key == "other"
    ));
    assert!(registry.close("main").await.unwrap());
    assert!(!registry.close("main").await.unwrap());
    assert!(registry.get("main").is_none());
}

// ===== Full caching =====

#[tokio::test]
async fn test_full_cache_is_preloaded() {
    let db = library(
        r#"
schema:
  entities:
    - name: person
      caching: full
"#,
    )
    .await;
    let person = db.entity("person").unwrap();
    assert_eq!(person.caching(), CachingPolicy::Full);
    assert_eq!(person.cache().len(), 2);

    let issued = db.statements_issued();
    let bob = person.fetch_by_value(&db, json!(2)).await.unwrap().unwrap();
    assert_eq!(bob.raw("name"), Some(json!("Bob")));
    assert_eq!(db.statements_issued(), issued);

    db.close().await.unwrap();
    assert!(person.cache().is_empty());
}

#[tokio::test]
async fn test_failed_preload_leaves_cache_empty() {
    let db = library(
        r#"
schema:
  entities:
    - name: ghost
      keys: [id]
      caching: full
"#,
    )
    .await;
    let ghost = db.entity("ghost").unwrap();
    assert!(ghost.cache().is_empty());
}

#[tokio::test]
async fn test_preload_skips_entities_without_keys() {
    let catalog_only = library("{}").await.statements_issued();
    let db = library(
        r#"
schema:
  entities:
    - name: color
      caching: full
"#,
    )
    .await;
    assert!(db.entity("color").unwrap().cache().is_empty());
    assert_eq!(db.statements_issued(), catalog_only);
}

// ===== Typed entities =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Book {
    #[serde(default)]
    book_id: Option<i64>,
    title: String,
    year: Option<i64>,
    author_id: Option<i64>,
}

impl RowBackedObject for Book {
    fn from_row(row: &Row) -> Result<Self> {
        row_to_struct(row)
    }

    fn to_row(&self) -> Result<Row> {
        struct_to_row(self)
    }

    fn before_insert(&mut self) -> Result<()> {
        self.title = self.title.trim().to_string();
        Ok(())
    }
}

#[tokio::test]
async fn test_typed_entity_round_trip() {
    let db = library("database:\n  read_only: false\n").await;
    let books = db.typed::<Book>("book").unwrap();
    let ctx = UserContext::new();

    let dune = books.fetch_by_value(&db, json!(1)).await.unwrap().unwrap();
    assert_eq!(dune.title, "Dune");
    assert_eq!(dune.author_id, Some(1));

    let mut emma = Book {
        book_id: None,
        title: "  Sanditon ".to_string(),
        year: Some(1817),
        author_id: Some(2),
    };
    assert!(books.insert(&db, &mut emma, &ctx).await.unwrap());
    assert_eq!(emma.book_id, Some(4));
    assert_eq!(emma.title, "Sanditon");

    emma.year = Some(1925);
    books.update(&db, &mut emma).await.unwrap();
    let stored = books.fetch(&db, &[json!(4)]).await.unwrap().unwrap();
    assert_eq!(stored, emma);

    books.delete(&db, &emma).await.unwrap();
    assert_eq!(books.all(&db).await.unwrap().len(), 3);
}

// ===== Native client =====

const CLIENT_MODEL: &str = r#"
schema:
  entities:
    - name: person
      read_only: false
      constraints:
        name: [not_empty]
      attributes:
        - name: book_count
          result: scalar
          query: "select count(*) from book where author_id = :id"
  root:
    actions:
      - name: rename_book
        query: "update book set title = :title where book_id = :book_id"
"#;

#[tokio::test]
async fn test_native_client_reads() {
    let client = NativeClient::new(Arc::new(library(CLIENT_MODEL).await));
    let ctx = UserContext::new();

    let dune = client.fetch_row("book", &[json!(1)], &ctx).await.unwrap().unwrap();
    assert_eq!(dune.get("title"), Some(&json!("Dune")));
    assert!(client.fetch_row("book", &[json!(42)], &ctx).await.unwrap().is_none());

    let rows = client
        .query_rows("book", &["year > 1900".to_string()], Some("year"), &ctx)
        .await
        .unwrap();
    let titles: Vec<_> = rows.iter().filter_map(|r| r.get("title")).collect();
    assert_eq!(titles, vec![&json!("Foundation"), &json!("Dune")]);

    let count = client
        .evaluate(Some("person"), "book_count", &row(&[("id", json!(1))]), &ctx)
        .await
        .unwrap();
    assert_eq!(count, json!(2));
    assert!(ctx.last_error().is_none());
}

#[tokio::test]
async fn test_native_client_writes() {
    let client = NativeClient::new(Arc::new(library(CLIENT_MODEL).await));
    let ctx = UserContext::new();

    let inserted = client
        .insert_row("person", row(&[("name", json!(" "))]), &ctx)
        .await
        .unwrap();
    assert!(!inserted);
    assert!(ctx.has_validation_errors());

    let affected = client
        .perform(
            None,
            "rename_book",
            &row(&[("book_id", json!(1)), ("title", json!("Dune Messiah"))]),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);

    client
        .update_row("person", row(&[("id", json!(2)), ("email", json!("bob@example.com"))]), &ctx)
        .await
        .unwrap();
    let bob = client.fetch_row("person", &[json!(2)], &ctx).await.unwrap().unwrap();
    assert_eq!(bob.get("email"), Some(&json!("bob@example.com")));
}

#[tokio::test]
async fn test_native_client_records_failures_on_the_context() {
    let client = NativeClient::new(Arc::new(library(CLIENT_MODEL).await));
    let ctx = UserContext::new();

    let err = client
        .delete_row("book", row(&[("book_id", json!(1))]), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, VelosurfError::ReadOnly(_)));
    assert_eq!(ctx.take_error(), Some("entity 'book' is read-only".to_string()));

    let err = client.fetch_row("loan", &[json!(2)], &ctx).await.unwrap_err();
    assert!(matches!(err, VelosurfError::KeyArity { count: 2, .. }));
    assert!(ctx.last_error().is_some());

    let err = client
        .perform(Some("person"), "vanish", &Row::new(), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, VelosurfError::UnknownAction { .. }));

    let err = client.query_rows("nobody", &[], None, &ctx).await.unwrap_err();
    assert!(matches!(err, VelosurfError::UnknownEntity(_)));
}
