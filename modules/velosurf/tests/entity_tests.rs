//! Entity fetching, caching and write-back against an in-memory database

use serde_json::json;
use std::sync::Arc;
use velosurf::{UserContext, VelosurfError};

mod common;
use common::{library, row};

const WRITABLE: &str = r#"
database:
  read_only: false
schema:
  entities:
    - name: person
      aliases: { mail: email }
      caching:
        soft:
          size: 10
    - name: color
      keys: [code]
"#;

#[tokio::test]
async fn test_fetch_by_value_reads_the_row() {
    let db = library(WRITABLE).await;
    let person = db.entity("person").unwrap();

    let ann = person.fetch_by_value(&db, json!(1)).await.unwrap().unwrap();
    assert_eq!(ann.raw("name"), Some(json!("Ann")));
    assert_eq!(ann.get_value("mail"), Some(json!("ann@example.com")));

    assert!(person.fetch_by_value(&db, json!(99)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cached_fetch_returns_the_same_instance_without_sql() {
    let db = library(WRITABLE).await;
    let person = db.entity("person").unwrap();

    let first = person.fetch_by_value(&db, json!(1)).await.unwrap().unwrap();
    let issued = db.statements_issued();
    // String and number keys address the same cached row
    let second = person.fetch_by_value(&db, json!("1")).await.unwrap().unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(db.statements_issued(), issued);
}

#[tokio::test]
async fn test_uncached_entity_always_queries() {
    let db = library(WRITABLE).await;
    let book = db.entity("book").unwrap();

    let first = book.fetch_by_value(&db, json!(1)).await.unwrap().unwrap();
    let issued = db.statements_issued();
    let second = book.fetch_by_value(&db, json!(1)).await.unwrap().unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(db.statements_issued(), issued + 1);
}

#[tokio::test]
async fn test_single_value_fetch_needs_a_single_key_column() {
    let db = library(WRITABLE).await;
    let loan = db.entity("loan").unwrap();

    let err = loan.fetch_by_value(&db, json!(2)).await.unwrap_err();
    assert!(matches!(err, VelosurfError::KeyArity { count: 2, .. }));

    let found = loan.fetch(&db, &[json!(2), json!(1)]).await.unwrap();
    assert_eq!(found.unwrap().raw("since"), Some(json!("2024-01-10")));
}

#[tokio::test]
async fn test_insert_reads_back_the_generated_key() {
    let db = library(WRITABLE).await;
    let person = db.entity("person").unwrap();
    let ctx = UserContext::new();

    let cid = person
        .new_instance_from(row(&[("name", json!("Cid")), ("mail", json!("cid@example.com"))]))
        .unwrap();
    assert!(cid.insert(&db, &ctx).await.unwrap());
    assert_eq!(cid.raw("id"), Some(json!(3)));

    // Inserted instances are cached
    let issued = db.statements_issued();
    let fetched = person.fetch_by_value(&db, json!(3)).await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&cid, &fetched));
    assert_eq!(db.statements_issued(), issued);
}

#[tokio::test]
async fn test_insert_without_a_full_composite_key_fails_before_any_sql() {
    let db = library(WRITABLE).await;
    let loan = db.entity("loan").unwrap();
    let ctx = UserContext::new();

    let issued = db.statements_issued();
    let err = loan
        .insert(&db, row(&[("book_id", json!(1)), ("since", json!("2024-02-01"))]), &ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, VelosurfError::MissingKey { ref column, .. } if column == "person_id"));
    assert_eq!(db.statements_issued(), issued);
    assert!(!ctx.has_validation_errors());
}

#[tokio::test]
async fn test_update_with_null_key_fails_before_any_sql() {
    let db = library(WRITABLE).await;
    let person = db.entity("person").unwrap();

    let issued = db.statements_issued();
    let err = person
        .update(&db, row(&[("id", json!(null)), ("name", json!("Nobody"))]))
        .await
        .unwrap_err();

    assert!(matches!(err, VelosurfError::MissingKey { ref column, .. } if column == "id"));
    assert_eq!(db.statements_issued(), issued);
}

#[tokio::test]
async fn test_update_writes_back_and_invalidates_cache() {
    let db = library(WRITABLE).await;
    let person = db.entity("person").unwrap();

    let before = person.fetch_by_value(&db, json!(2)).await.unwrap().unwrap();
    person
        .update_by_value(&db, json!(2), row(&[("name", json!("Robert"))]))
        .await
        .unwrap();

    let after = person.fetch_by_value(&db, json!(2)).await.unwrap().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.raw("name"), Some(json!("Robert")));
    // Null columns are left alone
    assert_eq!(after.raw("email"), Some(json!(null)));
}

#[tokio::test]
async fn test_update_drops_memoized_row_sets() {
    let db = library(WRITABLE).await;
    let ann = db
        .entity("person")
        .unwrap()
        .fetch_by_value(&db, json!(1))
        .await
        .unwrap()
        .unwrap();

    let books = ann.get(&db, "books").await.unwrap().unwrap().into_rowset().unwrap();
    assert!(Arc::ptr_eq(
        &books,
        &ann.get(&db, "books").await.unwrap().unwrap().into_rowset().unwrap()
    ));

    ann.put("name", json!("Anne")).unwrap();
    ann.update(&db).await.unwrap();
    let again = ann.get(&db, "books").await.unwrap().unwrap().into_rowset().unwrap();
    assert!(!Arc::ptr_eq(&books, &again));
    assert_eq!(again.rows(&db).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_update_touching_several_rows_is_an_integrity_violation() {
    let db = library(WRITABLE).await;
    let color = db.entity("color").unwrap();

    let err = color
        .update(&db, row(&[("code", json!("red")), ("label", json!("Scarlet"))]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VelosurfError::IntegrityViolation { operation: "update", affected: 2, .. }
    ));

    // A missing row is only a warning
    color
        .update(&db, row(&[("code", json!("green")), ("label", json!("Green"))]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_delete_by_value() {
    let db = library(WRITABLE).await;
    let book = db.entity("book").unwrap();

    book.delete_by_value(&db, json!(3)).await.unwrap();
    assert!(book.fetch_by_value(&db, json!(3)).await.unwrap().is_none());

    let err = db
        .entity("loan")
        .unwrap()
        .delete_by_value(&db, json!(2))
        .await
        .unwrap_err();
    assert!(matches!(err, VelosurfError::KeyArity { count: 2, .. }));
}

#[tokio::test]
async fn test_entities_are_read_only_by_default() {
    let db = library("{}").await;
    let person = db.entity("person").unwrap();

    let issued = db.statements_issued();
    let err = person
        .update(&db, row(&[("id", json!(1)), ("name", json!("Anna"))]))
        .await
        .unwrap_err();
    assert!(matches!(err, VelosurfError::ReadOnly(ref name) if name == "person"));
    assert_eq!(db.statements_issued(), issued);
}

#[tokio::test]
async fn test_obfuscated_key_round_trip() {
    let db = library(
        r#"
database:
  seed: "library secret"
schema:
  entities:
    - name: person
      obfuscate: [id]
"#,
    )
    .await;
    let person = db.entity("person").unwrap();

    let ann = person.fetch_by_value(&db, json!(1)).await.unwrap().unwrap();
    let hidden = ann.get_value("id").unwrap();
    assert_ne!(hidden, json!(1));
    assert_eq!(ann.raw("id"), Some(json!(1)));

    let again = person.fetch_by_value(&db, hidden.clone()).await.unwrap().unwrap();
    assert_eq!(again.raw("name"), Some(json!("Ann")));
    assert_eq!(ann.to_external_row().get("id"), Some(&hidden));

    let err = person
        .fetch_by_value(&db, json!("not-an-obfuscated-id!"))
        .await
        .unwrap_err();
    assert!(matches!(err, VelosurfError::Obfuscation(_)));
}

#[tokio::test]
async fn test_all_lists_every_row() {
    let db = library("{}").await;
    let rows = db.entity("book").unwrap().all().rows(&db).await.unwrap();
    assert_eq!(rows.len(), 3);
}
