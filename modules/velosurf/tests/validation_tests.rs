//! Field constraints checked before inserts

use serde_json::json;
use std::sync::Arc;
use velosurf::config::Config;
use velosurf::{Database, MapLocalizer, UserContext, VelosurfError};

mod common;
use common::{library, library_repository, row};

const MODEL: &str = r#"
database:
  read_only: false
schema:
  entities:
    - name: person
      aliases: { mail: email }
      constraints:
        name: [not_empty, { length: { max: 10 } }]
        email: [email]
    - name: book
      constraints:
        author_id: [not_null, { reference: { table: person, column: id } }]
        year: [{ range: { min: 1000, max: 2100 } }]
"#;

#[tokio::test]
async fn test_failed_validation_skips_the_insert() {
    let db = library(MODEL).await;
    let person = db.entity("person").unwrap();
    let ctx = UserContext::new();

    let issued = db.statements_issued();
    let inserted = person
        .insert(&db, row(&[("name", json!("")), ("mail", json!("not-an-address"))]), &ctx)
        .await
        .unwrap();

    assert!(!inserted);
    assert_eq!(db.statements_issued(), issued);
    assert_eq!(ctx.errors_for("name"), vec!["name: cannot be empty".to_string()]);
    assert_eq!(
        ctx.errors_for("email"),
        vec!["email: is not a valid email address".to_string()]
    );
    assert_eq!(ctx.validation_errors().len(), 2);
}

#[tokio::test]
async fn test_validation_messages_are_localized() {
    let db = library(MODEL).await;
    let localizer = MapLocalizer::new()
        .with("fr", "name: length must be at most 10", "nom : 10 caractères au plus");
    let ctx = UserContext::new()
        .with_locale("fr")
        .with_localizer(Arc::new(localizer));

    let inserted = db
        .entity("person")
        .unwrap()
        .insert(&db, row(&[("name", json!("Bartholomew"))]), &ctx)
        .await
        .unwrap();

    assert!(!inserted);
    assert_eq!(ctx.errors_for("name"), vec!["nom : 10 caractères au plus".to_string()]);
}

#[tokio::test]
async fn test_null_passes_everything_but_not_null() {
    let db = library(MODEL).await;
    let ctx = UserContext::new();

    // No email at all is fine
    let inserted = db
        .entity("person")
        .unwrap()
        .insert(&db, row(&[("name", json!("Dee")), ("email", json!(null))]), &ctx)
        .await
        .unwrap();
    assert!(inserted);
    assert!(!ctx.has_validation_errors());

    let inserted = db
        .entity("book")
        .unwrap()
        .insert(&db, row(&[("title", json!("Anonymous")), ("year", json!(1900))]), &ctx)
        .await
        .unwrap();
    assert!(!inserted);
    assert_eq!(
        ctx.errors_for("author_id"),
        vec!["author_id: cannot be null".to_string()]
    );
}

#[tokio::test]
async fn test_reference_constraint_queries_the_referenced_table() {
    let db = library(MODEL).await;
    let book = db.entity("book").unwrap();

    let ctx = UserContext::new();
    let issued = db.statements_issued();
    let inserted = book
        .insert(
            &db,
            row(&[("title", json!("Ghost")), ("year", json!(2001)), ("author_id", json!(99))]),
            &ctx,
        )
        .await
        .unwrap();
    assert!(!inserted);
    // Only the lookup ran
    assert_eq!(db.statements_issued(), issued + 1);
    assert_eq!(
        ctx.errors_for("author_id"),
        vec!["author_id: does not reference an existing person.id".to_string()]
    );

    let ctx = UserContext::new();
    let instance = book
        .new_instance_from(row(&[
            ("title", json!("Persuasion")),
            ("year", json!("1817")),
            ("author_id", json!(2)),
        ]))
        .unwrap();
    assert!(instance.insert(&db, &ctx).await.unwrap());
    assert_eq!(instance.raw("book_id"), Some(json!(4)));
    // String input was coerced to the column type
    assert_eq!(instance.raw("year"), Some(json!(1817)));
}

#[tokio::test]
async fn test_range_rejects_out_of_bounds_values() {
    let db = library(MODEL).await;
    let ctx = UserContext::new();

    let inserted = db
        .entity("book")
        .unwrap()
        .insert(
            &db,
            row(&[("title", json!("Far Future")), ("year", json!(3000)), ("author_id", json!(1))]),
            &ctx,
        )
        .await
        .unwrap();
    assert!(!inserted);
    assert_eq!(
        ctx.errors_for("year"),
        vec!["year: must be a number between 1000 and 2100".to_string()]
    );
}

#[tokio::test]
async fn test_invalid_regex_fails_the_build() {
    let config = Config::from_yaml_str(
        r#"
schema:
  entities:
    - name: person
      constraints:
        name: [{ regex: "([a-z" }]
"#,
    )
    .unwrap();
    let result = Database::builder(library_repository().await)
        .schema(config.schema)
        .build()
        .await;
    assert!(matches!(
        result,
        Err(VelosurfError::InvalidConstraint { ref column, .. }) if column == "name"
    ));
}
