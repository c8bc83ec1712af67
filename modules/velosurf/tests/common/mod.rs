//! Common test utilities: an in-memory library database and model builders

#![allow(dead_code)]

use std::sync::{Arc, Once};
use velosurf::config::{Config, DatabaseConfig};
use velosurf::domain::RowRepository;
use velosurf::infra::storage::SeaOrmRowRepository;
use velosurf::{Database, Row, Value};

static TRACING: Once = Once::new();

/// Route library logs to the test output; `RUST_LOG` selects the level
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Small library schema used across the tests
///
/// person 1 (Ann) wrote books 1 and 3, person 2 (Bob) wrote book 2.
/// `color` has no primary key and a duplicated code, `account` refuses
/// negative balances.
const SCHEMA: &[&str] = &[
    "create table person (id integer primary key autoincrement, name text not null, email text)",
    "create table book (book_id integer primary key autoincrement, title text not null, \
     year integer, author_id integer references person(id))",
    "create table loan (book_id integer not null references book(book_id), \
     person_id integer not null references person(id), since text, \
     primary key (book_id, person_id))",
    "create table color (code text, label text)",
    "create table account (id integer primary key, owner text, \
     balance integer not null check (balance >= 0))",
    "insert into person (id, name, email) values (1, 'Ann', 'ann@example.com')",
    "insert into person (id, name, email) values (2, 'Bob', null)",
    "insert into book (book_id, title, year, author_id) values (1, 'Dune', 1965, 1)",
    "insert into book (book_id, title, year, author_id) values (2, 'Emma', 1815, 2)",
    "insert into book (book_id, title, year, author_id) values (3, 'Foundation', 1951, 1)",
    "insert into loan (book_id, person_id, since) values (2, 1, '2024-01-10')",
    "insert into color (code, label) values ('red', 'Red')",
    "insert into color (code, label) values ('red', 'Crimson')",
    "insert into color (code, label) values ('blue', 'Blue')",
    "insert into account (id, owner, balance) values (1, 'Ann', 100)",
    "insert into account (id, owner, balance) values (2, 'Bob', 20)",
];

/// Fresh in-memory SQLite database with the library schema
pub async fn library_repository() -> Arc<SeaOrmRowRepository> {
    repository(SCHEMA).await
}

/// Fresh in-memory SQLite database running `statements`
pub async fn repository(statements: &[&str]) -> Arc<SeaOrmRowRepository> {
    init_tracing();
    let repo = SeaOrmRowRepository::connect(&DatabaseConfig::default())
        .await
        .unwrap();
    for sql in statements {
        repo.execute(sql, &[]).await.unwrap();
    }
    Arc::new(repo)
}

/// Model over `repo`, configured by `yaml`
pub async fn model(repo: Arc<SeaOrmRowRepository>, yaml: &str) -> Database {
    let config = Config::from_yaml_str(yaml).unwrap();
    Database::builder(repo)
        .with_config(&config.database)
        .schema(config.schema)
        .build()
        .await
        .unwrap()
}

/// Model over the library database, configured by `yaml`
///
/// Every keyed fixture table that became an entity must have its primary
/// key read from the catalog.
pub async fn library(yaml: &str) -> Database {
    let db = model(library_repository().await, yaml).await;
    for (name, keys) in [
        ("person", &["id"][..]),
        ("book", &["book_id"][..]),
        ("loan", &["book_id", "person_id"][..]),
        ("account", &["id"][..]),
    ] {
        if let Some(entity) = db.find_entity(name) {
            let expected = keys
                .iter()
                .map(|k| db.case_policy().adapt(k))
                .collect::<Vec<_>>();
            assert_eq!(entity.key_columns(), expected.as_slice(), "key columns of {}", name);
        }
    }
    db
}

/// Row from (column, value) pairs
pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
