//! SeaORM repository implementation

use crate::config::DatabaseConfig;
use crate::contract::{Result, Row, Value, VelosurfError};
use crate::domain::query::BoundStatement;
use crate::domain::repository::{InsertOutcome, RowRepository, TableInfo};
use async_trait::async_trait;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database as SeaDatabase, DatabaseConnection, DbBackend,
    TransactionTrait,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::mapper::{decode_row, statement};
use super::reverse;

pub struct SeaOrmRowRepository {
    db: Arc<DatabaseConnection>,
    issued: AtomicU64,
    // Serializes transactions against each other
    tx_lock: tokio::sync::Mutex<()>,
}

impl SeaOrmRowRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            issued: AtomicU64::new(0),
            tx_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Open a pool for `config.url`
    ///
    /// In-memory SQLite databases live in one connection, so the pool is
    /// limited to a single connection unless configured otherwise.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let max_connections = config.max_connections.unwrap_or(
            if config.url.starts_with("sqlite") && config.url.contains(":memory:") {
                1
            } else {
                10
            },
        );
        let mut options = ConnectOptions::new(config.url.clone());
        options.max_connections(max_connections).sqlx_logging(false);
        let db = SeaDatabase::connect(options).await?;
        info!(backend = ?db.get_database_backend(), max_connections, "database connected");
        Ok(Self::new(Arc::new(db)))
    }

    pub fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }

    pub fn connection(&self) -> &Arc<DatabaseConnection> {
        &self.db
    }

    fn record(&self, sql: &str, params: &[Value]) {
        self.issued.fetch_add(1, Ordering::Relaxed);
        debug!(sql, params = ?params, "issuing statement");
    }
}

#[async_trait]
impl RowRepository for SeaOrmRowRepository {
    async fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.record(sql, params);
        let rows = self
            .db
            .query_all(statement(self.backend(), sql, params))
            .await
            .map_err(|e| {
                error!(sql, error = %e, "query failed");
                e
            })?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.record(sql, params);
        let result = self
            .db
            .execute(statement(self.backend(), sql, params))
            .await
            .map_err(|e| {
                error!(sql, error = %e, "statement failed");
                e
            })?;
        Ok(result.rows_affected())
    }

    async fn insert(
        &self,
        sql: &str,
        params: &[Value],
        generated_key: Option<&str>,
    ) -> Result<InsertOutcome> {
        match (self.backend(), generated_key) {
            (DbBackend::Postgres, Some(column)) => {
                let sql = format!("{} returning {}", sql, column);
                let rows = self.query_rows(&sql, params).await?;
                let generated_key = rows
                    .into_iter()
                    .next()
                    .and_then(|row| row.get(column).cloned());
                Ok(InsertOutcome {
                    affected: u64::from(generated_key.is_some()),
                    generated_key,
                })
            }
            (_, generated) => {
                self.record(sql, params);
                let result = self
                    .db
                    .execute(statement(self.backend(), sql, params))
                    .await
                    .map_err(|e| {
                        error!(sql, error = %e, "insert failed");
                        e
                    })?;
                Ok(InsertOutcome {
                    affected: result.rows_affected(),
                    generated_key: generated.map(|_| Value::from(result.last_insert_id())),
                })
            }
        }
    }

    async fn execute_transaction(&self, statements: &[BoundStatement]) -> Result<u64> {
        let _guard = self.tx_lock.lock().await;
        let txn = self.db.begin().await?;
        let mut affected = 0;
        for bound in statements {
            self.record(&bound.sql, &bound.params);
            match txn
                .execute(statement(self.backend(), &bound.sql, &bound.params))
                .await
            {
                Ok(result) => affected += result.rows_affected(),
                Err(e) => {
                    error!(sql = %bound.sql, error = %e, "transaction statement failed, rolling back");
                    if let Err(rollback) = txn.rollback().await {
                        error!(error = %rollback, "rollback failed");
                    }
                    return Err(e.into());
                }
            }
        }
        txn.commit().await?;
        Ok(affected)
    }

    async fn describe_tables(&self) -> Result<Vec<TableInfo>> {
        match self.backend() {
            DbBackend::Sqlite => reverse::describe_sqlite(self).await,
            DbBackend::Postgres => reverse::describe_postgres(self).await,
            other => Err(VelosurfError::Schema(format!(
                "reading the catalog is not supported for {:?}",
                other
            ))),
        }
    }

    fn statements_issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    async fn close(&self) -> Result<()> {
        // The pool is shared by every clone of the connection
        (*self.db).clone().close().await?;
        Ok(())
    }
}
