//! Application registry: open database models by key and shut them down

use crate::api::native::NativeClient;
use crate::config::Config;
use crate::contract::{Result, VelosurfApi, VelosurfError};
use crate::domain::Database;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Open databases, keyed by an application-chosen name
#[derive(Default)]
pub struct Registry {
    databases: RwLock<HashMap<String, Arc<Database>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect and build the model for `key`; an already open key is
    /// returned as-is
    pub async fn open(&self, key: &str, config: &Config) -> Result<Arc<Database>> {
        if let Some(db) = self.get(key) {
            return Ok(db);
        }
        let db = Arc::new(Database::connect(config).await?);

        // Another caller may have opened the same key meanwhile
        let (kept, spare) = {
            let mut databases = self.databases.write();
            match databases.get(key) {
                Some(existing) => (existing.clone(), Some(db)),
                None => {
                    databases.insert(key.to_string(), db.clone());
                    (db, None)
                }
            }
        };
        if let Some(spare) = spare {
            spare.close().await?;
        }
        tracing::info!(key, "database opened");
        Ok(kept)
    }

    /// Load a configuration file and open it under `key`
    pub async fn open_file(&self, key: &str, path: impl AsRef<Path>) -> Result<Arc<Database>> {
        let config = Config::load(path)?;
        self.open(key, &config).await
    }

    pub fn get(&self, key: &str) -> Option<Arc<Database>> {
        self.databases.read().get(key).cloned()
    }

    pub fn require(&self, key: &str) -> Result<Arc<Database>> {
        self.get(key)
            .ok_or_else(|| VelosurfError::UnknownDatabase(key.to_string()))
    }

    /// Native client over the database opened as `key`
    pub fn client(&self, key: &str) -> Result<Arc<dyn VelosurfApi>> {
        Ok(Arc::new(NativeClient::new(self.require(key)?)))
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.databases.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Close and forget one database; returns whether it was open
    pub async fn close(&self, key: &str) -> Result<bool> {
        let removed = self.databases.write().remove(key);
        match removed {
            Some(db) => {
                db.close().await?;
                tracing::info!(key, "database closed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close every open database; the first failure is returned after all
    /// were attempted
    pub async fn shutdown(&self) -> Result<()> {
        let databases: Vec<(String, Arc<Database>)> = self.databases.write().drain().collect();
        let mut first_error = None;
        for (key, db) in databases {
            if let Err(e) = db.close().await {
                tracing::error!(key, error = %e, "failed to close database");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
