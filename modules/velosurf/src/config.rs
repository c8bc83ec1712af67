//! Configuration for a Velosurf database model
//!
//! Loaded from YAML and merged with `VELOSURF_`-prefixed environment
//! variables (`__` separates nesting levels, e.g. `VELOSURF_DATABASE__URL`).

use crate::contract::Result;
use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Connection and model-wide defaults
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Declared entities, attributes, actions and constraints
    #[serde(default)]
    pub schema: SchemaConfig,

    /// Logging settings (used by binaries)
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load a YAML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Figment::new()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("VELOSURF_").split("__"))
            .extract()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string, without environment overrides
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config = Figment::new().merge(Yaml::string(yaml)).extract()?;
        Ok(config)
    }
}

/// Database connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Connection URL (`sqlite::memory:`, `postgres://...`)
    #[serde(default = "default_url")]
    pub url: String,

    /// Pool size; in-memory SQLite defaults to a single connection
    #[serde(default)]
    pub max_connections: Option<u32>,

    /// How much of the schema is read from the database itself
    #[serde(default)]
    pub reverse: ReverseMode,

    /// Caching applied to entities that do not configure their own
    #[serde(default)]
    pub caching: CachingConfig,

    /// Whether entities are read-only unless configured otherwise
    #[serde(default = "default_true")]
    pub read_only: bool,

    /// Identifier case policy
    #[serde(default)]
    pub case: CasePolicy,

    /// Seed of the default obfuscation keystream
    #[serde(default = "default_seed")]
    pub seed: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: None,
            reverse: ReverseMode::default(),
            caching: CachingConfig::default(),
            read_only: true,
            case: CasePolicy::default(),
            seed: default_seed(),
        }
    }
}

/// Schema reverse-engineering mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReverseMode {
    /// Only configured entities, nothing read from the database
    None,
    /// Columns and keys read for configured entities only
    Partial,
    /// Every table becomes an entity
    Tables,
    /// Every table, plus imported/exported keys from foreign keys
    #[default]
    Full,
}

/// Identifier case policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CasePolicy {
    #[default]
    Sensitive,
    Lowercase,
    Uppercase,
}

impl CasePolicy {
    pub fn adapt(self, identifier: &str) -> String {
        match self {
            Self::Sensitive => identifier.to_string(),
            Self::Lowercase => identifier.to_lowercase(),
            Self::Uppercase => identifier.to_uppercase(),
        }
    }
}

/// Entity caching configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachingConfig {
    #[default]
    None,
    Soft {
        /// Maximum number of cached rows (0 = unbounded)
        #[serde(default = "default_cache_size")]
        size: usize,
        /// Time to live of a cached row
        #[serde(default, with = "humantime_serde")]
        ttl: Option<Duration>,
    },
    Full,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level directive (`info`, `velosurf=debug`, ...)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Declared schema
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    #[serde(default)]
    pub entities: Vec<EntityConfig>,

    /// Database-level attributes and actions
    #[serde(default)]
    pub root: RootConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RootConfig {
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,

    #[serde(default)]
    pub actions: Vec<ActionConfig>,
}

/// One declared entity
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityConfig {
    pub name: String,

    /// Mapped table; defaults to the entity name
    #[serde(default)]
    pub table: Option<String>,

    /// Column names, replacing reverse-engineered ones when present
    #[serde(default)]
    pub columns: Vec<String>,

    /// Primary-key columns, replacing reverse-engineered ones when present
    #[serde(default)]
    pub keys: Vec<String>,

    /// alias -> column
    #[serde(default)]
    pub aliases: IndexMap<String, String>,

    #[serde(default)]
    pub read_only: Option<bool>,

    #[serde(default)]
    pub caching: Option<CachingConfig>,

    #[serde(default)]
    pub obfuscate: Vec<String>,

    #[serde(default)]
    pub localize: Vec<String>,

    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,

    #[serde(default)]
    pub imported_keys: Vec<KeyConfig>,

    #[serde(default)]
    pub exported_keys: Vec<KeyConfig>,

    #[serde(default)]
    pub actions: Vec<ActionConfig>,

    /// column -> rules
    #[serde(default)]
    pub constraints: IndexMap<String, Vec<ConstraintConfig>>,
}

/// A named parametrized query
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeConfig {
    pub name: String,

    /// `row`, `rowset` or `scalar`
    #[serde(default)]
    pub result: String,

    /// Entity of the resulting rows (row / rowset)
    #[serde(default)]
    pub entity: Option<String>,

    /// SQL text; parameters inline as `:name` unless `params` is given
    pub query: String,

    /// Explicit parameter names for `?` placeholders
    #[serde(default)]
    pub params: Option<Vec<String>>,
}

/// Imported key (`entity` = referenced entity) or exported key
/// (`entity` = referencing entity); `columns` are the foreign-key columns
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyConfig {
    pub name: String,
    pub entity: String,
    pub columns: Vec<String>,
}

/// A named parametrized update; `transaction` splits it on `;`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionConfig {
    pub name: String,
    pub query: String,
    #[serde(default)]
    pub transaction: bool,
}

/// Field constraint declaration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintConfig {
    NotNull,
    NotEmpty,
    Length {
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    DateRange {
        #[serde(default)]
        after: Option<String>,
        #[serde(default)]
        before: Option<String>,
        #[serde(default = "default_date_format")]
        format: String,
    },
    Regex(String),
    OneOf(Vec<String>),
    Reference {
        table: String,
        column: String,
    },
    Email,
}

fn default_url() -> String {
    "sqlite::memory:".to_string()
}

fn default_true() -> bool {
    true
}

fn default_seed() -> String {
    "velosurf".to_string()
}

fn default_cache_size() -> usize {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}
