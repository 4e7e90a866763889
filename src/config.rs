//! Configuration loading
//!
//! [`DbConfig`] holds connection settings read from the environment, with an
//! optional .env file loaded first. [`RunConfig`] is everything else a run
//! needs; it is assembled once and passed by reference into the pipeline.

use std::{env, fmt, path::Path, str::FromStr};

use tracing::{debug, error, trace, warn};

use crate::codegen::CodeGenConfig;
use crate::introspect::TableFilter;
use crate::prelude::DaoforgeError;

/// Audit columns that get a finder when a table has them
pub const DEFAULT_AUDIT_COLUMNS: &[&str] = &["created_by", "updated_by", "modified_by"];

/// Database connection configuration
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl DbConfig {
    /// Load configuration from environment variables
    ///
    /// Expected variables:
    /// - DB_HOST (default: localhost)
    /// - DB_PORT (default: 5432)
    /// - DB_NAME (required)
    /// - DB_USER (required)
    /// - DB_PASSWORD (required)
    pub fn from_env() -> Result<Self, DaoforgeError> {
        debug!("Loading database configuration from environment");

        let host = optional_var("DB_HOST", "localhost");
        let port_str = optional_var("DB_PORT", "5432");
        let port = port_str.parse::<u16>().map_err(|e| {
            error!(port = ?port_str, error = ?e, "Invalid DB_PORT value");
            DaoforgeError::Config("DB_PORT must be a valid port number".to_string())
        })?;

        let database = required_var("DB_NAME")?;
        let user = required_var("DB_USER")?;
        let password = required_var("DB_PASSWORD")?;

        debug!(host = ?host, port = ?port, database = ?database, user = ?user, "Configuration loaded");

        Ok(Self {
            host,
            port,
            database,
            user,
            password,
        })
    }

    /// Load a .env file and then read configuration from environment
    pub fn load(env_file: &Path) -> Result<Self, DaoforgeError> {
        if env_file.exists() {
            debug!(path = ?env_file, "Loading environment file");
            dotenvy::from_path(env_file).map_err(|e| {
                error!(path = ?env_file, error = ?e, "Failed to load environment file");
                DaoforgeError::Config(format!("Failed to load {}: {}", env_file.display(), e))
            })?;
        } else {
            warn!(path = ?env_file, "Environment file not found, using existing environment");
        }

        Self::from_env()
    }

    /// Build a PostgreSQL connection string
    pub fn postgres_connection_string(&self) -> String {
        self.connection_string(&self.password)
    }

    /// Build a connection string with password redacted (for logs and errors)
    pub fn redacted_connection_string(&self) -> String {
        self.connection_string("***")
    }

    fn connection_string(&self, password: &str) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, password
        )
    }
}

fn optional_var(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        trace!(variable = name, default = default, "Variable not set, using default");
        default.to_string()
    })
}

fn required_var(name: &str) -> Result<String, DaoforgeError> {
    env::var(name).map_err(|_| {
        error!(variable = name, "Required environment variable is not set");
        DaoforgeError::Config(format!("{} environment variable is required", name))
    })
}

/// Optional emission features, all on by default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureToggles {
    /// Emit a record-level `validate()` method
    pub validation_methods: bool,
    /// Emit public class constants for inferred bounds, value sets and patterns
    pub constraint_constants: bool,
    /// Query and parse check constraints
    pub check_constraints: bool,
    /// Query unique constraints for documentation
    pub unique_constraints: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            validation_methods: true,
            constraint_constants: true,
            check_constraints: true,
            unique_constraints: true,
        }
    }
}

/// An explicitly requested `table.column` lookup finder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupColumn {
    pub table: String,
    pub column: String,
}

impl FromStr for LookupColumn {
    type Err = DaoforgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('.') {
            Some((table, column)) if !table.is_empty() && !column.is_empty() => Ok(Self {
                table: table.to_string(),
                column: column.to_string(),
            }),
            _ => Err(DaoforgeError::Config(format!(
                "lookup '{}' must have the form table.column",
                s
            ))),
        }
    }
}

impl fmt::Display for LookupColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// Immutable settings for one generation run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Database schema to introspect
    pub schema: String,
    pub filter: TableFilter,
    pub features: FeatureToggles,
    pub audit_columns: Vec<String>,
    pub lookup_columns: Vec<LookupColumn>,
    pub codegen: CodeGenConfig,
}

impl RunConfig {
    pub fn new(schema: impl Into<String>, codegen: CodeGenConfig) -> Self {
        Self {
            schema: schema.into(),
            filter: TableFilter::default(),
            features: FeatureToggles::default(),
            audit_columns: DEFAULT_AUDIT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            lookup_columns: Vec::new(),
            codegen,
        }
    }

    pub fn with_filter(mut self, filter: TableFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_features(mut self, features: FeatureToggles) -> Self {
        self.features = features;
        self
    }

    pub fn with_audit_columns(mut self, columns: Vec<String>) -> Self {
        self.audit_columns = columns;
        self
    }

    pub fn with_lookup_columns(mut self, lookups: Vec<LookupColumn>) -> Self {
        self.lookup_columns = lookups;
        self
    }

    /// Lookup columns requested for one table
    pub fn lookups_for<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.lookup_columns
            .iter()
            .filter(move |lookup| lookup.table == table)
            .map(|lookup| lookup.column.as_str())
    }
}
