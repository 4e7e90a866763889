use std::path::PathBuf;

use thiserror::Error;

/// daoforge errors
///
/// Every variant here aborts the run. Recoverable conditions (unparsable
/// check clauses, unknown catalog types) never surface as errors.
#[derive(Error, Debug)]
pub enum DaoforgeError {
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Failed to introspect schema '{schema}': {message}")]
    Introspection { schema: String, message: String },

    #[error("Inconsistent catalog metadata for table '{table}': {message}")]
    Schema { table: String, message: String },

    #[error("Code generation failed for table '{table}': {message}")]
    CodeGen { table: String, message: String },

    #[error("Failed to write '{}': {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl DaoforgeError {
    pub(crate) fn output(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Output {
            path: path.into(),
            source,
        }
    }
}
