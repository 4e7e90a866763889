//! # daoforge
//!
//! Generate validated record classes and data-access objects from a live
//! database catalog
//!
//! This crate provides a CLI tool and library that reads table metadata,
//! infers value rules from check constraints, classifies each table's key
//! and emits one record module and one data-access module per table.
//!
//! The output directory is owned by the generator: every run overwrites the
//! files it produces and never merges with existing content.

pub mod codegen;
pub mod config;
pub mod constraints;
pub mod error;
pub mod introspect;
pub mod keyshape;
pub mod pipeline;
pub mod schema;
pub mod types;

pub mod prelude {
    pub use crate::codegen::{CodeGenConfig, CodeGenerator, PythonGenerator};
    pub use crate::config::{DbConfig, FeatureToggles, LookupColumn, RunConfig};
    pub use crate::error::DaoforgeError;
    pub use crate::introspect::{CatalogReader, MemoryCatalog, TableFilter};
    pub use crate::keyshape::{KeyShape, TablePlan};
    pub use crate::pipeline::{run, GenerationReport};
    pub use crate::schema::{ColumnModel, SemanticConstraint, TableModel};
    pub use crate::types::TargetType;
}

#[cfg(feature = "postgres")]
pub use introspect::{connect_postgres, PostgresCatalog};
