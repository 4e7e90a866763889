//! Database introspection
//!
//! This module provides functionality for extracting table metadata from a
//! database catalog. [`CatalogReader`] is the raw query contract each backend
//! implements; [`read_table`] turns its answers into an enriched
//! [`TableModel`], running constraint inference and type mapping on the way.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::config::FeatureToggles;
use crate::constraints::infer_constraints;
use crate::prelude::{DaoforgeError, TableModel};
use crate::schema::{ColumnModel, ForeignKeyRef, IndexModel, UniqueConstraintModel};
use crate::types::map_type;

pub mod memory;

pub use memory::MemoryCatalog;

/// Filters to apply during introspection
#[derive(Debug, Default, Clone)]
pub struct TableFilter {
    /// Only include these tables (if Some)
    pub include: Option<Vec<String>>,
    /// Exclude these tables
    pub exclude: Option<Vec<String>>,
}

impl TableFilter {
    /// Check if a table should be included
    pub fn should_include(&self, table_name: &str) -> bool {
        let listed = |names: &Option<Vec<String>>| {
            names
                .as_ref()
                .map(|names| names.iter().any(|t| t == table_name))
        };

        listed(&self.include).unwrap_or(true) && !listed(&self.exclude).unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.include.is_some() || self.exclude.is_some()
    }
}

/// Column descriptor as the catalog reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    pub type_name: String,
    /// Character length or numeric precision
    pub size: Option<u32>,
    pub is_nullable: bool,
    pub is_auto_generated: bool,
    pub default_value: Option<String>,
}

/// One column of a foreign-key edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// A check constraint and the columns it names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCheckConstraint {
    pub name: String,
    pub clause: String,
    pub columns: Vec<String>,
}

/// Read-only, schema-qualified catalog queries
///
/// Any error returned here is fatal to the run.
pub trait CatalogReader {
    /// Table names in the schema, sorted
    fn tables(&mut self, schema: &str) -> Result<Vec<String>, DaoforgeError>;

    /// Columns in ordinal order
    fn columns(&mut self, schema: &str, table: &str) -> Result<Vec<RawColumn>, DaoforgeError>;

    /// Primary-key column names in key order
    fn primary_key(&mut self, schema: &str, table: &str) -> Result<Vec<String>, DaoforgeError>;

    fn foreign_keys(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<RawForeignKey>, DaoforgeError>;

    fn indexes(&mut self, schema: &str, table: &str) -> Result<Vec<IndexModel>, DaoforgeError>;

    fn check_constraints(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<RawCheckConstraint>, DaoforgeError>;

    fn unique_constraints(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<UniqueConstraintModel>, DaoforgeError>;
}

/// List the tables of a schema that pass the filter
pub fn list_tables(
    reader: &mut dyn CatalogReader,
    schema: &str,
    filter: &TableFilter,
) -> Result<Vec<String>, DaoforgeError> {
    let all_tables = reader.tables(schema)?;
    debug!(count = ?all_tables.len(), "Found all tables");

    let tables: Vec<String> = all_tables
        .into_iter()
        .filter(|name| filter.should_include(name))
        .collect();
    debug!(count = ?tables.len(), "Tables after filtering");

    Ok(tables)
}

/// Query one table and build its enriched model
pub fn read_table(
    reader: &mut dyn CatalogReader,
    schema: &str,
    table: &str,
    features: &FeatureToggles,
) -> Result<TableModel, DaoforgeError> {
    debug!(table = ?table, "Introspecting table");

    let raw_columns = reader.columns(schema, table)?;
    trace!(table = ?table, columns = ?raw_columns.len(), "Found columns");

    let primary_key = reader.primary_key(schema, table)?;
    trace!(table = ?table, primary_key = ?primary_key, "Found primary key");

    let foreign_keys: BTreeMap<String, ForeignKeyRef> = reader
        .foreign_keys(schema, table)?
        .into_iter()
        .map(|fk| {
            (
                fk.column,
                ForeignKeyRef {
                    table: fk.referenced_table,
                    column: fk.referenced_column,
                },
            )
        })
        .collect();
    trace!(table = ?table, foreign_keys = ?foreign_keys, "Found foreign keys");

    let indexes: BTreeMap<String, IndexModel> = reader
        .indexes(schema, table)?
        .into_iter()
        .map(|index| (index.name.clone(), index))
        .collect();

    let checks = if features.check_constraints {
        reader.check_constraints(schema, table)?
    } else {
        Vec::new()
    };
    trace!(table = ?table, checks = ?checks.len(), "Found check constraints");

    let unique_constraints: BTreeMap<String, UniqueConstraintModel> =
        if features.unique_constraints {
            reader
                .unique_constraints(schema, table)?
                .into_iter()
                .map(|unique| (unique.name.clone(), unique))
                .collect()
        } else {
            BTreeMap::new()
        };

    let columns = raw_columns
        .into_iter()
        .map(|raw| {
            let clauses: Vec<&str> = checks
                .iter()
                .filter(|check| check.columns.iter().any(|c| c == &raw.name))
                .map(|check| check.clause.as_str())
                .collect();
            let constraints = infer_constraints(&raw.name, &clauses);
            let target_type = map_type(&raw.type_name);

            trace!(
                column = ?raw.name,
                catalog_type = ?raw.type_name,
                target_type = ?target_type,
                constraints = ?constraints,
                "Resolved column"
            );

            ColumnModel {
                is_primary_key: primary_key.contains(&raw.name),
                is_foreign_key: foreign_keys.contains_key(&raw.name),
                target_type,
                constraints,
                name: raw.name,
                catalog_type: raw.type_name,
                size: raw.size,
                is_nullable: raw.is_nullable,
                is_auto_generated: raw.is_auto_generated,
                default_value: raw.default_value,
            }
        })
        .collect();

    Ok(TableModel {
        schema: schema.to_string(),
        name: table.to_string(),
        columns,
        primary_key,
        foreign_keys,
        indexes,
        unique_constraints,
    })
}

// Feature-gated database implementations
#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use self::postgres::{connect_postgres, PostgresCatalog};
