//! In-memory catalog
//!
//! A catalog snapshot held in memory. Answers the same queries as a live
//! database, which makes it the source for regenerating from a fixed
//! snapshot and for exercising the pipeline without a server.

use std::collections::BTreeMap;

use super::{CatalogReader, RawCheckConstraint, RawColumn, RawForeignKey};
use crate::prelude::DaoforgeError;
use crate::schema::{IndexModel, UniqueConstraintModel};

#[derive(Debug, Clone, Default)]
struct TableEntry {
    columns: Vec<RawColumn>,
    primary_key: Vec<String>,
    foreign_keys: Vec<RawForeignKey>,
    indexes: Vec<IndexModel>,
    checks: Vec<RawCheckConstraint>,
    uniques: Vec<UniqueConstraintModel>,
}

/// Catalog snapshot for a single schema
#[derive(Debug, Clone)]
pub struct MemoryCatalog {
    schema: String,
    tables: BTreeMap<String, TableEntry>,
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCatalog {
    /// Empty snapshot of the `public` schema
    pub fn new() -> Self {
        Self::for_schema("public")
    }

    pub fn for_schema(schema: &str) -> Self {
        Self {
            schema: schema.to_string(),
            tables: BTreeMap::new(),
        }
    }

    /// Start describing a table; replaces any previous table of that name
    pub fn table(mut self, name: &str) -> TableBuilder {
        self.tables.insert(name.to_string(), TableEntry::default());
        TableBuilder {
            catalog: self,
            name: name.to_string(),
        }
    }

    fn entry(&self, schema: &str, table: &str) -> Result<&TableEntry, DaoforgeError> {
        if schema != self.schema {
            return Err(DaoforgeError::Introspection {
                schema: schema.to_string(),
                message: format!("schema not present in snapshot (have '{}')", self.schema),
            });
        }
        self.tables
            .get(table)
            .ok_or_else(|| DaoforgeError::Introspection {
                schema: schema.to_string(),
                message: format!("table '{}' not present in snapshot", table),
            })
    }
}

/// Builder for one table of a [`MemoryCatalog`]
pub struct TableBuilder {
    catalog: MemoryCatalog,
    name: String,
}

impl TableBuilder {
    fn entry(&mut self) -> &mut TableEntry {
        self.catalog
            .tables
            .entry(self.name.clone())
            .or_default()
    }

    pub fn column(
        mut self,
        name: &str,
        type_name: &str,
        size: Option<u32>,
        is_nullable: bool,
        is_auto_generated: bool,
        default_value: Option<&str>,
    ) -> Self {
        self.entry().columns.push(RawColumn {
            name: name.to_string(),
            type_name: type_name.to_string(),
            size,
            is_nullable,
            is_auto_generated,
            default_value: default_value.map(str::to_string),
        });
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.entry().primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn foreign_key(mut self, column: &str, referenced_table: &str, referenced_column: &str) -> Self {
        self.entry().foreign_keys.push(RawForeignKey {
            column: column.to_string(),
            referenced_table: referenced_table.to_string(),
            referenced_column: referenced_column.to_string(),
        });
        self
    }

    pub fn index(mut self, name: &str, is_unique: bool, columns: &[&str]) -> Self {
        self.entry().indexes.push(IndexModel {
            name: name.to_string(),
            is_unique,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn check(mut self, name: &str, clause: &str, columns: &[&str]) -> Self {
        self.entry().checks.push(RawCheckConstraint {
            name: name.to_string(),
            clause: clause.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn unique(mut self, name: &str, columns: &[&str]) -> Self {
        self.entry().uniques.push(UniqueConstraintModel {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Finish this table and return the catalog
    pub fn done(self) -> MemoryCatalog {
        self.catalog
    }
}

impl CatalogReader for MemoryCatalog {
    fn tables(&mut self, schema: &str) -> Result<Vec<String>, DaoforgeError> {
        if schema != self.schema {
            return Ok(Vec::new());
        }
        Ok(self.tables.keys().cloned().collect())
    }

    fn columns(&mut self, schema: &str, table: &str) -> Result<Vec<RawColumn>, DaoforgeError> {
        Ok(self.entry(schema, table)?.columns.clone())
    }

    fn primary_key(&mut self, schema: &str, table: &str) -> Result<Vec<String>, DaoforgeError> {
        Ok(self.entry(schema, table)?.primary_key.clone())
    }

    fn foreign_keys(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<RawForeignKey>, DaoforgeError> {
        Ok(self.entry(schema, table)?.foreign_keys.clone())
    }

    fn indexes(&mut self, schema: &str, table: &str) -> Result<Vec<IndexModel>, DaoforgeError> {
        Ok(self.entry(schema, table)?.indexes.clone())
    }

    fn check_constraints(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<RawCheckConstraint>, DaoforgeError> {
        Ok(self.entry(schema, table)?.checks.clone())
    }

    fn unique_constraints(
        &mut self,
        schema: &str,
        table: &str,
    ) -> Result<Vec<UniqueConstraintModel>, DaoforgeError> {
        Ok(self.entry(schema, table)?.uniques.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_sorted() {
        let mut catalog = MemoryCatalog::new()
            .table("zebras")
            .done()
            .table("apples")
            .done();
        assert_eq!(catalog.tables("public").unwrap(), vec!["apples", "zebras"]);
        assert!(catalog.tables("other").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_table_is_an_error() {
        let mut catalog = MemoryCatalog::new();
        let err = catalog.columns("public", "missing").unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
