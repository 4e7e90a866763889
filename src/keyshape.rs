//! Key-shape classification
//!
//! Decides, per table, how records are identified and therefore which CRUD
//! operations the data-access object gets and how `save()` branches. Also
//! plans the derived finders (foreign-key, audit and lookup columns).

use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::prelude::{DaoforgeError, TableModel};
use crate::types::TargetType;

/// How a table's primary key is structured
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyShape {
    /// One auto-generated integer key, assigned by the database on insert
    SingleGeneratedId { column: String },
    /// Two or more key columns, in key order
    CompositeKey(Vec<String>),
    /// One key column whose value the caller supplies
    CustomSingleKey { column: String, target_type: TargetType },
    NoPrimaryKey,
}

impl KeyShape {
    /// Key columns in key order; empty for [`KeyShape::NoPrimaryKey`]
    pub fn key_columns(&self) -> Vec<&str> {
        match self {
            KeyShape::SingleGeneratedId { column } | KeyShape::CustomSingleKey { column, .. } => {
                vec![column.as_str()]
            }
            KeyShape::CompositeKey(columns) => columns.iter().map(String::as_str).collect(),
            KeyShape::NoPrimaryKey => Vec::new(),
        }
    }

    /// Whether update-by-key, delete-by-key and find-by-key exist
    pub fn is_keyed(&self) -> bool {
        !matches!(self, KeyShape::NoPrimaryKey)
    }

    /// Whether insert captures a database-generated key
    pub fn captures_generated_key(&self) -> bool {
        matches!(self, KeyShape::SingleGeneratedId { .. })
    }

    /// Whether save() must query for the key before choosing insert or update
    pub fn save_checks_existence(&self) -> bool {
        matches!(
            self,
            KeyShape::CustomSingleKey { .. } | KeyShape::CompositeKey(_)
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            KeyShape::SingleGeneratedId { .. } => "single generated id",
            KeyShape::CompositeKey(_) => "composite key",
            KeyShape::CustomSingleKey { .. } => "custom single key",
            KeyShape::NoPrimaryKey => "no primary key",
        }
    }
}

/// Select the key shape of a table
///
/// Fails only when the catalog names a primary-key column the table does
/// not have.
pub fn classify(table: &TableModel) -> Result<KeyShape, DaoforgeError> {
    for pk_name in &table.primary_key {
        if table.column(pk_name).is_none() {
            return Err(DaoforgeError::Schema {
                table: table.name.clone(),
                message: format!("primary key column '{}' is not a column of the table", pk_name),
            });
        }
    }

    let shape = match table.primary_key_columns().as_slice() {
        [] => KeyShape::NoPrimaryKey,
        [column] if column.is_auto_generated && column.target_type.is_integer() => {
            KeyShape::SingleGeneratedId {
                column: column.name.clone(),
            }
        }
        [column] => KeyShape::CustomSingleKey {
            column: column.name.clone(),
            target_type: column.target_type.clone(),
        },
        columns => KeyShape::CompositeKey(columns.iter().map(|c| c.name.clone()).collect()),
    };

    debug!(table = ?table.name, shape = ?shape, "Classified key shape");
    Ok(shape)
}

/// Why a finder was derived
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinderOrigin {
    ForeignKey { table: String, column: String },
    Audit,
    Lookup,
}

/// A generated read-many operation filtering on one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finder {
    pub column: String,
    pub origin: FinderOrigin,
}

/// Key shape plus the derived finders of one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePlan {
    pub shape: KeyShape,
    pub finders: Vec<Finder>,
}

/// Classify a table and plan its derived finders
///
/// Finders come out in column order, one per column. A foreign key wins over
/// the audit and lookup designations of the same column. The sole key column
/// of a single-key table gets no finder since find-by-key covers it.
pub fn plan(table: &TableModel, config: &RunConfig) -> Result<TablePlan, DaoforgeError> {
    let shape = classify(table)?;
    let sole_key = match &shape {
        KeyShape::SingleGeneratedId { column } | KeyShape::CustomSingleKey { column, .. } => {
            Some(column.as_str())
        }
        _ => None,
    };

    let lookups: Vec<&str> = config.lookups_for(&table.name).collect();
    for lookup in &lookups {
        if table.column(lookup).is_none() {
            warn!(table = ?table.name, column = ?lookup, "Requested lookup column does not exist");
        }
    }

    let finders = table
        .columns
        .iter()
        .filter(|col| Some(col.name.as_str()) != sole_key)
        .filter_map(|col| {
            let origin = if let Some(fk) = table.foreign_keys.get(&col.name) {
                FinderOrigin::ForeignKey {
                    table: fk.table.clone(),
                    column: fk.column.clone(),
                }
            } else if config.audit_columns.iter().any(|a| a == &col.name) {
                FinderOrigin::Audit
            } else if lookups.contains(&col.name.as_str()) {
                FinderOrigin::Lookup
            } else {
                return None;
            };
            Some(Finder {
                column: col.name.clone(),
                origin,
            })
        })
        .collect();

    Ok(TablePlan { shape, finders })
}
