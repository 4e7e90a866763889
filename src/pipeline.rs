//! Generation pipeline
//!
//! Drives one run: list tables, then for each table read the catalog,
//! classify its key, render and write its two artifacts. Package-level
//! support files are written last.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::codegen::{CodeGenerator, OutputWriter, TableSummary};
use crate::config::RunConfig;
use crate::introspect::{list_tables, read_table, CatalogReader};
use crate::keyshape::plan;
use crate::prelude::{DaoforgeError, TableModel};

/// Outcome of a generation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationReport {
    /// Tables with generated artifacts
    pub tables: Vec<String>,
    /// Tables passed over because they have no columns
    pub skipped: Vec<String>,
    /// Files written, support files included
    pub artifacts: usize,
}

/// Run generation for every selected table
///
/// All tables are read and checked for type-name collisions before anything
/// is written. A table error aborts the run; pairs already written stay.
pub fn run(
    reader: &mut dyn CatalogReader,
    generator: &dyn CodeGenerator,
    config: &RunConfig,
) -> Result<GenerationReport, DaoforgeError> {
    let names = list_tables(reader, &config.schema, &config.filter)?;
    info!(schema = ?config.schema, tables = ?names.len(), "Tables selected");

    let mut report = GenerationReport::default();
    let mut models = Vec::with_capacity(names.len());
    for name in &names {
        let table = read_table(reader, &config.schema, name, &config.features)?;
        if table.columns.is_empty() {
            warn!(table = ?name, "Table has no columns, skipping");
            report.skipped.push(name.clone());
            continue;
        }
        models.push(table);
    }

    let summaries: Vec<TableSummary> = models.iter().map(|t| generator.summarize(t)).collect();
    check_collisions(&summaries)?;

    let mut writer = OutputWriter::create(&config.codegen.output_path)?;
    for (table, summary) in models.iter().zip(&summaries) {
        generate_table(generator, config, table, &mut writer)?;
        info!(
            table = ?table.name,
            record = ?summary.record_class,
            dao = ?summary.dao_class,
            "Generated"
        );
        report.tables.push(table.name.clone());
    }

    for artifact in generator.render_support(&summaries)? {
        writer.write(&artifact)?;
    }

    report.artifacts = writer.written();
    debug!(report = ?report, language = generator.language(), "Run finished");
    Ok(report)
}

fn generate_table(
    generator: &dyn CodeGenerator,
    config: &RunConfig,
    table: &TableModel,
    writer: &mut OutputWriter,
) -> Result<(), DaoforgeError> {
    let plan = plan(table, config)?;
    debug!(
        table = ?table.name,
        shape = plan.shape.label(),
        finders = ?plan.finders.len(),
        "Planned table"
    );

    let artifacts = generator.render_table(table, &plan, &config.features)?;
    writer.write_pair(&artifacts)
}

/// Two tables deriving the same type or module name would overwrite each other
fn check_collisions(summaries: &[TableSummary]) -> Result<(), DaoforgeError> {
    let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
    for summary in summaries {
        for name in [&summary.record_class, &summary.record_module] {
            if let Some(other) = seen.insert(name, &summary.table) {
                if other != summary.table {
                    return Err(DaoforgeError::CodeGen {
                        table: summary.table.clone(),
                        message: format!(
                            "derived name '{}' is also derived from table '{}'",
                            name, other
                        ),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::{CodeGenConfig, PythonGenerator};
    use crate::introspect::MemoryCatalog;

    fn summary(table: &str, class: &str, module: &str) -> TableSummary {
        TableSummary {
            table: table.to_string(),
            record_module: module.to_string(),
            record_class: class.to_string(),
            dao_module: format!("{}_dao", module),
            dao_class: format!("{}Dao", class),
        }
    }

    #[test]
    fn test_collision_between_tables() {
        let err = check_collisions(&[
            summary("users", "User", "user"),
            summary("user", "User", "user"),
        ])
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'User'"));
        assert!(message.contains("users"));
    }

    #[test]
    fn test_distinct_names_pass() {
        assert!(check_collisions(&[
            summary("users", "User", "user"),
            summary("orders", "Order", "order"),
        ])
        .is_ok());
    }

    #[test]
    fn test_collision_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut catalog = MemoryCatalog::new()
            .table("user")
            .column("id", "bigint", None, false, true, None)
            .primary_key(&["id"])
            .done()
            .table("users")
            .column("id", "bigint", None, false, true, None)
            .primary_key(&["id"])
            .done();
        let generator = PythonGenerator::new().unwrap();
        let config = RunConfig::new("public", CodeGenConfig::new(out.clone()));

        assert!(run(&mut catalog, &generator, &config).is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_zero_column_table_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut catalog = MemoryCatalog::new()
            .table("empty")
            .done()
            .table("tags")
            .column("name", "text", None, false, false, None)
            .primary_key(&["name"])
            .done();
        let generator = PythonGenerator::new().unwrap();
        let config = RunConfig::new("public", CodeGenConfig::new(dir.path().to_path_buf()));

        let report = run(&mut catalog, &generator, &config).unwrap();
        assert_eq!(report.tables, vec!["tags"]);
        assert_eq!(report.skipped, vec!["empty"]);
        assert_eq!(report.artifacts, 4);
        assert!(!dir.path().join("empty.py").exists());
    }
}
