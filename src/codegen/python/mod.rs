//! Python code generator
//!
//! Generates, per table, a record module (validated properties, equality,
//! repr) and a data-access module whose operations follow the table's key
//! shape. Two shared modules complete the package: `_runtime.py` with the
//! error types and `__init__.py` re-exporting every class.

mod pattern;

use std::collections::BTreeSet;

use minijinja::{context, Environment, Value};
use tracing::{debug, trace};

use crate::codegen::{Artifact, CodeGenerator, TableArtifacts, TableSummary};
use crate::config::FeatureToggles;
use crate::error::DaoforgeError;
use crate::keyshape::{FinderOrigin, KeyShape, TablePlan};
use crate::schema::{quote_ident, Bound, ColumnModel, SemanticConstraint, TableModel};
use crate::types::TargetType;

use self::pattern::py_regex;

const RUNTIME_MODULE: &str = "_runtime";

/// Names a generated attribute, parameter or module may not take as is
const RESERVED: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield", "self", "validate", "record", "row", "cur", "sql", "columns",
    "values", "placeholders", "affected", "property", "staticmethod", "isinstance", "object",
    "len", "str", "NotImplemented",
];

/// Python code generator
pub struct PythonGenerator {
    env: Environment<'static>,
}

impl PythonGenerator {
    pub fn new() -> Result<Self, DaoforgeError> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_keep_trailing_newline(true);

        // Register templates
        let templates = [
            ("record", include_str!("templates/record.py.jinja")),
            ("dao", include_str!("templates/dao.py.jinja")),
            ("runtime", include_str!("templates/runtime.py.jinja")),
            ("init", include_str!("templates/init.py.jinja")),
        ];
        for (name, source) in templates {
            env.add_template(name, source)
                .map_err(|e| DaoforgeError::CodeGen {
                    table: format!("<template {}>", name),
                    message: format!("Template error: {}", e),
                })?;
        }

        Ok(Self { env })
    }

    fn render(&self, template_name: &str, table: &str, ctx: Value) -> Result<String, DaoforgeError> {
        let template = self
            .env
            .get_template(template_name)
            .map_err(|e| DaoforgeError::CodeGen {
                table: table.to_string(),
                message: format!("Template error: {}", e),
            })?;

        template.render(ctx).map_err(|e| DaoforgeError::CodeGen {
            table: table.to_string(),
            message: format!("Render error: {}", e),
        })
    }
}

impl CodeGenerator for PythonGenerator {
    fn language(&self) -> &'static str {
        "python"
    }

    fn summarize(&self, table: &TableModel) -> TableSummary {
        let record_module = py_ident(&table.singular_name());
        let record_class = py_ident(&table.singular_class_name());
        TableSummary {
            table: table.name.clone(),
            dao_module: format!("{}_dao", record_module),
            dao_class: format!("{}Dao", record_class),
            record_module,
            record_class,
        }
    }

    fn render_table(
        &self,
        table: &TableModel,
        plan: &TablePlan,
        features: &FeatureToggles,
    ) -> Result<TableArtifacts, DaoforgeError> {
        let summary = self.summarize(table);
        let fields = fields(table);

        let record = self.render("record", &table.name, record_context(table, &summary, &fields, features))?;
        trace!(table = ?table.name, bytes = record.len(), "Rendered record module");

        let dao = self.render("dao", &table.name, dao_context(table, &summary, &fields, plan))?;
        trace!(table = ?table.name, bytes = dao.len(), "Rendered data-access module");

        debug!(table = ?table.name, record = ?summary.record_module, dao = ?summary.dao_module, "Rendered table");

        Ok(TableArtifacts {
            record: Artifact {
                file_name: format!("{}.py", summary.record_module),
                contents: record,
            },
            dao: Artifact {
                file_name: format!("{}.py", summary.dao_module),
                contents: dao,
            },
        })
    }

    fn render_support(&self, tables: &[TableSummary]) -> Result<Vec<Artifact>, DaoforgeError> {
        let runtime = self.render(
            "runtime",
            RUNTIME_MODULE,
            context! { header => support_header() },
        )?;

        let mut exports: BTreeSet<&str> = ["DataAccessError", "NotFoundError", "ValidationError"]
            .into_iter()
            .collect();
        for table in tables {
            exports.insert(&table.record_class);
            exports.insert(&table.dao_class);
        }

        let init = self.render(
            "init",
            "__init__",
            context! {
                header => support_header(),
                tables => tables.iter().map(|t| {
                    context! {
                        record_module => &t.record_module,
                        record_class => &t.record_class,
                        dao_module => &t.dao_module,
                        dao_class => &t.dao_class,
                    }
                }).collect::<Vec<_>>(),
                exports => exports.into_iter().collect::<Vec<_>>(),
            },
        )?;

        Ok(vec![
            Artifact {
                file_name: format!("{}.py", RUNTIME_MODULE),
                contents: runtime,
            },
            Artifact {
                file_name: "__init__.py".to_string(),
                contents: init,
            },
        ])
    }
}

/// A column as it appears on the generated record
struct Field<'a> {
    column: &'a ColumnModel,
    name: String,
    /// Accepts None: nullable, or the database supplies a value
    optional: bool,
}

impl Field<'_> {
    fn annotation(&self) -> String {
        python_type(&self.column.target_type, self.optional)
    }

    fn sql_name(&self) -> String {
        quote_ident(&self.column.name)
    }
}

fn fields(table: &TableModel) -> Vec<Field<'_>> {
    table
        .columns
        .iter()
        .map(|column| Field {
            column,
            name: py_ident(&column.name),
            optional: column.is_nullable || column.has_default(),
        })
        .collect()
}

const OVERWRITE_NOTICE: &str = "# Regeneration overwrites this file; manual changes are discarded.";

fn header(source: &str) -> String {
    format!("# Generated by daoforge from {}. Do not edit.\n{}", source, OVERWRITE_NOTICE)
}

fn support_header() -> String {
    format!("# Generated by daoforge. Do not edit.\n{}", OVERWRITE_NOTICE)
}

/// Class constants and module-level patterns of one record module
#[derive(Default)]
struct ModuleNames {
    names: BTreeSet<String>,
    constants: Vec<Value>,
    patterns: Vec<Value>,
}

impl ModuleNames {
    /// First unused name among `base`, `base_2`, `base_3`, ...
    fn allocate(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut n = 2;
        while self.names.contains(&name) {
            name = format!("{}_{}", base, n);
            n += 1;
        }
        self.names.insert(name.clone());
        name
    }

    fn constant(&mut self, base: &str, literal: String) -> String {
        let name = self.allocate(base);
        self.constants.push(context! { name => &name, literal => literal });
        name
    }

    fn pattern(&mut self, base: &str, literal: String) -> String {
        let name = self.allocate(base);
        self.patterns.push(context! { name => &name, literal => literal });
        name
    }
}

/// Build template context for the record module
fn record_context(
    table: &TableModel,
    summary: &TableSummary,
    fields: &[Field<'_>],
    features: &FeatureToggles,
) -> Value {
    let class = &summary.record_class;
    let mut names = ModuleNames::default();

    let fields_ctx: Vec<_> = fields
        .iter()
        .map(|field| {
            let checks = field_checks(class, field, features, &mut names);
            context! {
                name => &field.name,
                annotation => field.annotation(),
                optional => field.optional,
                label => py_str(&field.column.name),
                checks => checks,
            }
        })
        .collect();

    let mut imports = Vec::new();
    if !names.patterns.is_empty() {
        imports.push("import re".to_string());
    }
    let mut from_imports = BTreeSet::new();
    for field in fields {
        collect_type_imports(&field.column.target_type, &mut from_imports);
    }
    imports.extend(from_imports);

    let identity: Vec<String> = table
        .identity_columns()
        .iter()
        .map(|c| py_ident(&c.name))
        .collect();
    let repr_fields: Vec<String> = identity
        .iter()
        .map(|name| format!("{name}={{self._{name}!r}}"))
        .collect();

    context! {
        header => header(&format!("{}.{}", table.schema, table.name)),
        imports => imports,
        patterns => names.patterns,
        record_class => class,
        doc_summary => format!("Row of {}.{}.", table.schema, table.name),
        doc_lines => doc_lines(table),
        slots => py_tuple(&fields.iter().map(|f| py_str(&format!("_{}", f.name))).collect::<Vec<_>>()),
        constants => names.constants,
        fields => fields_ctx,
        validation_methods => features.validation_methods,
        identity_self => py_tuple(&identity.iter().map(|n| format!("self._{n}")).collect::<Vec<_>>()),
        identity_other => py_tuple(&identity.iter().map(|n| format!("other._{n}")).collect::<Vec<_>>()),
        repr_expr => format!("f\"{}({})\"", class, repr_fields.join(", ")),
    }
}

/// Checks a field's mutator runs, in order, after the None check
fn field_checks(
    class: &str,
    field: &Field<'_>,
    features: &FeatureToggles,
    names: &mut ModuleNames,
) -> Vec<Value> {
    let target = &field.column.target_type;
    let base = field.name.trim_matches('_').to_uppercase();
    let subject = if target.is_text() { "value" } else { "str(value)" };
    let mut checks = Vec::new();

    // Either a class constant or the literal itself
    let reference = |names: &mut ModuleNames, suffix: &str, literal: String| -> String {
        if features.constraint_constants {
            let name = names.constant(&format!("{}_{}", base, suffix), literal);
            format!("{}.{}", class, name)
        } else {
            literal
        }
    };

    if let Some(max) = field.column.max_length() {
        let limit = reference(names, "MAX_LENGTH", max.to_string());
        checks.push(check(
            format!("len(value) > {}", limit),
            format!("length must be at most {}", max),
        ));
    }

    for constraint in &field.column.constraints {
        match constraint {
            SemanticConstraint::Range { min, max } => {
                if !target.is_numeric() {
                    debug!(column = ?field.column.name, "Range on non-numeric column not emitted");
                    continue;
                }
                if let Some(min) = min {
                    let bound = reference(names, "MIN", py_number(min, target));
                    checks.push(check(format!("value < {}", bound), format!("must be >= {}", min)));
                }
                if let Some(max) = max {
                    let bound = reference(names, "MAX", py_number(max, target));
                    checks.push(check(format!("value > {}", bound), format!("must be <= {}", max)));
                }
            }
            SemanticConstraint::Enum(values) => {
                let literals: Vec<String> = values.iter().map(|v| py_enum_value(v, target)).collect();
                let allowed = reference(names, "ALLOWED", py_tuple(&literals));
                checks.push(check(
                    format!("value not in {}", allowed),
                    format!("must be one of {}", values.join(", ")),
                ));
            }
            SemanticConstraint::Length(max) => {
                let limit = reference(names, "MAX_LENGTH", max.to_string());
                checks.push(check(
                    format!("len({}) > {}", subject, limit),
                    format!("length must be at most {}", max),
                ));
            }
            SemanticConstraint::Pattern(regex) => {
                let Some(translated) = py_regex(regex) else {
                    debug!(column = ?field.column.name, pattern = ?regex, "Pattern has no Python equivalent, not emitted");
                    continue;
                };
                let compiled = names.pattern(&format!("_{}_PATTERN", base), py_str(&translated));
                if features.constraint_constants {
                    names.constant(&format!("{}_PATTERN", base), py_str(regex));
                }
                checks.push(check(
                    format!("{}.search({}) is None", compiled, subject),
                    format!("must match {}", regex),
                ));
            }
        }
    }

    checks
}

fn check(condition: String, message: String) -> Value {
    context! { condition => condition, message => py_str(&message) }
}

fn doc_lines(table: &TableModel) -> Vec<String> {
    let mut lines = Vec::new();

    if table.primary_key.is_empty() {
        lines.push("No primary key.".to_string());
    } else {
        lines.push(format!("Primary key: {}", table.primary_key.join(", ")));
    }

    lines.push(String::new());
    lines.push("Columns:".to_string());
    for column in &table.columns {
        let null = if column.is_nullable { "" } else { ", not null" };
        lines.push(format!("    {}: {}{}", column.name, column.catalog_type, null));
    }

    let mut section = |title: &str, entries: Vec<String>| {
        if !entries.is_empty() {
            lines.push(String::new());
            lines.push(format!("{}:", title));
            lines.extend(entries.into_iter().map(|e| format!("    {}", e)));
        }
    };

    section(
        "Foreign keys",
        table
            .foreign_keys
            .iter()
            .map(|(column, target)| format!("{} -> {}.{}", column, target.table, target.column))
            .collect(),
    );
    section(
        "Indexes",
        table
            .indexes
            .values()
            .map(|index| {
                let unique = if index.is_unique { " (unique)" } else { "" };
                format!("{}{}: {}", index.name, unique, index.columns.join(", "))
            })
            .collect(),
    );
    section(
        "Unique constraints",
        table
            .unique_constraints
            .values()
            .map(|unique| format!("{}: {}", unique.name, unique.columns.join(", ")))
            .collect(),
    );

    lines.into_iter().map(|line| doc_escape(&line)).collect()
}

/// Build template context for the data-access module
fn dao_context(
    table: &TableModel,
    summary: &TableSummary,
    fields: &[Field<'_>],
    plan: &TablePlan,
) -> Value {
    let shape = &plan.shape;
    let qualified = table.qualified_name();
    let select_list = fields.iter().map(Field::sql_name).collect::<Vec<_>>().join(", ");
    let select = format!("SELECT {} FROM {}", select_list, qualified);

    let key_fields: Vec<&Field<'_>> = shape
        .key_columns()
        .iter()
        .filter_map(|key| fields.iter().find(|f| f.column.name == *key))
        .collect();
    let where_key = key_fields
        .iter()
        .map(|f| format!("{} = %s", f.sql_name()))
        .collect::<Vec<_>>()
        .join(" AND ");
    let order_by = if key_fields.is_empty() {
        String::new()
    } else {
        format!(
            " ORDER BY {}",
            key_fields.iter().map(|f| f.sql_name()).collect::<Vec<_>>().join(", ")
        )
    };

    let record_key: Vec<String> = key_fields.iter().map(|f| format!("record.{}", f.name)).collect();
    let key_params = key_fields
        .iter()
        .map(|f| format!("{}: {}", f.name, python_type(&f.column.target_type, false)))
        .collect::<Vec<_>>()
        .join(", ");
    let key_args = key_fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>().join(", ");

    // Insert: the generated key is never sent; defaulted columns only when set
    let mut insert_columns = Vec::new();
    let mut insert_values = Vec::new();
    let mut insert_optional = Vec::new();
    for field in fields {
        let is_generated_key = shape.captures_generated_key() && field.column.is_primary_key;
        if is_generated_key {
            continue;
        }
        if field.column.has_default() {
            insert_optional.push(context! {
                name => &field.name,
                column_literal => py_str(&field.sql_name()),
            });
        } else {
            insert_columns.push(py_str(&field.sql_name()));
            insert_values.push(format!("record.{}", field.name));
        }
    }

    let update_fields: Vec<&Field<'_>> = fields
        .iter()
        .filter(|f| !f.column.is_primary_key && !f.column.is_auto_generated)
        .collect();
    let update_sql = format!(
        "UPDATE {} SET {} WHERE {}",
        qualified,
        update_fields
            .iter()
            .map(|f| format!("{} = %s", f.sql_name()))
            .collect::<Vec<_>>()
            .join(", "),
        where_key
    );
    let update_values: Vec<String> = if update_fields.is_empty() {
        Vec::new()
    } else {
        update_fields
            .iter()
            .map(|f| format!("record.{}", f.name))
            .chain(record_key.iter().cloned())
            .collect()
    };

    let finders: Vec<Value> = plan
        .finders
        .iter()
        .filter_map(|finder| {
            let field = fields.iter().find(|f| f.column.name == finder.column)?;
            let doc = match &finder.origin {
                FinderOrigin::ForeignKey { table, column } => {
                    format!("Rows whose {} references {}.{}.", finder.column, table, column)
                }
                FinderOrigin::Audit => format!("Rows recorded with the given {}.", finder.column),
                FinderOrigin::Lookup => format!("Rows with the given {}.", finder.column),
            };
            Some(context! {
                method => format!("find_by_{}", field.name),
                param => &field.name,
                annotation => python_type(&field.column.target_type, field.column.is_nullable),
                sql => py_str(&format!(
                    "{} WHERE {} IS NOT DISTINCT FROM %s{}",
                    select,
                    field.sql_name(),
                    order_by
                )),
                doc => doc_escape(&doc),
            })
        })
        .collect();

    let mut imports = BTreeSet::new();
    imports.insert("from typing import Any".to_string());
    for field in &key_fields {
        collect_type_imports(&field.column.target_type, &mut imports);
    }
    for finder in &plan.finders {
        if let Some(column) = table.column(&finder.column) {
            collect_type_imports(&column.target_type, &mut imports);
        }
    }

    let mut runtime_imports = Vec::new();
    if shape.captures_generated_key() {
        runtime_imports.push("DataAccessError");
    }
    if shape.is_keyed() {
        runtime_imports.push("NotFoundError");
    }

    let shape_name = match shape {
        KeyShape::SingleGeneratedId { .. } => "single_generated",
        KeyShape::CustomSingleKey { .. } => "custom_single",
        KeyShape::CompositeKey(_) => "composite",
        KeyShape::NoPrimaryKey => "none",
    };

    let returning = key_fields
        .first()
        .map(|f| format!(" RETURNING {}", f.sql_name()))
        .unwrap_or_default();

    context! {
        header => header(&format!("{}.{}", table.schema, table.name)),
        imports => imports.into_iter().collect::<Vec<_>>(),
        runtime_imports => runtime_imports,
        record_module => &summary.record_module,
        record_class => &summary.record_class,
        dao_class => &summary.dao_class,
        table_literal => py_str(&qualified),
        table_name_literal => py_str(&table.name),
        table_doc => format!("{}.{}", table.schema, table.name),
        shape => shape_name,
        keyed => shape.is_keyed(),
        checks_existence => shape.save_checks_existence(),
        shape_label => shape.label(),
        fields => fields.iter().map(|f| context! { name => &f.name }).collect::<Vec<_>>(),
        key_fields => key_fields.iter().map(|f| context! { name => &f.name }).collect::<Vec<_>>(),
        key_params => key_params,
        key_args => key_args,
        record_key_args => record_key.join(", "),
        record_key_tuple => py_tuple(&record_key),
        insert_columns => insert_columns,
        insert_values => insert_values,
        insert_optional => insert_optional,
        returning_literal => py_str(&returning),
        missing_key_message => py_str(&format!("insert into {} returned no generated key", table.name)),
        update_sql => py_str(&update_sql),
        update_values => update_values,
        find_by_pk_sql => py_str(&format!("{} WHERE {}", select, where_key)),
        exists_sql => py_str(&format!("SELECT 1 FROM {} WHERE {} LIMIT 1", qualified, where_key)),
        delete_sql => py_str(&format!("DELETE FROM {} WHERE {}", qualified, where_key)),
        find_all_sql => py_str(&format!("{}{}", select, order_by)),
        count_sql => py_str(&format!("SELECT count(*) FROM {}", qualified)),
        finders => finders,
    }
}

/// Convert a target type to a Python annotation
fn python_type(target: &TargetType, optional: bool) -> String {
    let base_type = match target {
        TargetType::Int32 | TargetType::Int64 => "int".to_string(),
        TargetType::Boolean => "bool".to_string(),
        TargetType::Text => "str".to_string(),
        TargetType::Float32 | TargetType::Float64 => "float".to_string(),
        TargetType::Decimal => "Decimal".to_string(),
        TargetType::Timestamp | TargetType::TimestampTz => "datetime".to_string(),
        TargetType::Date => "date".to_string(),
        TargetType::Time => "time".to_string(),
        TargetType::Interval => "timedelta".to_string(),
        TargetType::Uuid => "UUID".to_string(),
        TargetType::Document => "dict[str, Any]".to_string(),
        TargetType::Bytes => "bytes".to_string(),
        TargetType::Array(inner) => format!("list[{}]", python_type(inner, false)),
    };

    if optional {
        format!("{} | None", base_type)
    } else {
        base_type
    }
}

/// Collect imports needed for a specific target type
fn collect_type_imports(target: &TargetType, imports: &mut BTreeSet<String>) {
    let import = match target {
        TargetType::Decimal => "from decimal import Decimal",
        TargetType::Timestamp | TargetType::TimestampTz => "from datetime import datetime",
        TargetType::Date => "from datetime import date",
        TargetType::Time => "from datetime import time",
        TargetType::Interval => "from datetime import timedelta",
        TargetType::Uuid => "from uuid import UUID",
        TargetType::Document => "from typing import Any",
        TargetType::Array(inner) => return collect_type_imports(inner, imports),
        _ => return,
    };
    imports.insert(import.to_string());
}

/// Python string literal, double-quoted unless that needs more escaping
fn py_str(s: &str) -> String {
    let quote = if s.contains('"') && !s.contains('\'') { '\'' } else { '"' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn py_tuple(items: &[String]) -> String {
    match items {
        [single] => format!("({},)", single),
        _ => format!("({})", items.join(", ")),
    }
}

/// Bounds keep their catalog text, so wide integers stay exact
fn py_number(value: &Bound, target: &TargetType) -> String {
    match target {
        TargetType::Decimal => format!("Decimal({})", py_str(value.as_str())),
        _ => value.to_string(),
    }
}

/// Enum members compare as the column's type when they parse as it
fn py_enum_value(value: &str, target: &TargetType) -> String {
    let trimmed = value.trim();
    match target {
        TargetType::Int32 | TargetType::Int64 => trimmed
            .parse::<i64>()
            .map(|n| n.to_string())
            .unwrap_or_else(|_| py_str(value)),
        TargetType::Float32 | TargetType::Float64 => trimmed
            .parse::<f64>()
            .map(|n| format!("{:?}", n))
            .unwrap_or_else(|_| py_str(value)),
        TargetType::Decimal if trimmed.parse::<f64>().is_ok() => {
            format!("Decimal({})", py_str(trimmed))
        }
        _ => py_str(value),
    }
}

/// Python identifier for a catalog name
fn py_ident(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if RESERVED.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}

fn doc_escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"")
}
