//! Schema data structures
//!
//! These types represent one table's enriched catalog metadata and form the
//! contract between introspection (produces) and code generation (consumes).
//! A [`TableModel`] is built once per table, never mutated afterwards, and
//! dropped once both of its artifacts are written.

use std::collections::BTreeMap;
use std::fmt;

use crate::types::TargetType;

/// A table and everything the catalog says about it
#[derive(Debug, Clone, PartialEq)]
pub struct TableModel {
    /// Schema the table lives in
    pub schema: String,
    pub name: String,
    /// Columns in catalog ordinal order
    pub columns: Vec<ColumnModel>,
    /// Column names that form the primary key (in key order)
    pub primary_key: Vec<String>,
    /// Foreign-key column -> referenced (table, column)
    pub foreign_keys: BTreeMap<String, ForeignKeyRef>,
    pub indexes: BTreeMap<String, IndexModel>,
    pub unique_constraints: BTreeMap<String, UniqueConstraintModel>,
}

/// Referenced side of a foreign-key edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

/// A table column
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnModel {
    pub name: String,
    /// Type name as reported by the catalog
    pub catalog_type: String,
    pub target_type: TargetType,
    /// Declared length or precision, when the catalog reports one
    pub size: Option<u32>,
    pub is_nullable: bool,
    /// Column is auto-generated (SERIAL, BIGSERIAL, IDENTITY)
    pub is_auto_generated: bool,
    /// Raw default expression, uninterpreted
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    /// Rules inferred from check-constraint text
    pub constraints: Vec<SemanticConstraint>,
}

impl ColumnModel {
    /// Column has a server-side default (DEFAULT value, NOW(), sequence)
    pub fn has_default(&self) -> bool {
        self.default_value.is_some() || self.is_auto_generated
    }

    /// Maximum length implied by the declared size of a text column
    ///
    /// Independent of any `Length` rule inferred from check constraints.
    pub fn max_length(&self) -> Option<u32> {
        match self.size {
            Some(size) if size > 0 && self.target_type.is_text() => Some(size),
            _ => None,
        }
    }
}

/// A validation rule inferred from a check constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemanticConstraint {
    Range { min: Option<Bound>, max: Option<Bound> },
    /// Allowed values in declaration order, case-sensitive as written
    Enum(Vec<String>),
    Length(u32),
    /// POSIX regular expression, verbatim
    Pattern(String),
}

/// A numeric range bound kept as the decimal text of the clause
///
/// Never converted to a float, so wide integer and exact decimal bounds
/// survive unchanged. Leading zeros of the integer part are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bound(String);

impl Bound {
    /// Accepts `-?digits(.digits)?`
    pub fn parse(text: &str) -> Option<Self> {
        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (whole, fraction) = match digits.split_once('.') {
            Some((whole, fraction)) => (whole, Some(fraction)),
            None => (digits, None),
        };

        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !fraction.map_or(true, all_digits) {
            return None;
        }

        let whole = match whole.trim_start_matches('0') {
            "" => "0",
            trimmed => trimmed,
        };
        let mut out = String::with_capacity(text.len());
        if negative {
            out.push('-');
        }
        out.push_str(whole);
        if let Some(fraction) = fraction {
            out.push('.');
            out.push_str(fraction);
        }
        Some(Self(out))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_integral(&self) -> bool {
        !self.0.contains('.')
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index descriptor, used for documentation only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexModel {
    pub name: String,
    pub is_unique: bool,
    pub columns: Vec<String>,
}

/// Unique constraint descriptor, used for documentation only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueConstraintModel {
    pub name: String,
    pub columns: Vec<String>,
}

impl TableModel {
    /// Returns singular form of the class name (basic heuristic)
    ///
    /// This is the table's derived type name: the record class and both
    /// artifact file names come from it.
    pub fn singular_class_name(&self) -> String {
        to_pascal_case(&self.singular_name())
    }

    /// Returns singular form of the table name in snake_case (basic heuristic)
    pub fn singular_name(&self) -> String {
        singularize(&self.name.to_lowercase())
    }

    pub fn column(&self, name: &str) -> Option<&ColumnModel> {
        self.columns.iter().find(|col| col.name == name)
    }

    /// Get primary key columns in key order
    pub fn primary_key_columns(&self) -> Vec<&ColumnModel> {
        self.primary_key
            .iter()
            .filter_map(|pk_name| self.column(pk_name))
            .collect()
    }

    /// Columns that identify a record for equality and display
    ///
    /// The primary key when there is one, every column otherwise.
    pub fn identity_columns(&self) -> Vec<&ColumnModel> {
        if self.primary_key.is_empty() {
            self.columns.iter().collect()
        } else {
            self.primary_key_columns()
        }
    }

    /// Schema-qualified, quoted table reference for SQL
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }
}

fn singularize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        format!("{}y", stem)
    } else if name.ends_with("sses") || name.ends_with("xes") {
        name[..name.len() - 2].to_string()
    } else if name.ends_with('s') && !name.ends_with("ss") && !name.ends_with("us") {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

/// Convert snake_case to PascalCase
///
/// This is a shared utility used by code generators for all target languages.
pub fn to_pascal_case(s: &str) -> String {
    s.split(|c: char| c == '_' || c == ' ' || c == '-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(first) => first.to_uppercase().chain(chars).collect(),
            }
        })
        .collect()
}

/// Double-quote a SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> TableModel {
        TableModel {
            schema: "public".to_string(),
            name: name.to_string(),
            columns: vec![],
            primary_key: vec![],
            foreign_keys: BTreeMap::new(),
            indexes: BTreeMap::new(),
            unique_constraints: BTreeMap::new(),
        }
    }

    fn column(name: &str, target_type: TargetType, size: Option<u32>) -> ColumnModel {
        ColumnModel {
            name: name.to_string(),
            catalog_type: "varchar".to_string(),
            target_type,
            size,
            is_nullable: false,
            is_auto_generated: false,
            default_value: None,
            is_primary_key: false,
            is_foreign_key: false,
            constraints: vec![],
        }
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(to_pascal_case("order_line_items"), "OrderLineItems");
        assert_eq!(to_pascal_case("order line-items"), "OrderLineItems");
    }

    #[test]
    fn test_singular_class_name_regular_plural() {
        assert_eq!(table("users").singular_class_name(), "User");
        assert_eq!(table("user_accounts").singular_class_name(), "UserAccount");
    }

    #[test]
    fn test_singular_class_name_ies_plural() {
        assert_eq!(table("categories").singular_class_name(), "Category");
    }

    #[test]
    fn test_singular_class_name_no_change() {
        assert_eq!(table("staff").singular_class_name(), "Staff");
        assert_eq!(table("status").singular_class_name(), "Status");
        assert_eq!(table("address").singular_class_name(), "Address");
    }

    #[test]
    fn test_singular_name_es_plural() {
        assert_eq!(table("addresses").singular_name(), "address");
        assert_eq!(table("boxes").singular_name(), "box");
    }

    #[test]
    fn test_max_length_only_for_sized_text() {
        assert_eq!(column("a", TargetType::Text, Some(40)).max_length(), Some(40));
        assert_eq!(column("a", TargetType::Text, Some(0)).max_length(), None);
        assert_eq!(column("a", TargetType::Text, None).max_length(), None);
        assert_eq!(column("a", TargetType::Decimal, Some(10)).max_length(), None);
    }

    #[test]
    fn test_identity_columns_fall_back_to_all() {
        let mut t = table("events");
        t.columns = vec![
            column("id", TargetType::Int64, None),
            column("label", TargetType::Text, None),
        ];
        assert_eq!(t.identity_columns().len(), 2);

        t.primary_key = vec!["id".to_string()];
        let ids: Vec<_> = t.identity_columns().iter().map(|c| c.name.clone()).collect();
        assert_eq!(ids, vec!["id"]);
    }

    #[test]
    fn test_qualified_name_quotes_identifiers() {
        assert_eq!(table("users").qualified_name(), "\"public\".\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_bound_keeps_wide_integers_exact() {
        let bound = Bound::parse("9007199254740993").unwrap();
        assert_eq!(bound.as_str(), "9007199254740993");
        assert!(bound.is_integral());
    }

    #[test]
    fn test_bound_canonical_text() {
        assert_eq!(Bound::parse("007").unwrap().as_str(), "7");
        assert_eq!(Bound::parse("-0.50").unwrap().as_str(), "-0.50");
        assert_eq!(Bound::parse("9999.99").unwrap().to_string(), "9999.99");
        assert!(!Bound::parse("1.5").unwrap().is_integral());
        assert!(Bound::parse("1.").is_none());
        assert!(Bound::parse("abc").is_none());
        assert!(Bound::parse("").is_none());
    }
}
