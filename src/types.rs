//! Catalog type mapping
//!
//! Resolves a catalog type name to the target-language field type. The
//! mapping is total: names it does not recognise resolve to [`TargetType::Text`].

/// Field type a column resolves to in generated code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetType {
    Text,
    Int32,
    Int64,
    Float32,
    Float64,
    Decimal,
    Boolean,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Interval,
    Uuid,
    /// JSON and other semi-structured documents
    Document,
    Bytes,
    Array(Box<TargetType>),
}

impl TargetType {
    pub fn is_integer(&self) -> bool {
        matches!(self, TargetType::Int32 | TargetType::Int64)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, TargetType::Text)
    }

    /// Whether values of this type are ordered numbers a Range can bound
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TargetType::Int32
                | TargetType::Int64
                | TargetType::Float32
                | TargetType::Float64
                | TargetType::Decimal
        )
    }
}

/// Map a catalog type name to its target type
///
/// Accepts both the short internal names (`int4`, `varchar`, `_text`) and the
/// SQL spellings (`integer`, `character varying(255)`, `text[]`). Length and
/// precision modifiers are ignored; they are reported separately as the
/// column size.
pub fn map_type(type_name: &str) -> TargetType {
    let lower = type_name.trim().to_lowercase();

    if let Some(inner) = lower.strip_suffix("[]") {
        return TargetType::Array(Box::new(map_type(inner)));
    }
    if let Some(inner) = lower.strip_prefix('_') {
        return TargetType::Array(Box::new(map_type(inner)));
    }

    let base = match lower.find('(') {
        Some(open) => {
            // "timestamp(3) with time zone" keeps its suffix
            let close = lower[open..].find(')').map(|i| open + i + 1).unwrap_or(lower.len());
            format!("{}{}", lower[..open].trim_end(), &lower[close..])
        }
        None => lower,
    };

    match base.trim() {
        "text" | "varchar" | "character varying" | "char" | "character" | "bpchar" | "name"
        | "citext" => TargetType::Text,
        "smallint" | "int2" | "integer" | "int" | "int4" | "smallserial" | "serial2"
        | "serial" | "serial4" => TargetType::Int32,
        "bigint" | "int8" | "bigserial" | "serial8" => TargetType::Int64,
        "real" | "float4" => TargetType::Float32,
        "double precision" | "float8" | "float" => TargetType::Float64,
        "numeric" | "decimal" | "money" => TargetType::Decimal,
        "boolean" | "bool" => TargetType::Boolean,
        "date" => TargetType::Date,
        "time" | "time without time zone" | "time with time zone" | "timetz" => TargetType::Time,
        "timestamp" | "timestamp without time zone" => TargetType::Timestamp,
        "timestamptz" | "timestamp with time zone" => TargetType::TimestampTz,
        "interval" => TargetType::Interval,
        "uuid" => TargetType::Uuid,
        "json" | "jsonb" | "xml" | "hstore" => TargetType::Document,
        "bytea" => TargetType::Bytes,
        _ => TargetType::Text,
    }
}
