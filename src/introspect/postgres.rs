use postgres::{Client, NoTls, Row};
use tracing::{error, info, trace};

use super::{CatalogReader, RawCheckConstraint, RawColumn, RawForeignKey};
use crate::config::DbConfig;
use crate::prelude::DaoforgeError;
use crate::schema::{IndexModel, UniqueConstraintModel};

/// Open a client for the configured database
pub fn connect_postgres(config: &DbConfig) -> Result<Client, DaoforgeError> {
    info!(connection = ?config.redacted_connection_string(), "Connecting to PostgreSQL");

    let client = Client::connect(&config.postgres_connection_string(), NoTls).map_err(|e| {
        DaoforgeError::Connection(format!("{} ({})", e, config.redacted_connection_string()))
    })?;

    info!("Connected to database");
    Ok(client)
}

/// PostgreSQL catalog reader
///
/// Issues read-only queries against `pg_catalog`. The client is borrowed
/// exclusively for the lifetime of the reader.
pub struct PostgresCatalog<'a> {
    client: &'a mut Client,
}

impl<'a> PostgresCatalog<'a> {
    pub fn new(client: &'a mut Client) -> Self {
        Self { client }
    }

    fn query(
        &mut self,
        sql: &str,
        schema_name: &str,
        table_name: &str,
        what: &str,
    ) -> Result<Vec<Row>, DaoforgeError> {
        trace!(schema = ?schema_name, table = ?table_name, "Querying {}", what);

        self.client
            .query(sql, &[&table_name, &schema_name])
            .map_err(|e| {
                error!(
                    schema = ?schema_name,
                    table = ?table_name,
                    error = ?e,
                    "Failed to query {}", what
                );
                DaoforgeError::Introspection {
                    schema: schema_name.to_string(),
                    message: format!("Failed to query {} for table '{}': {}", what, table_name, e),
                }
            })
    }
}

impl CatalogReader for PostgresCatalog<'_> {
    fn tables(&mut self, schema_name: &str) -> Result<Vec<String>, DaoforgeError> {
        trace!(schema = ?schema_name, "Querying tables");

        let sql = r#"
            SELECT c.relname AS table_name
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE c.relkind IN ('r', 'p')
                AND n.nspname = $1
            ORDER BY c.relname
        "#;

        let rows = self
            .client
            .query(sql, &[&schema_name])
            .map_err(|e| {
                error!(schema = ?schema_name, error = ?e, "Failed to query tables");
                DaoforgeError::Introspection {
                    schema: schema_name.to_string(),
                    message: format!("Failed to query tables: {}", e),
                }
            })?;

        let tables = rows.iter().map(|row| row.get("table_name")).collect();
        trace!(tables = ?tables, "Tables found");
        Ok(tables)
    }

    fn columns(
        &mut self,
        schema_name: &str,
        table_name: &str,
    ) -> Result<Vec<RawColumn>, DaoforgeError> {
        let sql = r#"
            SELECT
                a.attname AS column_name,
                format_type(a.atttypid, NULL) AS type_name,
                CASE
                    WHEN a.atttypmod > 0 AND t.typname IN ('varchar', 'bpchar')
                        THEN a.atttypmod - 4
                    WHEN a.atttypmod > 0 AND t.typname = 'numeric'
                        THEN ((a.atttypmod - 4) >> 16) & 65535
                    ELSE NULL
                END AS size,
                NOT a.attnotnull AS is_nullable,
                a.attidentity IN ('a', 'd') AS is_identity,
                pg_get_expr(d.adbin, d.adrelid) AS default_value
            FROM pg_attribute a
            JOIN pg_class c ON c.oid = a.attrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_type t ON t.oid = a.atttypid
            LEFT JOIN pg_attrdef d ON d.adrelid = c.oid AND d.adnum = a.attnum
            WHERE c.relname = $1
                AND n.nspname = $2
                AND a.attnum > 0
                AND NOT a.attisdropped
            ORDER BY a.attnum
        "#;

        let rows = self.query(sql, schema_name, table_name, "columns")?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let default_value: Option<String> = row.get("default_value");
            let is_identity: bool = row.get("is_identity");
            let size: Option<i32> = row.get("size");

            let column = RawColumn {
                name: row.get("column_name"),
                type_name: row.get("type_name"),
                size: size.and_then(|s| u32::try_from(s).ok()),
                is_nullable: row.get("is_nullable"),
                is_auto_generated: is_identity || is_sequence_default(default_value.as_deref()),
                default_value,
            };
            trace!(column = ?column, "Parsed column");
            columns.push(column);
        }

        Ok(columns)
    }

    fn primary_key(
        &mut self,
        schema_name: &str,
        table_name: &str,
    ) -> Result<Vec<String>, DaoforgeError> {
        let sql = r#"
            SELECT a.attname AS column_name
            FROM pg_constraint con
            JOIN pg_class c ON c.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(con.conkey)
            WHERE con.contype = 'p'
                AND c.relname = $1
                AND n.nspname = $2
            ORDER BY array_position(con.conkey, a.attnum)
        "#;

        let rows = self.query(sql, schema_name, table_name, "primary key")?;
        Ok(rows.iter().map(|row| row.get("column_name")).collect())
    }

    fn foreign_keys(
        &mut self,
        schema_name: &str,
        table_name: &str,
    ) -> Result<Vec<RawForeignKey>, DaoforgeError> {
        let sql = r#"
            SELECT
                a.attname AS column_name,
                rc.relname AS referenced_table,
                ra.attname AS referenced_column
            FROM pg_constraint con
            JOIN pg_class c ON c.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_class rc ON rc.oid = con.confrelid
            CROSS JOIN LATERAL unnest(con.conkey, con.confkey) AS k(attnum, refnum)
            JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum
            JOIN pg_attribute ra ON ra.attrelid = rc.oid AND ra.attnum = k.refnum
            WHERE con.contype = 'f'
                AND c.relname = $1
                AND n.nspname = $2
            ORDER BY con.conname, a.attnum
        "#;

        let rows = self.query(sql, schema_name, table_name, "foreign keys")?;
        Ok(rows
            .iter()
            .map(|row| RawForeignKey {
                column: row.get("column_name"),
                referenced_table: row.get("referenced_table"),
                referenced_column: row.get("referenced_column"),
            })
            .collect())
    }

    fn indexes(
        &mut self,
        schema_name: &str,
        table_name: &str,
    ) -> Result<Vec<IndexModel>, DaoforgeError> {
        let sql = r#"
            SELECT
                i.relname AS index_name,
                ix.indisunique AS is_unique,
                a.attname AS column_name
            FROM pg_index ix
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_class c ON c.oid = ix.indrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            CROSS JOIN LATERAL unnest(ix.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord)
            JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = k.attnum
            WHERE c.relname = $1
                AND n.nspname = $2
            ORDER BY i.relname, k.ord
        "#;

        let rows = self.query(sql, schema_name, table_name, "indexes")?;

        // Group index columns by index name; rows arrive ordered by name
        let mut indexes: Vec<IndexModel> = Vec::new();
        for row in rows {
            let name: String = row.get("index_name");
            let column: String = row.get("column_name");
            match indexes.last_mut() {
                Some(last) if last.name == name => last.columns.push(column),
                _ => indexes.push(IndexModel {
                    name,
                    is_unique: row.get("is_unique"),
                    columns: vec![column],
                }),
            }
        }
        Ok(indexes)
    }

    fn check_constraints(
        &mut self,
        schema_name: &str,
        table_name: &str,
    ) -> Result<Vec<RawCheckConstraint>, DaoforgeError> {
        let sql = r#"
            SELECT
                con.conname AS constraint_name,
                pg_get_constraintdef(con.oid) AS clause,
                array_agg(a.attname::text ORDER BY a.attnum) AS columns
            FROM pg_constraint con
            JOIN pg_class c ON c.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(con.conkey)
            WHERE con.contype = 'c'
                AND c.relname = $1
                AND n.nspname = $2
            GROUP BY con.oid, con.conname
            ORDER BY con.conname
        "#;

        let rows = self.query(sql, schema_name, table_name, "check constraints")?;
        Ok(rows
            .iter()
            .map(|row| RawCheckConstraint {
                name: row.get("constraint_name"),
                clause: row.get("clause"),
                columns: row.get("columns"),
            })
            .collect())
    }

    fn unique_constraints(
        &mut self,
        schema_name: &str,
        table_name: &str,
    ) -> Result<Vec<UniqueConstraintModel>, DaoforgeError> {
        let sql = r#"
            SELECT
                con.conname AS constraint_name,
                array_agg(a.attname::text ORDER BY array_position(con.conkey, a.attnum)) AS columns
            FROM pg_constraint con
            JOIN pg_class c ON c.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(con.conkey)
            WHERE con.contype = 'u'
                AND c.relname = $1
                AND n.nspname = $2
            GROUP BY con.oid, con.conname
            ORDER BY con.conname
        "#;

        let rows = self.query(sql, schema_name, table_name, "unique constraints")?;
        Ok(rows
            .iter()
            .map(|row| UniqueConstraintModel {
                name: row.get("constraint_name"),
                columns: row.get("columns"),
            })
            .collect())
    }
}

/// SERIAL/BIGSERIAL columns have nextval('sequence_name') as default
fn is_sequence_default(default_value: Option<&str>) -> bool {
    default_value.is_some_and(|default| default.to_lowercase().contains("nextval("))
}
