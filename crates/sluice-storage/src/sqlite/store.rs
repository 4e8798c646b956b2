//! [`SqliteRelational`] -- SQLite-backed relational driver.
//!
//! SQLite has no `MODIFY COLUMN`, so type widening rebuilds the table:
//! create a shadow table with the new declaration, copy rows, drop the
//! original, rename, and replay the surviving index DDL. MySQL-style type
//! names are kept in the declarations; SQLite accepts any type name and
//! applies its affinity rules.

use std::path::Path;

use rusqlite::Connection;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, StorageError};
use crate::sqlite::values::{from_sql_value, quote_ident, to_sql_value};
use crate::traits::{Document, RelationalStore, TableSpec};

/// Surrogate key column present in every table; carries inserts while no
/// primary key has been discovered.
pub const SURROGATE_COLUMN: &str = "sys_row_id";

/// Embedded implementation of [`RelationalStore`] on rusqlite.
pub struct SqliteRelational {
    conn: Connection,
}

impl SqliteRelational {
    /// Opens (or creates) a SQLite database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(?path, "opening SQLite database");
        let conn = Connection::open(path).map_err(|e| {
            StorageError::Connection(format!("failed to open {}: {e}", path.display()))
        })?;
        let store = Self { conn };
        store.configure_connection()?;
        Ok(store)
    }

    /// Opens an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        debug!("opening in-memory SQLite database");
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(format!("failed to open in-memory db: {e}")))?;
        let store = Self { conn };
        store.configure_connection()?;
        Ok(store)
    }

    /// Sets connection pragmas (WAL mode, busy timeout).
    fn configure_connection(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA busy_timeout = 5000;",
            )
            .map_err(|e| StorageError::Connection(format!("failed to set pragmas: {e}")))?;
        Ok(())
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// `(name, declared type, notnull)` for every column except the
    /// surrogate.
    fn column_info(&self, table: &str) -> Result<Vec<(String, String, bool)>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
        let rows = stmt.query_map([], |row| {
            let name: String = row.get(1)?;
            let decl: String = row.get(2)?;
            let notnull: i64 = row.get(3)?;
            Ok((name, decl, notnull != 0))
        })?;
        let mut columns = Vec::new();
        for row in rows {
            let (name, decl, notnull) = row?;
            if name != SURROGATE_COLUMN {
                columns.push((name, decl, notnull));
            }
        }
        Ok(columns)
    }

    /// Creates a unique index for the column, degrading to a warning when
    /// existing data already violates uniqueness.
    fn ensure_unique_index(&mut self, table: &str, column: &str) {
        let index = format!("idx_{table}_{column}_unique");
        let ddl = format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
            quote_ident(&index),
            quote_ident(table),
            quote_ident(column)
        );
        if let Err(e) = self.conn.execute_batch(&ddl) {
            warn!(table, column, error = %e, "unique index not created");
        }
    }

    /// Indexes that reference the given column.
    fn indexes_on_column(&self, table: &str, column: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("PRAGMA index_list({})", quote_ident(table)))?;
        let names: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<_, _>>()?;

        let mut matching = Vec::new();
        for name in names {
            let mut info = self
                .conn
                .prepare(&format!("PRAGMA index_info({})", quote_ident(&name)))?;
            let cols: Vec<String> = info
                .query_map([], |row| row.get::<_, String>(2))?
                .collect::<std::result::Result<_, _>>()?;
            if cols.iter().any(|c| c == column) {
                matching.push(name);
            }
        }
        Ok(matching)
    }
}

impl RelationalStore for SqliteRelational {
    fn ensure_table(&mut self, spec: &TableSpec) -> Result<()> {
        if !self.table_exists(&spec.name)? {
            let mut columns = vec![format!(
                "{} INTEGER PRIMARY KEY AUTOINCREMENT",
                quote_ident(SURROGATE_COLUMN)
            )];
            for col in &spec.columns {
                let nullability = if col.nullable { "" } else { " NOT NULL" };
                columns.push(format!(
                    "{} {}{nullability}",
                    quote_ident(&col.name),
                    col.sql_type
                ));
            }
            let ddl = format!(
                "CREATE TABLE {} (\n    {}\n)",
                quote_ident(&spec.name),
                columns.join(",\n    ")
            );
            self.conn
                .execute_batch(&ddl)
                .map_err(|e| StorageError::schema(&spec.name, e.to_string()))?;
            info!(table = %spec.name, columns = spec.columns.len(), "created table");
        } else {
            let existing: Vec<String> = self
                .column_info(&spec.name)?
                .into_iter()
                .map(|(name, _, _)| name)
                .collect();
            for col in &spec.columns {
                if existing.contains(&col.name) {
                    continue;
                }
                let ddl = format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_ident(&spec.name),
                    quote_ident(&col.name),
                    col.sql_type
                );
                self.conn
                    .execute_batch(&ddl)
                    .map_err(|e| StorageError::schema(&spec.name, e.to_string()))?;
                debug!(table = %spec.name, column = %col.name, sql_type = %col.sql_type, "added column");
            }
        }

        for col in &spec.columns {
            if col.unique {
                self.ensure_unique_index(&spec.name, &col.name);
            }
        }
        Ok(())
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        if !self.table_exists(table)? {
            return Ok(Vec::new());
        }
        Ok(self
            .column_info(table)?
            .into_iter()
            .map(|(name, _, _)| name)
            .collect())
    }

    fn modify_column_type(&mut self, table: &str, column: &str, sql_type: &str) -> Result<()> {
        let columns = self.column_info(table)?;
        if !columns.iter().any(|(name, _, _)| name == column) {
            return Err(StorageError::NotFound {
                entity: "column".to_string(),
                id: format!("{table}.{column}"),
            });
        }

        // Save index DDL before the rebuild drops it with the table.
        let mut stmt = self.conn.prepare(
            "SELECT sql FROM sqlite_master
             WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL",
        )?;
        let index_ddl: Vec<String> = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<_, _>>()?;
        drop(stmt);

        let shadow = format!("{table}__widen");
        let mut declarations = vec![format!(
            "{} INTEGER PRIMARY KEY AUTOINCREMENT",
            quote_ident(SURROGATE_COLUMN)
        )];
        let mut names = vec![quote_ident(SURROGATE_COLUMN)];
        for (name, decl, _) in &columns {
            let decl = if name == column { sql_type } else { decl };
            declarations.push(format!("{} {}", quote_ident(name), decl));
            names.push(quote_ident(name));
        }
        let column_list = names.join(", ");

        let tx = self
            .conn
            .transaction()
            .map_err(|e| StorageError::schema(table, e.to_string()))?;
        let rebuild = || -> rusqlite::Result<()> {
            tx.execute_batch(&format!(
                "CREATE TABLE {} (\n    {}\n)",
                quote_ident(&shadow),
                declarations.join(",\n    ")
            ))?;
            tx.execute_batch(&format!(
                "INSERT INTO {shadow_q} ({column_list}) SELECT {column_list} FROM {table_q}",
                shadow_q = quote_ident(&shadow),
                table_q = quote_ident(table),
            ))?;
            tx.execute_batch(&format!("DROP TABLE {}", quote_ident(table)))?;
            tx.execute_batch(&format!(
                "ALTER TABLE {} RENAME TO {}",
                quote_ident(&shadow),
                quote_ident(table)
            ))?;
            for ddl in &index_ddl {
                tx.execute_batch(ddl)?;
            }
            Ok(())
        };
        rebuild().map_err(|e| StorageError::schema(table, e.to_string()))?;
        tx.commit()
            .map_err(|e| StorageError::schema(table, e.to_string()))?;

        info!(table, column, sql_type, "widened column via table rebuild");
        Ok(())
    }

    fn drop_column(&mut self, table: &str, column: &str) -> Result<()> {
        // SQLite refuses to drop an indexed column; drop its indexes first.
        for index in self.indexes_on_column(table, column)? {
            self.conn
                .execute_batch(&format!("DROP INDEX IF EXISTS {}", quote_ident(&index)))
                .map_err(|e| StorageError::schema(table, e.to_string()))?;
        }
        self.conn
            .execute_batch(&format!(
                "ALTER TABLE {} DROP COLUMN {}",
                quote_ident(table),
                quote_ident(column)
            ))
            .map_err(|e| StorageError::schema(table, e.to_string()))?;
        info!(table, column, "dropped column");
        Ok(())
    }

    fn upsert(&mut self, table: &str, key_column: Option<&str>, row: &Document) -> Result<()> {
        if row.is_empty() {
            return Ok(());
        }

        // Update-then-insert keyed on the discovered primary key alone;
        // works with or without a unique index on the key.
        if let Some(key) = key_column {
            if let Some(key_value) = row.get(key) {
                let updates: Vec<&String> = row.keys().filter(|k| k.as_str() != key).collect();
                if !updates.is_empty() {
                    let assignments = updates
                        .iter()
                        .enumerate()
                        .map(|(i, k)| format!("{} = ?{}", quote_ident(k), i + 2))
                        .collect::<Vec<_>>()
                        .join(", ");
                    let sql = format!(
                        "UPDATE {} SET {assignments} WHERE {} = ?1",
                        quote_ident(table),
                        quote_ident(key)
                    );
                    let mut params = vec![to_sql_value(key_value)];
                    params.extend(updates.iter().map(|k| to_sql_value(&row[k.as_str()])));
                    let changed = self
                        .conn
                        .execute(&sql, rusqlite::params_from_iter(params))?;
                    if changed > 0 {
                        return Ok(());
                    }
                } else {
                    let exists: i64 = self.conn.query_row(
                        &format!(
                            "SELECT COUNT(*) FROM {} WHERE {} = ?1",
                            quote_ident(table),
                            quote_ident(key)
                        ),
                        [to_sql_value(key_value)],
                        |r| r.get(0),
                    )?;
                    if exists > 0 {
                        return Ok(());
                    }
                }
            }
        }

        let columns: Vec<&String> = row.keys().collect();
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let column_list = columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
            quote_ident(table)
        );
        let params = columns.iter().map(|c| to_sql_value(&row[c.as_str()]));
        self.conn.execute(&sql, rusqlite::params_from_iter(params))?;
        Ok(())
    }

    fn select_pairs(
        &self,
        table: &str,
        key_column: &str,
        column: &str,
    ) -> Result<Vec<(Value, Value)>> {
        let sql = format!(
            "SELECT {key}, {col} FROM {tbl} WHERE {col} IS NOT NULL",
            key = quote_ident(key_column),
            col = quote_ident(column),
            tbl = quote_ident(table),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, rusqlite::types::Value>(0)?,
                row.get::<_, rusqlite::types::Value>(1)?,
            ))
        })?;
        let mut pairs = Vec::new();
        for row in rows {
            let (k, v) = row?;
            pairs.push((from_sql_value(k), from_sql_value(v)));
        }
        Ok(pairs)
    }

    fn update_value(
        &mut self,
        table: &str,
        key_column: &str,
        key: &Value,
        column: &str,
        value: &Value,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET {} = ?1 WHERE {} = ?2",
            quote_ident(table),
            quote_ident(column),
            quote_ident(key_column)
        );
        self.conn
            .execute(&sql, rusqlite::params![to_sql_value(value), to_sql_value(key)])?;
        Ok(())
    }

    fn count_rows(&self, table: &str) -> Result<u64> {
        if !self.table_exists(table)? {
            return Ok(0);
        }
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn drop_table(&mut self, table: &str) -> Result<()> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(table)))
            .map_err(|e| StorageError::schema(table, e.to_string()))?;
        Ok(())
    }
}
