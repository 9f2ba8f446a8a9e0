//! DuckDB-backed store
//!
//! Partitions are rows of a `_partitions` catalog table, each exposed as a
//! view over the parent table. Inserts reject rows whose key has no
//! partition, the way list-partitioned tables do. Load progress lives in
//! `_load_progress`.

use super::types::{ProgressRecord, Store};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::schema::{TableColumn, TableColumnKind};
use arrow::array::{new_null_array, Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{Field, Schema as ArrowSchema, SchemaRef};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Connection;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

const PARTITIONS_TABLE: &str = "_partitions";
const PROGRESS_TABLE: &str = "_load_progress";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Store backed by an embedded DuckDB database
pub struct DuckDbStore {
    /// Base connection; each operation works on its own clone
    conn: Mutex<Connection>,
    /// Database path (for logging)
    path: String,
}

impl std::fmt::Debug for DuckDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl DuckDbStore {
    /// Open the configured database and create the catalog tables
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = if config.path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.path)
        }
        .map_err(|e| Error::store(format!("Failed to open DuckDB at '{}': {e}", config.path)))?;

        if let Some(ref limit) = config.memory_limit {
            conn.execute_batch(&format!("SET memory_limit = '{limit}';"))
                .map_err(|e| Error::config(format!("Failed to set memory limit: {e}")))?;
        }
        if let Some(threads) = config.threads {
            conn.execute_batch(&format!("SET threads = {threads};"))
                .map_err(|e| Error::config(format!("Failed to set threads: {e}")))?;
        }

        let store = Self {
            conn: Mutex::new(conn),
            path: config.path.clone(),
        };
        store.init_catalog()?;
        tracing::debug!(path = %store.path, "Opened DuckDB store");
        Ok(store)
    }

    /// In-memory database
    pub fn in_memory() -> Result<Self> {
        Self::open(&DatabaseConfig {
            path: ":memory:".to_string(),
            ..DatabaseConfig::default()
        })
    }

    fn connection(&self) -> Result<Connection> {
        let base = self
            .conn
            .lock()
            .map_err(|_| Error::store("connection lock poisoned"))?;
        Ok(base.try_clone()?)
    }

    fn init_catalog(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {PARTITIONS_TABLE} (
                parent_table VARCHAR NOT NULL,
                partition_key VARCHAR NOT NULL,
                partition_name VARCHAR NOT NULL,
                PRIMARY KEY (parent_table, partition_key)
            );
            CREATE TABLE IF NOT EXISTS {PROGRESS_TABLE} (
                table_name VARCHAR NOT NULL,
                unit_id VARCHAR NOT NULL,
                record_group VARCHAR NOT NULL,
                rows_inserted BIGINT NOT NULL,
                committed_at TIMESTAMP NOT NULL,
                PRIMARY KEY (table_name, unit_id)
            );"
        ))
        .map_err(|e| Error::store(format!("Failed to create catalog tables: {e}")))
    }

    /// Partition keys registered for a table
    pub fn partitions(&self, parent: &str) -> Result<Vec<String>> {
        let conn = self.connection()?;
        load_partitions(&conn, parent).map(|keys| {
            let mut keys: Vec<String> = keys.into_iter().collect();
            keys.sort();
            keys
        })
    }

    /// Total rows in a table
    pub fn count_rows(&self, table: &str) -> Result<u64> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote(table)), [], |row| {
            row.get(0)
        })?;
        Ok(count as u64)
    }

    /// First column of a query, rendered as text
    pub fn query_strings(&self, sql: &str) -> Result<Vec<Option<String>>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let values = stmt
            .query_map([], |row| row.get::<_, Option<String>>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(values)
    }

    /// Committed units of a table, oldest first
    pub fn progress_records(&self, table: &str) -> Result<Vec<ProgressRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT unit_id, record_group, table_name, rows_inserted, CAST(committed_at AS VARCHAR)
             FROM {PROGRESS_TABLE} WHERE table_name = ? ORDER BY committed_at, unit_id"
        ))?;
        let rows = stmt.query_map([table], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (unit_id, record_group, table_name, rows_inserted, committed_at) = row?;
            let committed_at = NaiveDateTime::parse_from_str(&committed_at, TIMESTAMP_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(&committed_at, "%Y-%m-%d %H:%M:%S"))
                .map_err(|e| Error::progress(format!("Bad timestamp '{committed_at}': {e}")))?;
            records.push(ProgressRecord {
                unit_id,
                record_group,
                table_name,
                rows_inserted: rows_inserted as u64,
                committed_at: DateTime::<Utc>::from_naive_utc_and_offset(committed_at, Utc),
            });
        }
        Ok(records)
    }
}

impl Store for DuckDbStore {
    fn table_exists(&self, name: &str) -> Result<bool> {
        let conn = self.connection()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ? AND table_type = 'BASE TABLE'",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_table(&self, name: &str, columns: &[TableColumn]) -> Result<()> {
        let definitions: Vec<String> = columns
            .iter()
            .map(|c| {
                let constraint = match c.kind {
                    TableColumnKind::Provenance => " PRIMARY KEY",
                    TableColumnKind::PartitionKey => " NOT NULL",
                    _ => "",
                };
                format!("{} {}{}", quote(&c.name), c.target_type.sql_type(), constraint)
            })
            .collect();

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} ({});",
            quote(name),
            definitions.join(", ")
        );
        tracing::debug!("Executing DDL: {}", ddl);

        let conn = self.connection()?;
        conn.execute_batch(&ddl)
            .map_err(|e| Error::store(format!("Failed to create table '{name}': {e}")))
    }

    fn create_partition(&self, parent: &str, key: &str) -> Result<()> {
        let conn = self.connection()?;
        let partition_key = partition_key_column(&conn, parent)?;
        let partition_name = format!("{parent}_{}", key.to_ascii_lowercase());

        conn.execute(
            &format!("INSERT OR IGNORE INTO {PARTITIONS_TABLE} VALUES (?, ?, ?)"),
            [parent, key, partition_name.as_str()],
        )
        .map_err(|e| Error::partition(parent, format!("Failed to register partition '{key}': {e}")))?;

        conn.execute_batch(&format!(
            "CREATE OR REPLACE VIEW {} AS SELECT * FROM {} WHERE {} = '{}';",
            quote(&partition_name),
            quote(parent),
            quote(&partition_key),
            key.replace('\'', "''")
        ))
        .map_err(|e| Error::partition(parent, format!("Failed to create partition view: {e}")))?;

        tracing::debug!(table = parent, key, "Created partition");
        Ok(())
    }

    fn bulk_insert(
        &self,
        name: &str,
        columns: &[TableColumn],
        batches: &mut dyn Iterator<Item = Result<RecordBatch>>,
    ) -> Result<u64> {
        let layout = table_layout(columns);
        let key_column = columns
            .iter()
            .find(|c| c.kind == TableColumnKind::PartitionKey)
            .map(|c| c.name.clone())
            .ok_or_else(|| Error::partition(name, "layout has no partition key column"))?;

        let mut conn = self.connection()?;
        let partitions = load_partitions(&conn, name)?;
        let tx = conn.transaction()?;

        let mut inserted: u64 = 0;
        {
            let mut appender = tx.appender(name)?;
            for batch in batches {
                let aligned = align_batch(&batch?, &layout)?;
                check_partitions(name, &aligned, &key_column, &partitions)?;
                inserted += aligned.num_rows() as u64;
                appender.append_record_batch(aligned)?;
            }
            appender.flush()?;
        }

        // Dropping the transaction on any error above rolls the unit back
        tx.commit()?;
        tracing::debug!(table = name, rows = inserted, "Committed bulk insert");
        Ok(inserted)
    }

    fn query_progress(&self, name: &str) -> Result<HashSet<String>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare(&format!("SELECT unit_id FROM {PROGRESS_TABLE} WHERE table_name = ?"))?;
        let units = stmt
            .query_map([name], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(units)
    }

    fn record_progress(&self, record: &ProgressRecord) -> Result<()> {
        let conn = self.connection()?;
        let committed_at = record.committed_at.format(TIMESTAMP_FORMAT).to_string();
        conn.execute(
            &format!(
                "INSERT INTO {PROGRESS_TABLE} (table_name, unit_id, record_group, rows_inserted, committed_at)
                 VALUES (?, ?, ?, ?, CAST(? AS TIMESTAMP))"
            ),
            duckdb::params![
                record.table_name,
                record.unit_id,
                record.record_group,
                record.rows_inserted as i64,
                committed_at
            ],
        )
        .map_err(|e| Error::progress(format!("Failed to record unit '{}': {e}", record.unit_id)))?;
        Ok(())
    }

    fn release_memory(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch("CHECKPOINT;")
            .map_err(|e| Error::store(format!("Checkpoint failed: {e}")))
    }
}

/// Double-quote an identifier
fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn load_partitions(conn: &Connection, parent: &str) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT partition_key FROM {PARTITIONS_TABLE} WHERE parent_table = ?"
    ))?;
    let keys = stmt
        .query_map([parent], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(keys)
}

/// Name of the last column of a table, which is where the layout puts the key
fn partition_key_column(conn: &Connection, table: &str) -> Result<String> {
    conn.query_row(
        "SELECT column_name FROM information_schema.columns WHERE table_name = ? ORDER BY ordinal_position DESC LIMIT 1",
        [table],
        |row| row.get::<_, String>(0),
    )
    .map_err(|e| Error::partition(table, format!("Table not found: {e}")))
}

fn table_layout(columns: &[TableColumn]) -> SchemaRef {
    let fields: Vec<Field> = columns
        .iter()
        .map(|c| Field::new(&c.name, c.target_type.arrow_type(), true))
        .collect();
    Arc::new(ArrowSchema::new(fields))
}

/// Reorder a batch into the table layout, filling absent columns with nulls
fn align_batch(batch: &RecordBatch, layout: &SchemaRef) -> Result<RecordBatch> {
    let rows = batch.num_rows();
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(layout.fields().len());
    for field in layout.fields() {
        let array = match batch.column_by_name(field.name()) {
            Some(array) if array.data_type() == field.data_type() => Arc::clone(array),
            Some(array) => cast(array, field.data_type())?,
            None => new_null_array(field.data_type(), rows),
        };
        arrays.push(array);
    }
    Ok(RecordBatch::try_new(Arc::clone(layout), arrays)?)
}

fn check_partitions(
    table: &str,
    batch: &RecordBatch,
    key_column: &str,
    partitions: &HashSet<String>,
) -> Result<()> {
    let keys = batch
        .column_by_name(key_column)
        .ok_or_else(|| Error::partition(table, format!("missing key column '{key_column}'")))?
        .as_string::<i32>();

    for key in keys {
        match key {
            Some(k) if partitions.contains(k) => {}
            Some(k) => {
                return Err(Error::partition(table, format!("no partition for key '{k}'")));
            }
            None => return Err(Error::partition(table, "row without partition key")),
        }
    }
    Ok(())
}
