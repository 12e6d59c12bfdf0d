// crates/testbed-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Fixture Store
// Description: Schema provisioning, seed loading, and ordered teardown.
// Purpose: Give fixtures a deterministic database lifecycle on SQLite.
// Dependencies: testbed-core, rusqlite, thiserror
// ============================================================================

//! ## Overview
//! Three operations cover the database side of a fixture's life:
//!
//! - [`create_all`] / [`drop_all`] — idempotent provisioning; tables are
//!   created parents-first and dropped children-first, so dropping an
//!   already-clean database is a no-op, not a failure.
//! - [`seed`] — merges a batch of fixed rows by primary key inside one
//!   transaction with a single commit; re-seeding the same batch never
//!   raises a duplicate-key error.
//! - [`clear`] — one transaction that deletes every row (children before
//!   parents), restarts the schema's autoincrement sequences, and commits.
//!   Any mid-sequence failure rolls the whole transaction back.
//!
//! Sequence restart is dialect-specific; on `SQLite` it means pruning the
//! `sqlite_sequence` bookkeeping rows for the schema's AUTOINCREMENT tables,
//! so the next insert receives the same ID as the first-ever insert.
//!
//! ## Invariants
//! - All SQL is assembled from schema identifiers validated at
//!   [`Schema`](testbed_core::Schema) construction.
//! - Connection failures surface immediately; nothing retries.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::Connection;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use testbed_core::Schema;
use testbed_core::SchemaError;
use testbed_core::SeedBatch;
use testbed_core::SeedError;
use testbed_core::SeedRow;
use testbed_core::TableDef;
use testbed_core::schema::ColumnDef;
use testbed_core::seed::SeedValue;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Database fixture errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Db(String),
    /// Invalid schema input.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// Invalid seed input.
    #[error(transparent)]
    Seed(#[from] SeedError),
}

/// Maps a rusqlite error onto [`StoreError::Db`].
fn db_err(err: rusqlite::Error) -> StoreError {
    StoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Schema Provisioner
// ============================================================================

/// Creates every table of the schema, parents first.
///
/// Uses `CREATE TABLE IF NOT EXISTS`, so provisioning an already-provisioned
/// database is a no-op.
///
/// # Errors
///
/// Returns [`StoreError::Db`] when a statement fails; failures surface
/// immediately with no retry.
pub fn create_all(conn: &Connection, schema: &Schema) -> Result<(), StoreError> {
    for table in schema.sorted_tables() {
        conn.execute_batch(&create_table_sql(table)).map_err(db_err)?;
    }
    Ok(())
}

/// Drops every table of the schema, children first.
///
/// Uses `DROP TABLE IF EXISTS`; dropping an already-clean database is a
/// no-op, and a second call after the first is equally harmless.
///
/// # Errors
///
/// Returns [`StoreError::Db`] when a statement fails.
pub fn drop_all(conn: &Connection, schema: &Schema) -> Result<(), StoreError> {
    for table in schema.sorted_tables().into_iter().rev() {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", table.name())).map_err(db_err)?;
    }
    Ok(())
}

/// Lists user tables currently present in the database.
///
/// Fixture suites use this to assert that [`drop_all`] left nothing behind;
/// the `sqlite_` bookkeeping tables are excluded.
///
/// # Errors
///
/// Returns [`StoreError::Db`] when the catalog query fails.
pub fn existing_tables(conn: &Connection) -> Result<Vec<String>, StoreError> {
    let mut statement = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .map_err(db_err)?;
    let names = statement
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(db_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok(names)
}

/// Renders the CREATE TABLE statement for one table.
fn create_table_sql(table: &TableDef) -> String {
    let mut clauses: Vec<String> = table.columns().iter().map(render_column).collect();
    for column in table.columns() {
        if let Some(target) = column.foreign_key() {
            clauses.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                column.name(),
                target.table,
                target.column
            ));
        }
    }
    format!("CREATE TABLE IF NOT EXISTS {} ({})", table.name(), clauses.join(", "))
}

/// Renders one column clause.
fn render_column(column: &ColumnDef) -> String {
    let mut clause = format!("{} {}", column.name(), column.ty().sql());
    if column.is_primary_key() {
        clause.push_str(" PRIMARY KEY");
        if column.is_autoincrement() {
            clause.push_str(" AUTOINCREMENT");
        }
    } else if !column.is_nullable() {
        clause.push_str(" NOT NULL");
    }
    clause
}

// ============================================================================
// SECTION: Seed Loader
// ============================================================================

/// Merges a batch of seed rows by primary key and commits once.
///
/// Every row is upserted (`INSERT .. ON CONFLICT(pk) DO UPDATE`), so
/// re-seeding fixed IDs never raises a uniqueness violation — including
/// after a partially completed prior teardown.
///
/// # Errors
///
/// Returns [`StoreError`] when a row is invalid for its table or a statement
/// fails; the transaction rolls back and nothing is committed.
pub fn seed(conn: &mut Connection, schema: &Schema, batch: &SeedBatch) -> Result<(), StoreError> {
    let tx = conn.transaction().map_err(db_err)?;
    for row in batch.rows() {
        let table = schema.table(row.table())?;
        row.validate_against(table)?;
        let (sql, values) = upsert_sql(table, row)?;
        tx.execute(&sql, params_from_iter(values)).map_err(db_err)?;
    }
    tx.commit().map_err(db_err)
}

/// Renders the upsert statement and bind values for one row.
fn upsert_sql(table: &TableDef, row: &SeedRow) -> Result<(String, Vec<SqlValue>), StoreError> {
    let key = table.primary_key().map(ColumnDef::name).unwrap_or_default();
    let columns: Vec<&str> = row.values().iter().map(|(name, _)| name.as_str()).collect();
    let placeholders: Vec<String> =
        (1 ..= columns.len()).map(|index| format!("?{index}")).collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|&&name| name != key)
        .map(|name| format!("{name} = excluded.{name}"))
        .collect();
    let conflict_action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
        row.table(),
        columns.join(", "),
        placeholders.join(", "),
        key,
        conflict_action
    );
    let values = row
        .values()
        .iter()
        .map(|(name, value)| bind_value(row.table(), name, value))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((sql, values))
}

/// Converts a seed value into a bindable SQL value.
fn bind_value(table: &str, column: &str, value: &SeedValue) -> Result<SqlValue, StoreError> {
    match value {
        SeedValue::Null => Ok(SqlValue::Null),
        SeedValue::Integer(value) => Ok(SqlValue::Integer(*value)),
        SeedValue::Real(value) => Ok(SqlValue::Real(*value)),
        SeedValue::Text(value) => Ok(SqlValue::Text(value.clone())),
        SeedValue::Blob(value) => Ok(SqlValue::Blob(value.clone())),
        SeedValue::Json(value) => {
            let rendered = serde_json::to_string(value).map_err(|err| SeedError::Serialize {
                table: table.to_string(),
                column: column.to_string(),
                message: err.to_string(),
            })?;
            Ok(SqlValue::Text(rendered))
        }
    }
}

// ============================================================================
// SECTION: Teardown Sequencer
// ============================================================================

/// Deletes all rows and restarts autoincrement sequences, in one transaction.
///
/// Tables are cleared children-first (reverse of the provisioning order) so
/// foreign keys never dangle mid-teardown. Sequences restart at their
/// initial value, so seeding after `clear` reproduces the same IDs run after
/// run. A failure at any step rolls the whole transaction back; partial
/// teardown is never committed.
///
/// # Errors
///
/// Returns [`StoreError::Db`] when any statement fails.
pub fn clear(conn: &mut Connection, schema: &Schema) -> Result<(), StoreError> {
    let tx = conn.transaction().map_err(db_err)?;
    for table in schema.sorted_tables().into_iter().rev() {
        tx.execute(&format!("DELETE FROM {}", table.name()), []).map_err(db_err)?;
    }
    reset_sequences(&tx, schema)?;
    tx.commit().map_err(db_err)
}

/// Restarts autoincrement counters for the schema's tables.
///
/// `SQLite` materializes `sqlite_sequence` lazily, on the first insert into
/// any AUTOINCREMENT table; the existence probe covers databases where that
/// has not happened yet.
fn reset_sequences(tx: &rusqlite::Transaction<'_>, schema: &Schema) -> Result<(), StoreError> {
    let sequence_table_exists: bool = tx
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' \
             AND name = 'sqlite_sequence')",
            [],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    if !sequence_table_exists {
        return Ok(());
    }
    for table in schema.tables() {
        if table.has_autoincrement() {
            tx.execute("DELETE FROM sqlite_sequence WHERE name = ?1", params![table.name()])
                .map_err(db_err)?;
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use rusqlite::Connection;
    use testbed_core::ColumnDef;
    use testbed_core::ColumnType;
    use testbed_core::Schema;
    use testbed_core::SchemaError;
    use testbed_core::SeedBatch;
    use testbed_core::SeedRow;
    use testbed_core::TableDef;

    use super::StoreError;
    use super::clear;
    use super::create_all;
    use super::drop_all;
    use super::existing_tables;
    use super::seed;

    /// Test result alias keeping assertions unwrap-free.
    type TestResult = Result<(), String>;

    /// Stringifies store errors for the test result alias.
    fn fail(err: StoreError) -> String {
        err.to_string()
    }

    /// Model-service style schema: basements own trainings and models.
    fn models_schema() -> Result<Schema, SchemaError> {
        let basements = TableDefs::basements()?;
        let trainings = TableDefs::trainings()?;
        let models = TableDefs::models()?;
        // Children declared first; sorted_tables must still put basements first.
        Schema::new(vec![trainings, models, basements])
    }

    /// Table builders shared by the tests.
    struct TableDefs;

    impl TableDefs {
        /// basements(id TEXT PK, key_script, key_archive, limits JSON-as-TEXT).
        fn basements() -> Result<TableDef, SchemaError> {
            Ok(TableDef::new("basements")?
                .with_column(ColumnDef::new("id", ColumnType::Text)?.primary_key())
                .with_column(ColumnDef::new("key_script", ColumnType::Text)?)
                .with_column(ColumnDef::new("key_archive", ColumnType::Text)?)
                .with_column(ColumnDef::new("limits", ColumnType::Text)?))
        }

        /// trainings(id INTEGER PK AUTOINCREMENT, basement -> basements.id).
        fn trainings() -> Result<TableDef, SchemaError> {
            Ok(TableDef::new("trainings")?
                .with_column(
                    ColumnDef::new("id", ColumnType::Integer)?.primary_key().autoincrement(),
                )
                .with_column(
                    ColumnDef::new("basement", ColumnType::Text)?.references("basements", "id")?,
                ))
        }

        /// models(id TEXT PK, name, basement -> basements.id).
        fn models() -> Result<TableDef, SchemaError> {
            Ok(TableDef::new("models")?
                .with_column(ColumnDef::new("id", ColumnType::Text)?.primary_key())
                .with_column(ColumnDef::new("name", ColumnType::Text)?)
                .with_column(
                    ColumnDef::new("basement", ColumnType::Text)?.references("basements", "id")?,
                ))
        }
    }

    /// Opens an in-memory database with foreign keys enforced.
    fn open() -> Result<Connection, String> {
        let conn = Connection::open_in_memory().map_err(|err| err.to_string())?;
        conn.pragma_update(None, "foreign_keys", true).map_err(|err| err.to_string())?;
        Ok(conn)
    }

    /// Counts rows in a table.
    fn count(conn: &Connection, table: &str) -> Result<i64, String> {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .map_err(|err| err.to_string())
    }

    /// Standard seed batch with fixed IDs.
    fn fixed_batch() -> SeedBatch {
        SeedBatch::new()
            .with_row(
                SeedRow::new("basements")
                    .set("id", "base_1")
                    .set("key_script", "basements/base_1/training_script.py")
                    .set("key_archive", "basements/base_1/training_archive.zip")
                    .set("limits", serde_json::json!({"pods": 1, "gpu": false})),
            )
            .with_row(SeedRow::new("trainings").set("id", 1_i64).set("basement", "base_1"))
            .with_row(
                SeedRow::new("models")
                    .set("id", "model_1")
                    .set("name", "first")
                    .set("basement", "base_1"),
            )
    }

    #[test]
    fn drop_after_create_leaves_zero_tables() -> TestResult {
        let conn = open()?;
        let schema = models_schema().map_err(|err| err.to_string())?;
        create_all(&conn, &schema).map_err(fail)?;
        assert_eq!(existing_tables(&conn).map_err(fail)?.len(), 3);
        drop_all(&conn, &schema).map_err(fail)?;
        assert!(existing_tables(&conn).map_err(fail)?.is_empty());
        // Second drop on a clean database is a no-op, not a failure.
        drop_all(&conn, &schema).map_err(fail)?;
        Ok(())
    }

    #[test]
    fn create_all_is_idempotent() -> TestResult {
        let conn = open()?;
        let schema = models_schema().map_err(|err| err.to_string())?;
        create_all(&conn, &schema).map_err(fail)?;
        create_all(&conn, &schema).map_err(fail)?;
        assert_eq!(existing_tables(&conn).map_err(fail)?.len(), 3);
        Ok(())
    }

    #[test]
    fn seeding_twice_equals_seeding_once() -> TestResult {
        let mut conn = open()?;
        let schema = models_schema().map_err(|err| err.to_string())?;
        create_all(&conn, &schema).map_err(fail)?;
        seed(&mut conn, &schema, &fixed_batch()).map_err(fail)?;
        seed(&mut conn, &schema, &fixed_batch()).map_err(fail)?;
        assert_eq!(count(&conn, "basements")?, 1);
        assert_eq!(count(&conn, "trainings")?, 1);
        assert_eq!(count(&conn, "models")?, 1);
        Ok(())
    }

    #[test]
    fn reseeding_updates_non_key_columns() -> TestResult {
        let mut conn = open()?;
        let schema = models_schema().map_err(|err| err.to_string())?;
        create_all(&conn, &schema).map_err(fail)?;
        seed(&mut conn, &schema, &fixed_batch()).map_err(fail)?;
        let updated = SeedBatch::new().with_row(
            SeedRow::new("models").set("id", "model_1").set("name", "renamed"),
        );
        seed(&mut conn, &schema, &updated).map_err(fail)?;
        let name: String = conn
            .query_row("SELECT name FROM models WHERE id = 'model_1'", [], |row| row.get(0))
            .map_err(|err| err.to_string())?;
        assert_eq!(name, "renamed");
        assert_eq!(count(&conn, "models")?, 1);
        Ok(())
    }

    #[test]
    fn seed_without_primary_key_is_rejected() -> TestResult {
        let mut conn = open()?;
        let schema = models_schema().map_err(|err| err.to_string())?;
        create_all(&conn, &schema).map_err(fail)?;
        let bad = SeedBatch::new().with_row(SeedRow::new("models").set("name", "keyless"));
        let result = seed(&mut conn, &schema, &bad);
        assert!(matches!(result, Err(StoreError::Seed(_))));
        assert_eq!(count(&conn, "models")?, 0);
        Ok(())
    }

    #[test]
    fn clear_empties_children_before_parents() -> TestResult {
        let mut conn = open()?;
        let schema = models_schema().map_err(|err| err.to_string())?;
        create_all(&conn, &schema).map_err(fail)?;
        seed(&mut conn, &schema, &fixed_batch()).map_err(fail)?;
        // foreign_keys=ON means clearing basements before trainings/models
        // would fail; clear's reverse ordering must make this succeed.
        clear(&mut conn, &schema).map_err(fail)?;
        assert_eq!(count(&conn, "basements")?, 0);
        assert_eq!(count(&conn, "trainings")?, 0);
        assert_eq!(count(&conn, "models")?, 0);
        Ok(())
    }

    #[test]
    fn clear_restarts_autoincrement_at_first_id() -> TestResult {
        let mut conn = open()?;
        let schema = models_schema().map_err(|err| err.to_string())?;
        create_all(&conn, &schema).map_err(fail)?;
        seed(
            &mut conn,
            &schema,
            &SeedBatch::new().with_row(SeedRow::new("basements").set("id", "base_1")),
        )
        .map_err(fail)?;
        let insert = "INSERT INTO trainings (basement) VALUES ('base_1')";
        conn.execute(insert, []).map_err(|err| err.to_string())?;
        let first: i64 = conn.last_insert_rowid();
        conn.execute(insert, []).map_err(|err| err.to_string())?;
        conn.execute(insert, []).map_err(|err| err.to_string())?;
        clear(&mut conn, &schema).map_err(fail)?;
        seed(
            &mut conn,
            &schema,
            &SeedBatch::new().with_row(SeedRow::new("basements").set("id", "base_1")),
        )
        .map_err(fail)?;
        conn.execute(insert, []).map_err(|err| err.to_string())?;
        assert_eq!(conn.last_insert_rowid(), first);
        Ok(())
    }

    #[test]
    fn clear_rolls_back_wholesale_on_mid_sequence_failure() -> TestResult {
        // Foreign keys explicitly off (the bundled SQLite defaults them on):
        // the sabotage below needs to drop the parent table while child rows
        // still reference it.
        let mut conn = Connection::open_in_memory().map_err(|err| err.to_string())?;
        conn.pragma_update(None, "foreign_keys", false).map_err(|err| err.to_string())?;
        let schema = models_schema().map_err(|err| err.to_string())?;
        create_all(&conn, &schema).map_err(fail)?;
        seed(&mut conn, &schema, &fixed_batch()).map_err(fail)?;
        // The parent table vanishes out-of-band; clear deletes children
        // first, then fails on the missing parent.
        conn.execute_batch("DROP TABLE basements").map_err(|err| err.to_string())?;
        let result = clear(&mut conn, &schema);
        assert!(matches!(result, Err(StoreError::Db(_))));
        // The child deletes that ran before the failure must have rolled
        // back; partial teardown is never committed.
        assert_eq!(count(&conn, "trainings")?, 1);
        assert_eq!(count(&conn, "models")?, 1);
        Ok(())
    }

    #[test]
    fn clear_on_freshly_created_schema_is_a_no_op() -> TestResult {
        let mut conn = open()?;
        let schema = models_schema().map_err(|err| err.to_string())?;
        create_all(&conn, &schema).map_err(fail)?;
        // sqlite_sequence does not exist yet; clear must still succeed.
        clear(&mut conn, &schema).map_err(fail)?;
        Ok(())
    }

    #[test]
    fn seed_fails_fast_on_missing_tables() -> TestResult {
        let mut conn = open()?;
        let schema = models_schema().map_err(|err| err.to_string())?;
        // Tables never provisioned: the first statement fails and nothing
        // is committed.
        let result = super::seed(&mut conn, &schema, &fixed_batch());
        assert!(matches!(result, Err(StoreError::Db(_))));
        Ok(())
    }

    #[test]
    fn on_disk_database_survives_reopen_between_phases() -> TestResult {
        let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
        let path = dir.path().join("fixtures.db");
        let schema = models_schema().map_err(|err| err.to_string())?;
        {
            let mut conn = Connection::open(&path).map_err(|err| err.to_string())?;
            create_all(&conn, &schema).map_err(fail)?;
            seed(&mut conn, &schema, &fixed_batch()).map_err(fail)?;
        }
        let conn = Connection::open(&path).map_err(|err| err.to_string())?;
        assert_eq!(count(&conn, "models")?, 1);
        Ok(())
    }
}
