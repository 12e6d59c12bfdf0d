// crates/testbed-core/src/seed.rs
// ============================================================================
// Module: Seed Rows
// Description: Typed fixed-value rows for establishing known starting state.
// Purpose: Let loaders upsert seed data by primary key, idempotently.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Seed rows are fixed-value records merged into the database at fixture
//! setup. Rows are keyed by their table's primary key so the loader can
//! upsert rather than insert; re-seeding the same batch never raises a
//! duplicate-key error, even after a partially completed prior teardown.
//!
//! ## Invariants
//! - A row names each column at most once (last assignment wins).
//! - JSON values serialize to canonical text at bind time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::schema::TableDef;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Seed construction and binding errors.
#[derive(Debug, Error)]
pub enum SeedError {
    /// A row omits its table's primary key column.
    #[error("seed row for {table} omits primary key column {column}")]
    MissingPrimaryKey {
        /// Target table.
        table: String,
        /// Expected primary key column.
        column: String,
    },
    /// A row names a column absent from its table.
    #[error("seed row for {table} names unknown column {column}")]
    UnknownColumn {
        /// Target table.
        table: String,
        /// Offending column name.
        column: String,
    },
    /// JSON value failed to serialize.
    #[error("seed value for {table}.{column} failed to serialize: {message}")]
    Serialize {
        /// Target table.
        table: String,
        /// Target column.
        column: String,
        /// Serializer message.
        message: String,
    },
}

// ============================================================================
// SECTION: Seed Values
// ============================================================================

/// A typed seed value.
#[derive(Debug, Clone, PartialEq)]
pub enum SeedValue {
    /// SQL NULL.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
    /// JSON document, stored as text.
    Json(JsonValue),
}

impl From<i64> for SeedValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SeedValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<&str> for SeedValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SeedValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<u8>> for SeedValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<JsonValue> for SeedValue {
    fn from(value: JsonValue) -> Self {
        Self::Json(value)
    }
}

// ============================================================================
// SECTION: Seed Rows
// ============================================================================

/// One fixed-value row destined for a named table.
#[derive(Debug, Clone)]
pub struct SeedRow {
    /// Target table name.
    table: String,
    /// Column/value assignments in insertion order.
    values: Vec<(String, SeedValue)>,
}

impl SeedRow {
    /// Creates an empty row for `table`.
    #[must_use]
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            values: Vec::new(),
        }
    }

    /// Assigns a column value; reassigning a column replaces the prior value.
    #[must_use]
    pub fn set(mut self, column: &str, value: impl Into<SeedValue>) -> Self {
        let value = value.into();
        if let Some(slot) = self.values.iter_mut().find(|(name, _)| name == column) {
            slot.1 = value;
        } else {
            self.values.push((column.to_string(), value));
        }
        self
    }

    /// Returns the target table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the column/value assignments in insertion order.
    #[must_use]
    pub fn values(&self) -> &[(String, SeedValue)] {
        &self.values
    }

    /// Returns the value assigned to `column`, when present.
    #[must_use]
    pub fn value(&self, column: &str) -> Option<&SeedValue> {
        self.values.iter().find(|(name, _)| name == column).map(|(_, value)| value)
    }

    /// Checks the row against its table: every named column must exist and
    /// the primary key must be assigned (upserts merge by key).
    ///
    /// # Errors
    ///
    /// Returns [`SeedError`] when a column is unknown or the key is missing.
    pub fn validate_against(&self, table: &TableDef) -> Result<(), SeedError> {
        for (column, _) in &self.values {
            if table.column(column).is_none() {
                return Err(SeedError::UnknownColumn {
                    table: self.table.clone(),
                    column: column.clone(),
                });
            }
        }
        let key = table.primary_key().map(|column| column.name().to_string()).unwrap_or_default();
        if self.value(&key).is_none() {
            return Err(SeedError::MissingPrimaryKey {
                table: self.table.clone(),
                column: key,
            });
        }
        Ok(())
    }
}

/// An ordered batch of seed rows committed as one unit.
#[derive(Debug, Clone, Default)]
pub struct SeedBatch {
    /// Rows in insertion order.
    rows: Vec<SeedRow>,
}

impl SeedBatch {
    /// Creates an empty batch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            rows: Vec::new(),
        }
    }

    /// Appends a row.
    #[must_use]
    pub fn with_row(mut self, row: SeedRow) -> Self {
        self.rows.push(row);
        self
    }

    /// Appends a row in place.
    pub fn push(&mut self, row: SeedRow) {
        self.rows.push(row);
    }

    /// Returns the rows in insertion order.
    #[must_use]
    pub fn rows(&self) -> &[SeedRow] {
        &self.rows
    }

    /// Returns whether the batch holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
