// crates/testbed-core/src/schema.rs
// ============================================================================
// Module: Schema Model
// Description: Declarative relational tables with keys and foreign keys.
// Purpose: Provide dependency-ordered table definitions for fixtures.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! This module defines the declarative schema a fixture provisions and tears
//! down. Tables carry typed columns, exactly one primary key, and optional
//! foreign keys to other tables in the same schema. [`Schema::new`] validates
//! the whole definition up front and precomputes a deterministic topological
//! order, so provisioning can run parents-first and teardown can iterate the
//! reverse order (children cleared before the tables they reference).
//!
//! ## Invariants
//! - All identifiers satisfy [`is_valid_identifier`]; SQL assembled from a
//!   validated schema needs no quoting or escaping.
//! - Every table has exactly one primary key column.
//! - Autoincrement is only legal on an integer primary key.
//! - Foreign keys reference a table and column that exist in the schema.
//! - The reference graph is acyclic.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Schema definition errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Identifier contains characters unsafe for SQL assembly.
    #[error("invalid identifier: {name:?}")]
    InvalidIdentifier {
        /// Offending identifier.
        name: String,
    },
    /// Two tables share a name.
    #[error("duplicate table: {table}")]
    DuplicateTable {
        /// Duplicated table name.
        table: String,
    },
    /// Two columns in one table share a name.
    #[error("duplicate column: {table}.{column}")]
    DuplicateColumn {
        /// Table containing the duplicate.
        table: String,
        /// Duplicated column name.
        column: String,
    },
    /// Table does not declare exactly one primary key column.
    #[error("table {table} must declare exactly one primary key column")]
    PrimaryKeyCount {
        /// Offending table name.
        table: String,
    },
    /// Autoincrement declared on a non-integer or non-key column.
    #[error("autoincrement on {table}.{column} requires an integer primary key")]
    AutoincrementColumn {
        /// Table containing the column.
        table: String,
        /// Offending column name.
        column: String,
    },
    /// Foreign key references a table or column absent from the schema.
    #[error("foreign key on {table}.{column} references unknown {target_table}.{target_column}")]
    UnknownReference {
        /// Table declaring the foreign key.
        table: String,
        /// Column declaring the foreign key.
        column: String,
        /// Referenced table name.
        target_table: String,
        /// Referenced column name.
        target_column: String,
    },
    /// The reference graph contains a cycle.
    #[error("foreign key cycle involving table {table}")]
    ReferenceCycle {
        /// A table on the cycle.
        table: String,
    },
    /// Lookup for a table that is not part of the schema.
    #[error("unknown table: {table}")]
    UnknownTable {
        /// Requested table name.
        table: String,
    },
}

// ============================================================================
// SECTION: Column Types
// ============================================================================

/// Storage class of a column.
///
/// # Invariants
/// - Variants map 1:1 to SQL type keywords via [`ColumnType::sql`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Real,
    /// UTF-8 text (also carries JSON payloads).
    Text,
    /// Raw bytes.
    Blob,
}

impl ColumnType {
    /// Returns the SQL type keyword.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
        }
    }
}

// ============================================================================
// SECTION: Column and Table Definitions
// ============================================================================

/// Foreign key target: a table and column elsewhere in the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDef {
    /// Referenced table name.
    pub table: String,
    /// Referenced column name.
    pub column: String,
}

/// One column of a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name.
    name: String,
    /// Storage class.
    ty: ColumnType,
    /// Whether this column is the table's primary key.
    primary_key: bool,
    /// Whether the primary key autoincrements.
    autoincrement: bool,
    /// Whether NULL values are accepted.
    nullable: bool,
    /// Optional foreign key target.
    references: Option<ForeignKeyDef>,
}

impl ColumnDef {
    /// Creates a nullable column with the given name and type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidIdentifier`] when the name is unsafe.
    pub fn new(name: &str, ty: ColumnType) -> Result<Self, SchemaError> {
        validate_identifier(name)?;
        Ok(Self {
            name: name.to_string(),
            ty,
            primary_key: false,
            autoincrement: false,
            nullable: true,
            references: None,
        })
    }

    /// Marks the column as the table's primary key (implies NOT NULL).
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Marks the primary key as autoincrementing.
    #[must_use]
    pub const fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Declares a foreign key to `table.column`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidIdentifier`] when either name is unsafe.
    pub fn references(mut self, table: &str, column: &str) -> Result<Self, SchemaError> {
        validate_identifier(table)?;
        validate_identifier(column)?;
        self.references = Some(ForeignKeyDef {
            table: table.to_string(),
            column: column.to_string(),
        });
        Ok(self)
    }

    /// Returns the column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the storage class.
    #[must_use]
    pub const fn ty(&self) -> ColumnType {
        self.ty
    }

    /// Returns whether this column is the primary key.
    #[must_use]
    pub const fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Returns whether the primary key autoincrements.
    #[must_use]
    pub const fn is_autoincrement(&self) -> bool {
        self.autoincrement
    }

    /// Returns whether NULL values are accepted.
    #[must_use]
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Returns the foreign key target, when declared.
    #[must_use]
    pub const fn foreign_key(&self) -> Option<&ForeignKeyDef> {
        self.references.as_ref()
    }
}

/// One table of the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    name: String,
    /// Columns in declaration order.
    columns: Vec<ColumnDef>,
}

impl TableDef {
    /// Creates an empty table definition.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidIdentifier`] when the name is unsafe.
    pub fn new(name: &str) -> Result<Self, SchemaError> {
        validate_identifier(name)?;
        Ok(Self {
            name: name.to_string(),
            columns: Vec::new(),
        })
    }

    /// Appends a column.
    #[must_use]
    pub fn with_column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Returns the table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the columns in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    /// Returns the primary key column.
    ///
    /// A table from a validated [`Schema`] always has one; the option covers
    /// definitions still under construction.
    #[must_use]
    pub fn primary_key(&self) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.is_primary_key())
    }

    /// Returns whether the primary key autoincrements.
    #[must_use]
    pub fn has_autoincrement(&self) -> bool {
        self.primary_key().is_some_and(ColumnDef::is_autoincrement)
    }

    /// Returns the column with the given name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name() == name)
    }

    /// Validates column uniqueness, primary key count, and autoincrement.
    fn validate(&self) -> Result<(), SchemaError> {
        for (index, column) in self.columns.iter().enumerate() {
            if self.columns[.. index].iter().any(|prior| prior.name() == column.name()) {
                return Err(SchemaError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name().to_string(),
                });
            }
            if column.is_autoincrement()
                && !(column.is_primary_key() && column.ty() == ColumnType::Integer)
            {
                return Err(SchemaError::AutoincrementColumn {
                    table: self.name.clone(),
                    column: column.name().to_string(),
                });
            }
        }
        let key_count = self.columns.iter().filter(|column| column.is_primary_key()).count();
        if key_count != 1 {
            return Err(SchemaError::PrimaryKeyCount {
                table: self.name.clone(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Schema
// ============================================================================

/// A validated set of tables with a precomputed topological order.
#[derive(Debug, Clone)]
pub struct Schema {
    /// Tables in declaration order.
    tables: Vec<TableDef>,
    /// Indices into `tables`, parents before children.
    order: Vec<usize>,
}

impl Schema {
    /// Validates the definitions and computes the provisioning order.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] for duplicate names, bad keys, unknown
    /// references, or reference cycles.
    pub fn new(tables: Vec<TableDef>) -> Result<Self, SchemaError> {
        for (index, table) in tables.iter().enumerate() {
            if tables[.. index].iter().any(|prior| prior.name() == table.name()) {
                return Err(SchemaError::DuplicateTable {
                    table: table.name().to_string(),
                });
            }
            table.validate()?;
        }
        for table in &tables {
            for column in table.columns() {
                if let Some(target) = column.foreign_key() {
                    let resolved = tables
                        .iter()
                        .find(|candidate| candidate.name() == target.table)
                        .and_then(|candidate| candidate.column(&target.column));
                    if resolved.is_none() {
                        return Err(SchemaError::UnknownReference {
                            table: table.name().to_string(),
                            column: column.name().to_string(),
                            target_table: target.table.clone(),
                            target_column: target.column.clone(),
                        });
                    }
                }
            }
        }
        let order = topological_order(&tables)?;
        Ok(Self {
            tables,
            order,
        })
    }

    /// Returns tables parents-first; teardown iterates the reverse.
    #[must_use]
    pub fn sorted_tables(&self) -> Vec<&TableDef> {
        self.order.iter().filter_map(|&index| self.tables.get(index)).collect()
    }

    /// Returns all tables in declaration order.
    #[must_use]
    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    /// Returns the table with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownTable`] when absent.
    pub fn table(&self, name: &str) -> Result<&TableDef, SchemaError> {
        self.tables.iter().find(|table| table.name() == name).ok_or_else(|| {
            SchemaError::UnknownTable {
                table: name.to_string(),
            }
        })
    }
}

/// Computes a parents-first order with Kahn's algorithm.
///
/// Ties break by declaration order so the result is deterministic for
/// identical input. Self-references do not force an ordering edge.
fn topological_order(tables: &[TableDef]) -> Result<Vec<usize>, SchemaError> {
    let table_index = |name: &str| tables.iter().position(|table| table.name() == name);
    // parents[i] holds the distinct tables that table i references.
    let mut parents: Vec<Vec<usize>> = vec![Vec::new(); tables.len()];
    for (child, table) in tables.iter().enumerate() {
        for column in table.columns() {
            if let Some(target) = column.foreign_key() {
                if let Some(parent) = table_index(&target.table) {
                    if parent != child && !parents[child].contains(&parent) {
                        parents[child].push(parent);
                    }
                }
            }
        }
    }
    let mut placed = vec![false; tables.len()];
    let mut order = Vec::with_capacity(tables.len());
    while order.len() < tables.len() {
        let mut progressed = false;
        for index in 0 .. tables.len() {
            if placed[index] {
                continue;
            }
            if parents[index].iter().all(|&parent| placed[parent]) {
                placed[index] = true;
                order.push(index);
                progressed = true;
            }
        }
        if !progressed {
            let stuck = tables
                .iter()
                .enumerate()
                .find(|(index, _)| !placed[*index])
                .map_or_else(String::new, |(_, table)| table.name().to_string());
            return Err(SchemaError::ReferenceCycle {
                table: stuck,
            });
        }
    }
    Ok(order)
}

// ============================================================================
// SECTION: Identifier Validation
// ============================================================================

/// Returns whether a name is safe to splice into SQL unquoted.
#[must_use]
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    name.len() <= 128 && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Validates an identifier, returning it as an error when unsafe.
fn validate_identifier(name: &str) -> Result<(), SchemaError> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
