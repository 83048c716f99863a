//! Row accumulation across entities, pages and tenants.
//!
//! Tables are created on their first row. Their column list only ever grows:
//! a column first seen in a later row is appended and applies from then on.
//! For incremental loads each child table also carries a [`DeleteScope`], the
//! parent-key values whose stored rows must be purged before the new rows are
//! inserted. Scopes are unioned across batches, never replaced.

use crate::melt::types::Row;
use crate::schema::types::TableDefinition;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Parent-key values whose previously stored child rows must be deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteScope {
    pub key_column: String,
    pub values: BTreeSet<String>,
}

impl DeleteScope {
    pub fn new(key_column: impl Into<String>) -> Self {
        DeleteScope {
            key_column: key_column.into(),
            values: BTreeSet::new(),
        }
    }

    pub fn union(&mut self, other: &DeleteScope) {
        self.values.extend(other.values.iter().cloned());
    }
}

/// An output table being accumulated
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub primary_key: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_scope: Option<DeleteScope>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Table {
            name: name.into(),
            primary_key: Vec::new(),
            columns: Vec::new(),
            rows: Vec::new(),
            delete_scope: None,
        }
    }

    /// Append columns not seen before, preserving their order
    pub fn extend_columns<'a>(&mut self, columns: impl IntoIterator<Item = &'a str>) {
        for column in columns {
            if !self.columns.iter().any(|c| c == column) {
                self.columns.push(column.to_string());
            }
        }
    }

    pub fn extend_primary_key<'a>(&mut self, columns: impl IntoIterator<Item = &'a str>) {
        for column in columns {
            if !self.primary_key.iter().any(|c| c == column) {
                self.primary_key.push(column.to_string());
            }
        }
    }

    pub fn push_row(&mut self, row: Row) {
        self.extend_columns(row.columns());
        self.rows.push(row);
    }

    pub fn definition(&self) -> TableDefinition {
        TableDefinition {
            name: self.name.clone(),
            primary_key: self.primary_key.clone(),
            columns: self.columns.clone(),
        }
    }

    /// Fold another accumulation of the same table into this one
    pub fn merge(&mut self, other: Table) {
        self.extend_primary_key(other.primary_key.iter().map(String::as_str));
        self.extend_columns(other.columns.iter().map(String::as_str));
        self.rows.extend(other.rows);
        if let Some(other_scope) = other.delete_scope {
            match &mut self.delete_scope {
                Some(scope) => scope.union(&other_scope),
                None => self.delete_scope = Some(other_scope),
            }
        }
    }
}

/// Collects rows per table for one run (or one parallel unit of a run)
#[derive(Debug, Clone, Default)]
pub struct TableAccumulator {
    tables: BTreeMap<String, Table>,
    incremental: bool,
}

impl TableAccumulator {
    pub fn new(incremental: bool) -> Self {
        TableAccumulator {
            tables: BTreeMap::new(),
            incremental,
        }
    }

    pub fn is_incremental(&self) -> bool {
        self.incremental
    }

    pub fn get_or_create_table(&mut self, table_name: &str) -> &mut Table {
        self.tables
            .entry(table_name.to_string())
            .or_insert_with(|| {
                tracing::debug!(table = table_name, "creating table");
                Table::new(table_name)
            })
    }

    /// Add a row, growing the table's column set and primary key as needed
    pub fn add_row(&mut self, table_name: &str, row: Row, primary_key_columns: &[String]) {
        let table = self.get_or_create_table(table_name);
        table.extend_primary_key(primary_key_columns.iter().map(String::as_str));
        table.push_row(row);
    }

    /// Record the parent-key value a child table's rows hang off
    ///
    /// Only incremental accumulators keep delete scopes; otherwise this is a no-op.
    /// The table is given its key columns even when none of its rows were kept,
    /// so a scope never hangs off a table without a schema.
    pub fn link_parent(&mut self, table_name: &str, primary_key_columns: &[String], key_column: &str, value: &str) {
        if !self.incremental {
            return;
        }
        let table = self.get_or_create_table(table_name);
        table.extend_primary_key(primary_key_columns.iter().map(String::as_str));
        table.extend_columns(primary_key_columns.iter().map(String::as_str));
        let scope = table
            .delete_scope
            .get_or_insert_with(|| DeleteScope::new(key_column));
        if scope.key_column != key_column {
            tracing::warn!(
                table = table_name,
                expected = %scope.key_column,
                found = key_column,
                "ignoring parent key from a different linkage column"
            );
            return;
        }
        scope.values.insert(value.to_string());
    }

    pub fn table(&self, table_name: &str) -> Option<&Table> {
        self.tables.get(table_name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn row_count(&self) -> usize {
        self.tables.values().map(|t| t.rows.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Take the rows accumulated so far, keeping columns, keys and delete scopes
    pub fn drain_rows(&mut self) -> Vec<(String, Vec<Row>)> {
        self.tables
            .values_mut()
            .filter(|t| !t.rows.is_empty())
            .map(|t| (t.name.clone(), std::mem::take(&mut t.rows)))
            .collect()
    }

    /// Reduce another accumulator into this one
    ///
    /// Column sets, primary keys and delete scopes are unioned; rows are
    /// concatenated.
    pub fn merge(&mut self, other: TableAccumulator) {
        self.incremental |= other.incremental;
        for (name, table) in other.tables {
            match self.tables.get_mut(&name) {
                Some(existing) => existing.merge(table),
                None => {
                    self.tables.insert(name, table);
                }
            }
        }
    }

    pub fn into_tables(self) -> BTreeMap<String, Table> {
        self.tables
    }
}
