use crate::error::Result;
use crate::melt::accumulator::{DeleteScope, Table};
use crate::melt::types::Row;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Sink for drained rows
///
/// Rows arrive in batches per table, each batch with the table's column list
/// as known at that point. Columns only ever grow between batches, so a writer
/// may need to widen what it has already stored. `finish_table` is called once
/// per table after the last batch and returns the final column list.
pub trait WriterCache {
    fn write_rows(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<()>;

    fn finish_table(&mut self, table: &Table) -> Result<Vec<String>>;
}

/// Keeps every written row in memory
#[derive(Debug, Default)]
pub struct MemoryWriter {
    columns: BTreeMap<String, Vec<String>>,
    rows: BTreeMap<String, Vec<Row>>,
    finished: BTreeMap<String, Table>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        MemoryWriter::default()
    }

    pub fn rows(&self, table: &str) -> &[Row] {
        self.rows.get(table).map_or(&[], Vec::as_slice)
    }

    pub fn columns(&self, table: &str) -> &[String] {
        self.columns.get(table).map_or(&[], Vec::as_slice)
    }

    /// Metadata of a finished table: final columns, primary key, delete scope
    pub fn finished(&self, table: &str) -> Option<&Table> {
        self.finished.get(table)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }
}

impl WriterCache for MemoryWriter {
    fn write_rows(&mut self, table: &str, columns: &[String], rows: &[Row]) -> Result<()> {
        let known = self.columns.entry(table.to_string()).or_default();
        for column in columns {
            if !known.contains(column) {
                known.push(column.clone());
            }
        }
        self.rows
            .entry(table.to_string())
            .or_default()
            .extend_from_slice(rows);
        Ok(())
    }

    fn finish_table(&mut self, table: &Table) -> Result<Vec<String>> {
        let mut finished = table.clone();
        finished.rows.clear();
        self.finished.insert(table.name.clone(), finished);

        let known = self.columns.entry(table.name.clone()).or_default();
        for column in &table.columns {
            if !known.contains(column) {
                known.push(column.clone());
            }
        }
        Ok(known.clone())
    }
}

#[derive(Serialize)]
struct TableManifest<'t> {
    name: &'t str,
    columns: &'t [String],
    primary_key: &'t [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    delete_scope: Option<&'t DeleteScope>,
}

/// Writes one JSON Lines file per table into a directory
///
/// Rows go to `{table}.jsonl`; missing columns are simply absent from a line.
/// Finishing a table writes `{table}.table.json` with its final columns,
/// primary key and delete scope.
pub struct JsonLinesWriter {
    output_dir: PathBuf,
    writers: BTreeMap<String, BufWriter<File>>,
}

impl JsonLinesWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        std::fs::create_dir_all(&output_dir)?;
        Ok(JsonLinesWriter {
            output_dir: output_dir.as_ref().to_path_buf(),
            writers: BTreeMap::new(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn writer(&mut self, table: &str) -> Result<&mut BufWriter<File>> {
        match self.writers.entry(table.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self.output_dir.join(format!("{}.jsonl", table));
                tracing::debug!(path = %path.display(), "opening table file");
                let file = File::create(&path)?;
                Ok(entry.insert(BufWriter::new(file)))
            }
        }
    }

    /// Flush every open table file
    pub fn close_all(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

impl WriterCache for JsonLinesWriter {
    fn write_rows(&mut self, table: &str, _columns: &[String], rows: &[Row]) -> Result<()> {
        let writer = self.writer(table)?;
        for row in rows {
            serde_json::to_writer(&mut *writer, row)?;
            writer.write_all(b"\n")?;
        }
        Ok(())
    }

    fn finish_table(&mut self, table: &Table) -> Result<Vec<String>> {
        if let Some(writer) = self.writers.get_mut(&table.name) {
            writer.flush()?;
        }
        let manifest = TableManifest {
            name: &table.name,
            columns: &table.columns,
            primary_key: &table.primary_key,
            delete_scope: table.delete_scope.as_ref(),
        };
        let path = self.output_dir.join(format!("{}.table.json", table.name));
        let mut file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut file, &manifest)?;
        file.flush()?;
        Ok(table.columns.clone())
    }
}
