//! Endpoint extraction runs
//!
//! An [`Extraction`] pulls pages for one endpoint from a [`Paginator`], melts
//! each page into a [`TableAccumulator`] and drains the rows into a
//! [`WriterCache`] before the next page is requested. Once the source is
//! exhausted every table is finished and its final columns reported.
//!
//! Tenants are independent units: each gets its own accumulator (see
//! [`Extraction::collect`]) and the results are reduced with
//! [`merge_tenants`].

use crate::error::Result;
use crate::melt::accumulator::TableAccumulator;
use crate::melt::decomposer::RowDecomposer;
use crate::melt::endpoint_parser::DeclarativeParser;
use crate::melt::types::MeltConfig;
use crate::melt::writer::WriterCache;
use crate::schema::endpoint::locate_root;
use crate::schema::registry::{Endpoint, SchemaRegistry};
use crate::schema::resolver::TypeResolver;
use serde_json::Value;
use std::collections::BTreeMap;

/// A finite, non-restartable source of raw page payloads
pub trait Paginator {
    /// The next page, or `None` once the source is exhausted
    fn next_page(&mut self) -> Result<Option<Value>>;
}

impl<I> Paginator for I
where
    I: Iterator<Item = Result<Value>>,
{
    fn next_page(&mut self) -> Result<Option<Value>> {
        self.next().transpose()
    }
}

/// Outcome of one endpoint run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub endpoint: String,
    pub pages: usize,
    pub entities: usize,
    pub rows: usize,
    /// Final column list per table, as reported by the writer
    pub tables: BTreeMap<String, Vec<String>>,
}

pub struct Extraction<'r> {
    registry: &'r SchemaRegistry,
    resolver: TypeResolver<'r>,
    config: MeltConfig,
}

impl<'r> Extraction<'r> {
    pub fn new(registry: &'r SchemaRegistry, config: MeltConfig) -> Self {
        Extraction {
            registry,
            resolver: TypeResolver::new(registry.catalog()),
            config,
        }
    }

    pub fn config(&self) -> &MeltConfig {
        &self.config
    }

    /// Melt every entity of one page, returning how many were found
    pub fn melt_page(&self, endpoint: &Endpoint, page: &Value, acc: &mut TableAccumulator) -> Result<usize> {
        let entities = locate_root(page, endpoint.root_node())?;
        match endpoint {
            Endpoint::Reflective { root_type, .. } => {
                let mut decomposer = RowDecomposer::new(&self.resolver, &self.config, acc);
                for entity in entities {
                    decomposer.decompose(entity, root_type, None)?;
                }
            }
            Endpoint::Declarative(definition) => {
                let mut parser = DeclarativeParser::new(definition, &self.config, acc);
                for entity in entities {
                    parser.parse(entity)?;
                }
            }
        }
        Ok(entities.len())
    }

    /// Run an endpoint to completion, draining rows into `writer` after every page
    pub fn run<P, W>(&self, endpoint_name: &str, mut pages: P, writer: &mut W) -> Result<RunSummary>
    where
        P: Paginator,
        W: WriterCache,
    {
        let endpoint = self.registry.endpoint(endpoint_name)?;
        let mut acc = TableAccumulator::new(self.config.incremental);
        let mut summary = RunSummary {
            endpoint: endpoint_name.to_string(),
            ..RunSummary::default()
        };

        while let Some(page) = pages.next_page()? {
            let entities = self.melt_page(endpoint, &page, &mut acc)?;
            summary.pages += 1;
            summary.entities += entities;
            let rows = write_rows(&mut acc, writer)?;
            summary.rows += rows;
            tracing::info!(endpoint = endpoint_name, page = summary.pages, entities, rows, "melted page");
        }

        summary.tables = finish_tables(&acc, writer)?;
        tracing::info!(
            endpoint = endpoint_name,
            pages = summary.pages,
            entities = summary.entities,
            rows = summary.rows,
            tables = summary.tables.len(),
            "endpoint complete"
        );
        Ok(summary)
    }

    /// Melt every page into a fresh accumulator without writing anything
    pub fn collect<P: Paginator>(&self, endpoint_name: &str, mut pages: P) -> Result<TableAccumulator> {
        let endpoint = self.registry.endpoint(endpoint_name)?;
        let mut acc = TableAccumulator::new(self.config.incremental);
        let mut page_count = 0;
        while let Some(page) = pages.next_page()? {
            let entities = self.melt_page(endpoint, &page, &mut acc)?;
            page_count += 1;
            tracing::info!(endpoint = endpoint_name, page = page_count, entities, "melted page");
        }
        Ok(acc)
    }
}

/// Drain accumulated rows into `writer`, returning how many were written
pub fn write_rows<W: WriterCache>(acc: &mut TableAccumulator, writer: &mut W) -> Result<usize> {
    let mut written = 0;
    for (table, rows) in acc.drain_rows() {
        let columns = acc
            .table(&table)
            .map(|t| t.columns.as_slice())
            .unwrap_or_default();
        writer.write_rows(&table, columns, &rows)?;
        written += rows.len();
    }
    Ok(written)
}

/// Finish every table the accumulator knows, returning the writer's final columns
pub fn finish_tables<W: WriterCache>(acc: &TableAccumulator, writer: &mut W) -> Result<BTreeMap<String, Vec<String>>> {
    let mut tables = BTreeMap::new();
    for table in acc.tables() {
        let columns = writer.finish_table(table)?;
        tables.insert(table.name.clone(), columns);
    }
    Ok(tables)
}

/// Write out a complete accumulator: remaining rows first, then table finalization
pub fn flush<W: WriterCache>(mut acc: TableAccumulator, writer: &mut W) -> Result<BTreeMap<String, Vec<String>>> {
    write_rows(&mut acc, writer)?;
    finish_tables(&acc, writer)
}

/// Reduce per-tenant accumulators into one
pub fn merge_tenants(tenants: impl IntoIterator<Item = TableAccumulator>) -> TableAccumulator {
    tenants.into_iter().fold(TableAccumulator::default(), |mut merged, tenant| {
        merged.merge(tenant);
        merged
    })
}
