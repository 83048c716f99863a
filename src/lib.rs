//! # ledger-melt - relational flattening for accounting API data
//!
//! Decomposes deeply nested JSON entities (invoices, contacts, bank
//! transactions, ...) into flat, relational tables with stable primary keys,
//! parent/child foreign keys and an evolving column set.
//!
//! ## Modules
//!
//! - **schema**: type catalog, type resolution and per-endpoint table definitions
//! - **melt**: row decomposition, table accumulation and writers
//! - **extract**: page-by-page endpoint runs and tenant merging
//!
//! ## Quick Start
//!
//! ```rust
//! use ledger_melt::melt::{MeltConfig, MemoryWriter};
//! use ledger_melt::schema::{Endpoint, EntityType, SchemaRegistry, TypeCatalog};
//! use ledger_melt::extract::Extraction;
//! use serde_json::json;
//!
//! # fn main() -> ledger_melt::Result<()> {
//! let catalog = TypeCatalog::new()
//!     .with_entity(EntityType::new("LineItem").attr("Description", "str").attr("Amount", "float"))?
//!     .with_entity(
//!         EntityType::new("Invoice")
//!             .with_id("InvoiceID")
//!             .attr("InvoiceID", "str")
//!             .attr("LineItems", "list[LineItem]"),
//!     )?;
//! let registry = SchemaRegistry::new(catalog)
//!     .with_endpoint("Invoices", Endpoint::reflective("Invoices", "Invoice"))?;
//!
//! let page = json!({"Invoices": [{"InvoiceID": "I1", "LineItems": [{"Description": "Widget"}]}]});
//! let mut writer = MemoryWriter::new();
//! let summary = Extraction::new(&registry, MeltConfig::default())
//!     .run("Invoices", std::iter::once(Ok::<_, ledger_melt::MeltError>(page)), &mut writer)?;
//!
//! // Invoice and Invoice_LineItem, the latter keyed by (LineItemID, InvoiceID)
//! assert_eq!(summary.tables.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod extract;
pub mod melt;
pub mod schema;

// Re-export commonly used types for convenience
pub use error::{MeltError, Result};
pub use extract::{merge_tenants, Extraction, Paginator, RunSummary};
pub use melt::{DeleteScope, Identity, JsonLinesWriter, MeltConfig, MemoryWriter, Row, Table, TableAccumulator, WriterCache};
pub use schema::{Endpoint, EntityType, SchemaRegistry, TableDefinition, TypeCatalog};

use serde_json::Value;

/// Melt a batch of already-fetched entities of a reflective root type
pub fn melt_entities<'v>(
    catalog: &TypeCatalog,
    root_type: &str,
    entities: impl IntoIterator<Item = &'v Value>,
    config: &MeltConfig,
) -> Result<TableAccumulator> {
    let resolver = schema::TypeResolver::new(catalog);
    let mut acc = TableAccumulator::new(config.incremental);
    let mut decomposer = melt::RowDecomposer::new(&resolver, config, &mut acc);
    for entity in entities {
        decomposer.decompose(entity, root_type, None)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn catalog() -> TypeCatalog {
        TypeCatalog::new()
            .with_enum("AccountType")
            .and_then(|c| {
                c.with_entity(
                    EntityType::new("Account")
                        .with_id("AccountID")
                        .attr("AccountID", "str")
                        .attr("Name", "str")
                        .attr("Type", "AccountType"),
                )
            })
            .and_then(|c| c.with_entity(EntityType::new("LineItem").attr("Description", "str").attr("Amount", "float")))
            .and_then(|c| {
                c.with_entity(
                    EntityType::new("Invoice")
                        .with_id("InvoiceID")
                        .attr("InvoiceID", "str")
                        .attr("LineItems", "list[LineItem]"),
                )
            })
            .unwrap()
    }

    #[test]
    fn test_account_rows() {
        let catalog = catalog();
        let accounts = vec![json!({"AccountID": "A1", "Name": "Cash", "Type": "BANK"})];
        let acc = melt_entities(&catalog, "Account", &accounts, &MeltConfig::default()).unwrap();

        let table = acc.table("Account").unwrap();
        assert_eq!(table.primary_key, vec!["AccountID"]);
        assert_eq!(table.columns, vec!["AccountID", "Name", "Type"]);
        assert_eq!(
            table.rows,
            vec![Row::from(
                json!({"AccountID": "A1", "Name": "Cash", "Type": "BANK"})
                    .as_object()
                    .cloned()
                    .unwrap()
            )]
        );
    }

    #[test]
    fn test_rows_match_table_definitions() {
        let catalog = catalog();
        let registry = SchemaRegistry::new(catalog.clone())
            .with_endpoint("Invoices", Endpoint::reflective("Invoices", "Invoice"))
            .unwrap();
        let definitions = registry.get_table_definitions("Invoices").unwrap();

        let invoices = vec![json!({
            "InvoiceID": "I1",
            "LineItems": [{"Description": "Widget", "Amount": 9.99}]
        })];
        let acc = melt_entities(&catalog, "Invoice", &invoices, &MeltConfig::default()).unwrap();

        for table in acc.tables() {
            let definition = &definitions[&table.name];
            assert_eq!(table.primary_key, definition.primary_key);
            assert!(table.columns.iter().all(|c| definition.columns.contains(c)));
        }
    }

    #[test]
    fn test_same_input_same_output() {
        let catalog = catalog();
        let invoices = vec![
            json!({"InvoiceID": "I1", "LineItems": [{"Description": "Widget"}, {"Amount": 2.5}]}),
            json!({"InvoiceID": "I2", "LineItems": []}),
        ];
        let first = melt_entities(&catalog, "Invoice", &invoices, &MeltConfig::default()).unwrap();
        let second = melt_entities(&catalog, "Invoice", &invoices, &MeltConfig::default()).unwrap();
        assert_eq!(first.into_tables(), second.into_tables());
    }
}
