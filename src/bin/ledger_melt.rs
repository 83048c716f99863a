//! ledger-melt: flatten accounting API pages into relational tables
//!
//! Usage:
//!   # Melt one tenant's invoice pages into ./tables
//!   ledger-melt --catalog catalog.json --endpoint Invoices invoices.jsonl -o ./tables
//!
//!   # Several tenants, incremental load with delete scopes
//!   ledger-melt --catalog catalog.json --endpoint Invoices --incremental acme.jsonl globex.jsonl -o ./tables
//!
//!   # One file holding a bare entity array as its only page
//!   ledger-melt --catalog catalog.json --endpoint Account --single-page accounts.json -o ./tables
//!
//!   # Declarative endpoints, print table definitions only
//!   ledger-melt --catalog catalog.json --endpoints endpoints.json --endpoint orders --list-tables

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ledger_melt::extract::{flush, merge_tenants, Extraction};
use ledger_melt::melt::{JsonLinesWriter, MeltConfig};
use ledger_melt::MeltError;
use ledger_melt::schema::{Endpoint, SchemaRegistry, TypeCatalog};
use serde_json::Value;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ledger-melt")]
#[command(about = "Flatten accounting API pages into relational tables", long_about = None)]
struct Args {
    /// Page files, one per tenant (NDJSON pages, a JSON array of pages, or a single page object)
    #[arg(value_name = "FILE")]
    inputs: Vec<PathBuf>,

    /// Treat each input file as exactly one page, even when it is a top-level array
    #[arg(long)]
    single_page: bool,

    /// Type catalog JSON file
    #[arg(long)]
    catalog: PathBuf,

    /// Endpoint definitions JSON file (name -> endpoint)
    #[arg(long)]
    endpoints: Option<PathBuf>,

    /// Endpoint to melt; without --endpoints it names a catalog root type
    #[arg(long)]
    endpoint: String,

    /// Dotted path to the entity list inside each page (reflective endpoints only)
    #[arg(long)]
    root_node: Option<String>,

    /// Output directory for one .jsonl file per table
    #[arg(long, short = 'o', default_value = ".")]
    output_dir: PathBuf,

    /// Track delete scopes for child tables
    #[arg(long)]
    incremental: bool,

    /// Drop rows that carry nothing beyond their key columns
    #[arg(long)]
    suppress_key_only_rows: bool,

    /// Separator for child table names and flattened columns (default: "_")
    #[arg(long)]
    separator: Option<String>,

    /// Print the endpoint's table definitions and exit
    #[arg(long)]
    list_tables: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = MeltConfig::default();
    if let Some(sep) = args.separator.clone() {
        config.separator = sep;
    }
    config.incremental = args.incremental;
    config.emit_key_only_rows = !args.suppress_key_only_rows;

    let registry = build_registry(&args)?;

    if args.list_tables {
        let tables = registry
            .get_table_definitions_with(&args.endpoint, &config)
            .with_context(|| format!("Failed to derive tables for {}", args.endpoint))?;
        println!("{}", serde_json::to_string_pretty(&tables)?);
        return Ok(());
    }

    if args.inputs.is_empty() {
        bail!("no input files given");
    }

    let extraction = Extraction::new(&registry, config);
    let mut tenants = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let pages = read_pages(input, args.single_page).with_context(|| format!("Failed to read {}", input.display()))?;
        tracing::info!(input = %input.display(), pages = pages.len(), "loaded tenant");
        match extraction.collect(&args.endpoint, pages.into_iter().map(Ok::<_, MeltError>)) {
            Ok(acc) => tenants.push(acc),
            Err(e) if !e.is_fatal() => {
                tracing::warn!(input = %input.display(), error = %e, "skipping tenant");
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to melt {}", input.display())),
        }
    }

    let merged = merge_tenants(tenants);
    let mut writer = JsonLinesWriter::new(&args.output_dir)
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;
    let tables = flush(merged, &mut writer)?;
    writer.close_all()?;

    for (table, columns) in &tables {
        tracing::info!(table = %table, columns = columns.len(), "wrote table");
    }
    Ok(())
}

fn build_registry(args: &Args) -> Result<SchemaRegistry> {
    let catalog = TypeCatalog::from_path(&args.catalog)
        .with_context(|| format!("Failed to load catalog {}", args.catalog.display()))?;
    let mut registry = SchemaRegistry::new(catalog);

    match &args.endpoints {
        Some(path) => registry
            .load_endpoints(path)
            .with_context(|| format!("Failed to load endpoints {}", path.display()))?,
        None => {
            let root_node = args.root_node.clone().unwrap_or_default();
            registry
                .add_endpoint(&args.endpoint, Endpoint::reflective(root_node, &args.endpoint))
                .with_context(|| format!("Unknown root type {}", args.endpoint))?;
        }
    }
    registry
        .get_table_definitions(&args.endpoint)
        .with_context(|| format!("Endpoint {} has no consistent table layout", args.endpoint))?;
    Ok(registry)
}

/// Read every page of a file
fn read_pages(path: &Path, single_page: bool) -> Result<Vec<Value>> {
    let mut content = Vec::new();
    BufReader::new(std::fs::File::open(path)?).read_to_end(&mut content)?;
    parse_pages(&content, single_page)
}

/// Split file content into pages using SIMD-accelerated parsing when possible
///
/// A top-level array is a list of pages unless `single_page` is set, in which
/// case it is handed to the endpoint as one page (root node `""`).
fn parse_pages(content: &[u8], single_page: bool) -> Result<Vec<Value>> {
    // simd-json parses in place, keep the raw bytes for the fallback
    let mut scratch = content.to_vec();
    match simd_json::serde::from_slice::<Value>(&mut scratch) {
        Ok(page) if single_page => Ok(vec![page]),
        Ok(Value::Array(pages)) => Ok(pages),
        Ok(page) => Ok(vec![page]),
        Err(_) => {
            // Fallback to serde_json for NDJSON
            let text = String::from_utf8_lossy(content);
            let mut pages = Vec::new();
            for (number, line) in text.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let page: Value = serde_json::from_str(line)
                    .with_context(|| format!("Invalid JSON on line {}", number + 1))?;
                pages.push(page);
            }
            Ok(pages)
        }
    }
}
