//! Melting - decompose typed JSON entities into relational rows
//!
//! Catalog-typed entities go through the [`RowDecomposer`]; endpoints with a
//! declarative table layout go through the [`DeclarativeParser`]. Both feed a
//! [`TableAccumulator`], which is drained into a [`WriterCache`] page by page.

pub mod accumulator;
pub mod decomposer;
pub mod endpoint_parser;
pub mod hash;
pub mod scalar;
pub mod types;
pub mod writer;

pub use accumulator::{DeleteScope, Table, TableAccumulator};
pub use decomposer::{EntityView, RowDecomposer};
pub use endpoint_parser::{DeclarativeParser, KeyColumn};
pub use hash::content_hash;
pub use types::{Identity, MeltConfig, ParentRef, Row};
pub use writer::{JsonLinesWriter, MemoryWriter, WriterCache};
