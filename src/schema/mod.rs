//! Type catalog and table schemas
//!
//! The [`TypeCatalog`] holds the accounting API's entity types. The
//! [`TypeResolver`] classifies declared attribute types against it, and the
//! [`SchemaRegistry`] maps endpoint names to the tables they produce.

pub mod catalog;
pub mod endpoint;
pub mod registry;
pub mod resolver;
pub mod types;

pub use catalog::TypeCatalog;
pub use endpoint::{locate_root, EndpointDefinition};
pub use registry::{Endpoint, SchemaRegistry};
pub use resolver::TypeResolver;
pub use types::{Attribute, DeclaredType, EntityType, TableDefinition, TerminalKind};
