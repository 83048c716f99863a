//! Type catalog: the statically constructed schema every decomposition runs against.
//!
//! A catalog is built once at startup, either in code or from a JSON descriptor
//! file, and is immutable afterwards:
//!
//! ```json
//! {
//!   "enums": ["AccountType", "CurrencyCode"],
//!   "entities": [
//!     {"name": "Account", "id_field": "AccountID",
//!      "attributes": {"AccountID": "str", "Name": "str", "Type": "AccountType"}}
//!   ]
//! }
//! ```

use crate::error::{MeltError, Result};
use crate::schema::types::{Attribute, EntityType};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    enums: BTreeSet<String>,
    #[serde(default)]
    entities: Vec<EntityType>,
}

/// Registry of entity types and enumerations known to the source schema
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    entities: BTreeMap<String, EntityType>,
    enums: BTreeSet<String>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type, validating its identifier declaration
    pub fn add_entity(&mut self, entity: EntityType) -> Result<()> {
        if let Some(id_field) = entity.id_field_name() {
            if entity.attribute(id_field).is_none() {
                return Err(MeltError::InvalidDefinition(format!(
                    "type `{}` declares id field `{}` which is not one of its attributes",
                    entity.name, id_field
                )));
            }
        }
        if self.enums.contains(&entity.name) {
            return Err(MeltError::InvalidDefinition(format!(
                "`{}` is declared both as an enum and as an entity",
                entity.name
            )));
        }
        if self.entities.contains_key(&entity.name) {
            return Err(MeltError::InvalidDefinition(format!(
                "type `{}` is declared twice",
                entity.name
            )));
        }
        self.entities.insert(entity.name.clone(), entity);
        Ok(())
    }

    pub fn add_enum(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.entities.contains_key(&name) {
            return Err(MeltError::InvalidDefinition(format!(
                "`{}` is declared both as an enum and as an entity",
                name
            )));
        }
        self.enums.insert(name);
        Ok(())
    }

    /// Builder form of [`add_entity`](Self::add_entity)
    pub fn with_entity(mut self, entity: EntityType) -> Result<Self> {
        self.add_entity(entity)?;
        Ok(self)
    }

    /// Builder form of [`add_enum`](Self::add_enum)
    pub fn with_enum(mut self, name: impl Into<String>) -> Result<Self> {
        self.add_enum(name)?;
        Ok(self)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let mut catalog = TypeCatalog::new();
        for name in file.enums {
            catalog.add_enum(name)?;
        }
        for entity in file.entities {
            catalog.add_entity(entity)?;
        }
        Ok(catalog)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn get(&self, type_name: &str) -> Option<&EntityType> {
        self.entities.get(type_name)
    }

    /// Look up an entity type, failing for names the catalog does not know
    pub fn entity(&self, type_name: &str) -> Result<&EntityType> {
        self.get(type_name)
            .ok_or_else(|| MeltError::UnknownType(type_name.to_string()))
    }

    pub fn get_attributes(&self, type_name: &str) -> Result<&[Attribute]> {
        Ok(&self.entity(type_name)?.attributes)
    }

    pub fn is_enum(&self, type_name: &str) -> bool {
        self.enums.contains(type_name)
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }
}
