//! Per-endpoint table definitions.
//!
//! The registry owns the type catalog and the endpoint map. Table definitions
//! are derived on demand: reflective endpoints walk the catalog from their root
//! type, declarative endpoints read their static mapping.

use crate::error::{MeltError, Result};
use crate::melt::types::MeltConfig;
use crate::schema::catalog::TypeCatalog;
use crate::schema::endpoint::EndpointDefinition;
use crate::schema::resolver::{child_table_name, enter_type, list_element, TypeResolver};
use crate::schema::types::{DeclaredType, TableDefinition};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// How an endpoint's payloads are decomposed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    /// Walk the catalog starting at `root_type`
    Reflective {
        #[serde(default)]
        root_node: String,
        root_type: String,
    },
    /// Follow a curated object-path mapping
    Declarative(EndpointDefinition),
}

impl Endpoint {
    pub fn reflective(root_node: impl Into<String>, root_type: impl Into<String>) -> Self {
        Endpoint::Reflective {
            root_node: root_node.into(),
            root_type: root_type.into(),
        }
    }

    /// Dotted path to the entity collection inside a page payload
    pub fn root_node(&self) -> &str {
        match self {
            Endpoint::Reflective { root_node, .. } => root_node,
            Endpoint::Declarative(definition) => &definition.root_node,
        }
    }
}

/// Schema catalog plus the endpoints that can be extracted with it
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    catalog: TypeCatalog,
    endpoints: BTreeMap<String, Endpoint>,
}

impl SchemaRegistry {
    pub fn new(catalog: TypeCatalog) -> Self {
        SchemaRegistry {
            catalog,
            endpoints: BTreeMap::new(),
        }
    }

    pub fn add_endpoint(&mut self, name: impl Into<String>, endpoint: Endpoint) -> Result<()> {
        let name = name.into();
        match &endpoint {
            Endpoint::Reflective { root_type, .. } => {
                self.catalog.entity(root_type)?;
            }
            Endpoint::Declarative(definition) => definition.validate()?,
        }
        self.endpoints.insert(name, endpoint);
        Ok(())
    }

    pub fn with_endpoint(mut self, name: impl Into<String>, endpoint: Endpoint) -> Result<Self> {
        self.add_endpoint(name, endpoint)?;
        Ok(self)
    }

    /// Load endpoints from a JSON object of `name -> endpoint`
    pub fn load_endpoints_json(&mut self, json: &str) -> Result<()> {
        let endpoints: BTreeMap<String, Endpoint> = serde_json::from_str(json)?;
        for (name, endpoint) in endpoints {
            self.add_endpoint(name, endpoint)?;
        }
        Ok(())
    }

    pub fn load_endpoints<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let json = std::fs::read_to_string(path)?;
        self.load_endpoints_json(&json)
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    pub fn endpoint(&self, name: &str) -> Result<&Endpoint> {
        self.endpoints.get(name).ok_or_else(|| MeltError::UnknownEndpoint {
            name: name.to_string(),
            known: self.endpoints.keys().cloned().collect(),
        })
    }

    pub fn endpoint_names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    /// Table definitions for an endpoint, using default naming
    pub fn get_table_definitions(&self, endpoint_name: &str) -> Result<BTreeMap<String, TableDefinition>> {
        self.get_table_definitions_with(endpoint_name, &MeltConfig::default())
    }

    pub fn get_table_definitions_with(
        &self,
        endpoint_name: &str,
        config: &MeltConfig,
    ) -> Result<BTreeMap<String, TableDefinition>> {
        match self.endpoint(endpoint_name)? {
            Endpoint::Reflective { root_type, .. } => {
                let resolver = TypeResolver::new(&self.catalog);
                let walker = DefinitionWalker { resolver: &resolver, config };
                let mut tables = BTreeMap::new();
                walker.describe_entity(root_type, None, &mut Vec::new(), &mut tables)?;
                Ok(tables)
            }
            Endpoint::Declarative(definition) => declarative_definitions(definition, config),
        }
    }

    /// Derive every endpoint's tables once, surfacing schema bugs before any data is read
    pub fn validate(&self) -> Result<()> {
        for name in self.endpoints.keys() {
            self.get_table_definitions(name)?;
        }
        Ok(())
    }
}

struct DefinitionWalker<'a> {
    resolver: &'a TypeResolver<'a>,
    config: &'a MeltConfig,
}

impl DefinitionWalker<'_> {
    fn describe_entity(
        &self,
        type_name: &str,
        parent: Option<(&str, &str)>,
        path: &mut Vec<String>,
        tables: &mut BTreeMap<String, TableDefinition>,
    ) -> Result<()> {
        enter_type(path, type_name)?;
        let entity = self.resolver.entity(type_name)?;
        let table_name = child_table_name(parent.map(|(table, _)| table), type_name, &self.config.separator);

        let mut table = TableDefinition::new(&table_name);
        let id_field = entity.synthetic_id_field(&self.config.id_suffix);
        table.push_key(&id_field);
        if let Some((_, parent_id)) = parent {
            table.push_key(parent_id);
        }

        let mut children = Vec::new();
        for attribute in &entity.attributes {
            match self.resolver.resolve(&attribute.type_name)? {
                DeclaredType::Terminal(_) => table.push_column(&attribute.name),
                DeclaredType::Struct(name) => self.describe_struct(&mut table, &name, &attribute.name, path)?,
                DeclaredType::Reference(name) => self.describe_reference(&mut table, &name, &attribute.name, path)?,
                DeclaredType::List(element) => children.push(list_element(attribute, &element)?.to_string()),
            }
        }
        tables.insert(table_name.clone(), table);

        for child in children {
            self.describe_entity(&child, Some((&table_name, &id_field)), path, tables)?;
        }
        path.pop();
        Ok(())
    }

    fn describe_struct(
        &self,
        table: &mut TableDefinition,
        type_name: &str,
        prefix: &str,
        path: &mut Vec<String>,
    ) -> Result<()> {
        enter_type(path, type_name)?;
        let entity = self.resolver.entity(type_name)?;
        for attribute in &entity.attributes {
            let column = format!("{}{}{}", prefix, self.config.separator, attribute.name);
            match self.resolver.resolve(&attribute.type_name)? {
                DeclaredType::Terminal(_) => table.push_column(&column),
                DeclaredType::Struct(name) => self.describe_struct(table, &name, &column, path)?,
                _ => {
                    return Err(MeltError::unsupported(
                        attribute.type_name.as_str(),
                        format!("struct `{}` may not contain `{}`", entity.name, attribute.name),
                    ))
                }
            }
        }
        path.pop();
        Ok(())
    }

    // References are shallow: the type itself is not expanded, so it is not
    // pushed onto the cycle path.
    fn describe_reference(
        &self,
        table: &mut TableDefinition,
        type_name: &str,
        field: &str,
        path: &mut Vec<String>,
    ) -> Result<()> {
        let entity = self.resolver.entity(type_name)?;
        if let Some(id_field) = entity.id_field_name() {
            table.push_column(id_field);
        }
        for attribute in &entity.attributes {
            if let DeclaredType::Struct(name) = self.resolver.resolve(&attribute.type_name)? {
                let prefix = format!("{}{}{}", field, self.config.separator, attribute.name);
                self.describe_struct(table, &name, &prefix, path)?;
            }
        }
        Ok(())
    }
}

fn declarative_definitions(
    definition: &EndpointDefinition,
    config: &MeltConfig,
) -> Result<BTreeMap<String, TableDefinition>> {
    // object path -> full key list as (key object, column)
    let mut keys: BTreeMap<&str, Vec<(String, String)>> = BTreeMap::new();
    let mut tables = BTreeMap::new();

    // Parents sort before their children: a path is a strict prefix of its descendants.
    let mut objects: Vec<&str> = definition.table_objects().collect();
    objects.sort_unstable();

    for object in objects {
        let table_name = definition
            .table_name(object)
            .ok_or_else(|| MeltError::InvalidDefinition(format!("no table for `{}`", object)))?;
        let mut table = TableDefinition::new(table_name);
        let mut table_keys = Vec::new();

        if let Some(parent) = definition.parent_table_object(object) {
            for (key_object, column) in keys.get(parent).into_iter().flatten() {
                let renamed = definition
                    .primary_key_column(object, key_object)
                    .unwrap_or(column.as_str());
                table_keys.push((key_object.clone(), renamed.to_string()));
            }
        }

        let own: Vec<(String, String)> = definition
            .primary_key_objects(object)
            .filter(|(key_object, _)| own_key_field(object, key_object).is_some())
            .map(|(key_object, column)| (key_object.to_string(), column.to_string()))
            .collect();
        if own.is_empty() {
            let synthetic = format!("{}{}", table_name, config.id_suffix);
            table_keys.insert(0, (object.to_string(), synthetic));
        } else {
            for (position, key) in own.into_iter().enumerate() {
                table_keys.insert(position, key);
            }
        }

        for (_, column) in &table_keys {
            table.push_key(column);
        }
        keys.insert(object, table_keys);
        tables.insert(table_name.to_string(), table);
    }

    Ok(tables)
}

/// Field name of a key object that is a direct member of `object_path`
pub(crate) fn own_key_field<'k>(object_path: &str, key_object: &'k str) -> Option<&'k str> {
    key_object
        .strip_prefix(object_path)?
        .strip_prefix('.')
        .filter(|field| !field.contains('.'))
}
