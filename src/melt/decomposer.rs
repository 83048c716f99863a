//! Catalog-driven decomposition of typed entities into rows.
//!
//! One entity instance yields one row in its own table, plus rows in child
//! tables for every element of its list attributes, recursively. Embedded
//! structs are flattened into the row under `{field}_` prefixes, references
//! contribute only the referenced identifier, and each child row carries its
//! parent's identifier as part of its primary key.

use crate::error::{MeltError, Result};
use crate::melt::accumulator::TableAccumulator;
use crate::melt::hash::content_hash_map;
use crate::melt::scalar::serialize_scalar;
use crate::melt::types::{key_string, Identity, MeltConfig, ParentRef, Row};
use crate::schema::resolver::{child_table_name, enter_type, list_element, TypeResolver};
use crate::schema::types::{DeclaredType, EntityType, TerminalKind};
use serde_json::{Map, Value};

/// A payload object viewed through its catalog type
pub struct EntityView<'a> {
    entity_type: &'a EntityType,
    data: &'a Map<String, Value>,
}

impl<'a> EntityView<'a> {
    pub fn new(entity_type: &'a EntityType, value: &'a Value) -> Result<Self> {
        match value {
            Value::Object(data) => Ok(EntityView { entity_type, data }),
            other => Err(MeltError::unsupported(
                entity_type.name.as_str(),
                format!("expected an object, found {}", json_kind(other)),
            )),
        }
    }

    pub fn type_name(&self) -> &'a str {
        &self.entity_type.name
    }

    pub fn id_field_name(&self) -> Option<&'a str> {
        self.entity_type.id_field_name()
    }

    /// Natural identifier under `field`, if the payload carries a usable key value
    pub fn id_value(&self, field: &str) -> Option<&'a Value> {
        self.data.get(field).filter(|v| key_string(v).is_some())
    }

    pub fn is_downloadable(&self) -> bool {
        self.entity_type.is_downloadable()
    }

    /// Value of a declared attribute; nulls count as absent
    pub fn field(&self, name: &str) -> Option<&'a Value> {
        self.data.get(name).filter(|v| !v.is_null())
    }

    fn undeclared_fields(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.data
            .keys()
            .filter(|k| self.entity_type.attribute(k).is_none())
            .map(String::as_str)
    }
}

/// Recursive row decomposer for catalog-typed entities
pub struct RowDecomposer<'a> {
    resolver: &'a TypeResolver<'a>,
    config: &'a MeltConfig,
    accumulator: &'a mut TableAccumulator,
}

impl<'a> RowDecomposer<'a> {
    pub fn new(
        resolver: &'a TypeResolver<'a>,
        config: &'a MeltConfig,
        accumulator: &'a mut TableAccumulator,
    ) -> Self {
        RowDecomposer {
            resolver,
            config,
            accumulator,
        }
    }

    /// Decompose one entity of `type_name`, returning its identity
    ///
    /// With a `parent`, the entity is treated as an element of the parent's
    /// child collection: its table is prefixed with the parent's table and its
    /// row carries the parent's identifier.
    pub fn decompose(&mut self, entity: &Value, type_name: &str, parent: Option<&ParentRef>) -> Result<Identity> {
        self.decompose_entity(entity, type_name, parent, &mut Vec::new())
    }

    fn decompose_entity(
        &mut self,
        entity: &Value,
        type_name: &str,
        parent: Option<&ParentRef>,
        path: &mut Vec<String>,
    ) -> Result<Identity> {
        enter_type(path, type_name)?;
        let view = EntityView::new(self.resolver.entity(type_name)?, entity)?;
        let table_name = child_table_name(parent.map(|p| p.table.as_str()), type_name, &self.config.separator);

        let mut row = Row::new();
        let mut primary_key = Vec::new();

        let id_field = view.entity_type.synthetic_id_field(&self.config.id_suffix);
        let identity = match view.id_value(&id_field) {
            Some(value) => Identity::new(id_field, value.clone()),
            None => Identity::new(id_field, content_hash_map(view.data)),
        };
        row.insert(identity.field.clone(), identity.value.clone());
        primary_key.push(identity.field.clone());

        let parent_key = match parent {
            Some(parent) => {
                let Some(key) = parent.identity.key() else {
                    return Err(MeltError::MissingParentIdentity { table: table_name });
                };
                row.insert(parent.identity.field.clone(), parent.identity.value.clone());
                primary_key.push(parent.identity.field.clone());
                Some((parent.identity.field.as_str(), key))
            }
            None => None,
        };

        for field in view.undeclared_fields() {
            tracing::debug!(table = %table_name, field, "skipping undeclared field");
        }

        let mut children = Vec::new();
        for attribute in &view.entity_type.attributes {
            let Some(value) = view.field(&attribute.name) else {
                continue;
            };
            match self.resolver.resolve(&attribute.type_name)? {
                DeclaredType::Terminal(kind) => {
                    // key columns already hold their final value
                    let is_parent_key = parent_key.as_ref().is_some_and(|(field, _)| *field == attribute.name);
                    if attribute.name == identity.field || is_parent_key {
                        continue;
                    }
                    row.insert(attribute.name.clone(), serialize_scalar(kind, value, &attribute.name)?);
                }
                DeclaredType::Struct(name) => {
                    self.flatten_struct(&mut row, value, &name, &attribute.name, path)?;
                }
                DeclaredType::Reference(name) => {
                    self.write_reference(&mut row, value, &name, &attribute.name, path)?;
                }
                DeclaredType::List(element) => {
                    let element_type = list_element(attribute, &element)?.to_string();
                    children.push((attribute, element_type, value));
                }
            }
        }

        if self.config.emit_key_only_rows || !row.has_only(&primary_key) {
            self.accumulator.add_row(&table_name, row, &primary_key);
        } else {
            tracing::debug!(table = %table_name, id = %identity.value, "suppressing key-only row");
        }
        if let Some((key_column, key)) = &parent_key {
            self.accumulator.link_parent(&table_name, &primary_key, key_column, key);
        }

        let child_parent = ParentRef {
            table: table_name,
            identity: identity.clone(),
        };
        for (attribute, element_type, value) in children {
            let Value::Array(items) = value else {
                return Err(MeltError::unsupported(
                    attribute.type_name.as_str(),
                    format!("attribute `{}` expected a list, found {}", attribute.name, json_kind(value)),
                ));
            };
            for item in items.iter().filter(|item| !item.is_null()) {
                self.decompose_entity(item, &element_type, Some(&child_parent), path)?;
            }
        }

        path.pop();
        Ok(identity)
    }

    fn flatten_struct(
        &self,
        row: &mut Row,
        value: &Value,
        type_name: &str,
        prefix: &str,
        path: &mut Vec<String>,
    ) -> Result<()> {
        enter_type(path, type_name)?;
        let view = EntityView::new(self.resolver.entity(type_name)?, value)?;
        for attribute in &view.entity_type.attributes {
            let Some(value) = view.field(&attribute.name) else {
                continue;
            };
            let column = format!("{}{}{}", prefix, self.config.separator, attribute.name);
            match self.resolver.resolve(&attribute.type_name)? {
                DeclaredType::Terminal(kind) => {
                    row.insert(column.clone(), serialize_scalar(kind, value, &column)?);
                }
                DeclaredType::Struct(name) => self.flatten_struct(row, value, &name, &column, path)?,
                _ => {
                    return Err(MeltError::unsupported(
                        attribute.type_name.as_str(),
                        format!("struct `{}` may not contain `{}`", view.type_name(), attribute.name),
                    ))
                }
            }
        }
        path.pop();
        Ok(())
    }

    // Shallow: the referenced entity's own row is fetched through its own endpoint.
    fn write_reference(
        &self,
        row: &mut Row,
        value: &Value,
        type_name: &str,
        field: &str,
        path: &mut Vec<String>,
    ) -> Result<()> {
        let view = EntityView::new(self.resolver.entity(type_name)?, value)?;
        if let Some(id_field) = view.id_field_name() {
            if let Some(id) = view.field(id_field) {
                let id = serialize_scalar(TerminalKind::String, id, id_field)?;
                if let Some(previous) = row.insert(id_field, id.clone()) {
                    if previous != id {
                        tracing::warn!(
                            column = id_field,
                            reference = field,
                            previous = %previous,
                            kept = %id,
                            "reference id overwrites an earlier value in the same column"
                        );
                    }
                }
            }
        }
        for attribute in &view.entity_type.attributes {
            let Some(value) = view.field(&attribute.name) else {
                continue;
            };
            if let DeclaredType::Struct(name) = self.resolver.resolve(&attribute.type_name)? {
                let prefix = format!("{}{}{}", field, self.config.separator, attribute.name);
                self.flatten_struct(row, value, &name, &prefix, path)?;
            }
        }
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
