//! Endpoint definitions and root-node lookup.
//!
//! An endpoint is either *reflective* (a root entity type in the catalog; tables
//! are derived by walking its attributes) or *declarative* (an externally curated
//! mapping of object paths to tables and primary keys).
//!
//! Declarative definitions use dotted object paths rooted at the parent object:
//!
//! ```json
//! {
//!   "root_node": "root_el.orders.order",
//!   "parent_table": {"order": "orders"},
//!   "child_table_definitions": {"order.order-items": "order_items"},
//!   "table_primary_keys": {
//!     "order": {"order.id": "order_id"},
//!     "order.order-items": {"order.id": "order_id", "order.order-items.item_id": "item_id"}
//!   }
//! }
//! ```

use crate::error::{MeltError, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Statically declared table layout for one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EndpointDefinition {
    /// Dotted path to the entity collection inside a page payload
    #[serde(default)]
    pub root_node: String,

    /// Single entry: parent object name -> parent table name
    pub parent_table: BTreeMap<String, String>,

    /// Child object path -> child table name
    #[serde(default)]
    pub child_table_definitions: BTreeMap<String, String>,

    /// Table object path -> (key object path -> output column name)
    #[serde(default)]
    pub table_primary_keys: BTreeMap<String, BTreeMap<String, String>>,
}

impl EndpointDefinition {
    pub fn validate(&self) -> Result<()> {
        let parent = self.parent_object()?;
        for path in self.child_table_definitions.keys() {
            if !path.starts_with(&format!("{}.", parent)) {
                return Err(MeltError::InvalidDefinition(format!(
                    "child table `{}` is not nested under parent object `{}`",
                    path, parent
                )));
            }
        }
        for path in self.table_primary_keys.keys() {
            if self.table_name(path).is_none() {
                return Err(MeltError::InvalidDefinition(format!(
                    "primary keys declared for unknown table object `{}`",
                    path
                )));
            }
        }
        Ok(())
    }

    /// Name of the parent object, the root of every object path
    pub fn parent_object(&self) -> Result<&str> {
        let mut entries = self.parent_table.keys();
        match (entries.next(), entries.next()) {
            (Some(name), None) => Ok(name),
            _ => Err(MeltError::InvalidDefinition(format!(
                "exactly one parent table is required, found {}",
                self.parent_table.len()
            ))),
        }
    }

    /// Output table for an object path, parent or child
    pub fn table_name(&self, object_path: &str) -> Option<&str> {
        self.parent_table
            .get(object_path)
            .or_else(|| self.child_table_definitions.get(object_path))
            .map(String::as_str)
    }

    pub fn is_child_table(&self, object_path: &str) -> bool {
        self.child_table_definitions.contains_key(object_path)
    }

    /// Closest enclosing object path that is itself a table
    pub fn parent_table_object<'p>(&self, object_path: &'p str) -> Option<&'p str> {
        let mut current = object_path;
        while let Some((parent, _)) = current.rsplit_once('.') {
            if self.table_name(parent).is_some() {
                return Some(parent);
            }
            current = parent;
        }
        None
    }

    /// Object paths of every table, parent first
    pub fn table_objects(&self) -> impl Iterator<Item = &str> {
        self.parent_table
            .keys()
            .chain(self.child_table_definitions.keys())
            .map(String::as_str)
    }

    /// Key object paths and their output columns for a table object
    pub fn primary_key_objects(&self, object_path: &str) -> impl Iterator<Item = (&str, &str)> {
        self.table_primary_keys
            .get(object_path)
            .into_iter()
            .flat_map(|keys| keys.iter().map(|(object, column)| (object.as_str(), column.as_str())))
    }

    /// Column a key object is renamed to inside the given table, if mapped
    pub fn primary_key_column(&self, object_path: &str, key_object: &str) -> Option<&str> {
        self.table_primary_keys
            .get(object_path)?
            .get(key_object)
            .map(String::as_str)
    }
}

/// Locate the entity collection inside a page payload
///
/// An empty `root_node` means the payload itself is the collection. A path that
/// leads nowhere, or to something other than a list, is reported as
/// [`MeltError::MissingRootData`]. An empty list is a valid, empty page.
pub fn locate_root<'v>(payload: &'v Value, root_node: &str) -> Result<&'v [Value]> {
    let mut current = payload;
    if !root_node.is_empty() {
        for segment in root_node.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment).ok_or_else(|| {
                    MeltError::missing_root(root_node, format!("no `{}` element in payload", segment))
                })?,
                _ => {
                    return Err(MeltError::missing_root(
                        root_node,
                        format!("cannot descend into `{}` of a non-object", segment),
                    ))
                }
            };
        }
    }

    match current {
        Value::Array(items) => Ok(items),
        Value::Null => Err(MeltError::missing_root(root_node, "root data is null")),
        _ => Err(MeltError::missing_root(
            root_node,
            "data extracted from the root node should be a list of objects",
        )),
    }
}
