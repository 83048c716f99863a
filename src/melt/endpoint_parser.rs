//! Declarative endpoint parsing
//!
//! Walks payload objects against an [`EndpointDefinition`]: every object path
//! the definition names becomes its own table, everything else is flattened
//! into the enclosing table's row. Child rows inherit their ancestors' key
//! values, renamed per the definition's primary-key mapping.

use crate::error::{MeltError, Result};
use crate::melt::accumulator::TableAccumulator;
use crate::melt::hash::content_hash_map;
use crate::melt::types::{key_string, MeltConfig, Row};
use crate::schema::endpoint::EndpointDefinition;
use crate::schema::registry::own_key_field;
use serde_json::{Map, Value};

/// A key value carried from a table row down to its child tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumn {
    /// Object path the key was declared on
    pub object: String,
    /// Column name inside the table that emitted it
    pub column: String,
    pub value: String,
}

pub struct DeclarativeParser<'a> {
    definition: &'a EndpointDefinition,
    config: &'a MeltConfig,
    accumulator: &'a mut TableAccumulator,
}

impl<'a> DeclarativeParser<'a> {
    pub fn new(
        definition: &'a EndpointDefinition,
        config: &'a MeltConfig,
        accumulator: &'a mut TableAccumulator,
    ) -> Self {
        DeclarativeParser {
            definition,
            config,
            accumulator,
        }
    }

    /// Parse one top-level object of the endpoint, returning its own key values
    pub fn parse(&mut self, entity: &Value) -> Result<Vec<KeyColumn>> {
        let parent = self.definition.parent_object()?.to_string();
        self.parse_entity(entity, &parent, &[])
    }

    /// Parse an object sitting at `object_path`, below ancestors holding `inherited` keys
    pub fn parse_entity(&mut self, entity: &Value, object_path: &str, inherited: &[KeyColumn]) -> Result<Vec<KeyColumn>> {
        let table_name = self
            .definition
            .table_name(object_path)
            .ok_or_else(|| MeltError::InvalidDefinition(format!("no table configured for `{}`", object_path)))?
            .to_string();
        let Value::Object(object) = entity else {
            return Err(MeltError::unsupported(
                table_name,
                format!("expected an object at `{}`", object_path),
            ));
        };

        let own_keys = self.own_keys(object, object_path, &table_name);
        let inherited: Vec<KeyColumn> = inherited
            .iter()
            .map(|key| KeyColumn {
                column: self
                    .definition
                    .primary_key_column(object_path, &key.object)
                    .unwrap_or(key.column.as_str())
                    .to_string(),
                ..key.clone()
            })
            .collect();

        let mut row = Row::new();
        let mut primary_key = Vec::with_capacity(own_keys.len() + inherited.len());
        for key in own_keys.iter().chain(&inherited) {
            row.insert(key.column.clone(), Value::String(key.value.clone()));
            primary_key.push(key.column.clone());
        }

        let mut children = Vec::new();
        self.flatten_into(&mut row, object, object_path, None, &mut children, &primary_key);

        if self.config.emit_key_only_rows || !row.has_only(&primary_key) {
            self.accumulator.add_row(&table_name, row, &primary_key);
        }
        if let Some(parent_key) = inherited.first() {
            self.accumulator
                .link_parent(&table_name, &primary_key, &parent_key.column, &parent_key.value);
        }

        let mut passed_down = own_keys.clone();
        passed_down.extend(inherited);
        for (child_path, value) in children {
            let items = match value {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            };
            for item in items.into_iter().filter(|item| !item.is_null()) {
                self.parse_entity(item, &child_path, &passed_down)?;
            }
        }

        Ok(own_keys)
    }

    fn own_keys(&self, object: &Map<String, Value>, object_path: &str, table_name: &str) -> Vec<KeyColumn> {
        let mut keys = Vec::new();
        for (key_object, column) in self.definition.primary_key_objects(object_path) {
            let Some(field) = own_key_field(object_path, key_object) else {
                continue;
            };
            let value = object.get(field).and_then(key_string).unwrap_or_else(|| {
                tracing::warn!(table = table_name, field, "key field missing, using content hash");
                content_hash_map(object)
            });
            keys.push(KeyColumn {
                object: key_object.to_string(),
                column: column.to_string(),
                value,
            });
        }

        if keys.is_empty() {
            keys.push(KeyColumn {
                object: object_path.to_string(),
                column: format!("{}{}", table_name, self.config.id_suffix),
                value: content_hash_map(object),
            });
        }
        keys
    }

    fn flatten_into<'v>(
        &self,
        row: &mut Row,
        object: &'v Map<String, Value>,
        object_path: &str,
        prefix: Option<&str>,
        children: &mut Vec<(String, &'v Value)>,
        primary_key: &[String],
    ) {
        for (field, value) in object {
            let path = format!("{}.{}", object_path, field);
            if self.definition.is_child_table(&path) {
                if !value.is_null() {
                    children.push((path, value));
                }
                continue;
            }

            let column = match prefix {
                Some(prefix) => format!("{}{}{}", prefix, self.config.separator, field),
                None => field.clone(),
            };
            if primary_key.contains(&column) && row.contains(&column) {
                continue;
            }

            match value {
                Value::Object(nested) => {
                    self.flatten_into(row, nested, &path, Some(&column), children, primary_key);
                }
                Value::Array(items) if items.iter().any(|i| i.is_object() || i.is_array()) => {
                    tracing::warn!(path = %path, "skipping list of objects with no table configured");
                }
                Value::Array(_) => {
                    row.insert(column, Value::String(value.to_string()));
                }
                scalar => {
                    row.insert(column, scalar.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn orders_definition() -> EndpointDefinition {
        serde_json::from_value(json!({
            "root_node": "root_el.orders.order",
            "parent_table": {"order": "orders"},
            "child_table_definitions": {
                "order.order-items": "order_items",
                "order.order-items.notes": "order_item_notes"
            },
            "table_primary_keys": {
                "order": {"order.id": "order_id"},
                "order.order-items": {"order.id": "order_id", "order.order-items.item_id": "item_id"}
            }
        }))
        .unwrap()
    }

    fn parse(definition: &EndpointDefinition, config: &MeltConfig, value: Value) -> TableAccumulator {
        let mut acc = TableAccumulator::new(config.incremental);
        DeclarativeParser::new(definition, config, &mut acc).parse(&value).unwrap();
        acc
    }

    #[test]
    fn test_parent_and_child_tables() {
        let definition = orders_definition();
        let acc = parse(
            &definition,
            &MeltConfig::default(),
            json!({
                "id": "O1",
                "customer": {"name": "Acme", "address": {"city": "Wellington"}},
                "tags": ["rush", "gift"],
                "order-items": [{"item_id": "X1", "qty": 2}, {"item_id": "X2", "qty": 1}]
            }),
        );

        let orders = acc.table("orders").unwrap();
        assert_eq!(orders.primary_key, vec!["order_id"]);
        assert_eq!(
            orders.columns,
            vec!["order_id", "id", "customer_name", "customer_address_city", "tags"]
        );
        assert_eq!(orders.rows[0].get("tags"), Some(&json!(r#"["rush","gift"]"#)));

        let items = acc.table("order_items").unwrap();
        assert_eq!(items.primary_key, vec!["item_id", "order_id"]);
        assert_eq!(items.rows.len(), 2);
        assert_eq!(items.rows[0].get("order_id"), Some(&json!("O1")));
        assert_eq!(items.rows[1].get("item_id"), Some(&json!("X2")));
    }

    #[test]
    fn test_synthetic_key_and_inherited_keys() {
        let definition = orders_definition();
        let acc = parse(
            &definition,
            &MeltConfig::default(),
            json!({
                "id": "O1",
                "order-items": [{"item_id": "X1", "notes": [{"text": "fragile"}]}]
            }),
        );

        let notes = acc.table("order_item_notes").unwrap();
        assert_eq!(notes.primary_key, vec!["order_item_notesID", "item_id", "order_id"]);
        let note = &notes.rows[0];
        assert_eq!(
            note.get("order_item_notesID"),
            Some(&json!(content_hash_map(json!({"text": "fragile"}).as_object().unwrap())))
        );
        assert_eq!(note.get("item_id"), Some(&json!("X1")));
        assert_eq!(note.get("order_id"), Some(&json!("O1")));
    }

    #[test]
    fn test_single_child_object_is_a_list_of_one() {
        let definition = orders_definition();
        let acc = parse(
            &definition,
            &MeltConfig::default(),
            json!({"id": "O1", "order-items": {"item_id": "X1"}}),
        );
        assert_eq!(acc.table("order_items").unwrap().rows.len(), 1);
    }

    #[test]
    fn test_unconfigured_object_list_is_skipped() {
        let definition = orders_definition();
        let acc = parse(
            &definition,
            &MeltConfig::default(),
            json!({"id": "O1", "payments": [{"amount": 10}], "note": null}),
        );

        let orders = acc.table("orders").unwrap();
        assert_eq!(orders.columns, vec!["order_id", "id", "note"]);
        assert_eq!(acc.table_names().collect::<Vec<_>>(), vec!["orders"]);
    }

    #[test]
    fn test_delete_scope_tracks_parent_key() {
        let definition = orders_definition();
        let config = MeltConfig {
            incremental: true,
            ..MeltConfig::default()
        };
        let acc = parse(
            &definition,
            &config,
            json!({"id": "O1", "order-items": [{"item_id": "X1"}, {"item_id": "X2"}]}),
        );

        let scope = acc.table("order_items").unwrap().delete_scope.clone().unwrap();
        assert_eq!(scope.key_column, "order_id");
        assert_eq!(scope.values.into_iter().collect::<Vec<_>>(), vec!["O1"]);
    }

    #[test]
    fn test_key_only_children_suppressed_when_configured() {
        let definition = orders_definition();
        let config = MeltConfig {
            emit_key_only_rows: false,
            ..MeltConfig::default()
        };
        let acc = parse(
            &definition,
            &config,
            json!({"id": "O1", "order-items": [{"item_id": "X1"}]}),
        );

        assert!(acc.table("order_items").map_or(true, |t| t.rows.is_empty()));
        assert_eq!(acc.table("orders").unwrap().rows.len(), 1);
    }

    #[test]
    fn test_suppressed_children_still_scoped_when_incremental() {
        let definition = orders_definition();
        let config = MeltConfig {
            emit_key_only_rows: false,
            incremental: true,
            ..MeltConfig::default()
        };
        let acc = parse(
            &definition,
            &config,
            json!({"id": "O1", "order-items": [{"item_id": "X1"}]}),
        );

        let items = acc.table("order_items").unwrap();
        assert!(items.rows.is_empty());
        assert_eq!(items.primary_key, vec!["item_id", "order_id"]);
        assert_eq!(items.columns, vec!["item_id", "order_id"]);
        let scope = items.delete_scope.clone().unwrap();
        assert_eq!(scope.values.into_iter().collect::<Vec<_>>(), vec!["O1"]);
    }

    #[test]
    fn test_missing_key_falls_back_to_hash() {
        let definition = orders_definition();
        let mut acc = TableAccumulator::new(false);
        let config = MeltConfig::default();
        let keys = DeclarativeParser::new(&definition, &config, &mut acc)
            .parse(&json!({"status": "open"}))
            .unwrap();

        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].column, "order_id");
        assert_eq!(keys[0].value, content_hash_map(json!({"status": "open"}).as_object().unwrap()));
    }

    #[test]
    fn test_non_object_rejected() {
        let definition = orders_definition();
        let mut acc = TableAccumulator::new(false);
        let config = MeltConfig::default();
        let err = DeclarativeParser::new(&definition, &config, &mut acc)
            .parse(&json!("O1"))
            .unwrap_err();
        assert!(matches!(err, MeltError::UnsupportedType { .. }));
    }
}
