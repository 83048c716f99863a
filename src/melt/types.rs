use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One output row: ordered column name -> terminal value
///
/// Columns are kept in insertion order, which becomes the first-seen column
/// order of the table the row is added to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new() -> Self {
        Row(Map::new())
    }

    /// Set a column, returning the previous value if the column was already present
    pub fn insert(&mut self, column: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(column.into(), value)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if every column of the row is one of `keys`
    pub fn has_only(&self, keys: &[String]) -> bool {
        self.columns().all(|c| keys.iter().any(|k| k == c))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Row(map)
    }
}

/// Identity of a decomposed entity: the id column and its value
///
/// The value keeps its JSON type so foreign keys in child rows match the
/// parent's own column exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub field: String,
    pub value: Value,
}

impl Identity {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Identity {
            field: field.into(),
            value: value.into(),
        }
    }

    /// The value as delete scopes and logs see it; `None` if it cannot key a row
    pub fn key(&self) -> Option<String> {
        key_string(&self.value)
    }
}

/// Reference to a parent entity (for foreign keys)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentRef {
    /// Table the parent row was emitted into
    pub table: String,
    pub identity: Identity,
}

/// Configuration for the melting process
#[derive(Debug, Clone)]
pub struct MeltConfig {
    /// Separator for child table names and flattened struct columns
    pub separator: String,

    /// Suffix for synthesized id columns, e.g. `LineItem` + `ID`
    pub id_suffix: String,

    /// Emit rows that carry nothing beyond their key columns
    pub emit_key_only_rows: bool,

    /// Track delete scopes for incremental loads
    pub incremental: bool,
}

impl Default for MeltConfig {
    fn default() -> Self {
        MeltConfig {
            separator: String::from("_"),
            id_suffix: String::from("ID"),
            emit_key_only_rows: true,
            incremental: false,
        }
    }
}

/// Render a scalar as a key value: strings verbatim, everything else as JSON text
pub fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
