use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Kind of a terminal (scalar) attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalKind {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

/// Classification of a declared attribute type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredType {
    /// Scalar written directly into the row (enums resolve to `Terminal(String)`)
    Terminal(TerminalKind),
    /// Embedded composite flattened inline under a column prefix
    Struct(String),
    /// Independently addressable composite; only its identifier is stored inline
    Reference(String),
    /// Repeated collection, stored as a child table
    List(Box<DeclaredType>),
}

impl DeclaredType {
    /// Name of the composite entity type, if this is a struct or reference
    pub fn entity_type(&self) -> Option<&str> {
        match self {
            DeclaredType::Struct(name) | DeclaredType::Reference(name) => Some(name),
            _ => None,
        }
    }
}

/// A declared attribute of an entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Key of the attribute in the raw payload, also the base column name
    pub name: String,
    /// Declared type name as exposed by the source schema, e.g. `str` or `list[LineItem]`
    pub type_name: String,
}

/// A named schema with ordered attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,

    #[serde(
        serialize_with = "attributes_to_map",
        deserialize_with = "attributes_from_map"
    )]
    pub attributes: Vec<Attribute>,

    /// Identifier column; present only for independently downloadable entities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
}

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        EntityType {
            name: name.into(),
            attributes: Vec::new(),
            id_field: None,
        }
    }

    pub fn with_id(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = Some(id_field.into());
        self
    }

    /// Append an attribute, keeping declaration order
    pub fn attr(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.attributes.push(Attribute {
            name: name.into(),
            type_name: type_name.into(),
        });
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn id_field_name(&self) -> Option<&str> {
        self.id_field.as_deref()
    }

    /// Downloadable entities are stored by reference rather than embedded
    pub fn is_downloadable(&self) -> bool {
        self.id_field.is_some()
    }

    /// Column holding the identity when the payload carries none
    pub fn synthetic_id_field(&self, id_suffix: &str) -> String {
        match &self.id_field {
            Some(field) => field.clone(),
            None => format!("{}{}", self.name, id_suffix),
        }
    }
}

fn attributes_to_map<S: Serializer>(attributes: &[Attribute], serializer: S) -> Result<S::Ok, S::Error> {
    let map: Map<String, Value> = attributes
        .iter()
        .map(|a| (a.name.clone(), Value::String(a.type_name.clone())))
        .collect();
    map.serialize(serializer)
}

// Attributes are written as an ordered JSON object: {"AccountID": "str", ...}
fn attributes_from_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Attribute>, D::Error> {
    let map = Map::<String, Value>::deserialize(deserializer)?;
    map.into_iter()
        .map(|(name, type_value)| match type_value {
            Value::String(type_name) => Ok(Attribute { name, type_name }),
            other => Err(D::Error::custom(format!(
                "attribute `{}` must declare its type as a string, found {}",
                name, other
            ))),
        })
        .collect()
}

/// Statically known shape of one output table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDefinition {
    pub name: String,
    pub primary_key: Vec<String>,
    pub columns: Vec<String>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        TableDefinition {
            name: name.into(),
            primary_key: Vec::new(),
            columns: Vec::new(),
        }
    }

    pub(crate) fn push_key(&mut self, column: &str) {
        if !self.primary_key.iter().any(|c| c == column) {
            self.primary_key.push(column.to_string());
        }
        self.push_column(column);
    }

    pub(crate) fn push_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }
}
