//! Classification of declared attribute type names.

use crate::error::{MeltError, Result};
use crate::schema::catalog::TypeCatalog;
use crate::schema::types::{Attribute, DeclaredType, EntityType, TerminalKind};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;

static LIST_TYPE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^list\[(?P<element>.+)\]$").expect("valid list type pattern"));

/// Resolves declared type names against a catalog, memoizing the results
pub struct TypeResolver<'c> {
    catalog: &'c TypeCatalog,
    cache: RefCell<HashMap<String, DeclaredType>>,
}

impl<'c> TypeResolver<'c> {
    pub fn new(catalog: &'c TypeCatalog) -> Self {
        TypeResolver {
            catalog,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &'c TypeCatalog {
        self.catalog
    }

    pub fn entity(&self, type_name: &str) -> Result<&'c EntityType> {
        self.catalog.entity(type_name)
    }

    /// Classify a declared type name
    ///
    /// Rules, in priority order: terminal vocabulary, date/datetime markers,
    /// enumerations, `list[...]` collections, then catalog composites.
    pub fn resolve(&self, type_name: &str) -> Result<DeclaredType> {
        if let Some(resolved) = self.cache.borrow().get(type_name) {
            return Ok(resolved.clone());
        }

        let resolved = self.classify(type_name)?;
        self.cache
            .borrow_mut()
            .insert(type_name.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn classify(&self, type_name: &str) -> Result<DeclaredType> {
        if let Some(kind) = terminal_kind(type_name) {
            return Ok(DeclaredType::Terminal(kind));
        }

        if self.catalog.is_enum(type_name) {
            return Ok(DeclaredType::Terminal(TerminalKind::String));
        }

        if let Some(captures) = LIST_TYPE_REGEX.captures(type_name) {
            let element = self.resolve(&captures["element"])?;
            if matches!(element, DeclaredType::List(_)) {
                return Err(MeltError::unsupported(
                    type_name,
                    "lists of lists are not supported",
                ));
            }
            return Ok(DeclaredType::List(Box::new(element)));
        }

        if let Some(entity) = self.catalog.get(type_name) {
            return Ok(if entity.is_downloadable() {
                DeclaredType::Reference(entity.name.clone())
            } else {
                DeclaredType::Struct(entity.name.clone())
            });
        }

        Err(MeltError::unsupported(type_name, "unexpected type encountered"))
    }
}

fn terminal_kind(type_name: &str) -> Option<TerminalKind> {
    let kind = match type_name {
        "str" | "string" => TerminalKind::String,
        "int" | "integer" => TerminalKind::Integer,
        "float" | "number" | "double" => TerminalKind::Float,
        "bool" | "boolean" => TerminalKind::Boolean,
        // datetime before date: both share the prefix
        _ if type_name.starts_with("datetime") => TerminalKind::DateTime,
        _ if type_name.starts_with("date") => TerminalKind::Date,
        _ => return None,
    };
    Some(kind)
}

/// Push a composite type onto the expansion path, failing if it is already on it
pub(crate) fn enter_type(path: &mut Vec<String>, type_name: &str) -> Result<()> {
    if path.iter().any(|t| t == type_name) {
        let mut cycle = path.clone();
        cycle.push(type_name.to_string());
        return Err(MeltError::SchemaCycle { path: cycle });
    }
    path.push(type_name.to_string());
    Ok(())
}

/// Entity type stored by a list attribute; only composite elements form child tables
pub(crate) fn list_element<'t>(attribute: &Attribute, element: &'t DeclaredType) -> Result<&'t str> {
    element.entity_type().ok_or_else(|| {
        MeltError::unsupported(
            attribute.type_name.as_str(),
            format!("list attribute `{}` must hold structs or references", attribute.name),
        )
    })
}

pub(crate) fn child_table_name(parent_table: Option<&str>, type_name: &str, separator: &str) -> String {
    match parent_table {
        Some(parent) => format!("{}{}{}", parent, separator, type_name),
        None => type_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> TypeCatalog {
        TypeCatalog::new()
            .with_enum("CurrencyCode")
            .and_then(|c| c.with_entity(EntityType::new("Address").attr("City", "str")))
            .and_then(|c| {
                c.with_entity(
                    EntityType::new("Contact")
                        .with_id("ContactID")
                        .attr("ContactID", "str"),
                )
            })
            .unwrap()
    }

    #[test]
    fn test_terminals() {
        let catalog = catalog();
        let resolver = TypeResolver::new(&catalog);

        assert_eq!(resolver.resolve("str").unwrap(), DeclaredType::Terminal(TerminalKind::String));
        assert_eq!(resolver.resolve("int").unwrap(), DeclaredType::Terminal(TerminalKind::Integer));
        assert_eq!(resolver.resolve("float").unwrap(), DeclaredType::Terminal(TerminalKind::Float));
        assert_eq!(resolver.resolve("bool").unwrap(), DeclaredType::Terminal(TerminalKind::Boolean));
        assert_eq!(
            resolver.resolve("date[ms-format]").unwrap(),
            DeclaredType::Terminal(TerminalKind::Date)
        );
        assert_eq!(
            resolver.resolve("datetime[ms-format]").unwrap(),
            DeclaredType::Terminal(TerminalKind::DateTime)
        );
    }

    #[test]
    fn test_enum_resolves_to_string() {
        let catalog = catalog();
        let resolver = TypeResolver::new(&catalog);
        assert_eq!(
            resolver.resolve("CurrencyCode").unwrap(),
            DeclaredType::Terminal(TerminalKind::String)
        );
    }

    #[test]
    fn test_composites() {
        let catalog = catalog();
        let resolver = TypeResolver::new(&catalog);

        assert_eq!(resolver.resolve("Address").unwrap(), DeclaredType::Struct("Address".into()));
        assert_eq!(resolver.resolve("Contact").unwrap(), DeclaredType::Reference("Contact".into()));
        assert_eq!(
            resolver.resolve("list[Address]").unwrap(),
            DeclaredType::List(Box::new(DeclaredType::Struct("Address".into())))
        );
    }

    #[test]
    fn test_list_of_lists_rejected() {
        let catalog = catalog();
        let resolver = TypeResolver::new(&catalog);
        let err = resolver.resolve("list[list[Address]]").unwrap_err();
        assert!(matches!(err, MeltError::UnsupportedType { type_name, .. } if type_name == "list[list[Address]]"));
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let catalog = catalog();
        let resolver = TypeResolver::new(&catalog);
        let err = resolver.resolve("Payslip").unwrap_err();
        assert_eq!(err.to_string(), "unsupported type `Payslip`: unexpected type encountered");
    }

    #[test]
    fn test_enter_type_detects_cycle() {
        let mut path = vec!["Node".to_string()];
        enter_type(&mut path, "Leaf").unwrap();
        let err = enter_type(&mut path, "Node").unwrap_err();
        assert!(matches!(err, MeltError::SchemaCycle { path } if path == ["Node", "Leaf", "Node"]));
    }

    #[test]
    fn test_memoized() {
        let catalog = catalog();
        let resolver = TypeResolver::new(&catalog);
        resolver.resolve("list[Address]").unwrap();
        let cache = resolver.cache.borrow();
        assert!(cache.contains_key("list[Address]"));
        assert!(cache.contains_key("Address"));
    }
}
