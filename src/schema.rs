//! Schema derivation: explicit type descriptions to normalized schema objects.
//!
//! A [`TypeDef`] is a serializable description of a data shape supplied by the
//! caller. [`derive_schema`] turns it into a self-contained [`SchemaObject`]:
//! every internal reference is inlined, optionality becomes `nullable`, and
//! genuine closed alternatives are preserved as an `anyOf` list.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;

/// Schema metadata keys a structural field must not shadow.
const RESERVED_KEYS: &[&str] = &[
    "type",
    "title",
    "description",
    "properties",
    "required",
    "items",
    "nullable",
    "anyOf",
    "default",
];

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W").unwrap());

/// Normalize a raw name into a valid identifier: non-word characters become
/// `_`, and a leading digit gets a `_` prefix.
pub fn valid_name(raw: &str) -> String {
    let cleaned = NON_WORD.replace_all(raw, "_").into_owned();
    if cleaned.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("_{cleaned}")
    } else {
        cleaned
    }
}

// ─────────────────────────────────────────────────────────────
// Type descriptions
// ─────────────────────────────────────────────────────────────

/// One field of an object type description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDef,
    /// Fields default to optional; no explicit marker means not required.
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: TypeDef) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            description: None,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Explicit, serializable description of a data shape.
///
/// This is the caller-supplied input to the schema deriver; nothing here is
/// inferred at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeDef {
    String {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Integer {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Number {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Boolean {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    Null,
    Object {
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        fields: Vec<FieldDef>,
    },
    Array {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        items: Box<TypeDef>,
    },
    /// A genuine closed set of alternatives, kept as an `anyOf` schema.
    Alternatives {
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        options: Vec<TypeDef>,
    },
    /// Optionality marker: derived as the inner schema with `nullable: true`.
    Optional { inner: Box<TypeDef> },
    /// Named reference, resolved against a [`TypeRegistry`] and inlined.
    Reference { name: String },
}

impl TypeDef {
    pub fn string() -> Self {
        TypeDef::String { description: None }
    }

    pub fn integer() -> Self {
        TypeDef::Integer { description: None }
    }

    pub fn number() -> Self {
        TypeDef::Number { description: None }
    }

    pub fn boolean() -> Self {
        TypeDef::Boolean { description: None }
    }

    pub fn object(title: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        TypeDef::Object {
            title: Some(title.into()),
            description: None,
            fields,
        }
    }

    /// Object without a title; the compiler names it after its position
    /// (node input/output, flow input/output).
    pub fn anonymous_object(fields: Vec<FieldDef>) -> Self {
        TypeDef::Object {
            title: None,
            description: None,
            fields,
        }
    }

    pub fn array(items: TypeDef) -> Self {
        TypeDef::Array {
            description: None,
            items: Box::new(items),
        }
    }

    pub fn alternatives(options: Vec<TypeDef>) -> Self {
        TypeDef::Alternatives {
            description: None,
            options,
        }
    }

    pub fn optional(inner: TypeDef) -> Self {
        TypeDef::Optional {
            inner: Box::new(inner),
        }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        TypeDef::Reference { name: name.into() }
    }

    /// Attach a description to the variants that carry one.
    pub fn describe(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        match &mut self {
            TypeDef::String { description }
            | TypeDef::Integer { description }
            | TypeDef::Number { description }
            | TypeDef::Boolean { description }
            | TypeDef::Object { description, .. }
            | TypeDef::Array { description, .. }
            | TypeDef::Alternatives { description, .. } => *description = Some(text),
            TypeDef::Null | TypeDef::Optional { .. } | TypeDef::Reference { .. } => {}
        }
        self
    }
}

/// Named type definitions for resolving [`TypeDef::Reference`].
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    defs: IndexMap<String, TypeDef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, def: TypeDef) {
        self.defs.insert(name.into(), def);
    }

    pub fn get(&self, name: &str) -> Option<&TypeDef> {
        self.defs.get(name)
    }

    pub(crate) fn merge(&mut self, other: TypeRegistry) {
        for (name, def) in other.defs {
            self.defs.insert(name, def);
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Schema objects
// ─────────────────────────────────────────────────────────────

/// Normalized, self-contained schema shape.
///
/// Invariant: an object-typed schema always carries a (possibly empty)
/// required list. Immutable once deposited in a compiled spec's registry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaObject {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, SchemaObject>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaObject>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(rename = "anyOf", skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<SchemaObject>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl SchemaObject {
    fn typed(schema_type: &str, description: Option<String>) -> Self {
        Self {
            schema_type: Some(schema_type.to_string()),
            description,
            ..Self::default()
        }
    }
}

/// `$ref`-style pointer into a compiled spec's schema registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaRef {
    #[serde(rename = "$ref")]
    pub target: String,
}

impl SchemaRef {
    pub fn to(title: &str) -> Self {
        Self {
            target: format!("#/schemas/{title}"),
        }
    }

    /// Registry key this pointer refers to, if it is a registry pointer.
    pub fn title(&self) -> Option<&str> {
        self.target.strip_prefix("#/schemas/")
    }
}

// ─────────────────────────────────────────────────────────────
// Derivation
// ─────────────────────────────────────────────────────────────

/// Derive a self-contained [`SchemaObject`] from a type description,
/// resolving and inlining every named reference through `types`.
pub fn derive_schema(def: &TypeDef, types: &TypeRegistry) -> Result<SchemaObject, SchemaError> {
    let mut resolving = Vec::new();
    derive_inner(def, types, &mut resolving)
}

fn derive_inner(
    def: &TypeDef,
    types: &TypeRegistry,
    resolving: &mut Vec<String>,
) -> Result<SchemaObject, SchemaError> {
    match def {
        TypeDef::String { description } => Ok(SchemaObject::typed("string", description.clone())),
        TypeDef::Integer { description } => Ok(SchemaObject::typed("integer", description.clone())),
        TypeDef::Number { description } => Ok(SchemaObject::typed("number", description.clone())),
        TypeDef::Boolean { description } => Ok(SchemaObject::typed("boolean", description.clone())),
        TypeDef::Null => Ok(SchemaObject::typed("null", None)),

        TypeDef::Object {
            title,
            description,
            fields,
        } => {
            let mut properties = IndexMap::with_capacity(fields.len());
            let mut required = Vec::new();

            for field in fields {
                if RESERVED_KEYS.contains(&field.name.as_str()) {
                    return Err(SchemaError::ReservedKey {
                        field: field.name.clone(),
                    });
                }
                let mut property = derive_inner(&field.ty, types, resolving)?;
                if let Some(text) = &field.description {
                    property.description = Some(text.clone());
                }
                if let Some(value) = &field.default {
                    property.default = Some(value.clone());
                }
                if field.required {
                    required.push(field.name.clone());
                }
                properties.insert(field.name.clone(), property);
            }

            Ok(SchemaObject {
                schema_type: Some("object".to_string()),
                title: title.clone(),
                description: description.clone(),
                properties: Some(properties),
                // Always present for objects, even when empty.
                required: Some(required),
                ..SchemaObject::default()
            })
        }

        TypeDef::Array { description, items } => {
            let item_schema = derive_inner(items, types, resolving)?;
            Ok(SchemaObject {
                schema_type: Some("array".to_string()),
                description: description.clone(),
                items: Some(Box::new(item_schema)),
                ..SchemaObject::default()
            })
        }

        TypeDef::Alternatives {
            description,
            options,
        } => {
            if options.is_empty() {
                return Err(SchemaError::EmptyAlternatives);
            }
            let mut any_of = Vec::with_capacity(options.len());
            for option in options {
                any_of.push(derive_inner(option, types, resolving)?);
            }
            Ok(SchemaObject {
                description: description.clone(),
                any_of: Some(any_of),
                ..SchemaObject::default()
            })
        }

        TypeDef::Optional { inner } => {
            let mut schema = derive_inner(inner, types, resolving)?;
            schema.nullable = Some(true);
            Ok(schema)
        }

        TypeDef::Reference { name } => {
            if resolving.iter().any(|seen| seen == name) {
                return Err(SchemaError::CircularReference { name: name.clone() });
            }
            let target = types
                .get(name)
                .ok_or_else(|| SchemaError::UnresolvedReference { name: name.clone() })?;
            resolving.push(name.clone());
            let schema = derive_inner(target, types, resolving);
            resolving.pop();
            schema
        }
    }
}
