// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Typed view of one input-schema property.
//!
//! Servers advertise properties as arbitrary JSON. They are folded into a
//! small tagged union so that type inference in the normalizer is exhaustive.
//! The original JSON is kept so the schema serializes back unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default argument and array item type.
pub const DEFAULT_TYPE: &str = "string";

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    String,
    Number,
    Integer,
    Boolean,
    Array { items: Option<Box<PropertySchema>> },
    Object,
    Null,
    /// A `type` string outside the JSON Schema primitives, kept verbatim
    Other(String),
    /// Object without a usable `type` (missing, empty, or a type union)
    Unspecified,
    /// Not an object at all (`true`, a bare string, ...)
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct PropertySchema {
    pub kind: PropertyKind,
    pub description: Option<String>,
    raw: Value,
}

impl PropertySchema {
    /// Declared type name, falling back to `string`.
    pub fn type_name(&self) -> &str {
        match &self.kind {
            PropertyKind::String => "string",
            PropertyKind::Number => "number",
            PropertyKind::Integer => "integer",
            PropertyKind::Boolean => "boolean",
            PropertyKind::Array { .. } => "array",
            PropertyKind::Object => "object",
            PropertyKind::Null => "null",
            PropertyKind::Other(name) => name,
            PropertyKind::Unspecified | PropertyKind::Opaque => DEFAULT_TYPE,
        }
    }

    /// Item type of an array property, `None` for every other kind.
    pub fn item_type(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::Array { items: Some(items) } => Some(items.type_name()),
            PropertyKind::Array { items: None } => Some(DEFAULT_TYPE),
            _ => None,
        }
    }
}

fn parse_kind(object: &serde_json::Map<String, Value>) -> PropertyKind {
    let Some(type_name) = object.get("type").and_then(Value::as_str) else {
        return PropertyKind::Unspecified;
    };
    match type_name {
        "" => PropertyKind::Unspecified,
        "string" => PropertyKind::String,
        "number" => PropertyKind::Number,
        "integer" => PropertyKind::Integer,
        "boolean" => PropertyKind::Boolean,
        "object" => PropertyKind::Object,
        "null" => PropertyKind::Null,
        "array" => PropertyKind::Array {
            items: object
                .get("items")
                .filter(|items| items.is_object())
                .map(|items| Box::new(PropertySchema::from(items.clone()))),
        },
        other => PropertyKind::Other(other.to_string()),
    }
}

fn parse_description(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

impl From<Value> for PropertySchema {
    fn from(raw: Value) -> Self {
        match raw.as_object() {
            Some(object) => Self {
                kind: parse_kind(object),
                description: parse_description(object.get("description")),
                raw,
            },
            None => Self {
                kind: PropertyKind::Opaque,
                description: None,
                raw,
            },
        }
    }
}

impl From<PropertySchema> for Value {
    fn from(schema: PropertySchema) -> Self {
        schema.raw
    }
}
