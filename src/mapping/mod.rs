//! Index mapping trees.
//!
//! A [`MappingNode`] is what the projector derives from a schema and what the
//! cluster reports back for a live index. Both sides go through the same
//! types so the comparator never has to look at raw JSON.

mod comparator;
mod projector;

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{json, Map, Value};
use thiserror::Error;

pub use comparator::{compare, DifferenceKind, MappingComparison, MappingDifference};
pub use projector::project;

/// Date formats accepted by projected `date` fields.
pub const DATE_FORMAT: &str = "strict_date_optional_time||epoch_second";

/// Resolved kind of an indexed field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexFieldKind {
    Double,
    Float,
    Long,
    Integer,
    Boolean,
    Keyword,
    Text,
    Date,
    GeoShape,
    Nested,
    /// Projection sentinel for a field kind nothing else matched
    Custom,
    /// Any other type name reported by the cluster (`object`, `geo_point`, ...)
    Other(String),
}

impl IndexFieldKind {
    pub fn as_str(&self) -> &str {
        match self {
            IndexFieldKind::Double => "double",
            IndexFieldKind::Float => "float",
            IndexFieldKind::Long => "long",
            IndexFieldKind::Integer => "integer",
            IndexFieldKind::Boolean => "boolean",
            IndexFieldKind::Keyword => "keyword",
            IndexFieldKind::Text => "text",
            IndexFieldKind::Date => "date",
            IndexFieldKind::GeoShape => "geo_shape",
            IndexFieldKind::Nested => "nested",
            IndexFieldKind::Custom => "custom",
            IndexFieldKind::Other(name) => name,
        }
    }

    pub fn from_type_name(name: &str) -> Self {
        match name {
            "double" => IndexFieldKind::Double,
            "float" => IndexFieldKind::Float,
            "long" => IndexFieldKind::Long,
            "integer" => IndexFieldKind::Integer,
            "boolean" => IndexFieldKind::Boolean,
            "keyword" => IndexFieldKind::Keyword,
            "text" => IndexFieldKind::Text,
            "date" => IndexFieldKind::Date,
            "geo_shape" => IndexFieldKind::GeoShape,
            "nested" => IndexFieldKind::Nested,
            "custom" => IndexFieldKind::Custom,
            other => IndexFieldKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for IndexFieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field name -> mapping, unique keys, order irrelevant.
pub type Properties = BTreeMap<String, FieldMapping>;

/// A mapping tree: the root of an index mapping or the body of a nested field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingNode {
    /// Reject documents carrying undeclared fields (`dynamic: strict`)
    pub strict: bool,
    pub properties: Properties,
}

/// Mapping of a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMapping {
    Leaf(IndexFieldKind),
    Nested(MappingNode),
}

impl FieldMapping {
    pub fn kind(&self) -> IndexFieldKind {
        match self {
            FieldMapping::Leaf(kind) => kind.clone(),
            FieldMapping::Nested(_) => IndexFieldKind::Nested,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldMapping::Nested(node) => json!({
                "type": "nested",
                "properties": node.properties_json(),
            }),
            FieldMapping::Leaf(kind) => match kind {
                IndexFieldKind::Double
                | IndexFieldKind::Float
                | IndexFieldKind::Long
                | IndexFieldKind::Integer => json!({
                    "type": kind.as_str(),
                    "index": true,
                    "coerce": true,
                }),
                IndexFieldKind::Boolean | IndexFieldKind::Keyword | IndexFieldKind::Text => {
                    json!({ "type": kind.as_str(), "index": true })
                }
                IndexFieldKind::GeoShape => json!({ "type": "geo_shape", "coerce": true }),
                IndexFieldKind::Date => json!({
                    "type": "date",
                    "index": true,
                    "format": DATE_FORMAT,
                }),
                IndexFieldKind::Nested => json!({ "type": "nested", "properties": {} }),
                IndexFieldKind::Custom | IndexFieldKind::Other(_) => {
                    json!({ "type": kind.as_str() })
                }
            },
        }
    }

    fn from_json(path: &str, value: &Value) -> Result<Self, MappingError> {
        let obj = value.as_object().ok_or_else(|| MappingError::NotAnObject {
            path: path.to_string(),
        })?;

        match obj.get("type").and_then(Value::as_str) {
            Some("nested") => Ok(FieldMapping::Nested(MappingNode::from_object(path, obj)?)),
            Some(type_name) => Ok(FieldMapping::Leaf(IndexFieldKind::from_type_name(
                type_name,
            ))),
            // Plain objects are reported without a type
            None if obj.contains_key("properties") => {
                Ok(FieldMapping::Leaf(IndexFieldKind::Other("object".to_string())))
            }
            None => Err(MappingError::MissingType {
                path: path.to_string(),
            }),
        }
    }
}

impl MappingNode {
    pub fn strict(properties: Properties) -> Self {
        Self {
            strict: true,
            properties,
        }
    }

    /// Field names of this level only
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Body for index creation (`mappings` section)
    pub fn to_json(&self) -> Value {
        let mut body = Map::new();
        if self.strict {
            body.insert("dynamic".to_string(), json!("strict"));
        }
        body.insert("properties".to_string(), self.properties_json());
        Value::Object(body)
    }

    /// `properties` object, as sent by additive mapping updates
    pub fn properties_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, field)| (name.clone(), field.to_json()))
            .collect();
        Value::Object(properties)
    }

    /// Parse a mapping as reported by the cluster (`{"dynamic": .., "properties": {..}}`)
    pub fn from_json(value: &Value) -> Result<Self, MappingError> {
        let obj = value.as_object().ok_or_else(|| MappingError::NotAnObject {
            path: String::new(),
        })?;
        Self::from_object("", obj)
    }

    fn from_object(path: &str, obj: &Map<String, Value>) -> Result<Self, MappingError> {
        let strict = obj.get("dynamic").and_then(Value::as_str) == Some("strict");
        let mut properties = Properties::new();

        if let Some(props) = obj.get("properties") {
            let props = props.as_object().ok_or_else(|| MappingError::NotAnObject {
                path: path.to_string(),
            })?;
            for (name, value) in props {
                let child_path = if path.is_empty() {
                    name.clone()
                } else {
                    format!("{}.{}", path, name)
                };
                properties.insert(name.clone(), FieldMapping::from_json(&child_path, value)?);
            }
        }

        Ok(Self { strict, properties })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("mapping at '{path}' is not a JSON object")]
    NotAnObject { path: String },
    #[error("mapping at '{path}' has neither a type nor properties")]
    MissingType { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_mapping_parse() {
        let live = json!({
            "dynamic": "strict",
            "properties": {
                "name": { "type": "keyword" },
                "score": { "type": "integer", "coerce": true },
                "when": { "type": "date", "format": "epoch_millis" },
                "location": {
                    "type": "nested",
                    "properties": {
                        "region": { "type": "keyword" }
                    }
                },
                "meta": {
                    "properties": {
                        "source": { "type": "keyword" }
                    }
                },
                "pin": { "type": "geo_point" }
            }
        });

        let node = MappingNode::from_json(&live).unwrap();
        assert!(node.strict);
        assert_eq!(node.properties.len(), 6);
        assert_eq!(node.properties["score"].kind(), IndexFieldKind::Integer);
        assert_eq!(node.properties["when"].kind(), IndexFieldKind::Date);
        assert_eq!(
            node.properties["meta"].kind(),
            IndexFieldKind::Other("object".to_string())
        );
        assert_eq!(
            node.properties["pin"].kind(),
            IndexFieldKind::Other("geo_point".to_string())
        );

        match &node.properties["location"] {
            FieldMapping::Nested(child) => {
                assert_eq!(child.field_names().collect::<Vec<_>>(), vec!["region"]);
            }
            other => panic!("expected nested, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_mapping() {
        let err = MappingNode::from_json(&json!({
            "properties": { "a": { "index": true } }
        }))
        .unwrap_err();
        assert_eq!(
            err,
            MappingError::MissingType {
                path: "a".to_string()
            }
        );

        assert!(MappingNode::from_json(&json!("nope")).is_err());
    }

    #[test]
    fn test_date_and_numeric_json() {
        let date = FieldMapping::Leaf(IndexFieldKind::Date).to_json();
        assert_eq!(date["format"], DATE_FORMAT);

        let long = FieldMapping::Leaf(IndexFieldKind::Long).to_json();
        assert_eq!(long["type"], "long");
        assert_eq!(long["coerce"], true);
    }

    #[test]
    fn test_json_roundtrip_keeps_kinds() {
        let mut location = Properties::new();
        location.insert(
            "region".to_string(),
            FieldMapping::Leaf(IndexFieldKind::Keyword),
        );

        let mut properties = Properties::new();
        properties.insert("id".to_string(), FieldMapping::Leaf(IndexFieldKind::Text));
        properties.insert(
            "location".to_string(),
            FieldMapping::Nested(MappingNode {
                strict: false,
                properties: location,
            }),
        );
        let node = MappingNode::strict(properties);

        let body = node.to_json();
        assert_eq!(body["dynamic"], "strict");
        assert_eq!(body["properties"]["location"]["type"], "nested");

        assert_eq!(MappingNode::from_json(&body).unwrap(), node);
    }
}
