//! Typed schema descriptions of indexed resources.
//!
//! A [`SchemaDescriptor`] is handed to the projector by whatever layer owns
//! the schema definitions. The bootstrap binary reads them from TOML files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};

/// Fully qualified name of the well-known timestamp message.
pub const TIMESTAMP_TYPE: &str = "google.protobuf.Timestamp";

/// Fully qualified name of the well-known geometry data message.
pub const GEOMETRY_TYPE: &str = "geobuf.Data";

/// Ordered field list of one resource type (or of a nested message).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Fully qualified type name, e.g. `acme.RiskScore`
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

/// A single field of a [`SchemaDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,

    /// Wire (JSON) name, defaults to the lowerCamelCase form of `name`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_name: Option<String>,

    #[serde(rename = "type")]
    pub kind: FieldType,

    #[serde(default)]
    pub repeated: bool,

    /// Field layout of `message` / `group` kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<SchemaDescriptor>,
}

/// Primitive or nested kind of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    String,
    Bytes,
    Enum,
    Message,
    Group,
    #[serde(other)]
    Unknown,
}

impl FieldType {
    pub fn is_64_bit_integer(self) -> bool {
        matches!(
            self,
            FieldType::Int64
                | FieldType::Uint64
                | FieldType::Sint64
                | FieldType::Fixed64
                | FieldType::Sfixed64
        )
    }

    pub fn is_32_bit_integer(self) -> bool {
        matches!(
            self,
            FieldType::Int32
                | FieldType::Uint32
                | FieldType::Sint32
                | FieldType::Fixed32
                | FieldType::Sfixed32
        )
    }

    pub fn is_nested(self) -> bool {
        matches!(self, FieldType::Message | FieldType::Group)
    }
}

impl SchemaDescriptor {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    /// Last segment of the fully qualified name (`acme.RiskScore` -> `RiskScore`)
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Load a descriptor from a TOML schema file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file {}", path.display()))?;
        let schema: SchemaDescriptor = toml::from_str(&content)
            .with_context(|| format!("Failed to parse schema file {}", path.display()))?;
        Ok(schema)
    }
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, kind: FieldType) -> Self {
        Self {
            name: name.into(),
            json_name: None,
            kind,
            repeated: false,
            message: None,
        }
    }

    pub fn nested(name: impl Into<String>, message: SchemaDescriptor) -> Self {
        Self {
            message: Some(message),
            ..Self::new(name, FieldType::Message)
        }
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    pub fn with_json_name(mut self, json_name: impl Into<String>) -> Self {
        self.json_name = Some(json_name.into());
        self
    }

    pub fn wire_name(&self) -> String {
        match &self.json_name {
            Some(json_name) => json_name.clone(),
            None => self.name.to_case(Case::Camel),
        }
    }

    /// Fully qualified name of the nested message type, if any
    pub fn message_type(&self) -> Option<&str> {
        self.message.as_ref().map(|m| m.name.as_str())
    }
}
