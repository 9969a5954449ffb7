//! Naming of the alias and concrete indices backing a resource type.

use std::fmt;

use convert_case::{Case, Casing};
use xxhash_rust::xxh64::xxh64;

use crate::mapping::MappingNode;
use crate::schema::SchemaDescriptor;

/// Suffix appended to an index name when it is cloned aside before a reindex.
pub const TEMP_SUFFIX: &str = "_temp";

/// A resource type as seen by the cluster: a stable alias plus the concrete
/// index name the current schema version should live in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalResource {
    pub type_name: String,
    pub alias: String,
    pub suffix: u32,
}

/// Two-segment key of an optional reindex transform script.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptKey {
    pub group: String,
    pub name: String,
}

impl fmt::Display for ScriptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.name)
    }
}

impl LogicalResource {
    /// Derive the names for a schema and its projected mapping.
    pub fn new(schema: &SchemaDescriptor, mapping: &MappingNode) -> Self {
        Self {
            type_name: schema.name.clone(),
            alias: normalized_name(schema.simple_name()),
            suffix: field_set_hash(mapping.field_names()),
        }
    }

    pub fn index_name(&self) -> String {
        format!("{}-{}", self.alias, self.suffix)
    }

    pub fn temp_index_name(&self) -> String {
        format!("{}{}", self.index_name(), TEMP_SUFFIX)
    }

    pub fn script_key(&self) -> ScriptKey {
        ScriptKey {
            group: self.alias.clone(),
            name: self.suffix.to_string(),
        }
    }
}

/// `RiskScore` -> `risk_score`
pub fn normalized_name(type_name: &str) -> String {
    type_name.to_case(Case::Snake)
}

/// Order-independent hash of a set of field names, non-negative as an `i32`.
///
/// Only the names are hashed: a field whose kind changes keeps the same
/// suffix.
pub fn field_set_hash<'a>(names: impl IntoIterator<Item = &'a str>) -> u32 {
    let sum = names
        .into_iter()
        .map(|name| xxh64(name.as_bytes(), 0))
        .fold(0u64, u64::wrapping_add);
    (sum & 0x7fff_ffff) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::project;
    use crate::schema::{FieldDescriptor, FieldType};

    fn schema(fields: &[(&str, FieldType)]) -> SchemaDescriptor {
        SchemaDescriptor::new(
            "acme.scores.RiskScore",
            fields
                .iter()
                .map(|(name, kind)| FieldDescriptor::new(*name, *kind))
                .collect(),
        )
    }

    fn resource(schema: &SchemaDescriptor) -> LogicalResource {
        LogicalResource::new(schema, &project(schema))
    }

    #[test]
    fn test_alias_is_snake_case_of_type_name() {
        let r = resource(&schema(&[("name", FieldType::String)]));
        assert_eq!(r.alias, "risk_score");
        assert!(r.index_name().starts_with("risk_score-"));
        assert_eq!(r.temp_index_name(), format!("{}_temp", r.index_name()));
    }

    #[test]
    fn test_field_set_change_changes_index_name_only() {
        let v1 = resource(&schema(&[("name", FieldType::String), ("score", FieldType::Int32)]));
        let v2 = resource(&schema(&[
            ("name", FieldType::String),
            ("score", FieldType::Int32),
            ("flagged", FieldType::Bool),
        ]));
        let renamed = resource(&schema(&[("name", FieldType::String), ("points", FieldType::Int32)]));

        assert_eq!(v1.alias, v2.alias);
        assert_ne!(v1.index_name(), v2.index_name());
        assert_ne!(v1.index_name(), renamed.index_name());
    }

    #[test]
    fn test_type_only_change_keeps_index_name() {
        let v1 = resource(&schema(&[("name", FieldType::String), ("score", FieldType::Int32)]));
        let v2 = resource(&schema(&[("name", FieldType::String), ("score", FieldType::Int64)]));
        assert_eq!(v1.index_name(), v2.index_name());
    }

    #[test]
    fn test_field_order_does_not_matter() {
        assert_eq!(
            field_set_hash(["a", "b", "c"]),
            field_set_hash(["c", "a", "b"])
        );
        assert!(i32::try_from(field_set_hash(["a", "b", "c"])).is_ok());
    }

    #[test]
    fn test_script_key() {
        let r = resource(&schema(&[("name", FieldType::String)]));
        let key = r.script_key();
        assert_eq!(key.group, "risk_score");
        assert_eq!(key.to_string(), format!("risk_score/{}", r.suffix));
    }
}
