//! Schema projection: [`SchemaDescriptor`] -> [`MappingNode`].

use tracing::error;

use super::{FieldMapping, IndexFieldKind, MappingNode, Properties};
use crate::schema::{FieldDescriptor, FieldType, SchemaDescriptor, GEOMETRY_TYPE, TIMESTAMP_TYPE};

/// One row of the type-resolution table.
struct Rule {
    matches: fn(&FieldDescriptor) -> bool,
    kind: IndexFieldKind,
}

/// Evaluated top to bottom, first match wins.
fn rules() -> [Rule; 13] {
    [
        Rule {
            matches: |f| f.kind == FieldType::Double,
            kind: IndexFieldKind::Double,
        },
        Rule {
            matches: |f| f.kind == FieldType::Float,
            kind: IndexFieldKind::Float,
        },
        Rule {
            matches: |f| f.kind.is_64_bit_integer(),
            kind: IndexFieldKind::Long,
        },
        Rule {
            matches: |f| f.kind.is_32_bit_integer(),
            kind: IndexFieldKind::Integer,
        },
        Rule {
            matches: |f| f.kind == FieldType::Bool,
            kind: IndexFieldKind::Boolean,
        },
        // wkt centroid strings are indexed as shapes
        Rule {
            matches: |f| {
                f.kind == FieldType::String && f.wire_name().to_lowercase().contains("centroid")
            },
            kind: IndexFieldKind::GeoShape,
        },
        Rule {
            matches: |f| f.kind == FieldType::String && f.wire_name().eq_ignore_ascii_case("id"),
            kind: IndexFieldKind::Text,
        },
        Rule {
            matches: |f| f.kind == FieldType::String,
            kind: IndexFieldKind::Keyword,
        },
        Rule {
            matches: |f| f.kind == FieldType::Enum,
            kind: IndexFieldKind::Keyword,
        },
        Rule {
            matches: |f| f.kind == FieldType::Bytes,
            kind: IndexFieldKind::Text,
        },
        Rule {
            matches: |f| f.kind.is_nested() && f.message_type() == Some(GEOMETRY_TYPE),
            kind: IndexFieldKind::GeoShape,
        },
        Rule {
            matches: |f| f.kind.is_nested() && f.message_type() == Some(TIMESTAMP_TYPE),
            kind: IndexFieldKind::Date,
        },
        // repeated and singular messages both land here
        Rule {
            matches: |f| f.kind.is_nested() && f.message.is_some(),
            kind: IndexFieldKind::Nested,
        },
    ]
}

/// Resolve the index kind of a single field.
pub(crate) fn resolve_kind(field: &FieldDescriptor) -> IndexFieldKind {
    match rules().into_iter().find(|rule| (rule.matches)(field)) {
        Some(rule) => rule.kind,
        None => {
            error!(
                "Unresolvable field kind {:?} for field '{}', mapping as custom",
                field.kind, field.name
            );
            IndexFieldKind::Custom
        }
    }
}

/// Project a schema into a strict mapping tree.
///
/// Total for every descriptor: a field whose kind cannot be resolved is
/// logged and mapped to [`IndexFieldKind::Custom`] so the remaining fields
/// still project.
pub fn project(schema: &SchemaDescriptor) -> MappingNode {
    MappingNode::strict(project_fields(&schema.fields))
}

fn project_fields(fields: &[FieldDescriptor]) -> Properties {
    let mut properties = Properties::new();

    for field in fields {
        let mapping = match (resolve_kind(field), &field.message) {
            (IndexFieldKind::Nested, Some(message)) => FieldMapping::Nested(MappingNode {
                strict: false,
                properties: project_fields(&message.fields),
            }),
            (kind, _) => FieldMapping::Leaf(kind),
        };
        properties.insert(field.name.clone(), mapping);
    }

    properties
}
