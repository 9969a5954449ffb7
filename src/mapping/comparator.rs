//! Structural comparison of two mapping trees.

use std::fmt;

use tracing::debug;

use super::{FieldMapping, IndexFieldKind, MappingNode, Properties};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DifferenceKind {
    /// Present in the reference, absent in the candidate
    MissingOnCandidate,
    /// Present in the candidate, absent in the reference
    MissingOnReference,
    KindMismatch {
        reference: IndexFieldKind,
        candidate: IndexFieldKind,
    },
}

/// A single recorded difference, addressed by its field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingDifference {
    pub path: Vec<String>,
    pub kind: DifferenceKind,
}

impl MappingDifference {
    pub fn dotted_path(&self) -> String {
        self.path.join(".")
    }
}

impl fmt::Display for MappingDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DifferenceKind::MissingOnCandidate => {
                write!(f, "{}: missing on candidate", self.dotted_path())
            }
            DifferenceKind::MissingOnReference => {
                write!(f, "{}: missing on reference", self.dotted_path())
            }
            DifferenceKind::KindMismatch {
                reference,
                candidate,
            } => write!(
                f,
                "{}: kind differs ({} vs {})",
                self.dotted_path(),
                reference,
                candidate
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingComparison {
    pub differences: Vec<MappingDifference>,
}

impl MappingComparison {
    pub fn is_equal(&self) -> bool {
        self.differences.is_empty()
    }
}

/// Compare two mapping trees field by field.
///
/// Symmetric over field sets: a field present on only one side is a
/// difference either way. Shared fields are compared by resolved kind only,
/// recursing when both sides are nested.
pub fn compare(reference: &MappingNode, candidate: &MappingNode) -> MappingComparison {
    let mut differences = Vec::new();
    compare_properties(
        &reference.properties,
        &candidate.properties,
        &mut Vec::new(),
        &mut differences,
    );

    for difference in &differences {
        debug!("Mapping difference at {}", difference);
    }

    MappingComparison { differences }
}

fn compare_properties(
    reference: &Properties,
    candidate: &Properties,
    path: &mut Vec<String>,
    differences: &mut Vec<MappingDifference>,
) {
    for (name, left) in reference {
        path.push(name.clone());

        match candidate.get(name) {
            None => differences.push(MappingDifference {
                path: path.clone(),
                kind: DifferenceKind::MissingOnCandidate,
            }),
            Some(right) => match (left, right) {
                (FieldMapping::Nested(l), FieldMapping::Nested(r)) => {
                    compare_properties(&l.properties, &r.properties, path, differences);
                }
                _ if left.kind() != right.kind() => differences.push(MappingDifference {
                    path: path.clone(),
                    kind: DifferenceKind::KindMismatch {
                        reference: left.kind(),
                        candidate: right.kind(),
                    },
                }),
                _ => {}
            },
        }

        path.pop();
    }

    for name in candidate.keys() {
        if !reference.contains_key(name) {
            path.push(name.clone());
            differences.push(MappingDifference {
                path: path.clone(),
                kind: DifferenceKind::MissingOnReference,
            });
            path.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::project;
    use crate::schema::{FieldDescriptor, FieldType, SchemaDescriptor};

    fn risk_score(score: FieldType) -> SchemaDescriptor {
        SchemaDescriptor::new(
            "acme.RiskScore",
            vec![
                FieldDescriptor::new("name", FieldType::String),
                FieldDescriptor::new("score", score),
            ],
        )
    }

    fn with_location(mut schema: SchemaDescriptor, fields: Vec<FieldDescriptor>) -> SchemaDescriptor {
        schema.fields.push(FieldDescriptor::nested(
            "location",
            SchemaDescriptor::new("acme.Location", fields),
        ));
        schema
    }

    #[test]
    fn test_identical_projections_are_equal() {
        let a = project(&risk_score(FieldType::Int32));
        let b = project(&risk_score(FieldType::Int32));

        let result = compare(&a, &b);
        assert!(result.is_equal());
        assert!(result.differences.is_empty());
    }

    #[test]
    fn test_kind_change_is_reported_at_path() {
        let a = project(&risk_score(FieldType::Int32));
        let b = project(&risk_score(FieldType::Int64));

        let result = compare(&a, &b);
        assert!(!result.is_equal());
        assert_eq!(result.differences.len(), 1);
        assert_eq!(result.differences[0].path, vec!["score".to_string()]);
        assert_eq!(
            result.differences[0].kind,
            DifferenceKind::KindMismatch {
                reference: IndexFieldKind::Integer,
                candidate: IndexFieldKind::Long,
            }
        );
    }

    #[test]
    fn test_added_field_reported_in_each_direction() {
        let original = risk_score(FieldType::Int32);
        let mut extended = original.clone();
        extended
            .fields
            .push(FieldDescriptor::new("flagged", FieldType::Bool));

        let a = project(&original);
        let b = project(&extended);

        let forward = compare(&a, &b);
        assert_eq!(
            forward.differences,
            vec![MappingDifference {
                path: vec!["flagged".to_string()],
                kind: DifferenceKind::MissingOnReference,
            }]
        );

        let backward = compare(&b, &a);
        assert_eq!(
            backward.differences,
            vec![MappingDifference {
                path: vec!["flagged".to_string()],
                kind: DifferenceKind::MissingOnCandidate,
            }]
        );
    }

    #[test]
    fn test_nested_difference_uses_dotted_path() {
        let a = project(&with_location(
            risk_score(FieldType::Int32),
            vec![FieldDescriptor::new("region", FieldType::String)],
        ));
        let b = project(&with_location(
            risk_score(FieldType::Int32),
            vec![
                FieldDescriptor::new("region", FieldType::String),
                FieldDescriptor::new("zone", FieldType::Int32),
            ],
        ));

        let result = compare(&a, &b);
        assert_eq!(result.differences.len(), 1);
        assert_eq!(result.differences[0].dotted_path(), "location.zone");
        assert_eq!(
            result.differences[0].to_string(),
            "location.zone: missing on reference"
        );
    }

    #[test]
    fn test_nested_against_leaf_is_kind_mismatch() {
        let a = project(&with_location(
            risk_score(FieldType::Int32),
            vec![FieldDescriptor::new("region", FieldType::String)],
        ));
        let mut b = risk_score(FieldType::Int32);
        b.fields.push(FieldDescriptor::new("location", FieldType::String));
        let b = project(&b);

        let result = compare(&a, &b);
        assert_eq!(result.differences.len(), 1);
        assert_eq!(
            result.differences[0].kind,
            DifferenceKind::KindMismatch {
                reference: IndexFieldKind::Nested,
                candidate: IndexFieldKind::Keyword,
            }
        );
    }

    #[test]
    fn test_verdict_is_symmetric() {
        let schemas = [
            risk_score(FieldType::Int32),
            risk_score(FieldType::Int64),
            with_location(
                risk_score(FieldType::Int32),
                vec![FieldDescriptor::new("region", FieldType::String)],
            ),
            SchemaDescriptor::new("acme.Empty", vec![]),
        ];

        for a in &schemas {
            for b in &schemas {
                let (a, b) = (project(a), project(b));
                assert_eq!(compare(&a, &b).is_equal(), compare(&b, &a).is_equal());
            }
        }
    }

    #[test]
    fn test_format_attributes_are_ignored() {
        let reference = project(&SchemaDescriptor::new(
            "acme.Event",
            vec![FieldDescriptor::nested(
                "at",
                SchemaDescriptor::new(crate::schema::TIMESTAMP_TYPE, vec![]),
            )],
        ));
        let live = MappingNode::from_json(&serde_json::json!({
            "properties": { "at": { "type": "date", "format": "epoch_millis" } }
        }))
        .unwrap();

        assert!(compare(&reference, &live).is_equal());
    }
}
