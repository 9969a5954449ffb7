//! Field level search queries.
//!
//! Each [`FieldQuery`] renders to one query clause. Fields addressed with a
//! dotted name (`location.region`) live in a nested object and are wrapped in
//! a `nested` query on the path before the last dot.

mod request;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

pub use request::{
    build_request, DistanceUnit, Pagination, SearchCriteria, SortCriterion, SortOrder,
    PIT_KEEP_ALIVE,
};

/// Characters with a meaning in `query_string` syntax, blanked out of user text
const RESERVED: [&str; 18] = [
    "\\", "*", "-", "=", "&&", "||", "!", "(", ")", "{", "}", "[", "]", "^", "\"", "?", ":", "/",
];

/// Scalar query value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl FieldValue {
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Bool(b) => json!(b),
            FieldValue::Number(n) => json!(n),
            FieldValue::String(s) => json!(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn to_json(self) -> Value {
        json!({ "lat": self.lat, "lon": self.lon })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceType {
    #[default]
    Arc,
    Plane,
}

impl DistanceType {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceType::Arc => "arc",
            DistanceType::Plane => "plane",
        }
    }
}

/// How an indexed shape must relate to the query shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeRelation {
    /// Indexed shape lies inside the query shape
    Contains,
    Intersects,
    /// Not supported; rendered without a relation
    Contained,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FieldQuery {
    Equality {
        field: String,
        value: FieldValue,
    },
    Exists {
        field: String,
    },
    /// Every term of the text must appear
    TextContains {
        field: String,
        text: String,
    },
    /// Prefix match unless the text carries its own wildcard or fuzziness
    TextMatches {
        field: String,
        text: String,
    },
    Range {
        field: String,
        min: f64,
        max: f64,
        #[serde(default)]
        min_inclusive: bool,
        #[serde(default)]
        max_inclusive: bool,
    },
    AnyIn {
        field: String,
        values: Vec<FieldValue>,
    },
    GeoBoundingBox {
        field: String,
        top_left: GeoPoint,
        bottom_right: GeoPoint,
    },
    GeoDistance {
        field: String,
        point: GeoPoint,
        /// With unit, e.g. `12km`
        distance: String,
        #[serde(default)]
        distance_type: Option<DistanceType>,
    },
    GeoShape {
        field: String,
        /// GeoJSON geometry
        shape: Value,
        relation: ShapeRelation,
    },
}

impl FieldQuery {
    pub fn field(&self) -> &str {
        match self {
            FieldQuery::Equality { field, .. }
            | FieldQuery::Exists { field }
            | FieldQuery::TextContains { field, .. }
            | FieldQuery::TextMatches { field, .. }
            | FieldQuery::Range { field, .. }
            | FieldQuery::AnyIn { field, .. }
            | FieldQuery::GeoBoundingBox { field, .. }
            | FieldQuery::GeoDistance { field, .. }
            | FieldQuery::GeoShape { field, .. } => field,
        }
    }

    pub fn is_geo(&self) -> bool {
        matches!(
            self,
            FieldQuery::GeoBoundingBox { .. }
                | FieldQuery::GeoDistance { .. }
                | FieldQuery::GeoShape { .. }
        )
    }

    /// Path of the nested object holding the field, for dotted names
    pub fn nested_path(&self) -> Option<&str> {
        nested_path(self.field())
    }

    /// Geo clauses on top level fields only filter; everything else scores.
    pub fn is_filter(&self) -> bool {
        self.is_geo() && self.nested_path().is_none()
    }

    pub fn to_query(&self) -> Value {
        let query = self.clause();
        match self.nested_path() {
            Some(path) => json!({
                "nested": {
                    "path": path,
                    "query": query,
                    "score_mode": "none",
                }
            }),
            None => query,
        }
    }

    fn clause(&self) -> Value {
        match self {
            FieldQuery::Equality { field, value } => json!({
                "term": { field.as_str(): { "value": value.to_json() } }
            }),
            FieldQuery::Exists { field } => json!({ "exists": { "field": field } }),
            FieldQuery::TextContains { field, text } => json!({
                "query_string": {
                    "query": escape(text),
                    "fields": [field],
                    "default_operator": "and",
                    "minimum_should_match": "100%",
                }
            }),
            FieldQuery::TextMatches { field, text } => {
                let mut query = escape(text);
                if !query.contains(['*', '~']) {
                    query.push('*');
                }
                json!({
                    "query_string": {
                        "query": query,
                        "fields": [field],
                        "default_operator": "and",
                    }
                })
            }
            FieldQuery::Range {
                field,
                min,
                max,
                min_inclusive,
                max_inclusive,
            } => {
                let lower = if *min_inclusive { "gte" } else { "gt" };
                let upper = if *max_inclusive { "lte" } else { "lt" };
                json!({ "range": { field.as_str(): { lower: min, upper: max } } })
            }
            FieldQuery::AnyIn { field, values } => {
                let values: Vec<Value> = values.iter().map(FieldValue::to_json).collect();
                json!({ "terms": { field.as_str(): values, "_name": field } })
            }
            FieldQuery::GeoBoundingBox {
                field,
                top_left,
                bottom_right,
            } => json!({
                "geo_bounding_box": {
                    field.as_str(): {
                        "top_left": top_left.to_json(),
                        "bottom_right": bottom_right.to_json(),
                    }
                }
            }),
            FieldQuery::GeoDistance {
                field,
                point,
                distance,
                distance_type,
            } => {
                let mut query = json!({
                    "distance": distance,
                    field.as_str(): point.to_json(),
                });
                if let Some(distance_type) = distance_type {
                    query["distance_type"] = json!(distance_type.as_str());
                }
                json!({ "geo_distance": query })
            }
            FieldQuery::GeoShape {
                field,
                shape,
                relation,
            } => {
                let mut spec = json!({ "shape": shape });
                match relation {
                    ShapeRelation::Contains => spec["relation"] = json!("within"),
                    ShapeRelation::Intersects => spec["relation"] = json!("intersects"),
                    ShapeRelation::Contained => {
                        error!("Shape relation {:?} is not supported yet", relation)
                    }
                }
                json!({ "geo_shape": { field.as_str(): spec } })
            }
        }
    }
}

/// All field queries of one condition must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCondition {
    pub fields: Vec<FieldQuery>,
}

impl SearchCondition {
    pub fn new(fields: Vec<FieldQuery>) -> Self {
        Self { fields }
    }

    pub fn to_query(&self) -> Value {
        let (filter, must): (Vec<&FieldQuery>, Vec<&FieldQuery>) =
            self.fields.iter().partition(|f| f.is_filter());

        let mut bool_query = serde_json::Map::new();
        if !must.is_empty() {
            let must: Vec<Value> = must.iter().map(|f| f.to_query()).collect();
            bool_query.insert("must".to_string(), Value::Array(must));
        }
        if !filter.is_empty() {
            let filter: Vec<Value> = filter.iter().map(|f| f.to_query()).collect();
            bool_query.insert("filter".to_string(), Value::Array(filter));
        }
        json!({ "bool": bool_query })
    }
}

pub(crate) fn nested_path(field: &str) -> Option<&str> {
    field.rfind('.').map(|idx| &field[..idx])
}

fn escape(text: &str) -> String {
    RESERVED
        .iter()
        .fold(text.to_string(), |acc, reserved| acc.replace(reserved, " "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_term() {
        let query = FieldQuery::Equality {
            field: "name".to_string(),
            value: FieldValue::String("Acme".to_string()),
        }
        .to_query();
        assert_eq!(query, json!({ "term": { "name": { "value": "Acme" } } }));
    }

    #[test]
    fn test_dotted_field_is_nested() {
        let query = FieldQuery::Exists {
            field: "location.address.region".to_string(),
        }
        .to_query();
        assert_eq!(query["nested"]["path"], "location.address");
        assert_eq!(query["nested"]["score_mode"], "none");
        assert_eq!(
            query["nested"]["query"]["exists"]["field"],
            "location.address.region"
        );
    }

    #[test]
    fn test_text_contains_escapes_reserved() {
        let query = FieldQuery::TextContains {
            field: "name".to_string(),
            text: "a-b (c)".to_string(),
        }
        .to_query();
        assert_eq!(query["query_string"]["query"], "a b  c ");
        assert_eq!(query["query_string"]["minimum_should_match"], "100%");
        assert_eq!(query["query_string"]["default_operator"], "and");
    }

    #[test]
    fn test_text_matches_wildcard() {
        let matches = |text: &str| {
            FieldQuery::TextMatches {
                field: "name".to_string(),
                text: text.to_string(),
            }
            .to_query()["query_string"]["query"]
                .clone()
        };
        assert_eq!(matches("Joh"), "Joh*");
        assert_eq!(matches("Jo~"), "Jo~");
        // an explicit wildcard is a reserved character and gets blanked
        assert_eq!(matches("J*n"), "J n*");
    }

    #[test]
    fn test_range_bounds() {
        let query = FieldQuery::Range {
            field: "score".to_string(),
            min: 35.0,
            max: 95.0,
            min_inclusive: true,
            max_inclusive: false,
        }
        .to_query();
        assert_eq!(query, json!({ "range": { "score": { "gte": 35.0, "lt": 95.0 } } }));
    }

    #[test]
    fn test_any_in_is_named() {
        let query = FieldQuery::AnyIn {
            field: "tags".to_string(),
            values: vec![
                FieldValue::String("a".to_string()),
                FieldValue::Number(2.0),
                FieldValue::Bool(true),
            ],
        }
        .to_query();
        assert_eq!(query["terms"]["_name"], "tags");
        assert_eq!(query["terms"]["tags"], json!(["a", 2.0, true]));
    }

    #[test]
    fn test_geo_shape_relations() {
        let shape = json!({ "type": "Point", "coordinates": [1.0, 2.0] });
        let relation = |relation| {
            FieldQuery::GeoShape {
                field: "area".to_string(),
                shape: shape.clone(),
                relation,
            }
            .to_query()["geo_shape"]["area"]
                .get("relation")
                .cloned()
        };
        assert_eq!(relation(ShapeRelation::Contains), Some(json!("within")));
        assert_eq!(relation(ShapeRelation::Intersects), Some(json!("intersects")));
        assert_eq!(relation(ShapeRelation::Contained), None);
    }

    #[test]
    fn test_geo_distance() {
        let query = FieldQuery::GeoDistance {
            field: "pin".to_string(),
            point: GeoPoint { lat: 40.0, lon: -70.0 },
            distance: "12km".to_string(),
            distance_type: Some(DistanceType::Plane),
        }
        .to_query();
        assert_eq!(query["geo_distance"]["distance"], "12km");
        assert_eq!(query["geo_distance"]["distance_type"], "plane");
        assert_eq!(query["geo_distance"]["pin"]["lat"], 40.0);
    }

    #[test]
    fn test_condition_splits_filter_and_must() {
        let condition = SearchCondition::new(vec![
            FieldQuery::Exists {
                field: "name".to_string(),
            },
            FieldQuery::GeoBoundingBox {
                field: "pin".to_string(),
                top_left: GeoPoint { lat: 1.0, lon: 0.0 },
                bottom_right: GeoPoint { lat: 0.0, lon: 1.0 },
            },
        ]);
        let query = condition.to_query();
        assert_eq!(query["bool"]["must"].as_array().unwrap().len(), 1);
        assert!(query["bool"]["filter"][0]["geo_bounding_box"].is_object());
    }

    #[test]
    fn test_field_query_from_json() {
        let query: FieldQuery = serde_json::from_value(json!({
            "op": "range",
            "field": "score",
            "min": 1,
            "max": 2
        }))
        .unwrap();
        assert_eq!(
            query,
            FieldQuery::Range {
                field: "score".to_string(),
                min: 1.0,
                max: 2.0,
                min_inclusive: false,
                max_inclusive: false,
            }
        );
    }
}
