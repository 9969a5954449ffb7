//! Search request bodies.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::{nested_path, DistanceType, GeoPoint, SearchCondition};

/// Keep-alive requested for point-in-time cursors
pub const PIT_KEEP_ALIVE: &str = "1m";

const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    Inches,
    Feet,
    Yards,
    Miles,
    NauticalMiles,
    Millimeters,
    Centimeters,
    Meters,
    #[default]
    Kilometers,
}

impl DistanceUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceUnit::Inches => "in",
            DistanceUnit::Feet => "ft",
            DistanceUnit::Yards => "yd",
            DistanceUnit::Miles => "mi",
            DistanceUnit::NauticalMiles => "nmi",
            DistanceUnit::Millimeters => "mm",
            DistanceUnit::Centimeters => "cm",
            DistanceUnit::Meters => "m",
            DistanceUnit::Kilometers => "km",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum SortCriterion {
    Field {
        field: String,
        #[serde(default)]
        order: SortOrder,
    },
    Score {
        #[serde(default)]
        order: SortOrder,
    },
    GeoDistance {
        field: String,
        point: GeoPoint,
        #[serde(default)]
        unit: DistanceUnit,
        #[serde(default)]
        distance_type: DistanceType,
        #[serde(default)]
        order: SortOrder,
    },
    /// Numeric painless sort script
    Script { source: String },
}

impl SortCriterion {
    /// `None` for sorts that cannot apply: a field sort without a field, or a
    /// distance sort without a field or around the 0/0 point.
    pub fn to_sort(&self) -> Option<Value> {
        match self {
            SortCriterion::Field { field, order } => {
                if field.is_empty() {
                    return None;
                }
                let mut sort = json!({ "order": order.as_str() });
                if let Some(path) = nested_path(field) {
                    sort["nested"] = json!({ "path": path });
                }
                Some(json!({ field.as_str(): sort }))
            }
            SortCriterion::Score { order } => Some(json!({ "_score": { "order": order.as_str() } })),
            SortCriterion::GeoDistance {
                field,
                point,
                unit,
                distance_type,
                order,
            } => {
                if field.is_empty() || point.lat == 0.0 || point.lon == 0.0 {
                    return None;
                }
                Some(json!({
                    "_geo_distance": {
                        field.as_str(): point.to_json(),
                        "unit": unit.as_str(),
                        "distance_type": distance_type.as_str(),
                        "order": order.as_str(),
                    }
                }))
            }
            SortCriterion::Script { source } => Some(json!({
                "_script": {
                    "type": "number",
                    "script": { "source": source },
                }
            })),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// `-1` for no hits, `0` for the default page size
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub from: i64,
    /// Point-in-time id; replaces `from` when present
    #[serde(default)]
    pub cursor: Option<String>,
}

impl Pagination {
    pub fn page_size(&self) -> i64 {
        match self.size {
            -1 => 0,
            0 => DEFAULT_PAGE_SIZE,
            size => size,
        }
    }

    fn apply(&self, body: &mut Map<String, Value>) {
        body.insert("size".to_string(), json!(self.page_size()));
        match self.cursor.as_deref() {
            Some(id) if !id.is_empty() => {
                body.insert(
                    "pit".to_string(),
                    json!({ "id": id, "keep_alive": PIT_KEEP_ALIVE }),
                );
            }
            _ => {
                body.insert("from".to_string(), json!(self.from.max(0)));
            }
        }
    }
}

/// Any one condition may match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    #[serde(default)]
    pub conditions: Vec<SearchCondition>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
    #[serde(default)]
    pub sorts: Vec<SortCriterion>,
}

impl SearchCriteria {
    pub fn to_query(&self) -> Value {
        if self.conditions.is_empty() {
            return json!({ "match_all": {} });
        }
        let should: Vec<Value> = self
            .conditions
            .iter()
            .map(SearchCondition::to_query)
            .collect();
        json!({ "bool": { "should": should } })
    }

    /// True when the request runs against a point-in-time instead of indices
    pub fn uses_cursor(&self) -> bool {
        self.pagination
            .as_ref()
            .and_then(|p| p.cursor.as_deref())
            .map_or(false, |id| !id.is_empty())
    }
}

/// Full `_search` body for the criteria
pub fn build_request(criteria: &SearchCriteria) -> Value {
    let mut body = Map::new();
    body.insert("query".to_string(), criteria.to_query());

    if let Some(pagination) = &criteria.pagination {
        pagination.apply(&mut body);
    }

    let sorts: Vec<Value> = criteria
        .sorts
        .iter()
        .filter_map(SortCriterion::to_sort)
        .collect();
    if !sorts.is_empty() {
        body.insert("sort".to_string(), Value::Array(sorts));
    }

    Value::Object(body)
}
