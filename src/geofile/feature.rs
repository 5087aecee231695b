use std::{cmp::Ordering, collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

/// A single attribute value of a feature record.
///
/// Feature services hand back loosely typed JSON, this keeps the kinds that matter for ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    /// Null and empty strings count as "no value" when sorting and grouping.
    pub fn is_missing(&self) -> bool {
        match self {
            AttributeValue::Null => true,
            AttributeValue::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(number) => Some(*number),
            AttributeValue::Text(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub(crate) fn kind_rank(&self) -> u8 {
        match self {
            AttributeValue::Null => 0,
            AttributeValue::Bool(_) => 1,
            AttributeValue::Number(_) => 2,
            AttributeValue::Text(_) => 3,
        }
    }

    /// Total order over attribute values. Values of different kinds order by kind, numbers use
    /// the IEEE total order so NaN sorts after every other number.
    pub fn total_cmp(&self, other: &AttributeValue) -> Ordering {
        match (self, other) {
            (AttributeValue::Null, AttributeValue::Null) => Ordering::Equal,
            (AttributeValue::Bool(a), AttributeValue::Bool(b)) => a.cmp(b),
            (AttributeValue::Number(a), AttributeValue::Number(b)) => a.total_cmp(b),
            (AttributeValue::Text(a), AttributeValue::Text(b)) => a.cmp(b),
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => write!(f, "null"),
            AttributeValue::Bool(value) => write!(f, "{}", value),
            AttributeValue::Number(value) => write!(f, "{}", value),
            AttributeValue::Text(value) => write!(f, "{}", value),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Number(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Number(value as f64)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl From<&serde_json::Value> for AttributeValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(value) => AttributeValue::Bool(*value),
            serde_json::Value::Number(number) => number
                .as_f64()
                .map(AttributeValue::Number)
                .unwrap_or(AttributeValue::Null),
            serde_json::Value::String(text) => AttributeValue::Text(text.clone()),
            // Nested values are kept as their JSON text.
            other => AttributeValue::Text(other.to_string()),
        }
    }
}

impl From<&AttributeValue> for serde_json::Value {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Null => serde_json::Value::Null,
            AttributeValue::Bool(value) => serde_json::Value::Bool(*value),
            AttributeValue::Number(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            AttributeValue::Text(value) => serde_json::Value::String(value.clone()),
        }
    }
}

pub type FeatureMap = HashMap<String, AttributeValue>;

/// A record retrieved from a feature source.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<geo::Geometry>,
    pub attributes: FeatureMap,
    /// Distance to the incident location, in the unit of the current search. Unset until
    /// distances are assigned.
    pub distance: Option<f64>,
}

impl Feature {
    pub fn new(attributes: FeatureMap) -> Self {
        Self {
            geometry: None,
            attributes,
            distance: None,
        }
    }

    pub fn with_geometry(mut self, geometry: geo::Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_distance(mut self, distance: f64) -> Self {
        self.distance = Some(distance);
        self
    }

    pub fn attribute(&self, field: &str) -> Option<&AttributeValue> {
        self.attributes.get(field)
    }

    /// Absent keys are treated the same as null values.
    pub fn has_value(&self, field: &str) -> bool {
        self.attribute(field)
            .map(|value| !value.is_missing())
            .unwrap_or(false)
    }

    /// Numeric identifier stored under `id_field`, if any.
    pub fn object_id(&self, id_field: &str) -> Option<i64> {
        self.attribute(id_field)
            .and_then(AttributeValue::as_f64)
            .map(|id| id as i64)
    }
}

impl From<geo::Geometry> for Feature {
    fn from(value: geo::Geometry) -> Self {
        Self {
            geometry: Some(value),
            attributes: HashMap::new(),
            distance: None,
        }
    }
}
