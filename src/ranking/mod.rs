//! Ordering and grouping of query results before they are displayed.
//!
//! Everything in here is a pure function of its inputs: records go in, an ordered copy (and
//! optionally groups of records) comes out.

pub mod group;
pub mod sort;

use serde::{Deserialize, Serialize};

use crate::geofile::feature::Feature;

pub use group::{display_label, Group};

/// Name of the derived distance key, as it appears in layer configs.
pub const DISTANCE_KEY: &str = "distance";

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    #[serde(alias = "ASC", alias = "asc")]
    Asc,
    #[serde(alias = "DESC", alias = "desc")]
    Desc,
}

/// The key records are sorted by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    Distance,
    Field(String),
}

impl From<&str> for SortKey {
    fn from(value: &str) -> Self {
        if value == DISTANCE_KEY {
            SortKey::Distance
        } else {
            SortKey::Field(value.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSortKey {
    Count,
    Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    pub field: String,
    pub order: SortOrder,
    pub sort_by: GroupSortKey,
    /// Prefix of the generated group ids, usually the data source id.
    pub id_prefix: String,
    /// Label used for groups whose value is missing.
    pub no_value_label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankingSpec {
    pub sort_by: SortKey,
    pub order: SortOrder,
    /// Field holding the record identifier, the last tie-break.
    pub id_field: String,
    pub group: Option<GroupSpec>,
}

impl RankingSpec {
    pub fn by_distance(id_field: &str) -> Self {
        Self {
            sort_by: SortKey::Distance,
            order: SortOrder::Asc,
            id_field: id_field.to_string(),
            group: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedFeatures {
    pub features: Vec<Feature>,
    /// Empty unless grouping was requested.
    pub groups: Vec<Group>,
}

/// Order `features` according to `spec`, and bucket them into groups when the spec asks for it.
///
/// Records without a value for the sort key are kept apart from the rest and placed at the
/// tail for ascending order, at the head for descending order. Ties keep their input order.
pub fn rank_features(features: &[Feature], spec: &RankingSpec) -> RankedFeatures {
    let groups = match &spec.group {
        Some(group_spec) => group::build_groups(features, group_spec),
        None => Vec::new(),
    };
    let sorted = sort::sort_features(features.to_vec(), &spec.sort_by, spec.order, &spec.id_field);
    let groups = match &spec.group {
        Some(group_spec) => group::fill_groups(groups, &sorted, &group_spec.field),
        None => groups,
    };
    RankedFeatures {
        features: sorted,
        groups,
    }
}
