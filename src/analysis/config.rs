use serde::{Deserialize, Serialize};

use crate::ranking::SortOrder;

use super::units::DistanceUnit;

/// One analysis layer: which data source to query and what to do with the results.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LayerConfig {
    pub data_source_id: String,
    pub label: String,
    pub analysis_info: AnalysisInfo,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "analysis_type", rename_all = "lowercase")]
pub enum AnalysisInfo {
    Closest(ClosestAnalysis),
    Proximity(ProximityAnalysis),
    Summary(SummaryAnalysis),
}

impl AnalysisInfo {
    pub fn name(&self) -> &'static str {
        match self {
            AnalysisInfo::Closest(_) => "closest",
            AnalysisInfo::Proximity(_) => "proximity",
            AnalysisInfo::Summary(_) => "summary",
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ClosestAnalysis {
    pub closest_feature_max_distance: f64,
    #[serde(default)]
    pub distance_unit: DistanceUnit,
    #[serde(default)]
    pub expand_on_open: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct SortFeatures {
    #[serde(default)]
    pub sort_features_by_field: String,
    #[serde(default)]
    pub sort_features_order: SortOrder,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct GroupFeatures {
    #[serde(default)]
    pub group_features_by_field: String,
    #[serde(default)]
    pub group_features_order: SortOrder,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ProximityAnalysis {
    /// Field used as the title of each record. Empty means the layer's default display field.
    #[serde(default)]
    pub display_field: String,
    #[serde(default = "default_true")]
    pub sort_features_by_distance: bool,
    #[serde(default)]
    pub sort_features: SortFeatures,
    #[serde(default)]
    pub group_features_enabled: bool,
    #[serde(default)]
    pub group_features: GroupFeatures,
    #[serde(default)]
    pub sort_groups_by_count: bool,
    #[serde(default)]
    pub highlight_results_on_map: bool,
    #[serde(default)]
    pub expand_on_open: bool,
    #[serde(default)]
    pub expand_feature_details: bool,
}

impl Default for ProximityAnalysis {
    fn default() -> Self {
        Self {
            display_field: String::new(),
            sort_features_by_distance: true,
            sort_features: SortFeatures::default(),
            group_features_enabled: false,
            group_features: GroupFeatures::default(),
            sort_groups_by_count: false,
            highlight_results_on_map: false,
            expand_on_open: false,
            expand_feature_details: false,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormatting {
    #[default]
    NoFormatting,
    Round,
    Truncate,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FormatOptions {
    #[serde(default)]
    pub show_separator: bool,
    #[serde(default)]
    pub number_formatting_option: NumberFormatting,
    #[serde(default = "default_significant_digits")]
    pub significant_digits: usize,
}

fn default_significant_digits() -> usize {
    2
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            show_separator: false,
            number_formatting_option: NumberFormatting::NoFormatting,
            significant_digits: default_significant_digits(),
        }
    }
}

/// What a summary card computes.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "summary_by", rename_all = "snake_case")]
pub enum SummaryExpression {
    Count,
    Sum { field: String },
    Average { field: String },
    Min { field: String },
    Max { field: String },
    SumOfIntersectedArea(FormatOptions),
    SumOfIntersectedLength(FormatOptions),
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SummaryFieldInfo {
    pub field_label: String,
    #[serde(default)]
    pub field_color: String,
    pub summary_field_info: SummaryExpression,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct SummaryAnalysis {
    #[serde(default)]
    pub is_single_color_mode: bool,
    #[serde(default)]
    pub single_field_color: String,
    #[serde(default)]
    pub summary_fields: Vec<SummaryFieldInfo>,
    #[serde(default)]
    pub highlight_results_on_map: bool,
    #[serde(default)]
    pub expand_on_open: bool,
}

#[cfg(test)]
mod tests {
    use super::{AnalysisInfo, LayerConfig, NumberFormatting, SummaryExpression};
    use crate::{analysis::units::DistanceUnit, ranking::SortOrder};

    #[test]
    fn test_layer_configs_from_yaml() {
        let contents = r#"
- data_source_id: schools
  label: Schools
  analysis_info:
    analysis_type: proximity
    sort_features_by_distance: false
    sort_features:
      sort_features_by_field: NAME
      sort_features_order: DESC
    group_features_enabled: true
    group_features:
      group_features_by_field: DISTRICT
- data_source_id: hospitals
  label: Hospitals
  analysis_info:
    analysis_type: closest
    closest_feature_max_distance: 20
    distance_unit: kilometers
- data_source_id: parcels
  label: Parcels
  analysis_info:
    analysis_type: summary
    summary_fields:
      - field_label: Parcels
        summary_field_info:
          summary_by: count
      - field_label: Area
        summary_field_info:
          summary_by: sum_of_intersected_area
          number_formatting_option: round
          significant_digits: 1
"#;
        let layers: Vec<LayerConfig> = serde_yaml::from_str(contents).unwrap();
        assert_eq!(3, layers.len());

        match &layers[0].analysis_info {
            AnalysisInfo::Proximity(proximity) => {
                assert!(!proximity.sort_features_by_distance);
                assert_eq!(SortOrder::Desc, proximity.sort_features.sort_features_order);
                assert_eq!("DISTRICT", proximity.group_features.group_features_by_field);
                assert_eq!(SortOrder::Asc, proximity.group_features.group_features_order);
            }
            other => panic!("Expected proximity analysis, got {:?}", other),
        }
        match &layers[1].analysis_info {
            AnalysisInfo::Closest(closest) => {
                assert_eq!(20.0, closest.closest_feature_max_distance);
                assert_eq!(DistanceUnit::Kilometers, closest.distance_unit);
            }
            other => panic!("Expected closest analysis, got {:?}", other),
        }
        match &layers[2].analysis_info {
            AnalysisInfo::Summary(summary) => {
                assert_eq!(SummaryExpression::Count, summary.summary_fields[0].summary_field_info);
                match &summary.summary_fields[1].summary_field_info {
                    SummaryExpression::SumOfIntersectedArea(options) => {
                        assert_eq!(NumberFormatting::Round, options.number_formatting_option);
                        assert_eq!(1, options.significant_digits);
                    }
                    other => panic!("Expected area summary, got {:?}", other),
                }
            }
            other => panic!("Expected summary analysis, got {:?}", other),
        }
    }
}
