use crate::{
    geofile::feature::Feature,
    ranking::{
        rank_features, GroupSortKey, GroupSpec, RankedFeatures, RankingSpec, SortKey, SortOrder,
    },
};

use super::{
    config::{AnalysisInfo, LayerConfig, ProximityAnalysis},
    search::SearchMode,
};

/// Layer metadata the analysis needs from the feature service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerDefinition {
    pub object_id_field: Option<String>,
    pub display_field: Option<String>,
    pub fields: Vec<String>,
    pub max_record_count: Option<usize>,
}

impl LayerDefinition {
    /// Field used as record title when none is configured: the object id field, then the
    /// display field, then the first field.
    pub fn default_display_field(&self) -> String {
        self.object_id_field
            .iter()
            .chain(self.display_field.iter())
            .chain(self.fields.first())
            .find(|field| !field.is_empty())
            .cloned()
            .unwrap_or_default()
    }
}

/// Derive the ranking of a layer from its analysis settings.
///
/// Proximity layers sort by their configured field unless sorting by distance is enabled.
/// Without a search distance a distance sort falls back to the id field. Closest and summary
/// layers sort by distance without groups.
pub fn ranking_spec_for_layer(
    layer: &LayerConfig,
    mode: SearchMode,
    id_field: &str,
    no_value_label: &str,
) -> RankingSpec {
    let analysis = match &layer.analysis_info {
        AnalysisInfo::Proximity(analysis) => analysis,
        _ => return RankingSpec::by_distance(id_field),
    };
    let sort_field = &analysis.sort_features.sort_features_by_field;
    let sort_by_field = !analysis.sort_features_by_distance && !sort_field.is_empty();
    let (sort_by, order) = if sort_by_field {
        (
            SortKey::Field(sort_field.clone()),
            analysis.sort_features.sort_features_order,
        )
    } else if mode == SearchMode::Distance {
        (SortKey::Distance, SortOrder::Asc)
    } else {
        (SortKey::Field(id_field.to_string()), SortOrder::Asc)
    };
    let group_field = &analysis.group_features.group_features_by_field;
    let group = if analysis.group_features_enabled && !group_field.is_empty() {
        Some(GroupSpec {
            field: group_field.clone(),
            order: analysis.group_features.group_features_order,
            sort_by: if analysis.sort_groups_by_count {
                GroupSortKey::Count
            } else {
                GroupSortKey::Value
            },
            id_prefix: layer.data_source_id.clone(),
            no_value_label: no_value_label.to_string(),
        })
    } else {
        None
    };
    RankingSpec {
        sort_by,
        order,
        id_field: id_field.to_string(),
        group,
    }
}

fn sorted_descending_by_field(analysis: &ProximityAnalysis) -> bool {
    !analysis.sort_features_by_distance
        && !analysis.sort_features.sort_features_by_field.is_empty()
        && analysis.sort_features.sort_features_order == SortOrder::Desc
}

/// Turn the ranking into the order records are listed in. A descending field sort is listed
/// back to front, both in the flat list and inside every group.
pub fn display_order(ranked: RankedFeatures, analysis: &ProximityAnalysis) -> RankedFeatures {
    if !sorted_descending_by_field(analysis) {
        return ranked;
    }
    let RankedFeatures {
        mut features,
        mut groups,
    } = ranked;
    features.reverse();
    for group in groups.iter_mut() {
        group.features.reverse();
    }
    RankedFeatures { features, groups }
}

/// Rank and order the records of a proximity layer for display.
pub fn proximity_result(
    features: &[Feature],
    layer: &LayerConfig,
    analysis: &ProximityAnalysis,
    mode: SearchMode,
    id_field: &str,
    no_value_label: &str,
) -> RankedFeatures {
    let spec = ranking_spec_for_layer(layer, mode, id_field, no_value_label);
    log::debug!("Ranking {} records of {} with {:?}", features.len(), layer.label, spec);
    display_order(rank_features(features, &spec), analysis)
}

/// Title field of the records of a layer.
pub fn popup_title_field(analysis: &ProximityAnalysis, definition: &LayerDefinition) -> String {
    if analysis.display_field.is_empty() {
        definition.default_display_field()
    } else {
        analysis.display_field.clone()
    }
}

/// Approximate distances are shown for distance searches only: always for closest layers, and
/// for proximity layers that open expanded with feature details.
pub fn display_approximate_distance(layer: &LayerConfig, mode: SearchMode) -> bool {
    if mode != SearchMode::Distance {
        return false;
    }
    match &layer.analysis_info {
        AnalysisInfo::Closest(_) => true,
        AnalysisInfo::Proximity(analysis) => {
            analysis.expand_on_open && analysis.expand_feature_details
        }
        AnalysisInfo::Summary(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{
        display_approximate_distance, proximity_result, ranking_spec_for_layer, LayerDefinition,
    };
    use crate::{
        analysis::{
            config::{
                AnalysisInfo, ClosestAnalysis, GroupFeatures, LayerConfig, ProximityAnalysis,
                SortFeatures,
            },
            search::SearchMode,
            units::DistanceUnit,
        },
        geofile::feature::{AttributeValue, Feature, FeatureMap},
        ranking::{GroupSortKey, SortKey, SortOrder},
    };

    fn layer(analysis: ProximityAnalysis) -> LayerConfig {
        LayerConfig {
            data_source_id: "ds_1".to_string(),
            label: "Schools".to_string(),
            analysis_info: AnalysisInfo::Proximity(analysis),
        }
    }

    fn sorted_by_name(order: SortOrder) -> ProximityAnalysis {
        ProximityAnalysis {
            sort_features_by_distance: false,
            sort_features: SortFeatures {
                sort_features_by_field: "NAME".to_string(),
                sort_features_order: order,
            },
            ..ProximityAnalysis::default()
        }
    }

    #[rstest]
    #[case(ProximityAnalysis::default(), SearchMode::Distance, SortKey::Distance)]
    #[case(ProximityAnalysis::default(), SearchMode::ShowAll, SortKey::Field("OBJECTID".into()))]
    #[case(ProximityAnalysis::default(), SearchMode::MapExtent, SortKey::Field("OBJECTID".into()))]
    #[case(sorted_by_name(SortOrder::Asc), SearchMode::ShowAll, SortKey::Field("NAME".into()))]
    #[case(sorted_by_name(SortOrder::Asc), SearchMode::Distance, SortKey::Field("NAME".into()))]
    fn test_ranking_spec_sort_key(
        #[case] analysis: ProximityAnalysis,
        #[case] mode: SearchMode,
        #[case] expected: SortKey,
    ) {
        let spec = ranking_spec_for_layer(&layer(analysis), mode, "OBJECTID", "");
        assert_eq!(expected, spec.sort_by);
        assert!(spec.group.is_none());
    }

    #[test]
    fn test_ranking_spec_for_closest_layer() {
        let layer = LayerConfig {
            data_source_id: "ds_2".to_string(),
            label: "Hospitals".to_string(),
            analysis_info: AnalysisInfo::Closest(ClosestAnalysis {
                closest_feature_max_distance: 5.0,
                distance_unit: DistanceUnit::Miles,
                expand_on_open: false,
            }),
        };
        let spec = ranking_spec_for_layer(&layer, SearchMode::Distance, "FID", "");
        assert_eq!(SortKey::Distance, spec.sort_by);
        assert_eq!("FID", spec.id_field);
    }

    #[test]
    fn test_ranking_spec_group() {
        let analysis = ProximityAnalysis {
            group_features_enabled: true,
            group_features: GroupFeatures {
                group_features_by_field: "TYPE".to_string(),
                group_features_order: SortOrder::Desc,
            },
            sort_groups_by_count: true,
            ..ProximityAnalysis::default()
        };
        let spec = ranking_spec_for_layer(&layer(analysis), SearchMode::Distance, "OBJECTID", "-");
        let group = spec.group.unwrap();
        assert_eq!("TYPE", group.field);
        assert_eq!(SortOrder::Desc, group.order);
        assert_eq!(GroupSortKey::Count, group.sort_by);
        assert_eq!("ds_1", group.id_prefix);
    }

    #[test]
    fn test_descending_sort_is_listed_back_to_front() {
        let features: Vec<Feature> = [(1, Some("b")), (2, None), (3, Some("a")), (4, Some("c"))]
            .iter()
            .map(|(id, name)| {
                let mut attributes =
                    FeatureMap::from([("OBJECTID".to_string(), AttributeValue::from(*id as i64))]);
                if let Some(name) = name {
                    attributes.insert("NAME".to_string(), AttributeValue::from(*name));
                }
                Feature::new(attributes)
            })
            .collect();
        let analysis = sorted_by_name(SortOrder::Desc);
        let result = proximity_result(
            &features,
            &layer(analysis.clone()),
            &analysis,
            SearchMode::Distance,
            "OBJECTID",
            "",
        );
        let ids: Vec<i64> = result
            .features
            .iter()
            .map(|feature| feature.object_id("OBJECTID").unwrap())
            .collect();
        assert_eq!(vec![4, 1, 3, 2], ids);
    }

    #[rstest]
    #[case(LayerDefinition { object_id_field: Some("OID".into()), display_field: Some("NAME".into()), fields: vec!["A".into()], max_record_count: None }, "OID")]
    #[case(LayerDefinition { object_id_field: None, display_field: Some("NAME".into()), fields: vec!["A".into()], max_record_count: None }, "NAME")]
    #[case(LayerDefinition { object_id_field: None, display_field: None, fields: vec!["A".into()], max_record_count: None }, "A")]
    fn test_default_display_field(#[case] definition: LayerDefinition, #[case] expected: &str) {
        assert_eq!(expected, definition.default_display_field());
    }

    #[rstest]
    #[case(true, true, SearchMode::Distance, true)]
    #[case(true, false, SearchMode::Distance, false)]
    #[case(true, true, SearchMode::MapExtent, false)]
    fn test_display_approximate_distance(
        #[case] expand_on_open: bool,
        #[case] expand_feature_details: bool,
        #[case] mode: SearchMode,
        #[case] expected: bool,
    ) {
        let analysis = ProximityAnalysis {
            expand_on_open,
            expand_feature_details,
            ..ProximityAnalysis::default()
        };
        assert_eq!(expected, display_approximate_distance(&layer(analysis), mode));
    }
}
