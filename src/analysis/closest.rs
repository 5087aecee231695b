use crate::geofile::feature::Feature;

use super::{
    config::ClosestAnalysis,
    search::SearchMode,
    units::{convert, DistanceUnit},
};

/// Closest max distance of `analysis`, expressed in the unit of the active search.
pub fn max_distance_in(analysis: &ClosestAnalysis, unit: DistanceUnit) -> f64 {
    convert(analysis.closest_feature_max_distance, analysis.distance_unit, unit)
}

/// Keep the nearest record within the closest max distance.
///
/// `features` must already be ordered by distance. Records beyond the max distance are only
/// dropped when the search buffer reaches further than it.
pub fn closest_feature(
    features: Vec<Feature>,
    analysis: &ClosestAnalysis,
    buffer_distance: f64,
    unit: DistanceUnit,
) -> Vec<Feature> {
    let max_distance = max_distance_in(analysis, unit);
    let mut features = features;
    if buffer_distance > max_distance {
        features.retain(|feature| feature.distance.unwrap_or(0.0) <= max_distance);
    }
    features.truncate(1);
    features
}

/// Whether an empty buffer search should be retried with a buffer of the closest max distance.
pub fn needs_closest_max_buffer(
    analysis: &ClosestAnalysis,
    mode: SearchMode,
    buffer_distance: f64,
    unit: DistanceUnit,
) -> bool {
    match mode {
        SearchMode::Distance => buffer_distance < max_distance_in(analysis, unit),
        SearchMode::MapExtent => true,
        SearchMode::ShowAll => false,
    }
}
