use geo::{Closest, ClosestPoint, HaversineDistance};

use crate::geofile::feature::Feature;

use super::units::DistanceUnit;

/// Distance in meters from `incident` to the nearest point of `geometry`, or `None` if no
/// nearest point exists (e.g. empty geometries).
pub fn distance_to_geometry(incident: &geo::Point, geometry: &geo::Geometry) -> Option<f64> {
    match geometry.closest_point(incident) {
        Closest::Intersection(_) => Some(0.0),
        Closest::SinglePoint(nearest) => Some(incident.haversine_distance(&nearest)),
        Closest::Indeterminate => None,
    }
}

/// Set the distance of every record to the incident, in `unit`.
///
/// Records without geometry, or without an incident to measure from, get a distance of zero.
pub fn assign_distances(
    features: &mut [Feature],
    incident: Option<&geo::Point>,
    unit: DistanceUnit,
) {
    for feature in features.iter_mut() {
        let distance = match (incident, &feature.geometry) {
            (Some(incident), Some(geometry)) => distance_to_geometry(incident, geometry)
                .map(|meters| meters / unit.meters_per_unit())
                .unwrap_or(0.0),
            _ => 0.0,
        };
        feature.distance = Some(distance);
    }
}
