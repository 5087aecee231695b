use geo::HaversineDestination;
use serde::{Deserialize, Serialize};

use super::units::{cap_buffer_distance, DistanceUnit};

/// Number of vertices of a buffer circle.
const BUFFER_VERTEX_COUNT: usize = 64;

/// How the area to analyse is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Buffer around an incident location. The only mode with meaningful distances.
    Distance,
    /// Everything in the current map extent.
    MapExtent,
    /// Every record of the layer.
    ShowAll,
}

impl SearchMode {
    /// Geometry is only needed when distances to the incident are shown.
    pub fn return_geometry(&self) -> bool {
        *self == SearchMode::Distance
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SearchSettings {
    #[serde(default = "default_true")]
    pub define_search_area: bool,
    #[serde(default)]
    pub search_by_current_map_extent: bool,
    #[serde(default)]
    pub buffer_distance: f64,
    #[serde(default)]
    pub distance_units: Option<DistanceUnit>,
    /// Portal unit system, `english` or `metric`. Decides the unit when no search distance is used.
    #[serde(default)]
    pub portal_units: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            define_search_area: true,
            search_by_current_map_extent: false,
            buffer_distance: 0.0,
            distance_units: None,
            portal_units: None,
        }
    }
}

impl SearchSettings {
    pub fn mode(&self) -> SearchMode {
        match (self.define_search_area, self.search_by_current_map_extent) {
            (false, _) => SearchMode::ShowAll,
            (true, true) => SearchMode::MapExtent,
            (true, false) => SearchMode::Distance,
        }
    }

    /// Unit distances are reported in. Outside of distance searches the portal unit is used.
    pub fn active_unit(&self) -> DistanceUnit {
        let portal_unit = DistanceUnit::portal_default(self.portal_units.as_deref());
        match self.mode() {
            SearchMode::Distance => self.distance_units.unwrap_or(portal_unit),
            _ => portal_unit,
        }
    }
}

/// The geometries a search runs against.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AreaOfInterest {
    pub incident: Option<geo::Point>,
    pub buffer: Option<geo::Polygon>,
    pub buffer_distance: f64,
    pub distance_unit: Option<DistanceUnit>,
}

impl AreaOfInterest {
    pub fn around(incident: geo::Point, distance: f64, unit: DistanceUnit) -> Self {
        let distance = cap_buffer_distance(distance, unit);
        let buffer = if distance > 0.0 {
            Some(create_buffer(incident, distance, unit))
        } else {
            None
        };
        Self {
            incident: Some(incident),
            buffer,
            buffer_distance: distance,
            distance_unit: Some(unit),
        }
    }

    /// Search the current map extent. There is no incident, so no distances.
    pub fn from_extent(extent: geo::Rect) -> Self {
        Self {
            incident: None,
            buffer: Some(extent.to_polygon()),
            buffer_distance: 0.0,
            distance_unit: None,
        }
    }

    /// Geometry to query with: the buffer when there is one, the incident otherwise.
    pub fn search_geometry(&self) -> Option<geo::Geometry> {
        match (&self.buffer, &self.incident) {
            (Some(buffer), _) => Some(geo::Geometry::Polygon(buffer.clone())),
            (None, Some(incident)) => Some(geo::Geometry::Point(*incident)),
            (None, None) => None,
        }
    }
}

/// Geodesic circle around a WGS84 `center`.
pub fn create_buffer(center: geo::Point, distance: f64, unit: DistanceUnit) -> geo::Polygon {
    let radius_meters = distance * unit.meters_per_unit();
    let ring: Vec<geo::Point> = (0..BUFFER_VERTEX_COUNT)
        .map(|index| {
            let bearing = 360.0 * index as f64 / BUFFER_VERTEX_COUNT as f64;
            center.haversine_destination(bearing, radius_meters)
        })
        .collect();
    geo::Polygon::new(ring.into_iter().collect(), vec![])
}
