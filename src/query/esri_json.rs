use anyhow::anyhow;
use geo::{orient::Direction, Orient, Winding};
use serde::{Deserialize, Serialize};

use crate::geofile::feature::{AttributeValue, Feature, FeatureMap};

/// `[x, y]`, optionally followed by z and m values which are ignored.
type Position = Vec<f64>;

/// Geometry as written by ArcGIS feature services.
///
/// Variants are told apart by their keys. `Point` comes last as empty points have null
/// coordinates.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum EsriGeometry {
    Multipoint {
        points: Vec<Position>,
    },
    Polyline {
        paths: Vec<Vec<Position>>,
    },
    Polygon {
        rings: Vec<Vec<Position>>,
    },
    Envelope {
        xmin: f64,
        ymin: f64,
        xmax: f64,
        ymax: f64,
    },
    Point {
        x: Option<f64>,
        y: Option<f64>,
    },
}

#[derive(Deserialize, Debug)]
struct EsriFeature {
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    geometry: Option<EsriGeometry>,
}

/// `esriGeometry*` name of the geometry type a geometry is sent as.
pub fn geometry_type(geometry: &geo::Geometry) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "esriGeometryPoint",
        geo::Geometry::MultiPoint(_) => "esriGeometryMultipoint",
        geo::Geometry::Line(_) | geo::Geometry::LineString(_) | geo::Geometry::MultiLineString(_) => {
            "esriGeometryPolyline"
        }
        geo::Geometry::Rect(_) => "esriGeometryEnvelope",
        _ => "esriGeometryPolygon",
    }
}

fn coord(position: &Position) -> anyhow::Result<geo::Coord> {
    match position.as_slice() {
        [x, y, ..] => Ok(geo::coord! { x: *x, y: *y }),
        _ => Err(anyhow!("Position {:?} has less than two values", position)),
    }
}

fn line_string(positions: &[Position]) -> anyhow::Result<geo::LineString> {
    positions
        .iter()
        .map(coord)
        .collect::<anyhow::Result<Vec<_>>>()
        .map(geo::LineString::new)
}

fn position(coord: geo::Coord) -> Position {
    vec![coord.x, coord.y]
}

fn ring_positions(ring: &geo::LineString) -> Vec<Position> {
    ring.coords().copied().map(position).collect()
}

/// Clockwise rings are outer rings, counterclockwise rings are holes of the outer ring before
/// them.
fn polygons_from_rings(rings: &[Vec<Position>]) -> anyhow::Result<geo::MultiPolygon> {
    let mut polygons: Vec<(geo::LineString, Vec<geo::LineString>)> = Vec::new();
    for ring in rings {
        let mut ring = line_string(ring)?;
        ring.close();
        if ring.is_ccw() && !polygons.is_empty() {
            let last = polygons.len() - 1;
            polygons[last].1.push(ring);
        } else {
            polygons.push((ring, Vec::new()));
        }
    }
    Ok(polygons
        .into_iter()
        .map(|(exterior, holes)| geo::Polygon::new(exterior, holes))
        .collect())
}

impl EsriGeometry {
    /// `None` for empty geometries.
    pub fn to_geo(&self) -> anyhow::Result<Option<geo::Geometry>> {
        let geometry = match self {
            EsriGeometry::Point {
                x: Some(x),
                y: Some(y),
            } => geo::Geometry::Point(geo::Point::new(*x, *y)),
            EsriGeometry::Point { .. } => return Ok(None),
            EsriGeometry::Multipoint { points } if points.is_empty() => return Ok(None),
            EsriGeometry::Multipoint { points } => geo::Geometry::MultiPoint(
                points
                    .iter()
                    .map(|point| coord(point).map(geo::Point::from))
                    .collect::<anyhow::Result<_>>()?,
            ),
            EsriGeometry::Polyline { paths } if paths.is_empty() => return Ok(None),
            EsriGeometry::Polyline { paths } => {
                let mut lines = paths
                    .iter()
                    .map(|path| line_string(path))
                    .collect::<anyhow::Result<Vec<_>>>()?;
                if lines.len() == 1 {
                    geo::Geometry::LineString(lines.remove(0))
                } else {
                    geo::Geometry::MultiLineString(geo::MultiLineString::new(lines))
                }
            }
            EsriGeometry::Polygon { rings } if rings.is_empty() => return Ok(None),
            EsriGeometry::Polygon { rings } => {
                let mut polygons = polygons_from_rings(rings)?;
                if polygons.0.len() == 1 {
                    geo::Geometry::Polygon(polygons.0.remove(0))
                } else {
                    geo::Geometry::MultiPolygon(polygons)
                }
            }
            EsriGeometry::Envelope {
                xmin,
                ymin,
                xmax,
                ymax,
            } => geo::Geometry::Rect(geo::Rect::new(
                geo::coord! { x: *xmin, y: *ymin },
                geo::coord! { x: *xmax, y: *ymax },
            )),
        };
        Ok(Some(geometry))
    }

    /// Polygons are written with clockwise outer rings and counterclockwise holes.
    pub fn from_geo(geometry: &geo::Geometry) -> anyhow::Result<Self> {
        let polygon_rings = |polygons: &[geo::Polygon]| -> Vec<Vec<Position>> {
            polygons
                .iter()
                .flat_map(|polygon| {
                    let polygon = polygon.orient(Direction::Reversed);
                    let mut rings = vec![ring_positions(polygon.exterior())];
                    rings.extend(polygon.interiors().iter().map(ring_positions));
                    rings
                })
                .collect()
        };
        let esri_geometry = match geometry {
            geo::Geometry::Point(point) => EsriGeometry::Point {
                x: Some(point.x()),
                y: Some(point.y()),
            },
            geo::Geometry::MultiPoint(points) => EsriGeometry::Multipoint {
                points: points.iter().map(|point| position(point.0)).collect(),
            },
            geo::Geometry::Line(line) => EsriGeometry::Polyline {
                paths: vec![vec![position(line.start), position(line.end)]],
            },
            geo::Geometry::LineString(line) => EsriGeometry::Polyline {
                paths: vec![ring_positions(line)],
            },
            geo::Geometry::MultiLineString(lines) => EsriGeometry::Polyline {
                paths: lines.iter().map(ring_positions).collect(),
            },
            geo::Geometry::Polygon(polygon) => EsriGeometry::Polygon {
                rings: polygon_rings(std::slice::from_ref(polygon)),
            },
            geo::Geometry::MultiPolygon(polygons) => EsriGeometry::Polygon {
                rings: polygon_rings(&polygons.0),
            },
            geo::Geometry::Rect(rect) => EsriGeometry::Envelope {
                xmin: rect.min().x,
                ymin: rect.min().y,
                xmax: rect.max().x,
                ymax: rect.max().y,
            },
            geo::Geometry::Triangle(triangle) => EsriGeometry::Polygon {
                rings: polygon_rings(&[triangle.to_polygon()]),
            },
            geo::Geometry::GeometryCollection(_) => {
                return Err(anyhow!("Geometry collections have no Esri JSON equivalent"))
            }
        };
        Ok(esri_geometry)
    }
}

/// Esri JSON of `geometry` tagged with its spatial reference, as sent in query parameters.
pub fn to_esri_json(geometry: &geo::Geometry, wkid: u32) -> anyhow::Result<serde_json::Value> {
    let mut value = serde_json::to_value(EsriGeometry::from_geo(geometry)?)?;
    if let serde_json::Value::Object(object) = &mut value {
        object.insert(
            "spatialReference".to_string(),
            serde_json::json!({ "wkid": wkid }),
        );
    }
    Ok(value)
}

/// Read one element of the `features` array of a query response.
pub fn feature_from_esri_json(value: serde_json::Value) -> anyhow::Result<Feature> {
    let esri_feature: EsriFeature = serde_json::from_value(value)?;
    let attributes: FeatureMap = esri_feature
        .attributes
        .iter()
        .map(|(key, value)| (key.clone(), AttributeValue::from(value)))
        .collect();
    let mut feature = Feature::new(attributes);
    if let Some(geometry) = esri_feature.geometry {
        feature.geometry = geometry.to_geo()?;
    }
    Ok(feature)
}
