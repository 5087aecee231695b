use geo::{Area, BooleanOps, EuclideanLength, GeodesicArea, GeodesicLength};
use serde::Serialize;

use crate::geofile::feature::Feature;

use super::{
    config::{FormatOptions, SummaryAnalysis, SummaryExpression},
    display::format_number,
    search::SearchMode,
    units::DistanceUnit,
};

pub const NO_SUMMARIES_DEFINED: &str = "No summaries defined";

/// One computed summary card.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SummaryCard {
    pub label: String,
    pub value: String,
    pub color: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SummaryResult {
    pub count: usize,
    pub cards: Vec<SummaryCard>,
    /// Set when there is nothing to show.
    pub message: Option<String>,
}

fn polygons_of(geometry: &geo::Geometry) -> Option<geo::MultiPolygon> {
    match geometry {
        geo::Geometry::Polygon(polygon) => Some(geo::MultiPolygon::new(vec![polygon.clone()])),
        geo::Geometry::MultiPolygon(polygons) => Some(polygons.clone()),
        geo::Geometry::Rect(rect) => Some(geo::MultiPolygon::new(vec![rect.to_polygon()])),
        _ => None,
    }
}

fn lines_of(geometry: &geo::Geometry) -> Option<geo::MultiLineString> {
    match geometry {
        geo::Geometry::LineString(line) => Some(geo::MultiLineString::new(vec![line.clone()])),
        geo::Geometry::MultiLineString(lines) => Some(lines.clone()),
        geo::Geometry::Line(line) => Some(geo::MultiLineString::new(vec![(*line).into()])),
        _ => None,
    }
}

/// Sum of the feature areas clipped to `search_area`, in square `unit`.
///
/// `geographic` selects geodesic measurement for lon/lat data, planar otherwise.
pub fn intersected_area(
    features: &[Feature],
    search_area: Option<&geo::MultiPolygon>,
    unit: DistanceUnit,
    geographic: bool,
) -> f64 {
    let square_meters: f64 = features
        .iter()
        .filter_map(|feature| feature.geometry.as_ref().and_then(polygons_of))
        .map(|polygons| match search_area {
            Some(search_area) => polygons.intersection(search_area),
            None => polygons,
        })
        .map(|polygons| {
            if geographic {
                polygons.geodesic_area_unsigned()
            } else {
                polygons.unsigned_area()
            }
        })
        .sum();
    square_meters / unit.meters_per_unit().powi(2)
}

/// Sum of the feature lengths clipped to `search_area`, in `unit`.
pub fn intersected_length(
    features: &[Feature],
    search_area: Option<&geo::MultiPolygon>,
    unit: DistanceUnit,
    geographic: bool,
) -> f64 {
    let meters: f64 = features
        .iter()
        .filter_map(|feature| feature.geometry.as_ref().and_then(lines_of))
        .map(|lines| match search_area {
            Some(search_area) => search_area.clip(&lines, false),
            None => lines,
        })
        .map(|lines| {
            if geographic {
                lines.geodesic_length()
            } else {
                lines.euclidean_length()
            }
        })
        .sum();
    meters / unit.meters_per_unit()
}

fn numeric_values<'a>(features: &'a [Feature], field: &'a str) -> impl Iterator<Item = f64> + 'a {
    features
        .iter()
        .filter_map(move |feature| feature.attribute(field))
        .filter_map(|value| value.as_f64())
}

fn statistic(features: &[Feature], expression: &SummaryExpression) -> Option<f64> {
    match expression {
        SummaryExpression::Count => Some(features.len() as f64),
        SummaryExpression::Sum { field } => Some(numeric_values(features, field).sum()),
        SummaryExpression::Average { field } => {
            let (sum, count) = numeric_values(features, field)
                .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
            if count == 0 {
                None
            } else {
                Some(sum / count as f64)
            }
        }
        SummaryExpression::Min { field } => numeric_values(features, field).reduce(f64::min),
        SummaryExpression::Max { field } => numeric_values(features, field).reduce(f64::max),
        SummaryExpression::SumOfIntersectedArea(_) | SummaryExpression::SumOfIntersectedLength(_) => {
            None
        }
    }
}

/// Compute the summary cards of a layer.
///
/// Intersected area and length only make sense for a distance search and are skipped otherwise.
pub fn summary_analysis(
    features: &[Feature],
    analysis: &SummaryAnalysis,
    search_geometry: Option<&geo::Geometry>,
    mode: SearchMode,
    unit: DistanceUnit,
    geographic: bool,
) -> SummaryResult {
    let search_area = search_geometry.and_then(polygons_of);
    let mut cards = Vec::new();
    for summary_field in &analysis.summary_fields {
        let color = if analysis.is_single_color_mode {
            analysis.single_field_color.clone()
        } else {
            summary_field.field_color.clone()
        };
        let value = match &summary_field.summary_field_info {
            SummaryExpression::SumOfIntersectedArea(options) => {
                if mode != SearchMode::Distance {
                    continue;
                }
                let area = intersected_area(features, search_area.as_ref(), unit, geographic);
                format!("{} {}²", format_number(area, options), unit.abbreviation())
            }
            SummaryExpression::SumOfIntersectedLength(options) => {
                if mode != SearchMode::Distance {
                    continue;
                }
                let length = intersected_length(features, search_area.as_ref(), unit, geographic);
                format!("{} {}", format_number(length, options), unit.abbreviation())
            }
            expression => match statistic(features, expression) {
                Some(value) => format_number(value, &FormatOptions::default()),
                None => String::new(),
            },
        };
        cards.push(SummaryCard {
            label: summary_field.field_label.clone(),
            value,
            color,
        });
    }
    let message = if cards.is_empty() {
        Some(NO_SUMMARIES_DEFINED.to_string())
    } else {
        None
    };
    SummaryResult {
        count: features.len(),
        cards,
        message,
    }
}
