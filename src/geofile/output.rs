use anyhow::{anyhow, Context};
use geo::BoundingRect;
use geohash::{encode, Coord};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    analysis::search::AreaOfInterest,
    session::{LayerAnalysis, LayerResult},
};

use super::{
    feature::{AttributeValue, Feature, FeatureMap},
    geojson::write_features_to_geojson,
};

const GEOHASH_LENGTH: usize = 8;

fn geohash_of(x: f64, y: f64) -> anyhow::Result<String> {
    Ok(encode(Coord { x, y }, GEOHASH_LENGTH)?)
}

/// File name prefix identifying a search: the geohash of the incident, the geohashes of the
/// extent corners, or `all` when every record was searched.
pub fn output_prefix(area: Option<&AreaOfInterest>) -> anyhow::Result<String> {
    let area = match area {
        Some(area) => area,
        None => return Ok("all".to_string()),
    };
    if let Some(incident) = area.incident {
        return geohash_of(incident.x(), incident.y());
    }
    match &area.buffer {
        Some(extent) => {
            let rect = extent
                .bounding_rect()
                .ok_or(anyhow!("Search extent is empty"))?;
            let top_left_geohash = geohash_of(rect.min().x, rect.max().y)?;
            let bottom_right_geohash = geohash_of(rect.max().x, rect.min().y)?;
            Ok(format!("{top_left_geohash}_{bottom_right_geohash}"))
        }
        None => Ok("all".to_string()),
    }
}

fn group_properties(id: &str, label: &str) -> FeatureMap {
    FeatureMap::from([
        ("group_id".to_string(), AttributeValue::from(id)),
        ("group_label".to_string(), AttributeValue::from(label)),
    ])
}

/// Records of a layer result with the extra properties written next to their attributes.
/// Grouped records are listed group by group.
pub fn layer_records(result: &LayerResult) -> Vec<(Feature, FeatureMap)> {
    match &result.analysis {
        LayerAnalysis::Proximity(ranked) if !ranked.groups.is_empty() => ranked
            .groups
            .iter()
            .flat_map(|group| {
                group
                    .features
                    .iter()
                    .map(move |feature| (feature.clone(), group_properties(&group.id, &group.label)))
            })
            .collect(),
        _ => result
            .records()
            .iter()
            .map(|feature| (feature.clone(), FeatureMap::new()))
            .collect(),
    }
}

/// Write one layer result to `output_dir`: records as GeoJSON, summaries as JSON.
pub fn write_layer_result(
    result: &LayerResult,
    prefix: &str,
    output_dir: &Path,
) -> anyhow::Result<PathBuf> {
    let name = format!(
        "{}_{}_{}_{}",
        prefix,
        result.index,
        result.layer.data_source_id,
        result.layer.analysis_info.name()
    );
    match &result.analysis {
        LayerAnalysis::Summary(summary) => {
            let output_filepath = output_dir.join(format!("{}.json", name));
            fs::write(&output_filepath, serde_json::to_string_pretty(summary)?)
                .with_context(|| format!("Writing summary to {:?}", output_filepath))?;
            Ok(output_filepath)
        }
        _ => {
            let output_filepath = output_dir.join(format!("{}.geojson", name));
            write_features_to_geojson(&layer_records(result), &output_filepath)?;
            Ok(output_filepath)
        }
    }
}

/// Write the search geometry for reference.
pub fn write_search_area(
    area: &AreaOfInterest,
    prefix: &str,
    output_dir: &Path,
) -> anyhow::Result<Option<PathBuf>> {
    let geometry = match area.search_geometry() {
        Some(geometry) => geometry,
        None => return Ok(None),
    };
    let output_filepath = output_dir.join(format!("{}_search_area.geojson", prefix));
    write_features_to_geojson(&[(Feature::from(geometry), FeatureMap::new())], &output_filepath)?;
    Ok(Some(output_filepath))
}
