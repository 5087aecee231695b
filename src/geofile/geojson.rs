use anyhow::{anyhow, Context};
use std::{fs, path::Path};

use super::feature::{AttributeValue, Feature, FeatureMap};

pub fn read_features_from_geojson(input_filepath: &Path) -> anyhow::Result<Vec<Feature>> {
    let contents = fs::read_to_string(input_filepath)
        .with_context(|| format!("Reading GeoJSON file {:?}", input_filepath))?;
    parse_features(&contents)
}

pub fn parse_features(contents: &str) -> anyhow::Result<Vec<Feature>> {
    let geojson: geojson::GeoJson = contents.parse()?;
    let collection = match geojson {
        geojson::GeoJson::FeatureCollection(collection) => collection,
        geojson::GeoJson::Feature(feature) => geojson::FeatureCollection {
            bbox: None,
            features: vec![feature],
            foreign_members: None,
        },
        geojson::GeoJson::Geometry(_) => {
            return Err(anyhow!("Expected a Feature or FeatureCollection, found a bare geometry"))
        }
    };
    collection
        .features
        .into_iter()
        .map(feature_from_geojson)
        .collect()
}

fn feature_from_geojson(feature: geojson::Feature) -> anyhow::Result<Feature> {
    let geometry = match feature.geometry {
        Some(geometry) => Some(
            geo::Geometry::<f64>::try_from(geometry.value)
                .map_err(|err| anyhow!("Could not convert GeoJSON geometry, {}", err))?,
        ),
        None => None,
    };
    let attributes: FeatureMap = feature
        .properties
        .unwrap_or_default()
        .iter()
        .map(|(key, value)| (key.clone(), AttributeValue::from(value)))
        .collect();
    Ok(Feature {
        geometry,
        attributes,
        distance: None,
    })
}

/// Convert a feature to GeoJSON. `extra` properties are written after the attributes and take
/// precedence over attributes with the same name.
pub fn feature_to_geojson(feature: &Feature, extra: &FeatureMap) -> geojson::Feature {
    let mut properties = geojson::JsonObject::new();
    for (key, value) in feature.attributes.iter().chain(extra.iter()) {
        properties.insert(key.clone(), serde_json::Value::from(value));
    }
    if let Some(distance) = feature.distance {
        properties.insert("distance".to_string(), serde_json::json!(distance));
    }
    geojson::Feature {
        bbox: None,
        geometry: feature
            .geometry
            .as_ref()
            .map(|geometry| geojson::Geometry::new(geojson::Value::from(geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn write_features_to_geojson(
    features: &[(Feature, FeatureMap)],
    output_filepath: &Path,
) -> anyhow::Result<()> {
    let feature_collection: geojson::FeatureCollection = features
        .iter()
        .map(|(feature, extra)| feature_to_geojson(feature, extra))
        .collect();
    let geojson_contents: geojson::GeoJson = geojson::GeoJson::from(feature_collection);
    fs::write(output_filepath, geojson_contents.to_string())
        .with_context(|| format!("Writing GeoJSON to {:?}", output_filepath))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use testdir::testdir;

    use super::{parse_features, read_features_from_geojson, write_features_to_geojson};
    use crate::geofile::feature::{AttributeValue, Feature, FeatureMap};

    #[test]
    fn test_parse_features() {
        let contents = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [10.0, 20.0]},
                 "properties": {"OBJECTID": 1, "NAME": "Library"}},
                {"type": "Feature", "geometry": null, "properties": {"OBJECTID": 2, "NAME": null}}
            ]
        }"#;
        let features = parse_features(contents).unwrap();
        assert_eq!(2, features.len());
        assert_eq!(
            Some(geo::Geometry::Point(geo::Point::new(10.0, 20.0))),
            features[0].geometry
        );
        assert_eq!(Some(1), features[0].object_id("OBJECTID"));
        assert!(features[1].geometry.is_none());
        assert!(!features[1].has_value("NAME"));
    }

    #[rstest]
    fn test_parse_rejects_bare_geometry() {
        let contents = r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#;
        assert!(parse_features(contents).is_err());
    }

    #[test]
    fn test_written_features_carry_extra_properties() {
        let feature = Feature::new(FeatureMap::from([(
            "NAME".to_string(),
            AttributeValue::from("School"),
        )]))
        .with_geometry(geo::Geometry::Point(geo::Point::new(1.0, 2.0)))
        .with_distance(3.5);
        let extra = FeatureMap::from([("rank".to_string(), AttributeValue::from(1.0))]);

        let output_filepath = testdir!().join("results.geojson");
        write_features_to_geojson(&[(feature, extra)], &output_filepath).unwrap();

        let features = read_features_from_geojson(&output_filepath).unwrap();
        assert_eq!(1, features.len());
        let attributes = &features[0].attributes;
        assert_eq!(Some(&AttributeValue::from("School")), attributes.get("NAME"));
        assert_eq!(Some(&AttributeValue::from(1.0)), attributes.get("rank"));
        assert_eq!(Some(&AttributeValue::from(3.5)), attributes.get("distance"));
    }
}
