use std::{collections::HashSet, path::Path};

use geo::Intersects;

use crate::{
    analysis::{distance::distance_to_geometry, proximity::LayerDefinition},
    geofile::{
        feature::{AttributeValue, Feature},
        geojson::read_features_from_geojson,
    },
};

use super::{FeatureSource, SearchQuery, DEFAULT_MAX_RECORD_COUNT};

/// Records held in memory, queried with `geo` predicates. Geometries are WGS84 lon/lat.
#[derive(Debug, Clone)]
pub struct LocalFeatureSource {
    features: Vec<Feature>,
    id_field: String,
    max_record_count: usize,
}

impl LocalFeatureSource {
    /// Records without a value in `id_field` are numbered after the largest existing id, in
    /// input order.
    pub fn new(features: Vec<Feature>, id_field: &str) -> Self {
        let mut next_id = features
            .iter()
            .filter_map(|feature| feature.object_id(id_field))
            .max()
            .unwrap_or(0)
            + 1;
        let features = features
            .into_iter()
            .map(|mut feature| {
                if !feature.has_value(id_field) {
                    feature
                        .attributes
                        .insert(id_field.to_string(), AttributeValue::from(next_id));
                    next_id += 1;
                }
                feature
            })
            .collect();
        Self {
            features,
            id_field: id_field.to_string(),
            max_record_count: DEFAULT_MAX_RECORD_COUNT,
        }
    }

    pub fn from_geojson(filepath: &Path, id_field: &str) -> anyhow::Result<Self> {
        let features = read_features_from_geojson(filepath)?;
        log::info!("Read {} records from {:?}", features.len(), filepath);
        Ok(Self::new(features, id_field))
    }

    pub fn with_max_record_count(mut self, max_record_count: usize) -> Self {
        self.max_record_count = max_record_count;
        self
    }

    /// A record matches when it intersects the search geometry. Around a search point records
    /// within the search distance match too.
    fn matches(feature: &Feature, query: &SearchQuery) -> bool {
        let search_geometry = match &query.geometry {
            Some(search_geometry) => search_geometry,
            None => return true,
        };
        let geometry = match &feature.geometry {
            Some(geometry) => geometry,
            None => return false,
        };
        if search_geometry.intersects(geometry) {
            return true;
        }
        match search_geometry {
            geo::Geometry::Point(point) => distance_to_geometry(point, geometry)
                .map(|meters| meters <= query.distance)
                .unwrap_or(false),
            _ => false,
        }
    }

    fn matching<'a>(&'a self, query: &'a SearchQuery) -> impl Iterator<Item = &'a Feature> + 'a {
        self.features
            .iter()
            .filter(move |feature| Self::matches(feature, query))
    }
}

impl FeatureSource for LocalFeatureSource {
    fn layer_definition(&self) -> anyhow::Result<LayerDefinition> {
        let mut fields: Vec<String> = self
            .features
            .first()
            .map(|feature| feature.attributes.keys().cloned().collect())
            .unwrap_or_default();
        fields.sort();
        Ok(LayerDefinition {
            object_id_field: Some(self.id_field.clone()),
            display_field: None,
            fields,
            max_record_count: Some(self.max_record_count),
        })
    }

    fn query_count(&self, query: &SearchQuery) -> anyhow::Result<usize> {
        Ok(self.matching(query).count())
    }

    fn query(
        &self,
        query: &SearchQuery,
        page: usize,
        page_size: usize,
    ) -> anyhow::Result<Vec<Feature>> {
        Ok(self
            .matching(query)
            .skip(page.saturating_sub(1) * page_size)
            .take(page_size)
            .map(|feature| {
                let mut feature = feature.clone();
                if !query.return_geometry {
                    feature.geometry = None;
                }
                feature
            })
            .collect())
    }

    fn query_disjoint(&self, query: &SearchQuery, ids: &[i64]) -> anyhow::Result<HashSet<i64>> {
        let ids: HashSet<i64> = ids.iter().copied().collect();
        Ok(self
            .features
            .iter()
            .filter_map(|feature| {
                let id = feature.object_id(&self.id_field)?;
                if ids.contains(&id) && !Self::matches(feature, query) {
                    Some(id)
                } else {
                    None
                }
            })
            .collect())
    }
}
