//! Analysis state across searches.
//!
//! Records are fetched once per data source and search, then every configured layer is analysed
//! from that cache. Commands say what changed, and only the affected state is dropped.

use std::collections::{HashMap, HashSet};

use crate::{
    analysis::{
        closest::{closest_feature, needs_closest_max_buffer},
        config::{AnalysisInfo, LayerConfig},
        distance::assign_distances,
        proximity::{
            display_approximate_distance, popup_title_field, proximity_result,
            ranking_spec_for_layer, LayerDefinition,
        },
        search::{create_buffer, AreaOfInterest, SearchMode, SearchSettings},
        summary::{summary_analysis, SummaryResult},
        units::DistanceUnit,
    },
    geofile::feature::Feature,
    query::{get_all_features_with, FeatureSource, QueryOptions, SearchQuery, DEFAULT_ID_FIELD},
    ranking::{rank_features, RankedFeatures},
};

/// Feature sources by data source id.
pub type FeatureSources = HashMap<String, Box<dyn FeatureSource>>;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Search around a new incident location with the current buffer distance.
    SetIncident(geo::Point),
    SetBufferDistance(f64, DistanceUnit),
    /// Search the given map extent.
    SetMapExtent(geo::Rect),
    SetSearchSettings(SearchSettings),
    SetLayers(Vec<LayerConfig>),
    Clear,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerAnalysis {
    /// The nearest record, if any.
    Closest(Vec<Feature>),
    Proximity(RankedFeatures),
    Summary(SummaryResult),
}

/// Outcome of analysing one configured layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerResult {
    /// Position of the layer in the configured layers.
    pub index: usize,
    pub layer: LayerConfig,
    /// Unit of the record distances.
    pub unit: DistanceUnit,
    pub popup_title_field: String,
    pub show_approximate_distance: bool,
    pub analysis: LayerAnalysis,
}

impl LayerResult {
    /// Records in display order. Summary layers list the records they summarise.
    pub fn records(&self) -> &[Feature] {
        match &self.analysis {
            LayerAnalysis::Closest(features) => features,
            LayerAnalysis::Proximity(ranked) => &ranked.features,
            LayerAnalysis::Summary(_) => &[],
        }
    }
}

pub struct AnalysisSession {
    layers: Vec<LayerConfig>,
    settings: SearchSettings,
    area: Option<AreaOfInterest>,
    options: QueryOptions,
    no_value_label: String,
    features_by_ds_id: HashMap<String, Vec<Feature>>,
    results: Vec<LayerResult>,
}

impl AnalysisSession {
    pub fn new(layers: Vec<LayerConfig>, settings: SearchSettings) -> Self {
        Self {
            layers,
            settings,
            area: None,
            options: QueryOptions::default(),
            no_value_label: String::new(),
            features_by_ds_id: HashMap::new(),
            results: Vec::new(),
        }
    }

    pub fn with_query_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_no_value_label(mut self, no_value_label: &str) -> Self {
        self.no_value_label = no_value_label.to_string();
        self
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn area(&self) -> Option<&AreaOfInterest> {
        self.area.as_ref()
    }

    pub fn results(&self) -> &[LayerResult] {
        &self.results
    }

    /// Data source ids with cached records.
    pub fn cached_data_sources(&self) -> HashSet<&str> {
        self.features_by_ds_id.keys().map(String::as_str).collect()
    }

    fn invalidate_search(&mut self) {
        self.features_by_ds_id.clear();
        self.results.clear();
    }

    fn buffer_unit(&self) -> DistanceUnit {
        self.settings
            .distance_units
            .unwrap_or_else(|| DistanceUnit::portal_default(self.settings.portal_units.as_deref()))
    }

    fn area_around(&self, incident: geo::Point) -> AreaOfInterest {
        AreaOfInterest::around(incident, self.settings.buffer_distance, self.buffer_unit())
    }

    pub fn apply(&mut self, command: Command) {
        log::debug!("Applying {:?}", command);
        match command {
            Command::SetIncident(incident) => {
                self.area = Some(self.area_around(incident));
                self.invalidate_search();
            }
            Command::SetBufferDistance(distance, unit) => {
                self.settings.buffer_distance = distance;
                self.settings.distance_units = Some(unit);
                if let Some(incident) = self.area.as_ref().and_then(|area| area.incident) {
                    self.area = Some(self.area_around(incident));
                }
                self.invalidate_search();
            }
            Command::SetMapExtent(extent) => {
                self.area = Some(AreaOfInterest::from_extent(extent));
                self.invalidate_search();
            }
            Command::SetSearchSettings(settings) => {
                self.settings = settings;
                if let Some(incident) = self.area.as_ref().and_then(|area| area.incident) {
                    self.area = Some(self.area_around(incident));
                }
                self.invalidate_search();
            }
            Command::SetLayers(layers) => {
                // Records of data sources that stay configured are still valid.
                let configured: HashSet<&str> = layers
                    .iter()
                    .map(|layer| layer.data_source_id.as_str())
                    .collect();
                self.features_by_ds_id
                    .retain(|ds_id, _| configured.contains(ds_id.as_str()));
                self.layers = layers;
                self.results.clear();
            }
            Command::Clear => {
                self.area = None;
                self.invalidate_search();
            }
        }
    }

    /// Geometry records are searched with, `None` for every record.
    fn search_geometry(&self) -> Option<geo::Geometry> {
        match self.settings.mode() {
            SearchMode::ShowAll => None,
            _ => self.area.as_ref().and_then(AreaOfInterest::search_geometry),
        }
    }

    fn ready(&self) -> bool {
        self.settings.mode() == SearchMode::ShowAll || self.area.is_some()
    }

    fn fetch(&self, source: &dyn FeatureSource, query: &SearchQuery) -> anyhow::Result<Vec<Feature>> {
        Ok(get_all_features_with(source, query, &self.options)?)
    }

    /// Fetch the records of data sources without cached records, then analyse every layer.
    ///
    /// Layers whose data source has no entry in `sources` are skipped.
    pub fn run(&mut self, sources: &FeatureSources) -> anyhow::Result<&[LayerResult]> {
        if !self.ready() {
            log::info!("No search area yet, nothing to analyse");
            self.results.clear();
            return Ok(&self.results);
        }
        let query = SearchQuery::new(self.search_geometry(), self.settings.mode().return_geometry());
        let mut queried: HashSet<String> = HashSet::new();
        for layer in &self.layers {
            let ds_id = &layer.data_source_id;
            if self.features_by_ds_id.contains_key(ds_id) || !queried.insert(ds_id.clone()) {
                continue;
            }
            let source = match sources.get(ds_id) {
                Some(source) => source,
                None => {
                    log::warn!("No feature source for data source {}, skipping", ds_id);
                    continue;
                }
            };
            log::info!("Querying records of {}", layer.label);
            let features = self.fetch(source.as_ref(), &query)?;
            self.features_by_ds_id.insert(ds_id.clone(), features);
        }

        let mut results = Vec::new();
        for (index, layer) in self.layers.iter().enumerate() {
            let (source, features) = match (
                sources.get(&layer.data_source_id),
                self.features_by_ds_id.get(&layer.data_source_id),
            ) {
                (Some(source), Some(features)) => (source, features),
                _ => continue,
            };
            results.push(self.analyse_layer(index, layer, source.as_ref(), features.clone())?);
        }
        self.results = results;
        Ok(&self.results)
    }

    fn analyse_layer(
        &self,
        index: usize,
        layer: &LayerConfig,
        source: &dyn FeatureSource,
        features: Vec<Feature>,
    ) -> anyhow::Result<LayerResult> {
        let mode = self.settings.mode();
        let unit = self.settings.active_unit();
        let definition = source.layer_definition().unwrap_or_else(|err| {
            log::warn!("No layer definition for {}: {:?}", layer.label, err);
            LayerDefinition::default()
        });
        let id_field = definition
            .object_id_field
            .clone()
            .unwrap_or_else(|| DEFAULT_ID_FIELD.to_string());
        let incident = self.area.as_ref().and_then(|area| area.incident);
        let buffer_distance = self
            .area
            .as_ref()
            .map(|area| area.buffer_distance)
            .unwrap_or(self.settings.buffer_distance);

        let mut features = features;
        if let AnalysisInfo::Closest(analysis) = &layer.analysis_info {
            if features.is_empty()
                && mode == SearchMode::Distance
                && needs_closest_max_buffer(analysis, mode, buffer_distance, unit)
            {
                if let Some(incident) = incident {
                    log::info!(
                        "Nothing found for {}, searching within {} {}",
                        layer.label,
                        analysis.closest_feature_max_distance,
                        analysis.distance_unit
                    );
                    let buffer = create_buffer(
                        incident,
                        analysis.closest_feature_max_distance,
                        analysis.distance_unit,
                    );
                    let query = SearchQuery::new(Some(geo::Geometry::Polygon(buffer)), true);
                    features = self.fetch(source, &query)?;
                }
            }
        }
        if mode == SearchMode::Distance {
            assign_distances(&mut features, incident.as_ref(), unit);
        }

        let (analysis, popup_title) = match &layer.analysis_info {
            AnalysisInfo::Closest(analysis) => {
                let ranked =
                    rank_features(&features, &ranking_spec_for_layer(layer, mode, &id_field, ""));
                (
                    LayerAnalysis::Closest(closest_feature(
                        ranked.features,
                        analysis,
                        buffer_distance,
                        unit,
                    )),
                    definition.default_display_field(),
                )
            }
            AnalysisInfo::Proximity(analysis) => (
                LayerAnalysis::Proximity(proximity_result(
                    &features,
                    layer,
                    analysis,
                    mode,
                    &id_field,
                    &self.no_value_label,
                )),
                popup_title_field(analysis, &definition),
            ),
            AnalysisInfo::Summary(analysis) => {
                let search_geometry = self.search_geometry();
                (
                    LayerAnalysis::Summary(summary_analysis(
                        &features,
                        analysis,
                        search_geometry.as_ref(),
                        mode,
                        unit,
                        true,
                    )),
                    definition.default_display_field(),
                )
            }
        };
        log::info!("Analysed {} records of {}", features.len(), layer.label);
        Ok(LayerResult {
            index,
            layer: layer.clone(),
            unit,
            popup_title_field: popup_title,
            show_approximate_distance: display_approximate_distance(layer, mode),
            analysis,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use rstest::{fixture, rstest};

    use super::{AnalysisSession, Command, FeatureSources, LayerAnalysis};
    use crate::{
        analysis::{
            config::{
                AnalysisInfo, ClosestAnalysis, LayerConfig, ProximityAnalysis, SummaryAnalysis,
                SummaryExpression, SummaryFieldInfo,
            },
            proximity::LayerDefinition,
            search::SearchSettings,
            units::DistanceUnit,
        },
        geofile::feature::{AttributeValue, Feature, FeatureMap},
        query::{local::LocalFeatureSource, FeatureSource, SearchQuery},
    };

    /// Counts the count requests made to the wrapped source.
    struct CountingSource {
        inner: LocalFeatureSource,
        counts: Arc<AtomicUsize>,
    }

    impl FeatureSource for CountingSource {
        fn layer_definition(&self) -> anyhow::Result<LayerDefinition> {
            self.inner.layer_definition()
        }

        fn query_count(&self, query: &SearchQuery) -> anyhow::Result<usize> {
            self.counts.fetch_add(1, Ordering::SeqCst);
            self.inner.query_count(query)
        }

        fn query(
            &self,
            query: &SearchQuery,
            page: usize,
            page_size: usize,
        ) -> anyhow::Result<Vec<Feature>> {
            self.inner.query(query, page, page_size)
        }

        fn query_disjoint(
            &self,
            query: &SearchQuery,
            ids: &[i64],
        ) -> anyhow::Result<std::collections::HashSet<i64>> {
            self.inner.query_disjoint(query, ids)
        }
    }

    fn school(id: i64, name: &str, lat: f64) -> Feature {
        Feature::new(FeatureMap::from([
            ("OBJECTID".to_string(), AttributeValue::from(id)),
            ("NAME".to_string(), AttributeValue::from(name)),
        ]))
        .with_geometry(geo::Geometry::Point(geo::Point::new(0.0, lat)))
    }

    /// Schools about 1.1, 3.3 and 11.1 km north of the origin.
    fn sources(counts: Arc<AtomicUsize>) -> FeatureSources {
        let schools = LocalFeatureSource::new(
            vec![
                school(1, "North", 0.1),
                school(2, "Central", 0.01),
                school(3, "Hill", 0.03),
            ],
            "OBJECTID",
        );
        let mut sources = FeatureSources::new();
        sources.insert(
            "schools".to_string(),
            Box::new(CountingSource {
                inner: schools,
                counts,
            }),
        );
        sources
    }

    fn layer(analysis_info: AnalysisInfo) -> LayerConfig {
        LayerConfig {
            data_source_id: "schools".to_string(),
            label: "Schools".to_string(),
            analysis_info,
        }
    }

    #[fixture]
    fn settings() -> SearchSettings {
        SearchSettings {
            buffer_distance: 5.0,
            distance_units: Some(DistanceUnit::Kilometers),
            ..SearchSettings::default()
        }
    }

    fn proximity_ids(session: &AnalysisSession) -> Vec<i64> {
        session.results()[0]
            .records()
            .iter()
            .filter_map(|record| record.object_id("OBJECTID"))
            .collect()
    }

    #[rstest]
    fn test_nothing_to_analyse_without_incident(settings: SearchSettings) {
        let counts = Arc::new(AtomicUsize::new(0));
        let mut session = AnalysisSession::new(
            vec![layer(AnalysisInfo::Proximity(ProximityAnalysis::default()))],
            settings,
        );
        assert!(session.run(&sources(counts.clone())).unwrap().is_empty());
        assert_eq!(0, counts.load(Ordering::SeqCst));
    }

    #[rstest]
    fn test_proximity_within_buffer(settings: SearchSettings) {
        let counts = Arc::new(AtomicUsize::new(0));
        let sources = sources(counts.clone());
        let mut session = AnalysisSession::new(
            vec![layer(AnalysisInfo::Proximity(ProximityAnalysis::default()))],
            settings,
        );
        session.apply(Command::SetIncident(geo::Point::new(0.0, 0.0)));
        session.run(&sources).unwrap();
        assert_eq!(vec![2, 3], proximity_ids(&session));
        let result = &session.results()[0];
        assert_eq!(DistanceUnit::Kilometers, result.unit);
        assert_eq!("OBJECTID", result.popup_title_field);
        let distance = result.records()[0].distance.unwrap();
        assert!((distance - 1.11).abs() < 0.01);

        // Cached records are reused until the search changes.
        session.run(&sources).unwrap();
        assert_eq!(1, counts.load(Ordering::SeqCst));

        session.apply(Command::SetBufferDistance(20.0, DistanceUnit::Kilometers));
        session.run(&sources).unwrap();
        assert_eq!(2, counts.load(Ordering::SeqCst));
        assert_eq!(vec![2, 3, 1], proximity_ids(&session));
    }

    #[rstest]
    fn test_zero_buffer_searches_around_incident(settings: SearchSettings) {
        let counts = Arc::new(AtomicUsize::new(0));
        let mut session = AnalysisSession::new(
            vec![layer(AnalysisInfo::Proximity(ProximityAnalysis::default()))],
            settings,
        );
        session.apply(Command::SetBufferDistance(0.0, DistanceUnit::Kilometers));
        session.apply(Command::SetIncident(geo::Point::new(0.0, 0.0)));
        session.run(&sources(counts)).unwrap();
        // The search point keeps the default 10 km search distance.
        assert_eq!(vec![2, 3], proximity_ids(&session));
    }

    #[rstest]
    fn test_layers_sharing_a_data_source_are_queried_once(settings: SearchSettings) {
        let counts = Arc::new(AtomicUsize::new(0));
        let sources = sources(counts.clone());
        let mut session = AnalysisSession::new(
            vec![
                layer(AnalysisInfo::Proximity(ProximityAnalysis::default())),
                layer(AnalysisInfo::Summary(SummaryAnalysis {
                    summary_fields: vec![SummaryFieldInfo {
                        field_label: "Schools".to_string(),
                        field_color: "#000".to_string(),
                        summary_field_info: SummaryExpression::Count,
                    }],
                    ..SummaryAnalysis::default()
                })),
            ],
            settings,
        );
        session.apply(Command::SetIncident(geo::Point::new(0.0, 0.0)));
        let results = session.run(&sources).unwrap();
        assert_eq!(2, results.len());
        match &results[1].analysis {
            LayerAnalysis::Summary(summary) => assert_eq!("2", summary.cards[0].value),
            other => panic!("Expected a summary, got {:?}", other),
        }
        assert_eq!(1, counts.load(Ordering::SeqCst));
    }

    #[rstest]
    fn test_closest_falls_back_to_max_distance_buffer(settings: SearchSettings) {
        let counts = Arc::new(AtomicUsize::new(0));
        let sources = sources(counts.clone());
        let closest = ClosestAnalysis {
            closest_feature_max_distance: 10.0,
            distance_unit: DistanceUnit::Miles,
            expand_on_open: false,
        };
        let mut session = AnalysisSession::new(vec![layer(AnalysisInfo::Closest(closest))], settings);
        session.apply(Command::SetBufferDistance(0.5, DistanceUnit::Kilometers));
        session.apply(Command::SetIncident(geo::Point::new(0.0, 0.0)));
        let results = session.run(&sources).unwrap();
        assert_eq!(1, results[0].records().len());
        assert_eq!(Some(2), results[0].records()[0].object_id("OBJECTID"));
        assert!(results[0].show_approximate_distance);
        assert_eq!(2, counts.load(Ordering::SeqCst));
    }

    #[rstest]
    fn test_show_all_sorts_by_id(settings: SearchSettings) {
        let counts = Arc::new(AtomicUsize::new(0));
        let settings = SearchSettings {
            define_search_area: false,
            ..settings
        };
        let mut session = AnalysisSession::new(
            vec![layer(AnalysisInfo::Proximity(ProximityAnalysis::default()))],
            settings,
        );
        session.run(&sources(counts)).unwrap();
        assert_eq!(vec![1, 2, 3], proximity_ids(&session));
        assert!(session.results()[0].records()[0].distance.is_none());
    }

    #[rstest]
    fn test_set_layers_keeps_cache_of_remaining_sources(settings: SearchSettings) {
        let counts = Arc::new(AtomicUsize::new(0));
        let sources = sources(counts.clone());
        let mut session = AnalysisSession::new(
            vec![layer(AnalysisInfo::Proximity(ProximityAnalysis::default()))],
            settings,
        );
        session.apply(Command::SetIncident(geo::Point::new(0.0, 0.0)));
        session.run(&sources).unwrap();

        session.apply(Command::SetLayers(vec![layer(AnalysisInfo::Summary(
            SummaryAnalysis::default(),
        ))]));
        assert!(session.cached_data_sources().contains("schools"));
        assert!(session.results().is_empty());
        session.run(&sources).unwrap();
        assert_eq!(1, counts.load(Ordering::SeqCst));

        session.apply(Command::Clear);
        assert!(session.cached_data_sources().is_empty());
        assert!(session.area().is_none());
    }
}
