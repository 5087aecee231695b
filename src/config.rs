use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs::read_to_string,
    path::{Path, PathBuf},
};

use crate::{
    analysis::{config::LayerConfig, search::SearchSettings},
    query::{
        local::LocalFeatureSource, rest::RestFeatureSource, FeatureSource, QueryOptions,
        DEFAULT_ID_FIELD,
    },
    session::{AnalysisSession, Command, FeatureSources},
};

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct WgsBoundingBox {
    pub left_lon: f64,
    pub right_lon: f64,
    pub bottom_lat: f64,
    pub top_lat: f64,
}

impl WgsBoundingBox {
    pub fn to_rect(&self) -> geo::Rect {
        geo::Rect::new(
            geo::coord! { x: self.left_lon, y: self.bottom_lat },
            geo::coord! { x: self.right_lon, y: self.top_lat },
        )
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct WgsLocation {
    pub lon: f64,
    pub lat: f64,
}

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub enum DataSourceConfig {
    /// ArcGIS feature service layer.
    Rest { url: String },
    /// GeoJSON file.
    Geofile {
        filepath: PathBuf,
        #[serde(default = "default_id_field")]
        id_field: String,
    },
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SearchConfig {
    #[serde(flatten)]
    pub settings: SearchSettings,
    #[serde(default)]
    pub incident: Option<WgsLocation>,
    #[serde(default)]
    pub map_extent: Option<WgsBoundingBox>,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    /// Feature sources by data source id.
    pub data_sources: HashMap<String, DataSourceConfig>,
    pub search: SearchConfig,
    pub analysis_layers: Vec<LayerConfig>,
    pub data_dir: PathBuf,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub no_value_label: String,
}

impl Config {
    pub fn from_file(config_filepath: &Path) -> anyhow::Result<Self> {
        if !config_filepath.exists() {
            return Err(anyhow!("Config file {:?} not found", config_filepath));
        }
        let config_contents = read_to_string(config_filepath)?;
        let config: Config = serde_yaml::from_str(&config_contents)
            .with_context(|| format!("Parsing config file {:?}", config_filepath))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for layer in &self.analysis_layers {
            if !self.data_sources.contains_key(&layer.data_source_id) {
                return Err(anyhow!(
                    "Layer {} uses unknown data source {}",
                    layer.label,
                    layer.data_source_id
                ));
            }
        }
        Ok(())
    }

    /// Relative geofile paths are resolved against `base_dir`.
    pub fn feature_sources(&self, base_dir: &Path) -> anyhow::Result<FeatureSources> {
        let mut sources = FeatureSources::new();
        for (ds_id, data_source) in &self.data_sources {
            let source: Box<dyn FeatureSource> = match data_source {
                DataSourceConfig::Rest { url } => Box::new(RestFeatureSource::new(url)?),
                DataSourceConfig::Geofile { filepath, id_field } => Box::new(
                    LocalFeatureSource::from_geojson(&base_dir.join(filepath), id_field)?,
                ),
            };
            sources.insert(ds_id.clone(), source);
        }
        Ok(sources)
    }

    /// Commands that set up the configured search.
    pub fn search_commands(&self) -> Vec<Command> {
        let mut commands = Vec::new();
        if let Some(extent) = &self.search.map_extent {
            commands.push(Command::SetMapExtent(extent.to_rect()));
        }
        if let Some(incident) = &self.search.incident {
            commands.push(Command::SetIncident(geo::Point::new(incident.lon, incident.lat)));
        }
        commands
    }

    pub fn session(&self) -> AnalysisSession {
        let mut session =
            AnalysisSession::new(self.analysis_layers.clone(), self.search.settings.clone())
                .with_query_options(QueryOptions {
                    strict: self.strict,
                })
                .with_no_value_label(&self.no_value_label);
        for command in self.search_commands() {
            session.apply(command);
        }
        session
    }
}
