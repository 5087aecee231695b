use std::{collections::HashSet, sync::OnceLock};

use anyhow::{anyhow, Context};
use reqwest::blocking::Request;
use serde::Deserialize;

use crate::{analysis::proximity::LayerDefinition, geofile::feature::Feature};

use super::{
    esri_json::{feature_from_esri_json, geometry_type, to_esri_json},
    id_where_clause, FeatureSource, SearchQuery, DEFAULT_ID_FIELD, WGS84_WKID,
};

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LayerDefinitionResponse {
    max_record_count: Option<usize>,
    object_id_field: Option<String>,
    display_field: Option<String>,
    #[serde(default)]
    fields: Vec<FieldResponse>,
}

#[derive(Deserialize, Debug)]
struct FieldResponse {
    name: String,
    #[serde(rename = "type", default)]
    field_type: String,
}

#[derive(Deserialize, Debug)]
struct CountResponse {
    count: usize,
}

#[derive(Deserialize, Debug)]
struct FeaturesResponse {
    #[serde(default)]
    features: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct IdsResponse {
    #[serde(default)]
    object_ids: Option<Vec<i64>>,
}

type QueryParams = Vec<(&'static str, String)>;

/// A layer of an ArcGIS feature service, e.g.
/// `https://services.arcgis.com/<org>/arcgis/rest/services/<name>/FeatureServer/0`.
pub struct RestFeatureSource {
    url: String,
    client: reqwest::blocking::Client,
    definition: OnceLock<LayerDefinition>,
}

impl RestFeatureSource {
    pub fn new(url: &str) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("proximity-rust")
            .build()?;
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            client,
            definition: OnceLock::new(),
        })
    }

    /// Send `request` and parse the JSON body. Services report errors in a 200 response with an
    /// `error` member.
    fn execute<T: serde::de::DeserializeOwned>(&self, request: Request) -> anyhow::Result<T> {
        let url = request.url().clone();
        let response = self
            .client
            .execute(request)
            .with_context(|| format!("Requesting {}", url))?
            .error_for_status()?;
        let body = response.text().or(Err(anyhow!("No response text")))?;
        let value: serde_json::Value = serde_json::from_str(&body)
            .with_context(|| format!("Parsing response of {}", url))?;
        if let Some(error) = value.get("error") {
            return Err(anyhow!("Feature service error: {}", error));
        }
        Ok(serde_json::from_value(value)?)
    }

    fn definition_request(&self) -> anyhow::Result<Request> {
        Ok(self.client.get(&self.url).query(&[("f", "json")]).build()?)
    }

    /// Query parameters go in a form body, search geometries and id lists are too long for a URL.
    fn query_request(&self, params: &[(&'static str, String)]) -> anyhow::Result<Request> {
        Ok(self
            .client
            .post(format!("{}/query", self.url))
            .form(params)
            .build()?)
    }

    fn post_query<T: serde::de::DeserializeOwned>(
        &self,
        params: &[(&'static str, String)],
    ) -> anyhow::Result<T> {
        self.execute(self.query_request(params)?)
    }

    /// Geometry, distance and spatial relationship of `query`. Empty without a search geometry.
    fn predicate_params(query: &SearchQuery, spatial_rel: &str) -> anyhow::Result<QueryParams> {
        let geometry = match &query.geometry {
            Some(geometry) => geometry,
            None => return Ok(Vec::new()),
        };
        Ok(vec![
            ("geometry", to_esri_json(geometry, WGS84_WKID)?.to_string()),
            ("geometryType", geometry_type(geometry).to_string()),
            ("inSR", WGS84_WKID.to_string()),
            ("spatialRel", spatial_rel.to_string()),
            ("distance", query.distance.to_string()),
            ("units", "esriSRUnit_Meter".to_string()),
        ])
    }

    fn search_params(query: &SearchQuery) -> anyhow::Result<QueryParams> {
        let mut params: QueryParams = vec![("f", "json".to_string()), ("where", "1=1".to_string())];
        params.extend(Self::predicate_params(query, "esriSpatialRelIntersects")?);
        Ok(params)
    }

    fn disjoint_params(
        query: &SearchQuery,
        id_field: &str,
        ids: &[i64],
    ) -> anyhow::Result<QueryParams> {
        let mut params: QueryParams = vec![
            ("f", "json".to_string()),
            ("where", id_where_clause(id_field, ids)),
            ("returnIdsOnly", "true".to_string()),
        ];
        params.extend(Self::predicate_params(query, "esriSpatialRelDisjoint")?);
        Ok(params)
    }
}

impl FeatureSource for RestFeatureSource {
    fn layer_definition(&self) -> anyhow::Result<LayerDefinition> {
        if let Some(definition) = self.definition.get() {
            return Ok(definition.clone());
        }
        let response: LayerDefinitionResponse = self.execute(self.definition_request()?)?;
        // Older services only flag the id field in the field list.
        let object_id_field = response.object_id_field.or_else(|| {
            response
                .fields
                .iter()
                .find(|field| field.field_type == "esriFieldTypeOID")
                .map(|field| field.name.clone())
        });
        let definition = LayerDefinition {
            object_id_field,
            display_field: response.display_field,
            fields: response.fields.into_iter().map(|field| field.name).collect(),
            max_record_count: response.max_record_count,
        };
        log::debug!("Layer definition of {}: {:?}", self.url, definition);
        Ok(self.definition.get_or_init(|| definition).clone())
    }

    fn query_count(&self, query: &SearchQuery) -> anyhow::Result<usize> {
        let mut params = Self::search_params(query)?;
        params.push(("returnCountOnly", "true".to_string()));
        let response: CountResponse = self.post_query(&params)?;
        Ok(response.count)
    }

    fn query(
        &self,
        query: &SearchQuery,
        page: usize,
        page_size: usize,
    ) -> anyhow::Result<Vec<Feature>> {
        let mut params = Self::search_params(query)?;
        params.extend([
            ("outFields", "*".to_string()),
            ("returnGeometry", query.return_geometry.to_string()),
            ("outSR", query.out_wkid.to_string()),
            ("resultOffset", (page.saturating_sub(1) * page_size).to_string()),
            ("resultRecordCount", page_size.to_string()),
        ]);
        let response: FeaturesResponse = self.post_query(&params)?;
        response
            .features
            .into_iter()
            .map(feature_from_esri_json)
            .collect()
    }

    fn query_disjoint(&self, query: &SearchQuery, ids: &[i64]) -> anyhow::Result<HashSet<i64>> {
        if query.geometry.is_none() || ids.is_empty() {
            return Ok(HashSet::new());
        }
        let id_field = self
            .layer_definition()?
            .object_id_field
            .unwrap_or_else(|| DEFAULT_ID_FIELD.to_string());
        let params = Self::disjoint_params(query, &id_field, ids)?;
        let response: IdsResponse = self.post_query(&params)?;
        Ok(response.object_ids.unwrap_or_default().into_iter().collect())
    }
}
