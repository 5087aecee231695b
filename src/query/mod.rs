//! Fetching every record of a feature service that matches a search geometry.
//!
//! Services cap the number of records returned per request, so records are fetched page by page.
//! Each page is then checked against a disjoint query with the same geometry and records the
//! service reports as disjoint are dropped.

use std::collections::HashSet;

use anyhow::Context;
use rayon::prelude::*;

use crate::{analysis::proximity::LayerDefinition, geofile::feature::Feature};

pub mod esri_json;
pub mod local;
pub mod rest;

/// Page size used when the service does not declare `maxRecordCount`.
pub const DEFAULT_MAX_RECORD_COUNT: usize = 1000;
/// Search distance attached to every geometry query, in meters.
pub const DEFAULT_SEARCH_DISTANCE: f64 = 10000.0;
pub const DEFAULT_ID_FIELD: &str = "OBJECTID";
pub const WGS84_WKID: u32 = 4326;

/// Predicate and output options shared by the count, page and disjoint requests of one search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Records intersecting this geometry are returned. `None` returns every record.
    pub geometry: Option<geo::Geometry>,
    /// Distance in meters around `geometry` that still counts as intersecting.
    pub distance: f64,
    pub return_geometry: bool,
    /// Spatial reference of the returned geometries.
    pub out_wkid: u32,
}

impl SearchQuery {
    pub fn new(geometry: Option<geo::Geometry>, return_geometry: bool) -> Self {
        Self {
            geometry,
            distance: DEFAULT_SEARCH_DISTANCE,
            return_geometry,
            out_wkid: WGS84_WKID,
        }
    }
}

/// A queryable collection of records, e.g. a feature service layer.
///
/// One source is shared by all page workers.
pub trait FeatureSource: Sync {
    fn layer_definition(&self) -> anyhow::Result<LayerDefinition>;

    /// Number of records matching `query`.
    fn query_count(&self, query: &SearchQuery) -> anyhow::Result<usize>;

    /// Records of the 1-based `page` of `page_size` records matching `query`, all fields included.
    fn query(
        &self,
        query: &SearchQuery,
        page: usize,
        page_size: usize,
    ) -> anyhow::Result<Vec<Feature>>;

    /// Ids among `ids` whose records do not satisfy the spatial predicate of `query`: neither
    /// intersecting its geometry nor within its distance.
    fn query_disjoint(&self, query: &SearchQuery, ids: &[i64]) -> anyhow::Result<HashSet<i64>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Fail instead of dropping the records of failed requests.
    pub strict: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("counting matching records failed")]
    Count(#[source] anyhow::Error),
    #[error("{} page(s) failed: {failed_pages:?}", .failed_pages.len())]
    PartialResult {
        failed_pages: Vec<usize>,
        /// Records of the pages that did succeed, in page order.
        records: Vec<Feature>,
    },
}

/// `floor(total / page_size) + 1`. A total that is a multiple of the page size gets a trailing
/// empty page.
pub fn page_count(total: usize, page_size: usize) -> usize {
    total / page_size.max(1) + 1
}

/// Where clause selecting `ids`.
pub fn id_where_clause(id_field: &str, ids: &[i64]) -> String {
    let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!("{} IN ({})", id_field, ids.join(","))
}

fn remove_disjoint(
    source: &dyn FeatureSource,
    query: &SearchQuery,
    records: Vec<Feature>,
    id_field: &str,
) -> anyhow::Result<Vec<Feature>> {
    if query.geometry.is_none() {
        return Ok(records);
    }
    let ids: Vec<i64> = records
        .iter()
        .filter_map(|record| record.object_id(id_field))
        .collect();
    if ids.is_empty() {
        return Ok(records);
    }
    let disjoint = source.query_disjoint(query, &ids)?;
    Ok(records
        .into_iter()
        .filter(|record| match record.object_id(id_field) {
            Some(id) => !disjoint.contains(&id),
            None => true,
        })
        .collect())
}

fn fetch_page(
    source: &dyn FeatureSource,
    query: &SearchQuery,
    page: usize,
    page_size: usize,
    id_field: &str,
) -> anyhow::Result<Vec<Feature>> {
    let records = source
        .query(query, page, page_size)
        .with_context(|| format!("Querying page {}", page))?;
    let fetched = records.len();
    let records = remove_disjoint(source, query, records, id_field)
        .with_context(|| format!("Disjoint check of page {}", page))?;
    log::debug!(
        "Page {} returned {} records, {} after the disjoint check",
        page,
        fetched,
        records.len()
    );
    Ok(records)
}

fn page_size_and_id_field(source: &dyn FeatureSource) -> (usize, String) {
    match source.layer_definition() {
        Ok(definition) => (
            definition
                .max_record_count
                .filter(|count| *count > 0)
                .unwrap_or(DEFAULT_MAX_RECORD_COUNT),
            definition
                .object_id_field
                .unwrap_or_else(|| DEFAULT_ID_FIELD.to_string()),
        ),
        Err(err) => {
            log::warn!("Could not read the layer definition, using defaults: {:?}", err);
            (DEFAULT_MAX_RECORD_COUNT, DEFAULT_ID_FIELD.to_string())
        }
    }
}

/// Fetch every record matching `query`, page by page and in parallel.
///
/// Failing requests are logged and resolve to no records. With `options.strict` a failed count
/// is returned as [QueryError::Count] and failed pages as [QueryError::PartialResult].
pub fn get_all_features_with(
    source: &dyn FeatureSource,
    query: &SearchQuery,
    options: &QueryOptions,
) -> Result<Vec<Feature>, QueryError> {
    let total = match source.query_count(query) {
        Ok(total) => total,
        Err(err) if options.strict => return Err(QueryError::Count(err)),
        Err(err) => {
            log::warn!("Counting matching records failed: {:?}", err);
            return Ok(Vec::new());
        }
    };
    if total == 0 {
        log::info!("No matching records");
        return Ok(Vec::new());
    }
    let (page_size, id_field) = page_size_and_id_field(source);
    let pages = page_count(total, page_size);
    log::info!(
        "Fetching {} matching records in {} pages of {}",
        total,
        pages,
        page_size
    );

    let results: Vec<(usize, anyhow::Result<Vec<Feature>>)> = (1..=pages)
        .into_par_iter()
        .map(|page| (page, fetch_page(source, query, page, page_size, &id_field)))
        .collect();

    let mut records = Vec::new();
    let mut failed_pages = Vec::new();
    for (page, result) in results {
        match result {
            Ok(page_records) => records.extend(page_records),
            Err(err) => {
                log::warn!("Dropping page {}: {:?}", page, err);
                failed_pages.push(page);
            }
        }
    }
    if options.strict && !failed_pages.is_empty() {
        return Err(QueryError::PartialResult {
            failed_pages,
            records,
        });
    }
    Ok(records)
}

/// [get_all_features_with] with default options: failures never surface as errors.
pub fn get_all_features(source: &dyn FeatureSource, query: &SearchQuery) -> Vec<Feature> {
    get_all_features_with(source, query, &QueryOptions::default()).unwrap_or_default()
}
