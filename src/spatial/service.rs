//! Staged, cached assembly of spatial responses
//!
//! | Stage              | Key parameters                         | Lifetime        |
//! |--------------------|----------------------------------------|-----------------|
//! | `raw_source`       | source                                 | `raw_ttl`       |
//! | `filtered_geojson` | source, filter                         | `raw_ttl`       |
//! | `topojson`         | source, filter, simplify, quantize     | `raw_ttl`       |
//! | `get_spatial`      | every request parameter                | `response_ttl`  |

use crate::cache::{CacheClient, CacheKey};
use crate::config::SpatialConfig;
use crate::error::LyraResult;
use crate::geometry::Bbox;
use crate::rsb::records::Row;
use crate::rsb::{Direction, RsbService};
use crate::source::ByteSource;
use crate::spatial::filter::{filter_features, SpatialFilter};
use crate::spatial::topo::{self, TopoOptions};
use crate::spatial::SpatialFormat;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Parameters of one spatial request
#[derive(Debug, Clone, Default)]
pub struct SpatialRequest {
    pub format: SpatialFormat,
    /// Falls back to the configured default box
    pub bbox: Option<Bbox>,
    pub watersheds: Vec<String>,
    pub catchidns: Vec<i64>,
    /// Falls back to `spatial.toposimplify`
    pub toposimplify: Option<f64>,
    /// Falls back to `spatial.topoquantize`
    pub topoquantize: Option<f64>,
}

/// Spatial layer over one catchment polygon source
#[derive(Clone)]
pub struct SpatialService {
    cache: CacheClient,
    source: Arc<dyn ByteSource>,
    config: SpatialConfig,
}

impl SpatialService {
    pub fn new(cache: CacheClient, source: Arc<dyn ByteSource>, config: SpatialConfig) -> Self {
        Self {
            cache,
            source,
            config,
        }
    }

    fn keyed(&self, key: CacheKey) -> LyraResult<CacheKey> {
        key.kwarg("source", &self.source.identity())
    }

    fn filtered_key(&self, function: &str, filter: &SpatialFilter) -> LyraResult<CacheKey> {
        self.keyed(CacheKey::new(function))?
            .kwarg("bbox", &filter.bbox)?
            .kwarg("watersheds", &filter.watersheds)?
            .kwarg("catchidns", &filter.catchidns)
    }

    /// Source bytes as read
    pub async fn raw_source(&self) -> LyraResult<Vec<u8>> {
        let key = self.keyed(CacheKey::new("raw_source"))?;
        self.cache
            .get_or_compute(&key, self.config.raw_ttl(), || self.source.read())
            .await
    }

    /// GeoJSON restricted by `filter`; the raw bytes when nothing is filtered
    pub async fn filtered_geojson(&self, filter: &SpatialFilter) -> LyraResult<Vec<u8>> {
        if filter.is_unfiltered() {
            return self.raw_source().await;
        }
        let key = self.filtered_key("filtered_geojson", filter)?;
        self.cache
            .get_or_compute(&key, self.config.raw_ttl(), || self.compute_filtered(filter))
            .await
    }

    async fn compute_filtered(&self, filter: &SpatialFilter) -> LyraResult<Vec<u8>> {
        let layer: Value = serde_json::from_slice(&self.raw_source().await?)?;
        let filtered = filter_features(
            &layer,
            filter,
            &self.config.id_column,
            &self.config.watershed_column,
        );
        debug!(
            "Filtered spatial layer to {} features",
            filtered["features"].as_array().map_or(0, Vec::len)
        );
        Ok(serde_json::to_vec(&filtered)?)
    }

    /// TopoJSON of the filtered layer
    pub async fn topojson(&self, filter: &SpatialFilter, options: TopoOptions) -> LyraResult<Vec<u8>> {
        let key = self
            .filtered_key("topojson", filter)?
            .kwarg("toposimplify", &options.simplify)?
            .kwarg("topoquantize", &options.quantize)?;
        self.cache
            .get_or_compute(&key, self.config.raw_ttl(), || {
                self.compute_topojson(filter, options)
            })
            .await
    }

    async fn compute_topojson(&self, filter: &SpatialFilter, options: TopoOptions) -> LyraResult<Vec<u8>> {
        let layer: Value = serde_json::from_slice(&self.filtered_geojson(filter).await?)?;
        let topology = topo::encode(&layer, &options)?;
        info!(
            "Encoded topology with {} arcs",
            topology["arcs"].as_array().map_or(0, Vec::len)
        );
        Ok(serde_json::to_vec(&topology)?)
    }

    /// The spatial layer in the requested format
    pub async fn get_spatial(&self, request: &SpatialRequest) -> LyraResult<Vec<u8>> {
        let bbox = match request.bbox {
            Some(bbox) => bbox,
            None => Bbox::from_array(self.config.default_bbox)?,
        };
        let filter = SpatialFilter::new(
            Some(bbox),
            request.watersheds.clone(),
            request.catchidns.clone(),
        );
        let options = TopoOptions {
            simplify: request.toposimplify.unwrap_or(self.config.toposimplify),
            quantize: request.topoquantize.unwrap_or(self.config.topoquantize),
        };

        let mut key = self
            .filtered_key("get_spatial", &filter)?
            .kwarg("f", &request.format)?;
        if request.format == SpatialFormat::TopoJson {
            key = key
                .kwarg("toposimplify", &options.simplify)?
                .kwarg("topoquantize", &options.quantize)?;
        }

        self.cache
            .get_or_compute(&key, self.config.response_ttl(), || async {
                match request.format {
                    SpatialFormat::GeoJson => self.filtered_geojson(&filter).await,
                    SpatialFormat::TopoJson => self.topojson(&filter, options).await,
                }
            })
            .await
    }

    /// Attribute table of the layer as JSON records, geometry dropped
    pub async fn rsb_data(&self, watersheds: Vec<String>, catchidns: Vec<i64>) -> LyraResult<Vec<u8>> {
        let filter = SpatialFilter::new(None, watersheds, catchidns);
        let key = self.filtered_key("rsb_data", &filter)?;
        self.cache
            .get_or_compute(&key, self.config.raw_ttl(), || self.compute_rsb_data(&filter))
            .await
    }

    async fn compute_rsb_data(&self, filter: &SpatialFilter) -> LyraResult<Vec<u8>> {
        let layer: Value = serde_json::from_slice(&self.filtered_geojson(filter).await?)?;
        let records: Vec<Row> = layer["features"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|f| f["properties"].as_object().cloned())
            .collect();
        Ok(serde_json::to_vec(&records)?)
    }
}

/// Catchment ids upstream of `catchidn`, for use as a spatial filter
pub async fn catchidns_upstream_of(rsb: &RsbService, catchidn: i64) -> LyraResult<Vec<i64>> {
    rsb.trace_ids(catchidn, Direction::Upstream).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheSwitch, MemoryStore};
    use crate::config::RsbConfig;
    use crate::error::LyraError;
    use crate::source::MemorySource;
    use async_trait::async_trait;
    use serde_json::json;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        inner: MemorySource,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ByteSource for CountingSource {
        async fn read(&self) -> LyraResult<Vec<u8>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read().await
        }

        fn identity(&self) -> String {
            self.inner.identity()
        }
    }

    fn square(id: i64, downstream: i64, watershed: &str, x: f64, y: f64) -> Value {
        json!({
            "type": "Feature",
            "properties": { "CatchIDN": id, "DwnCatchIDN": downstream, "Watershed": watershed },
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[x, y], [x + 0.01, y], [x + 0.01, y + 0.01], [x, y + 0.01], [x, y]]]
            }
        })
    }

    fn layer() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "type": "FeatureCollection",
            "features": [
                square(10, 24, "Aliso", -117.70, 33.50),
                square(23, 10, "Aliso", -117.69, 33.50),
                square(24, 0, "Aliso", -117.68, 33.50),
                square(500, 0, "San Juan", -117.00, 33.00),
            ]
        }))
        .unwrap()
    }

    fn service() -> (SpatialService, Arc<CountingSource>, CacheClient) {
        let cache = CacheClient::new(Arc::new(MemoryStore::new()), CacheSwitch::new(true));
        let source = Arc::new(CountingSource {
            inner: MemorySource::new("catchments.geojson", layer()),
            reads: AtomicUsize::new(0),
        });
        let svc = SpatialService::new(cache.clone(), source.clone(), SpatialConfig::default());
        (svc, source, cache)
    }

    fn ids(bytes: &[u8]) -> Vec<i64> {
        let doc: Value = serde_json::from_slice(bytes).unwrap();
        doc["features"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["properties"]["CatchIDN"].as_i64().unwrap())
            .collect()
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert_eq!(SpatialFormat::from_str("topojson").unwrap(), SpatialFormat::TopoJson);
        assert_eq!(SpatialFormat::from_str("GeoJSON").unwrap(), SpatialFormat::GeoJson);
        assert!(matches!(
            SpatialFormat::from_str("shapefile"),
            Err(LyraError::UnsupportedFormat(f)) if f == "shapefile"
        ));
    }

    #[tokio::test]
    async fn requests_default_to_topojson() {
        let (svc, _, _) = service();
        assert_eq!(SpatialRequest::default().format, SpatialFormat::TopoJson);
        let doc: Value =
            serde_json::from_slice(&svc.get_spatial(&SpatialRequest::default()).await.unwrap())
                .unwrap();
        assert_eq!(doc["type"], "Topology");
    }

    #[tokio::test]
    async fn unfiltered_layer_is_the_raw_source() {
        let (svc, _, _) = service();
        let bytes = svc.filtered_geojson(&SpatialFilter::default()).await.unwrap();
        assert_eq!(bytes, layer());
    }

    #[tokio::test]
    async fn default_bbox_applies_to_requests() {
        let (svc, _, _) = service();
        let request = SpatialRequest {
            format: SpatialFormat::GeoJson,
            ..Default::default()
        };
        let bytes = svc.get_spatial(&request).await.unwrap();
        assert_eq!(ids(&bytes), vec![10, 23, 24]);
    }

    #[tokio::test]
    async fn upstream_trace_as_filter() {
        let (svc, _, cache) = service();
        let topology = Arc::new(MemorySource::new("catchments.geojson", layer()));
        let rsb = RsbService::new(cache, topology, RsbConfig::default());

        let upstream = catchidns_upstream_of(&rsb, 10).await.unwrap();
        assert_eq!(upstream, vec![10, 23]);

        let request = SpatialRequest {
            format: SpatialFormat::GeoJson,
            catchidns: upstream,
            ..Default::default()
        };
        assert_eq!(ids(&svc.get_spatial(&request).await.unwrap()), vec![10, 23]);
    }

    #[tokio::test]
    async fn topojson_request_builds_topology() {
        let (svc, _, _) = service();
        let request = SpatialRequest {
            format: SpatialFormat::TopoJson,
            watersheds: vec!["Aliso".to_string()],
            ..Default::default()
        };
        let doc: Value = serde_json::from_slice(&svc.get_spatial(&request).await.unwrap()).unwrap();
        assert_eq!(doc["type"], "Topology");
        assert_eq!(doc["objects"]["data"]["geometries"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn stages_share_one_source_read() {
        let (svc, source, _) = service();
        svc.get_spatial(&SpatialRequest {
            format: SpatialFormat::GeoJson,
            ..Default::default()
        })
        .await
        .unwrap();
        svc.get_spatial(&SpatialRequest::default())
        .await
        .unwrap();
        svc.rsb_data(vec![], vec![500]).await.unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rsb_data_returns_properties_only() {
        let (svc, _, _) = service();
        let records: Vec<Row> =
            serde_json::from_slice(&svc.rsb_data(vec!["San Juan".into()], vec![]).await.unwrap())
                .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["CatchIDN"], 500);
        assert!(!records[0].contains_key("geometry"));
    }
}
