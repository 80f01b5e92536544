//! Hydstra timeseries API client
//!
//! Requests are JSON documents posted to a single endpoint; failures come
//! back as a body carrying a non-zero `error_num`.

use crate::config::HydstraConfig;
use crate::error::{LyraError, LyraResult};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Error number that rules out retrying with another variable
const NO_FALLBACK_ERROR: i64 = 220;

/// Hydstra timestamp layout
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Convert `YYYY-MM-DD` and `HH:MM[:SS]` to `YYYYMMDDHHMMSS`, zero padded
pub fn to_hydstra_datetime(date: &str, time: &str) -> String {
    let date = date.replace('-', "");
    let time = time.replace(':', "");
    format!("{:0<8}{:0<6}", date, time)
}

/// Parameters of a `get_ts_traces` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRequest {
    pub site: String,
    pub varfrom: String,
    /// Defaults to `varfrom`
    pub varto: Option<String>,
    /// `YYYY-MM-DD`; open when unset
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub interval: String,
    pub aggregation: String,
    pub datasource: String,
    pub multiplier: u32,
}

impl TraceRequest {
    pub fn new(site: impl Into<String>, varfrom: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            varfrom: varfrom.into(),
            varto: None,
            start_date: None,
            end_date: None,
            interval: "hour".to_string(),
            aggregation: "mean".to_string(),
            datasource: "PUBLISH".to_string(),
            multiplier: 1,
        }
    }

    /// Request body
    pub fn payload(&self) -> Value {
        let time = |d: &Option<String>| d.as_deref().map_or("0".to_string(), |d| to_hydstra_datetime(d, ""));
        json!({
            "function": "get_ts_traces",
            "version": 2,
            "params": {
                "site_list": self.site,
                "start_time": time(&self.start_date),
                "end_time": time(&self.end_date),
                "varfrom": self.varfrom,
                "varto": self.varto.as_deref().unwrap_or(&self.varfrom),
                "interval": self.interval,
                "datasource": self.datasource,
                "data_type": self.aggregation,
                "multiplier": self.multiplier,
                "rounding": [{
                    "zero_no_dec": "1",
                    "dec_first": "1",
                    "sigfigs": "6",
                    "variable": "100",
                }],
            }
        })
    }
}

/// One timeseries sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    /// `YYYYMMDDHHMMSS`
    pub t: String,
    pub v: f64,
}

impl TracePoint {
    pub fn timestamp(&self) -> LyraResult<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.t, TIMESTAMP_FORMAT)
            .map_err(|e| LyraError::Internal(format!("bad hydstra timestamp {}: {}", self.t, e)))
    }
}

/// Fail on a body reporting a non-zero `error_num`
pub fn check_error(body: &Value) -> LyraResult<()> {
    match body.get("error_num").and_then(Value::as_i64) {
        Some(0) | None => Ok(()),
        Some(code) => Err(LyraError::Hydstra {
            code,
            message: body["error_msg"].as_str().unwrap_or_default().to_string(),
        }),
    }
}

/// Samples of the first trace in a `get_ts_traces` body
pub fn parse_trace(body: &Value) -> LyraResult<Vec<TracePoint>> {
    check_error(body)?;
    let ret = body.get("_return").or_else(|| body.get("return"));
    let samples = ret
        .and_then(|r| r["traces"].get(0))
        .and_then(|t| t["trace"].as_array());

    samples
        .into_iter()
        .flatten()
        .map(|s| {
            let t = s["t"].as_str().unwrap_or_default().to_string();
            let v = match &s["v"] {
                Value::Number(n) => n.as_f64(),
                Value::String(v) => v.trim().parse().ok(),
                _ => None,
            }
            .ok_or_else(|| LyraError::Internal(format!("bad hydstra value at {}", t)))?;
            Ok(TracePoint { t, v })
        })
        .collect()
}

/// Anything that can produce a timeseries trace
#[async_trait]
pub trait TimeseriesSource: Send + Sync {
    async fn get_trace(&self, request: &TraceRequest) -> LyraResult<Vec<TracePoint>>;
}

/// HTTP client for a Hydstra endpoint
#[derive(Debug, Clone)]
pub struct HydstraClient {
    base_url: String,
    timeout: Duration,
}

impl HydstraClient {
    pub fn new(config: &HydstraConfig) -> LyraResult<Self> {
        if config.base_url.is_empty() {
            return Err(LyraError::SourceNotConfigured("hydstra"));
        }
        Ok(Self {
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Post a request document and return the decoded body
    pub async fn send(&self, payload: Value) -> LyraResult<Value> {
        let url = self.base_url.clone();
        let timeout = self.timeout;
        debug!("POST {} {}", url, payload["function"]);

        tokio::task::spawn_blocking(move || {
            let agent: ureq::Agent = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build()
                .into();
            let mut response = agent
                .post(&url)
                .send_json(&payload)
                .map_err(|e| LyraError::Http(e.to_string()))?;
            response
                .body_mut()
                .read_json::<Value>()
                .map_err(|e| LyraError::Http(e.to_string()))
        })
        .await
        .map_err(|e| LyraError::Internal(format!("hydstra request task failed: {}", e)))?
    }
}

#[async_trait]
impl TimeseriesSource for HydstraClient {
    async fn get_trace(&self, request: &TraceRequest) -> LyraResult<Vec<TracePoint>> {
        let body = self.send(request.payload()).await?;
        parse_trace(&body)
    }
}

/// A trace plus any warnings raised while fetching it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchedTrace {
    pub points: Vec<TracePoint>,
    pub warnings: Vec<String>,
}

/// Fetch a trace, retrying once with `fallback_varfrom` when the first
/// variable fails or has no data
pub async fn get_trace_with_fallback(
    source: &dyn TimeseriesSource,
    request: &TraceRequest,
    fallback_varfrom: Option<&str>,
) -> LyraResult<FetchedTrace> {
    let outcome = source.get_trace(request).await;
    let retryable = match &outcome {
        Ok(points) => points.is_empty(),
        Err(LyraError::Hydstra { code, .. }) => *code != NO_FALLBACK_ERROR,
        Err(_) => false,
    };
    let fallback = match fallback_varfrom {
        Some(f) if retryable => f,
        _ => {
            return outcome.map(|points| FetchedTrace {
                points,
                warnings: Vec::new(),
            })
        }
    };

    let message = format!(
        "Warning: variable '{}' not available. Falling back to '{}'",
        request.varfrom, fallback
    );
    warn!("{}", message);

    let retry = TraceRequest {
        varfrom: fallback.to_string(),
        ..request.clone()
    };
    Ok(FetchedTrace {
        points: source.get_trace(&retry).await?,
        warnings: vec![message],
    })
}
