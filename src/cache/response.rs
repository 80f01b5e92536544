//! JSON response envelope shared by cached calls and background tasks

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome flag carried by every envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failure,
    Pending,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Pending => "PENDING",
        };
        write!(f, "{}", name)
    }
}

/// How the payload was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessType {
    /// Served through the cache
    Cached,
    /// Computed with caching switched off or unavailable
    CacheDisabled,
    /// Computation failed; the envelope is stored with zero TTL
    CacheFailed,
    /// Computed in a background task
    AsyncBackground,
}

/// Structured response with a status flag and readable error list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub status: ResponseStatus,
    pub process_type: ProcessType,
    pub data: Option<serde_json::Value>,
    pub errors: Option<Vec<String>>,
    pub task_id: Option<String>,
    pub result_route: Option<String>,
    /// Seconds until the cache entry expires, `None` for never
    pub expires_after: Option<u64>,
    /// Creation time, RFC 3339
    pub ts: String,
}

impl CachedResponse {
    /// Successful envelope around `data`
    pub fn success(
        process_type: ProcessType,
        data: serde_json::Value,
        expires_after: Option<u64>,
    ) -> Self {
        Self {
            status: ResponseStatus::Success,
            process_type,
            data: Some(data),
            errors: None,
            task_id: None,
            result_route: None,
            expires_after,
            ts: Utc::now().to_rfc3339(),
        }
    }

    /// Failed envelope; expires immediately
    pub fn failure(errors: Vec<String>) -> Self {
        Self {
            status: ResponseStatus::Failure,
            process_type: ProcessType::CacheFailed,
            data: None,
            errors: Some(errors),
            task_id: None,
            result_route: None,
            expires_after: Some(0),
            ts: Utc::now().to_rfc3339(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_wire_names() {
        let rsp = CachedResponse::success(
            ProcessType::CacheDisabled,
            serde_json::json!([1, 2]),
            Some(3600),
        );
        let value = serde_json::to_value(&rsp).unwrap();
        assert_eq!(value["status"], "SUCCESS");
        assert_eq!(value["process_type"], "cache_disabled");
        assert_eq!(value["expires_after"], 3600);
        assert_eq!(value["data"][1], 2);
    }

    #[test]
    fn failure_expires_immediately() {
        let rsp = CachedResponse::failure(vec!["boom".to_string()]);
        assert!(!rsp.is_success());
        assert_eq!(rsp.expires_after, Some(0));
        assert_eq!(rsp.process_type, ProcessType::CacheFailed);
        assert_eq!(ResponseStatus::Failure.to_string(), "FAILURE");
    }
}
