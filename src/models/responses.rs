//! Response DTOs for the exam session API
//!
//! Session operations serialize their own result types; these cover the
//! service endpoints and errors.

use serde::Serialize;

use crate::cache::CacheStatsReport;

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Cache backend in use after any fallback
    pub cache_backend: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy(cache_backend: &str) -> Self {
        Self {
            status: "healthy".to_string(),
            cache_backend: cache_backend.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for GET /cache/stats
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    pub report: CacheStatsReport,
    /// Only reported by the in-process backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_rate: Option<f64>,
}

impl CacheStatsResponse {
    pub fn new(report: CacheStatsReport) -> Self {
        let hit_rate = match &report {
            CacheStatsReport::Memory(stats) => Some(stats.hit_rate()),
            CacheStatsReport::Redis(_) => None,
        };
        Self { report, hit_rate }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStats;

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy("memory");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("memory"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_cache_stats_response_flattens_report() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            items: 2,
            ..CacheStats::default()
        };
        let json = serde_json::to_value(CacheStatsResponse::new(CacheStatsReport::Memory(stats)))
            .unwrap();

        assert_eq!(json["backend"], "memory");
        assert_eq!(json["items"], 2);
        assert_eq!(json["hit_rate"], 0.75);
    }

    #[test]
    fn test_error_response_serialize() {
        let json = serde_json::to_string(&ErrorResponse::new("boom")).unwrap();
        assert_eq!(json, r#"{"error":"boom"}"#);
    }
}
