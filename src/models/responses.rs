//! Response DTOs for the todo API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::pipeline::MetricsSnapshot;
use crate::todos::TodoId;

/// Response body for POST /todos
#[derive(Debug, Clone, Serialize)]
pub struct CreatedResponse {
    pub id: TodoId,
}

/// Cache section of GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub total_entries: usize,
    pub total_tags: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for CacheStatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expirations: stats.expirations,
            total_entries: stats.total_entries,
            total_tags: stats.total_tags,
        }
    }
}

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub cache: CacheStatsResponse,
    pub pipeline: MetricsSnapshot,
    /// Pipeline-level hit rate, counting only cacheable requests
    pub pipeline_hit_rate: f64,
}

impl StatsResponse {
    pub fn new(cache: CacheStats, pipeline: MetricsSnapshot) -> Self {
        Self {
            cache: cache.into(),
            pipeline_hit_rate: pipeline.cache_hit_rate(),
            pipeline,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
