//! Configuration Module
//!
//! Handles loading the service and cache configuration from environment variables.

use std::env;
use std::str::FromStr;

/// Payload codec used by the cache serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Json,
    Bincode,
}

impl FromStr for CodecKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(CodecKind::Json),
            "bincode" => Ok(CodecKind::Bincode),
            other => Err(format!("unknown cache codec '{}'", other)),
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries the cache can hold
    pub max_entries: usize,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
    /// Codec for cached payloads
    pub cache_codec: CodecKind,
    /// Encoded payloads at or above this size are compressed when the request allows it
    pub compression_threshold: usize,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    /// - `CACHE_CODEC` - `json` or `bincode` (default: json)
    /// - `COMPRESSION_THRESHOLD` - Compression threshold in bytes (default: 1024)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_or("MAX_ENTRIES", defaults.max_entries),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            cleanup_interval: env_or("CLEANUP_INTERVAL", defaults.cleanup_interval),
            cache_codec: env_or("CACHE_CODEC", defaults.cache_codec),
            compression_threshold: env_or(
                "COMPRESSION_THRESHOLD",
                defaults.compression_threshold,
            ),
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: 300,
            server_port: 3000,
            cleanup_interval: 1,
            cache_codec: CodecKind::Json,
            compression_threshold: 1024,
        }
    }
}
