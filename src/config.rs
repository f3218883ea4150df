//! Configuration management for the Lectern server

use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub reader: ReaderConfig,
    pub cache: CacheConfig,
    pub coordinator: CoordinatorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Client-session tuning: debounce, restore settling, prefetch reach
#[derive(Debug, Clone, Deserialize)]
pub struct ReaderConfig {
    pub sync_debounce_ms: u64,
    pub restore_quiet_window_ms: u64,
    pub prefetch_window: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub capacity_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    pub lease_ttl_secs: u64,
    pub wait_budget_ms: u64,
}

impl ReaderConfig {
    pub fn sync_debounce(&self) -> Duration {
        Duration::from_millis(self.sync_debounce_ms)
    }

    pub fn restore_quiet_window(&self) -> Duration {
        Duration::from_millis(self.restore_quiet_window_ms)
    }
}

impl CoordinatorConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }

    pub fn wait_budget(&self) -> Duration {
        Duration::from_millis(self.wait_budget_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./lectern.db".to_string(),
            },
            reader: ReaderConfig {
                sync_debounce_ms: 1000,
                restore_quiet_window_ms: 500,
                prefetch_window: 2,
            },
            cache: CacheConfig {
                capacity_bytes: 64 * 1024 * 1024,
            },
            coordinator: CoordinatorConfig {
                lease_ttl_secs: 120,
                wait_budget_ms: 30_000,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.server.port),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            reader: ReaderConfig {
                sync_debounce_ms: env::var("SYNC_DEBOUNCE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.reader.sync_debounce_ms),
                restore_quiet_window_ms: env::var("RESTORE_QUIET_WINDOW_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.reader.restore_quiet_window_ms),
                prefetch_window: env::var("PREFETCH_WINDOW")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.reader.prefetch_window),
            },
            cache: CacheConfig {
                capacity_bytes: env::var("CACHE_CAPACITY_BYTES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.cache.capacity_bytes),
            },
            coordinator: CoordinatorConfig {
                lease_ttl_secs: env::var("LEASE_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.coordinator.lease_ttl_secs),
                wait_budget_ms: env::var("EXTRACTION_WAIT_BUDGET_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults.coordinator.wait_budget_ms),
            },
        }
    }
}
