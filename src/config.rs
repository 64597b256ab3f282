//! Server configuration from environment variables

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::fanout::DispatchConfig;
use crate::ingest::GeneratorConfig;
use crate::store::DEFAULT_PAGE_SIZE;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3030";

/// Runtime configuration of the weather server
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Write log path; `None` keeps the table in memory only
    pub data_file: Option<PathBuf>,
    pub query_page_size: usize,
    pub dispatch: DispatchConfig,
    /// `None` when the data generator is disabled
    pub generator: Option<GeneratorConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServerConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`
    ///
    /// Missing or unparseable values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = parse_or(&lookup, "WEATHER_BIND_ADDR", || {
            SocketAddr::from(([0, 0, 0, 0], 3030))
        });

        let data_file = lookup("WEATHER_DATA_FILE")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let query_page_size = parse_or(&lookup, "WEATHER_QUERY_PAGE_SIZE", || DEFAULT_PAGE_SIZE).max(1);

        let defaults = DispatchConfig::default();
        let dispatch = DispatchConfig {
            time_budget: Duration::from_secs(parse_or(&lookup, "WEATHER_PUSH_BUDGET_SECS", || {
                defaults.time_budget.as_secs()
            })),
            max_in_flight: parse_or(&lookup, "WEATHER_PUSH_CONCURRENCY", || defaults.max_in_flight)
                .max(1),
        };

        let interval_secs: u64 = parse_or(&lookup, "WEATHER_GENERATOR_INTERVAL_SECS", || 0);
        let generator = (interval_secs > 0).then(|| {
            let defaults = GeneratorConfig::default();
            GeneratorConfig {
                interval: Duration::from_secs(interval_secs),
                first_device: parse_or(&lookup, "WEATHER_GENERATOR_FIRST_DEVICE", || {
                    defaults.first_device
                }),
                device_count: parse_or(&lookup, "WEATHER_GENERATOR_DEVICES", || {
                    defaults.device_count
                }),
            }
        });

        Self {
            bind_addr,
            data_file,
            query_page_size,
            dispatch,
            generator,
        }
    }
}

fn parse_or<F, T, D>(lookup: &F, name: &str, default: D) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    D: FnOnce() -> T,
{
    match lookup(name) {
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(variable = name, value = %raw, "invalid configuration value, using default");
                default()
            }
        },
        None => default(),
    }
}
