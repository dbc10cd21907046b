use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub registry: FileRegistryConfig,
    #[serde(default)]
    pub callback: FileCallbackConfig,
    #[serde(default)]
    pub scan_job: FileScanJobConfig,
    #[serde(default)]
    pub runtime: FileRuntimeConfig,
    #[serde(default)]
    pub adapter_client: FileAdapterClientConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileRegistryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCallbackConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<String>,
}

/// Durations are humantime strings such as `10s` or `30m`.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileScanJobConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fails: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileRuntimeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_delivery_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_retry_delay: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_backoff: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileAdapterClientConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept_invalid_certs: Option<bool>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub database_url: Option<String>,
    pub registry_external_url: Option<String>,
    pub registry_token: Option<String>,
    pub callback_base_url: Option<String>,
    pub hook_transport: Option<String>,
    pub scan_poll_interval: Option<String>,
    pub scan_timeout: Option<String>,
    pub scan_max_fails: Option<u32>,
    pub job_workers: Option<usize>,
    pub job_queue_capacity: Option<usize>,
    pub hook_delivery_attempts: Option<u32>,
    pub hook_retry_delay: Option<String>,
    pub job_retry_backoff: Option<String>,
    pub adapter_request_timeout: Option<String>,
    pub adapter_accept_invalid_certs: Option<bool>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        Self {
            config_path: var("SCANPLANE_CONFIG").map(PathBuf::from),
            server_host: var("SERVER_HOST"),
            server_port: parse(var("SERVER_PORT")),
            database_url: var("DATABASE_URL"),
            registry_external_url: var("REGISTRY_EXTERNAL_URL"),
            registry_token: var("REGISTRY_TOKEN"),
            callback_base_url: var("CORE_INTERNAL_URL"),
            hook_transport: var("HOOK_TRANSPORT"),
            scan_poll_interval: var("SCAN_POLL_INTERVAL"),
            scan_timeout: var("SCAN_TIMEOUT"),
            scan_max_fails: parse(var("SCAN_MAX_FAILS")),
            job_workers: parse(var("JOB_WORKERS")),
            job_queue_capacity: parse(var("JOB_QUEUE_CAPACITY")),
            hook_delivery_attempts: parse(var("HOOK_DELIVERY_ATTEMPTS")),
            hook_retry_delay: var("HOOK_RETRY_DELAY"),
            job_retry_backoff: var("JOB_RETRY_BACKOFF"),
            adapter_request_timeout: var("ADAPTER_REQUEST_TIMEOUT"),
            adapter_accept_invalid_certs: var("ADAPTER_ACCEPT_INVALID_CERTS")
                .and_then(|raw| parse_bool(&raw)),
        }
    }
}

fn parse<T: FromStr>(raw: Option<String>) -> Option<T> {
    raw.and_then(|value| value.trim().parse().ok())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
