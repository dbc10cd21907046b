use std::fmt;
use std::path::PathBuf;

use scanplane_core::client::ClientOptions;
use scanplane_core::job::{RuntimeConfig, ScanJobConfig};

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub registry: RegistryConfig,
    pub callback: CallbackConfig,
    pub scan_job: ScanJobConfig,
    pub runtime: RuntimeConfig,
    pub adapter_client: ClientOptions,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Clone, Default)]
pub struct DatabaseConfig {
    /// Postgres URL; in-memory stores are used when absent.
    pub url: Option<String>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Clone)]
pub struct RegistryConfig {
    /// Registry URL handed to adapters so they can pull the artifact.
    pub external_url: String,
    pub token: String,
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("external_url", &self.external_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackConfig {
    /// Base URL the job runtime posts status hooks to.
    pub internal_base_url: String,
    pub transport: HookTransport,
}

/// How the job runtime reaches the hook handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookTransport {
    /// POST to the callback URL.
    #[default]
    Http,
    /// Call the handler in-process.
    Local,
}

impl HookTransport {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}
