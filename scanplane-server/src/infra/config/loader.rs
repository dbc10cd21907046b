use once_cell::sync::Lazy;
use std::{
    fs,
    path::PathBuf,
    time::Duration,
};
use thiserror::Error;
use url::Url;

use scanplane_core::client::ClientOptions;
use scanplane_core::job::{RuntimeConfig, ScanJobConfig};

use super::{
    models::{
        CallbackConfig, Config, ConfigMetadata, DatabaseConfig, HookTransport, RegistryConfig,
        ServerConfig,
    },
    sources::{EnvConfig, FileConfig},
};

static DEFAULT_CONFIG_LOCATIONS: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    vec![
        PathBuf::from("scanplane.toml"),
        PathBuf::from("config/scanplane.toml"),
    ]
});

const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Command-line overrides; these beat the environment.
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Loads `.env`, then resolves the process environment over the TOML
    /// file over built-in defaults.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Same as [`ConfigLoader::load`] with an explicit environment and no
    /// `.env` handling.
    pub fn load_with_env(&self, mut env: EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        if let Some(host) = &self.options.server_host {
            env.server_host = Some(host.clone());
        }
        env.server_port = self.options.server_port.or(env.server_port);
        let (file_config, config_path) = self.load_file_config(&env)?;
        let mut warnings = Vec::new();
        if config_path.is_none() {
            warnings.push(
                "No scanplane.toml detected; falling back to environment variables".to_string(),
            );
        }
        let config = compose_config(file_config.unwrap_or_default(), env, config_path)?;
        if config.database.url.is_some() && !cfg!(feature = "postgres") {
            warnings.push(
                "database.url is set but the postgres feature is disabled; using in-memory stores"
                    .to_string(),
            );
        }
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let mut source = ConfigPathSource::default();

        if let Some(explicit) = &self.options.config_path {
            source.explicit = Some(explicit.clone());
        } else if let Some(from_env) = &env_config.config_path {
            source.env = Some(from_env.clone());
        }

        if source.is_empty() {
            source.default = DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
                .cloned();
        }

        let Some((path, provenance)) = source.resolved_path() else {
            return Ok((None, None));
        };

        if !path.exists() {
            if provenance.is_explicit() {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents = fs::read_to_string(&path).map_err(|err| ConfigLoadError::Io {
            path: path.clone(),
            source: err,
        })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|err| ConfigLoadError::Parse {
                path: path.clone(),
                source: err,
            })?;

        Ok((Some(file_config), Some(path)))
    }
}

fn compose_config(
    file: FileConfig,
    env: EnvConfig,
    config_path: Option<PathBuf>,
) -> Result<Config, ConfigLoadError> {
    let FileConfig {
        server: file_server,
        database: file_database,
        registry: file_registry,
        callback: file_callback,
        scan_job: file_scan_job,
        runtime: file_runtime,
        adapter_client: file_adapter_client,
    } = file;

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        port: env.server_port.or(file_server.port).unwrap_or(DEFAULT_PORT),
    };

    let database = DatabaseConfig {
        url: env
            .database_url
            .or(file_database.url)
            .filter(|url| !url.trim().is_empty()),
    };

    let external_url = env
        .registry_external_url
        .or(file_registry.external_url)
        .ok_or(ConfigLoadError::Missing {
            key: "registry.external_url",
        })?;
    validate_url("registry.external_url", &external_url)?;
    let token = env
        .registry_token
        .or(file_registry.token)
        .filter(|token| !token.trim().is_empty())
        .ok_or(ConfigLoadError::Missing {
            key: "registry.token",
        })?;
    let registry = RegistryConfig {
        external_url,
        token,
    };

    let internal_base_url = env
        .callback_base_url
        .or(file_callback.internal_base_url)
        .unwrap_or_else(|| format!("http://127.0.0.1:{}", server.port));
    validate_url("callback.internal_base_url", &internal_base_url)?;
    let transport = match env.hook_transport.or(file_callback.transport) {
        Some(raw) => HookTransport::parse(&raw).ok_or(ConfigLoadError::InvalidValue {
            key: "callback.transport",
            value: raw,
        })?,
        None => HookTransport::default(),
    };
    let callback = CallbackConfig {
        internal_base_url,
        transport,
    };

    let job_defaults = ScanJobConfig::default();
    let scan_job = ScanJobConfig {
        poll_interval: duration_or(
            "scan_job.poll_interval",
            env.scan_poll_interval.or(file_scan_job.poll_interval),
            job_defaults.poll_interval,
        )?,
        timeout: duration_or(
            "scan_job.timeout",
            env.scan_timeout.or(file_scan_job.timeout),
            job_defaults.timeout,
        )?,
        max_fails: env
            .scan_max_fails
            .or(file_scan_job.max_fails)
            .unwrap_or(job_defaults.max_fails),
    };

    let runtime_defaults = RuntimeConfig::default();
    let runtime = RuntimeConfig {
        workers: env
            .job_workers
            .or(file_runtime.workers)
            .unwrap_or(runtime_defaults.workers),
        queue_capacity: env
            .job_queue_capacity
            .or(file_runtime.queue_capacity)
            .unwrap_or(runtime_defaults.queue_capacity),
        hook_delivery_attempts: env
            .hook_delivery_attempts
            .or(file_runtime.hook_delivery_attempts)
            .unwrap_or(runtime_defaults.hook_delivery_attempts),
        retry_backoff: duration_or(
            "runtime.retry_backoff",
            env.job_retry_backoff.or(file_runtime.retry_backoff),
            runtime_defaults.retry_backoff,
        )?,
        hook_retry_delay: duration_or(
            "runtime.hook_retry_delay",
            env.hook_retry_delay.or(file_runtime.hook_retry_delay),
            runtime_defaults.hook_retry_delay,
        )?,
    };

    let client_defaults = ClientOptions::default();
    let adapter_client = ClientOptions {
        request_timeout: duration_or(
            "adapter_client.request_timeout",
            env.adapter_request_timeout
                .or(file_adapter_client.request_timeout),
            client_defaults.request_timeout,
        )?,
        accept_invalid_certs: env
            .adapter_accept_invalid_certs
            .or(file_adapter_client.accept_invalid_certs)
            .unwrap_or(client_defaults.accept_invalid_certs),
    };

    Ok(Config {
        server,
        database,
        registry,
        callback,
        scan_job,
        runtime,
        adapter_client,
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded: false,
        },
    })
}

fn duration_or(
    key: &'static str,
    raw: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigLoadError> {
    match raw {
        Some(value) => humantime::parse_duration(value.trim()).map_err(|source| {
            ConfigLoadError::InvalidDuration { key, value, source }
        }),
        None => Ok(default),
    }
}

fn validate_url(key: &'static str, raw: &str) -> Result<(), ConfigLoadError> {
    Url::parse(raw)
        .map(|_| ())
        .map_err(|source| ConfigLoadError::InvalidUrl { key, source })
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{key} is required")]
    Missing { key: &'static str },
    #[error("invalid URL for {key}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid duration '{value}' for {key}")]
    InvalidDuration {
        key: &'static str,
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Default)]
struct ConfigPathSource {
    explicit: Option<PathBuf>,
    env: Option<PathBuf>,
    default: Option<PathBuf>,
}

impl ConfigPathSource {
    fn is_empty(&self) -> bool {
        self.explicit.is_none() && self.env.is_none() && self.default.is_none()
    }

    fn resolved_path(&self) -> Option<(PathBuf, ConfigPathProvenance)> {
        if let Some(path) = &self.explicit {
            return Some((path.clone(), ConfigPathProvenance::Explicit));
        }
        if let Some(path) = &self.env {
            return Some((path.clone(), ConfigPathProvenance::Env));
        }
        if let Some(path) = &self.default {
            return Some((path.clone(), ConfigPathProvenance::Default));
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigPathProvenance {
    Explicit,
    Env,
    Default,
}

impl ConfigPathProvenance {
    fn is_explicit(self) -> bool {
        matches!(
            self,
            ConfigPathProvenance::Explicit | ConfigPathProvenance::Env
        )
    }
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: Vec<String>,
}
