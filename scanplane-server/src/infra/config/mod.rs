pub mod loader;
pub mod models;
pub mod sources;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    CallbackConfig, Config, ConfigMetadata, DatabaseConfig, HookTransport, RegistryConfig,
    ServerConfig,
};
