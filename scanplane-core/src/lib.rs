//! Scan orchestration for container vulnerability scanners.
//!
//! [`controller::ScanController`] selects an adapter and claims a result row
//! through [`results::ResultManager`]; the [`job::ScanJob`] runs on a
//! [`job::JobRuntime`] and reports back through [`hook::HookHandler`].

pub mod client;
pub mod controller;
pub mod error;
pub mod hook;
pub mod job;
pub mod ports;
pub mod registry;
pub mod results;
pub mod store;

pub use controller::{ControllerConfig, ScanController};
pub use error::{Result, ScanError};
pub use hook::{HookHandler, SCAN_HOOK_PATH, scan_hook_url};
pub use registry::AdapterRegistry;
pub use results::ResultManager;

pub use scanplane_model as model;
