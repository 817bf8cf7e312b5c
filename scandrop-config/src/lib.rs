//! Configuration loading for scandrop.
//!
//! Values come from environment variables (optionally seeded from a `.env`
//! file), then a TOML file, then built-in defaults, in that order of
//! precedence. The result is a single immutable [`Config`] plus any non-fatal
//! [`ConfigWarnings`] worth surfacing at startup.

#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::sources::{EnvConfig, FileConfig};
pub use models::{Config, ConfigMetadata, ToolsConfig};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};
