//! Configuration for the inspector: schema, file discovery, and environment
//! overrides.

pub mod error;
pub mod loader;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{CONFIG_FILENAMES, apply_env_overrides, discover_and_load, find_config_file, load_from},
    schema::{AgentConfig, InspectorConfig, ServerConfig, SessionConfig, StreamingMode},
};
