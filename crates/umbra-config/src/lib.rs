//! Configuration for the Umbra viewer.
//!
//! Settings persist to disk as `config.ron`. Missing sections and fields fall
//! back to defaults, unknown fields are ignored, and command-line arguments
//! override whatever was loaded.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE, CameraConfig, Config, DebugConfig, RenderConfig, ShadowConfig, WindowConfig,
    default_config_dir,
};
pub use error::ConfigError;
