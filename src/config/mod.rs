//! Layered configuration
//!
//! 1. Built-in defaults
//! 2. Config file (`--config`, or ~/.config/nomad-deploy/config.toml)
//! 3. CLI flags and their environment variables

mod defaults;
mod effective;
mod merge;
mod settings;

pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, DEFAULT_CONFIG_PATH};
pub use merge::{deep_merge, merge_layers, strip_nulls};
pub use settings::{DeployConfig, DeploySettings, NomadSettings, SshSettings};
