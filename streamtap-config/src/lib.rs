//! # streamtap configuration
//!
//! Hierarchical configuration for the capture pipeline and the event
//! publisher.
//!
//! ## Features
//! - **Unified Configuration**: capture, publishing and telemetry in one file
//! - **Validation**: every section is checked with `validator` on load
//! - **Environment Awareness**: `STREAMTAP_*` variables override files

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

mod capture;
mod error;
mod publish;
mod telemetry;
mod validation;

pub use capture::{CaptureConfig, SourceType};
pub use error::ConfigError;
pub use publish::PublishConfig;
pub use telemetry::TelemetryConfig;

/// Top‑level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct StreamtapConfig {
    /// Packet source selection and sizing.
    #[validate(nested)]
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Telemetry sink parameters.
    #[validate(nested)]
    #[serde(default)]
    pub publish: PublishConfig,

    /// Logging and metric reporting.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl StreamtapConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/streamtap.yaml` - base settings, optional.
    /// 3. `config/<environment>.yaml` - `STREAMTAP_ENV` overrides, optional.
    /// 4. `STREAMTAP_*` environment variables (`__` separates sections).
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(StreamtapConfig::default()));
        let mut layers = vec!["defaults".to_string()];

        if Path::new("config/streamtap.yaml").exists() {
            figment = figment.merge(Yaml::file("config/streamtap.yaml"));
            layers.push("config/streamtap.yaml".into());
        } else {
            debug!("config/streamtap.yaml not found, using default configuration");
        }

        let env = std::env::var("STREAMTAP_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(&env_file));
            layers.push(env_file);
        }

        Self::extract(figment, layers)
    }

    /// Load configuration from a specific path, layered over the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment = Figment::from(Serialized::defaults(StreamtapConfig::default()))
            .merge(Yaml::file(path));
        Self::extract(figment, vec!["defaults".into(), path.display().to_string()])
    }

    fn extract(figment: Figment, mut layers: Vec<String>) -> Result<Self, ConfigError> {
        layers.push("STREAMTAP_* environment".into());
        let config: Self = figment
            .merge(Env::prefixed("STREAMTAP_").split("__"))
            .extract()
            .map_err(|e| ConfigError::parsing(&layers, e))?;
        config.validate()?;
        Ok(config)
    }
}
