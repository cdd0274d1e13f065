//! YAML configuration for the annotator binary.

use std::path::{Path, PathBuf};

use page_annotations::AnnotationPolicy;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use crate::errors::{AnnotatorError, AnnotatorResult};

const LOCAL_CONFIG: &str = "config/annotator.yaml";
const APP_DIR: &str = "page-annotator";

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    pub policy: AnnotationPolicy,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

#[derive(Debug)]
pub struct LoadedConfig {
    pub config: AnnotatorConfig,
    /// File the config was read from, `None` when defaults are in use.
    pub path: Option<PathBuf>,
}

/// Candidate path: the explicit one, else `./config/annotator.yaml`, else
/// `<config_dir>/page-annotator/config.yaml`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir().map(|mut path| {
        path.push(APP_DIR);
        path.push("config.yaml");
        path
    })
}

/// Loads the config. A missing file means defaults; an unreadable or
/// malformed one is an error.
pub async fn load_config(explicit: Option<&Path>) -> AnnotatorResult<LoadedConfig> {
    let Some(path) = resolve_config_path(explicit) else {
        warn!("No config directory available, using defaults");
        return Ok(LoadedConfig {
            config: AnnotatorConfig::default(),
            path: None,
        });
    };

    if !path.exists() {
        if explicit.is_some() {
            return Err(AnnotatorError::read(
                &path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
            ));
        }
        warn!("Config file not found, using defaults: {}", path.display());
        return Ok(LoadedConfig {
            config: AnnotatorConfig::default(),
            path: None,
        });
    }

    let content = fs::read_to_string(&path)
        .await
        .map_err(|err| AnnotatorError::read(&path, err))?;
    let config = parse_config(&content).map_err(|source| AnnotatorError::Config {
        path: path.clone(),
        source,
    })?;
    info!("Loaded configuration from: {}", path.display());
    Ok(LoadedConfig {
        config,
        path: Some(path),
    })
}

pub fn parse_config(content: &str) -> Result<AnnotatorConfig, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(AnnotatorConfig::default());
    }
    serde_yaml::from_str(content)
}
