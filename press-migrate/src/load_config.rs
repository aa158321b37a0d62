/// `load_config` module: Loads the static YAML config and injects environment overrides.
///
/// This module is the only place where user-supplied YAML is parsed and mapped to the
/// typed sections the CLI hands to the source reader, the destination writer and the core
/// [`MigrateConfig`].
///
/// # Sections
/// - `source`: WordPress site URL, export directory and page size.
/// - `destination`: Contentful space, environment and asset-processing polling.
/// - `migrate`: state directory, batching, locale, content-type ids and transform options.
///
/// # Secrets
/// Tokens never live in the file. `CONTENTFUL_MANAGEMENT_TOKEN`, `WP_USERNAME` and
/// `WP_APP_PASSWORD` are read by the clients themselves; `CONTENTFUL_SPACE_ID`, when set,
/// overrides `destination.space_id` here.
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{Context, Result};
use press_migrate_core::config::MigrateConfig;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const SPACE_ID_ENV: &str = "CONTENTFUL_SPACE_ID";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub source: SourceSection,
    #[serde(default)]
    pub destination: DestinationSection,
    pub migrate: MigrateConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    /// Site root, e.g. `https://blog.example.com`.
    pub base_url: String,
    pub export_dir: PathBuf,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DestinationSection {
    pub space_id: Option<String>,
    pub environment: String,
    pub management_url: String,
    pub upload_url: String,
    pub processing_max_attempts: u32,
    pub processing_interval_ms: u64,
}

impl Default for DestinationSection {
    fn default() -> Self {
        Self {
            space_id: None,
            environment: "master".to_string(),
            management_url: "https://api.contentful.com".to_string(),
            upload_url: "https://upload.contentful.com".to_string(),
            processing_max_attempts: 10,
            processing_interval_ms: 1000,
        }
    }
}

fn default_per_page() -> u32 {
    100
}

/// Loads a static YAML config file (no secrets) and applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Ok(space_id) = env::var(SPACE_ID_ENV) {
        if !space_id.trim().is_empty() {
            info!(env = SPACE_ID_ENV, "Space id taken from environment");
            config.destination.space_id = Some(space_id);
        }
    }

    config.migrate.trace_loaded();
    Ok(config)
}

impl DestinationSection {
    pub fn require_space_id(&self) -> Result<&str> {
        self.space_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .with_context(|| format!("destination.space_id is not set (config or {SPACE_ID_ENV})"))
    }
}
