use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::semantic::{DEFAULT_DISTANCE_THRESHOLD, DEFAULT_MODEL};

const CONFIG_FILE: &str = "config.yaml";

/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

const DEFAULT_CAPTIONER_ENDPOINT: &str = "http://127.0.0.1:11434";
const DEFAULT_CAPTIONER_MODEL: &str = "llama3.2-vision";
/// Default captioner request timeout in seconds
const DEFAULT_CAPTIONER_TIMEOUT_SECS: u64 = 15;

/// Configuration for the embedding side of search
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SemanticConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_semantic_model")]
    pub model: String,

    /// Squared-L2 distance above which vector hits are dropped
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f32,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        }
    }
}

/// Configuration for the vision captioner
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaptionerConfig {
    /// Base URL of the Ollama server
    #[serde(default = "default_captioner_endpoint")]
    pub endpoint: String,

    /// Vision model to caption with
    #[serde(default = "default_captioner_model")]
    pub model: String,

    /// Per-request timeout in seconds; a timeout is a failure, not a retry
    #[serde(default = "default_captioner_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CaptionerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_CAPTIONER_ENDPOINT.to_string(),
            model: DEFAULT_CAPTIONER_MODEL.to_string(),
            timeout_secs: DEFAULT_CAPTIONER_TIMEOUT_SECS,
        }
    }
}

fn default_semantic_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_distance_threshold() -> f32 {
    DEFAULT_DISTANCE_THRESHOLD
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_captioner_endpoint() -> String {
    DEFAULT_CAPTIONER_ENDPOINT.to_string()
}

fn default_captioner_model() -> String {
    DEFAULT_CAPTIONER_MODEL.to_string()
}

fn default_captioner_timeout_secs() -> u64 {
    DEFAULT_CAPTIONER_TIMEOUT_SECS
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub semantic: SemanticConfig,

    #[serde(default)]
    pub captioner: CaptionerConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: String,
}

impl Config {
    fn validate(&self) {
        if self.semantic.distance_threshold <= 0.0 {
            panic!(
                "semantic.distance_threshold must be positive, got {}",
                self.semantic.distance_threshold
            );
        }

        if self.semantic.download_timeout_secs == 0 {
            panic!("semantic.download_timeout_secs must be greater than 0");
        }

        if self.captioner.timeout_secs == 0 {
            panic!("captioner.timeout_secs must be greater than 0");
        }
    }

    pub fn load_with(base_path: &str) -> Self {
        let path = Path::new(base_path).join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            let defaults = Self::default();
            let _ = std::fs::create_dir_all(base_path);
            if let Err(err) = std::fs::write(
                &path,
                serde_yml::to_string(&defaults).expect("default config serializes"),
            ) {
                log::warn!("could not write default config to {}: {err}", path.display());
            }
        }

        let config_str = std::fs::read_to_string(&path).expect("config file is not readable");
        let mut config: Self = serde_yml::from_str(&config_str).expect("config is malformed");

        config.base_path = base_path.to_string();
        config.validate();

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config).expect("config serializes") {
            config.save();
        }

        config
    }

    pub fn save(&self) {
        let path = Path::new(&self.base_path).join(CONFIG_FILE);
        let config_str = serde_yml::to_string(&self).expect("config serializes");
        if let Err(err) = std::fs::write(&path, config_str) {
            log::error!("failed to save config to {}: {err}", path.display());
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }
}

/// Data directory for glance itself (config, model cache): GLANCE_BASE_PATH
/// or ~/.glance. Per-folder data always lives inside the opened folder.
pub fn base_path() -> anyhow::Result<String> {
    if let Ok(path) = std::env::var("GLANCE_BASE_PATH") {
        return Ok(path);
    }

    let home = homedir::my_home()?
        .ok_or_else(|| anyhow::anyhow!("could not determine home directory"))?;
    Ok(home.join(".glance").to_string_lossy().to_string())
}
