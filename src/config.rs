//! Configuration for reportflow.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (REPORTFLOW_HOME, REPORTFLOW_API_KEY)
//! 2. Config file (.reportflow/config.yaml)
//! 3. Defaults (~/.reportflow)
//!
//! Config file discovery:
//! - Searches current directory and parents for .reportflow/config.yaml
//! - `paths.home` is relative to the .reportflow/ directory
//!
//! Configuration is loaded explicitly and handed to constructors.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::{CollaboratorLimits, EndpointConfig, VoiceSettings};
use crate::core::{OrchestratorSettings, ProgressSettings};

pub const HOME_ENV: &str = "REPORTFLOW_HOME";
pub const API_KEY_ENV: &str = "REPORTFLOW_API_KEY";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub endpoints: EndpointConfig,
    #[serde(default)]
    pub limits: CollaboratorLimits,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub progress: ProgressSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// State directory (relative to .reportflow/)
    pub home: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(flatten)]
    pub settings: VoiceSettings,
}

fn default_voice_id() -> String {
    "narrator".to_string()
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            voice_id: default_voice_id(),
            settings: VoiceSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoConfig {
    /// Without an avatar, videos are replaced by a placeholder
    pub avatar_id: Option<String>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// State directory (pipeline snapshots live under it)
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub endpoints: EndpointConfig,
    pub limits: CollaboratorLimits,
    pub voice_id: String,
    pub voice_settings: VoiceSettings,
    pub avatar_id: Option<String>,
    pub progress: ProgressSettings,
    /// Bearer token for the HTTP collaborators
    pub api_key: Option<String>,
}

impl ResolvedConfig {
    /// Where pipeline snapshots are stored ($REPORTFLOW_HOME/pipelines)
    pub fn pipelines_dir(&self) -> PathBuf {
        self.home.join("pipelines")
    }

    /// Orchestrator settings derived from this configuration
    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            limits: self.limits.clone(),
            voice_id: self.voice_id.clone(),
            voice_settings: self.voice_settings.clone(),
            avatar_id: self.avatar_id.clone(),
        }
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".reportflow").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Environment overrides, read once by `load_config`
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub home: Option<PathBuf>,
    pub api_key: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            home: std::env::var(HOME_ENV).ok().map(PathBuf::from),
            api_key: std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()),
        }
    }
}

/// Merge a parsed config file, environment overrides and defaults
pub fn resolve_config(
    config_file: Option<(PathBuf, ConfigFile)>,
    env: EnvOverrides,
    default_home: PathBuf,
) -> ResolvedConfig {
    let (config_path, config) = match config_file {
        Some((path, config)) => (Some(path), config),
        None => (None, ConfigFile::default()),
    };

    let home = if let Some(env_home) = env.home {
        env_home
    } else if let (Some(path), Some(home_path)) = (&config_path, &config.paths.home) {
        let reportflow_dir = path.parent().unwrap_or(Path::new("."));
        resolve_path(reportflow_dir, home_path)
    } else {
        default_home
    };

    ResolvedConfig {
        home,
        config_file: config_path,
        endpoints: config.endpoints,
        limits: config.limits,
        voice_id: config.voice.voice_id,
        voice_settings: config.voice.settings,
        avatar_id: config.video.avatar_id.filter(|a| !a.trim().is_empty()),
        progress: config.progress,
        api_key: env.api_key,
    }
}

/// Load configuration from all sources
pub fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".reportflow");

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config_file = match find_config_file(&cwd) {
        Some(path) => {
            let config = load_config_file(&path)?;
            Some((path, config))
        }
        None => None,
    };

    Ok(resolve_config(
        config_file,
        EnvOverrides::from_env(),
        default_home,
    ))
}
