//! Run configuration.
//!
//! A [`Config`] is an explicit value handed to every entry point of the pipeline. It can be
//! loaded from a TOML file and then adjusted by command-line flags; nothing is kept in
//! process-wide state.

use crate::error::Error;
use anyhow::{Context, Result};
use clap::ValueEnum;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for one generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project name shown in the documentation title
    pub project_name: String,
    /// Project version shown in the documentation
    pub version: String,
    /// Free-text description placed on the index page
    pub description: String,
    /// Documentation author
    pub author: String,
    /// When present, only these applications are processed
    pub include_apps: Option<Vec<String>>,
    /// Applications to skip when `include_apps` is absent
    pub exclude_apps: Vec<String>,
    /// Endpoints whose path contains any of these substrings are dropped
    pub exclude_endpoints: Vec<String>,
    /// Run extraction and synthesis but write no files
    pub dry_run: bool,
    pub extraction: ExtractionConfig,
    pub output: OutputConfig,
    pub ai: AiConfig,
}

/// Extra base-type names recognized in addition to the built-in tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub serializer_bases: Vec<String>,
    pub view_bases: Vec<String>,
    pub model_bases: Vec<String>,
}

/// Output roots for the two renderers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub sphinx_dir: PathBuf,
    pub typescript_dir: PathBuf,
}

/// Optional description enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: AiProvider,
    pub model: String,
    pub timeout_secs: u64,
}

/// Completion provider used for enrichment. `Local` never touches the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    /// OpenAI completion API
    Openai,
    /// Anthropic completion API
    Anthropic,
    /// Heuristic text only
    Local,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_name: "Django API".to_string(),
            version: "1.0.0".to_string(),
            description: "Auto-generated API documentation".to_string(),
            author: String::new(),
            include_apps: None,
            exclude_apps: Vec::new(),
            exclude_endpoints: vec!["/admin/".to_string(), "/debug/".to_string()],
            dry_run: false,
            extraction: ExtractionConfig::default(),
            output: OutputConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sphinx_dir: PathBuf::from("docs/api"),
            typescript_dir: PathBuf::from("types"),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::Local,
            model: "gpt-4".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Config {
    /// Loads a configuration from a TOML file. Missing keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML for this schema.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());

        let contents = std::fs::read_to_string(path)
            .map_err(Error::from)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(e.to_string()))
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Returns whether an application takes part in the run.
    ///
    /// An explicit include list decides on its own; the exclude list only applies when
    /// no include list is configured.
    pub fn should_include_app(&self, app_name: &str) -> bool {
        match &self.include_apps {
            Some(include) => include.iter().any(|name| name == app_name),
            None => !self.exclude_apps.iter().any(|name| name == app_name),
        }
    }

    /// Returns whether an endpoint path survives the `exclude_endpoints` filter.
    pub fn should_include_endpoint(&self, endpoint_path: &str) -> bool {
        !self
            .exclude_endpoints
            .iter()
            .any(|pattern| endpoint_path.contains(pattern.as_str()))
    }

    /// Points both renderers below a common output directory.
    pub fn set_output_root(&mut self, root: &Path) {
        self.output.sphinx_dir = root.join("docs").join("api");
        self.output.typescript_dir = root.join("types");
    }
}
