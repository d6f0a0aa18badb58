//! Cartographer configuration: deserialization and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cli::discovery::{CrawlConfig, DEFAULT_MAX_OUTPUT_BYTES};
use crate::cli::executable::validate_root_name;
use crate::error::CartographerError;
use crate::runner::RunConfig;

/// Largest accepted `crawl.max_depth`.
pub const MAX_DEPTH_LIMIT: u8 = 10;

/// Top-level configuration, parsed from `cartographer.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CartographerConfig {
    /// Root commands crawled at startup.
    #[serde(default)]
    pub preload: Vec<String>,
    #[serde(default)]
    pub crawl: CrawlSection,
    #[serde(default)]
    pub run: RunSection,
}

/// `[crawl]` table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CrawlSection {
    #[serde(default = "default_max_depth")]
    pub max_depth: u8,
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    #[serde(default = "default_help_timeout_secs")]
    pub help_timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Bytes kept per output stream of one help invocation.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    /// Directories searched instead of `$PATH` when non-empty.
    #[serde(default)]
    pub search_path: Vec<PathBuf>,
}

/// `[run]` table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    #[serde(default = "default_run_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub strict_options: bool,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_max_depth() -> u8 {
    5
}

fn default_max_nodes() -> usize {
    256
}

fn default_help_timeout_secs() -> u64 {
    5
}

fn default_concurrency() -> usize {
    8
}

fn default_run_timeout_secs() -> u64 {
    10
}

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_nodes: default_max_nodes(),
            help_timeout_secs: default_help_timeout_secs(),
            concurrency: default_concurrency(),
            max_output_bytes: default_max_output_bytes(),
            search_path: Vec::new(),
        }
    }
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_run_timeout_secs(),
            strict_options: false,
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl CartographerConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: CartographerConfig =
            toml::from_str(content).map_err(|e| CartographerError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub async fn load(path: &Path) -> crate::Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CartographerError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Fail fast on out-of-range values before anything is crawled.
    pub fn validate(&self) -> crate::Result<()> {
        let crawl = &self.crawl;
        if crawl.max_depth == 0 || crawl.max_depth > MAX_DEPTH_LIMIT {
            return Err(CartographerError::InvalidConfig(format!(
                "crawl.max_depth must be between 1 and {}, got {}",
                MAX_DEPTH_LIMIT, crawl.max_depth
            )));
        }
        if crawl.max_nodes == 0 {
            return Err(CartographerError::InvalidConfig(
                "crawl.max_nodes must be greater than 0".to_string(),
            ));
        }
        if crawl.help_timeout_secs == 0 {
            return Err(CartographerError::InvalidConfig(
                "crawl.help_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if crawl.concurrency == 0 {
            return Err(CartographerError::InvalidConfig(
                "crawl.concurrency must be greater than 0".to_string(),
            ));
        }
        if crawl.max_output_bytes == 0 {
            return Err(CartographerError::InvalidConfig(
                "crawl.max_output_bytes must be greater than 0".to_string(),
            ));
        }
        if self.run.max_output_bytes == 0 {
            return Err(CartographerError::InvalidConfig(
                "run.max_output_bytes must be greater than 0".to_string(),
            ));
        }
        if self.run.timeout_secs == 0 {
            return Err(CartographerError::InvalidConfig(
                "run.timeout_secs must be greater than 0".to_string(),
            ));
        }
        for name in &self.preload {
            validate_root_name(name).map_err(|e| {
                CartographerError::InvalidConfig(format!("preload entry '{}': {}", name, e))
            })?;
        }
        Ok(())
    }

    pub fn crawl_config(&self) -> CrawlConfig {
        CrawlConfig {
            max_depth: self.crawl.max_depth,
            max_nodes: self.crawl.max_nodes,
            help_timeout: Duration::from_secs(self.crawl.help_timeout_secs),
            concurrency: self.crawl.concurrency,
            max_output_bytes: self.crawl.max_output_bytes,
            search_path: self.crawl.search_path.clone(),
        }
    }

    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            timeout: Duration::from_secs(self.run.timeout_secs),
            strict_options: self.run.strict_options,
            max_output_bytes: self.run.max_output_bytes,
        }
    }
}
