//! Run configuration loaded from TOML.
//!
//! ```toml
//! max_attempts = 10
//! result_root = "output"
//! prompt_template = "prompts/repair.txt"
//!
//! [[oracles]]
//! name = "gpt4o"
//! provider = "openai"
//! model = "gpt-4o"
//! ```

use std::path::{Path, PathBuf};

use oracle_gateway::OracleConfig;
use serde::{Deserialize, Serialize};

use crate::error::{RepairError, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_MAX_PATHS: usize = 256;
pub const COST_EXPORT_FILE: &str = "token_usage.csv";

/// Bound on verification passes per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPolicy {
    pub max_attempts: u32,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RepairPolicy {
    pub fn new(max_attempts: u32) -> Result<Self> {
        let policy = Self { max_attempts };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(RepairError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_result_root() -> PathBuf {
    PathBuf::from("output")
}

fn default_max_paths() -> usize {
    DEFAULT_MAX_PATHS
}

/// Everything a batch run needs besides its inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_result_root")]
    pub result_root: PathBuf,
    #[serde(default)]
    pub prompt_template: Option<PathBuf>,
    #[serde(default)]
    pub debug_dir: Option<PathBuf>,
    #[serde(default)]
    pub cost_export: Option<PathBuf>,
    #[serde(default = "default_max_paths")]
    pub max_paths: usize,
    #[serde(default)]
    pub oracles: Vec<OracleConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            result_root: default_result_root(),
            prompt_template: None,
            debug_dir: None,
            cost_export: None,
            max_paths: DEFAULT_MAX_PATHS,
            oracles: Vec::new(),
        }
    }
}

impl RunConfig {
    /// Parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(RepairError::io_at(path))?;
        let config: Self = toml::from_str(&text).map_err(|source| RepairError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.policy()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|source| RepairError::ConfigParse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.policy()?;
        Ok(config)
    }

    pub fn policy(&self) -> Result<RepairPolicy> {
        RepairPolicy::new(self.max_attempts)
    }

    /// `<result_root>/<oracle>`
    pub fn oracle_dir(&self, oracle: &str) -> PathBuf {
        self.result_root.join(oracle)
    }

    /// Debug artifacts for one oracle: `<debug_dir>/<oracle>`.
    pub fn debug_dir_for(&self, oracle: &str) -> PathBuf {
        self.debug_dir
            .clone()
            .unwrap_or_else(|| self.result_root.join("debug"))
            .join(oracle)
    }

    pub fn cost_export_path(&self) -> PathBuf {
        self.cost_export
            .clone()
            .unwrap_or_else(|| self.result_root.join(COST_EXPORT_FILE))
    }
}
