//! Configuration System
//!
//! Layered configuration: built-in defaults, then the user file, then the
//! workspace file, then `PLAYBOOK_SYNC__SECTION__KEY` environment variables.
//! Relative paths resolve against the workspace root.

use crate::error::ApiError;
use crate::logging::LoggingConfig;
use crate::retry::RetryConfig;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use crate::provider::{ProviderConfig, ProviderType};

mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
    pub mod workspace_file;
}

pub const ENV_PREFIX: &str = "PLAYBOOK_SYNC";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".playbook-sync/store.json")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Playbook files and the optional section filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_company_path")]
    pub company: PathBuf,

    #[serde(default = "default_targets_path")]
    pub targets: PathBuf,

    /// Target sections to process; empty means all
    #[serde(default)]
    pub sections: Vec<String>,
}

fn default_company_path() -> PathBuf {
    PathBuf::from("data/company_info.json")
}

fn default_targets_path() -> PathBuf {
    PathBuf::from("data/target_info.json")
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            company: default_company_path(),
            targets: default_targets_path(),
            sections: Vec::new(),
        }
    }
}

/// Per-stage retry budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default)]
    pub fetch: RetryConfig,

    #[serde(default = "default_generate_retry")]
    pub generate: RetryConfig,
}

fn default_generate_retry() -> RetryConfig {
    RetryConfig {
        delay_ms: 1500,
        ..RetryConfig::default()
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            fetch: RetryConfig::default(),
            generate: default_generate_retry(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub section: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(section: &'static str, message: impl Into<String>) -> Self {
        Self {
            section,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.section, self.message)
    }
}

impl std::error::Error for ValidationError {}

impl SyncConfig {
    /// Validate the entire configuration, collecting every violation.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.store.path.as_os_str().is_empty() {
            errors.push(ValidationError::new("store", "Store path cannot be empty"));
        }
        if self.input.company.as_os_str().is_empty() {
            errors.push(ValidationError::new("input", "Company file path cannot be empty"));
        }
        if self.input.targets.as_os_str().is_empty() {
            errors.push(ValidationError::new("input", "Target file path cannot be empty"));
        }
        if self.output.dir.as_os_str().is_empty() {
            errors.push(ValidationError::new("output", "Output directory cannot be empty"));
        }
        if let Err(e) = self.provider.validate() {
            errors.push(ValidationError::new("provider", e));
        }
        if let Err(e) = self.retry.fetch.validate() {
            errors.push(ValidationError::new("retry.fetch", e));
        }
        if let Err(e) = self.retry.generate.validate() {
            errors.push(ValidationError::new("retry.generate", e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate and fold all violations into one error.
    pub fn ensure_valid(&self) -> Result<(), ApiError> {
        self.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ApiError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })
    }

    /// Make relative paths absolute against `workspace_root`.
    pub fn resolve_paths(&mut self, workspace_root: &Path) {
        for path in [
            &mut self.store.path,
            &mut self.input.company,
            &mut self.input.targets,
            &mut self.output.dir,
            &mut self.logging.file,
        ] {
            if path.is_relative() {
                *path = workspace_root.join(&*path);
            }
        }
    }
}

/// Builds a [`SyncConfig`] from its layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load with every layer, paths resolved against `workspace_root`.
    pub fn load(workspace_root: &Path) -> Result<SyncConfig, ApiError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = builder.add_source(Self::environment());

        let mut config: SyncConfig = builder.build()?.try_deserialize()?;
        config.resolve_paths(workspace_root);
        Ok(config)
    }

    /// Load one explicit file (plus environment overrides). Paths are left as written.
    pub fn load_from_file(path: &Path) -> Result<SyncConfig, ApiError> {
        if !path.exists() {
            return Err(ApiError::ConfigError(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let config = merge::merge_policy::builder_with_defaults()?
            .add_source(File::from(path).format(FileFormat::Toml))
            .add_source(Self::environment())
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn global_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }

    pub fn workspace_config_path(workspace_root: &Path) -> PathBuf {
        sources::workspace_file::workspace_config_path(workspace_root)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    /// Defaults only, no files or environment.
    pub fn defaults() -> Result<SyncConfig, ApiError> {
        let config: Config = merge::merge_policy::builder_with_defaults()?.build()?;
        Ok(config.try_deserialize()?)
    }
}
