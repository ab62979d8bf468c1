//! Configuration management for crmq
//!
//! Settings are layered: built-in defaults, then the first configuration
//! file found in the standard locations, then `CRMQ_*` environment
//! variables, then command-line flags. Configuration files may also declare
//! additional field registries that `crmq parse` can validate against.

use crate::cli::Cli;
use crmq_dsl::{FieldRegistry, NestedControl, ParserOptions};
use crmq_sql::{DEFAULT_LIMIT, MAX_LIMIT};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use std::fs;
use std::path::{Path, PathBuf};

/// File names probed in every search directory, in priority order
pub const CONFIG_FILE_NAMES: [&str; 4] = ["crmq.toml", ".crmq.toml", "crmq.yaml", ".crmq.yaml"];

/// Errors raised while loading, validating or saving configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        /// File that was read
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// The file could not be written
    #[error("Failed to write config file {}: {source}", .path.display())]
    Write {
        /// File that was written
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
    /// TOML syntax or schema error
    #[error("Invalid TOML config: {0}")]
    Toml(String),
    /// YAML syntax or schema error
    #[error("Invalid YAML config: {0}")]
    Yaml(String),
    /// The configuration could not be serialised
    #[error("Failed to serialize config: {0}")]
    Serialize(String),
    /// Extension other than `.toml`, `.yaml` or `.yml`
    #[error("Unsupported config file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    /// Semantically invalid settings
    #[error("{0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main configuration structure for the crmq CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Parser limits
    pub parser: ParserOptions,
    /// Page sizes applied when compiling
    pub pagination: PaginationConfig,
    /// Output settings
    pub display: DisplayConfig,
    /// Diagnostics
    pub debug: DebugConfig,
    /// Extra field registries, by resource name
    pub registries: IndexMap<String, FieldRegistry>,
}

/// Page sizes applied when compiling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
    /// Page size used when a query has no `LIMIT`
    pub default_limit: u64,
    /// Cap applied to `LIMIT`
    pub max_limit: u64,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

/// Output settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Pretty-print JSON; unset means "when stdout is a terminal"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pretty: Option<bool>,
}

/// Diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Verbosity level (0 warn, 1 info, 2 debug, 3+ trace)
    pub verbosity: u8,
}

impl Config {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge_file(path)?;
        Ok(config)
    }

    /// Load configuration from the standard locations and the environment
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(config_path) = Self::find_config_file(None) {
            log::debug!("loading configuration from {}", config_path.display());
            config.merge_file(&config_path)?;
        }

        config.merge_env();
        Ok(config)
    }

    /// Directories searched for a configuration file, in priority order
    pub fn search_dirs(current_dir: Option<&Path>) -> Vec<PathBuf> {
        let current_dir = current_dir
            .map(Path::to_path_buf)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let mut search = vec![current_dir];
        if let Some(home) = dirs::home_dir() {
            search.push(home.join(".config").join("crmq"));
            search.push(home);
        }
        search.push(PathBuf::from("/etc/crmq"));
        search
    }

    /// Find a configuration file in the standard locations
    pub fn find_config_file(current_dir: Option<&Path>) -> Option<PathBuf> {
        Self::find_config_file_in(&Self::search_dirs(current_dir))
    }

    /// First existing configuration file in `dirs`
    pub fn find_config_file_in(dirs: &[PathBuf]) -> Option<PathBuf> {
        dirs.iter()
            .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
            .find(|path| path.is_file())
    }

    /// Merge configuration from a TOML or YAML file
    pub fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let file_config: Config = match extension(path) {
            "toml" => toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?,
            "yaml" | "yml" => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::Yaml(e.to_string()))?
            }
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        self.merge(file_config);
        Ok(())
    }

    /// Merge configuration from environment variables
    pub fn merge_env(&mut self) {
        self.merge_env_with_reader(|key| std::env::var(key).ok());
    }

    /// Merge configuration from environment variables with a custom reader
    ///
    /// Unparseable values fall back to the built-in default.
    pub fn merge_env_with_reader<F>(&mut self, env_reader: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = env_reader("CRMQ_MAX_DEPTH") {
            self.parser.max_depth = val.parse().unwrap_or_else(|_| {
                log::warn!("ignoring invalid CRMQ_MAX_DEPTH '{}'", val);
                ParserOptions::default().max_depth
            });
        }

        if let Some(val) = env_reader("CRMQ_NESTED_CONTROL") {
            self.parser.nested_control = match val.to_lowercase().as_str() {
                "ignore" => NestedControl::Ignore,
                "reject" => NestedControl::Reject,
                _ => {
                    log::warn!("ignoring invalid CRMQ_NESTED_CONTROL '{}'", val);
                    NestedControl::default()
                }
            };
        }

        if let Some(val) = env_reader("CRMQ_VERBOSITY") {
            self.debug.verbosity = val.parse().unwrap_or_else(|_| {
                log::warn!("ignoring invalid CRMQ_VERBOSITY '{}'", val);
                0
            });
        }

        if let Some(val) = env_reader("CRMQ_PRETTY") {
            self.display.pretty = Some(val != "0" && val.to_lowercase() != "false");
        }

        if let Some(val) = env_reader("CRMQ_MAX_LIMIT") {
            self.pagination.max_limit = val.parse().unwrap_or_else(|_| {
                log::warn!("ignoring invalid CRMQ_MAX_LIMIT '{}'", val);
                MAX_LIMIT
            });
        }
    }

    /// Merge another config into this one; only non-default values win
    fn merge(&mut self, other: Config) {
        let parser_defaults = ParserOptions::default();
        if other.parser.max_depth != parser_defaults.max_depth {
            self.parser.max_depth = other.parser.max_depth;
        }
        if other.parser.nested_control != parser_defaults.nested_control {
            self.parser.nested_control = other.parser.nested_control;
        }

        let pagination_defaults = PaginationConfig::default();
        if other.pagination.default_limit != pagination_defaults.default_limit {
            self.pagination.default_limit = other.pagination.default_limit;
        }
        if other.pagination.max_limit != pagination_defaults.max_limit {
            self.pagination.max_limit = other.pagination.max_limit;
        }

        if other.display.pretty.is_some() {
            self.display.pretty = other.display.pretty;
        }
        if other.debug.verbosity != 0 {
            self.debug.verbosity = other.debug.verbosity;
        }

        self.registries.extend(other.registries);
    }

    /// Apply command-line overrides
    pub fn apply_cli(&mut self, cli: &Cli) {
        if cli.verbose > 0 {
            self.debug.verbosity = cli.verbose;
        }
        if cli.compact {
            self.display.pretty = Some(false);
        }
        if let Some(max_depth) = cli.max_depth {
            self.parser.max_depth = max_depth;
        }
        if let Some(nested_control) = cli.nested_control {
            self.parser.nested_control = nested_control.into();
        }
        if let Some(max_limit) = cli.max_limit {
            self.pagination.max_limit = max_limit;
        }
    }

    /// Registry for a resource: configured registries first, then built-ins
    pub fn registry(&self, resource: &str) -> Option<FieldRegistry> {
        self.registries
            .get(resource)
            .cloned()
            .or_else(|| crmq_sql::builtin(resource).map(|r| r.registry))
    }

    /// Every resource name a registry is known for
    pub fn resource_names(&self) -> Vec<String> {
        let mut names: Vec<String> = crmq_sql::BUILTIN_RESOURCES
            .iter()
            .map(|name| (*name).to_string())
            .collect();
        for name in self.registries.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Save configuration to a TOML or YAML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = match extension(path) {
            "toml" => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            "yaml" | "yml" => {
                serde_yaml::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|ext| ext.to_str()).unwrap_or("")
}

/// Create a default config file template
pub fn create_default_config_file(path: &Path) -> Result<()> {
    Config::default().save(path)
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.parser.max_depth == 0 {
        return Err(ConfigError::Invalid(
            "Max depth must be greater than 0".to_string(),
        ));
    }

    if config.pagination.max_limit == 0 {
        return Err(ConfigError::Invalid(
            "Max limit must be greater than 0".to_string(),
        ));
    }

    if config.pagination.default_limit == 0
        || config.pagination.default_limit > config.pagination.max_limit
    {
        return Err(ConfigError::Invalid(format!(
            "Default limit must be between 1 and the max limit ({})",
            config.pagination.max_limit
        )));
    }

    for name in config.registries.keys() {
        if crmq_sql::BUILTIN_RESOURCES.contains(&name.as_str()) {
            log::warn!("configured registry '{}' shadows the built-in resource", name);
        }
    }

    Ok(())
}
