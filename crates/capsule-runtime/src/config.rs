//! Host configuration
//!
//! A host configuration names the artifacts to load, the module parameter
//! overrides and the retry behaviour. It can be written in YAML, TOML or
//! JSON; `${VAR}` and `${VAR:-default}` are expanded from the environment
//! before parsing.

use crate::artifact_loader::ArtifactLoader;
use crate::catalog::TypeCatalog;
use crate::dynamic::DynamicModule;
use crate::error::{Result, RuntimeError};
use crate::module::Module;
use crate::retry::{BackoffRetryPolicy, RetryPolicy, SimpleRetryPolicy};
use crate::retrying::RetryingDynamicModule;
use capsule_api::{ConverterRegistry, DataType, ParameterMap, Value};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| RuntimeError::config("Unable to detect config format"))?;

        match ext {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            _ => Err(RuntimeError::config(format!("Unsupported config format: {}", ext))),
        }
    }
}

/// Host configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Artifact locations; the first one holds the module
    pub artifacts: Vec<PathBuf>,

    /// Retry budget pushed onto processor handles
    #[serde(default = "default_retry_max")]
    pub retry_max: u32,

    /// Retry policy for invocations
    #[serde(default)]
    pub retry: RetryConfig,

    /// Module parameter overrides
    #[serde(default)]
    pub parameters: BTreeMap<String, ConfigValue>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "policy", rename_all = "lowercase")]
pub enum RetryConfig {
    /// Fixed pause between attempts
    Simple {
        /// Attempt budget, `retry_max` when absent
        #[serde(default)]
        max_attempts: Option<u32>,

        /// Pause between attempts
        #[serde(default = "default_frequency", with = "humantime_serde")]
        frequency: Duration,
    },

    /// Exponentially growing pause between attempts
    Backoff {
        /// Attempt budget, `retry_max` when absent
        #[serde(default)]
        max_attempts: Option<u32>,

        /// Pause after the first failure
        #[serde(default = "default_initial_delay", with = "humantime_serde")]
        initial_delay: Duration,

        /// Growth factor of the pause
        #[serde(default = "default_multiplier")]
        multiplier: f64,

        /// Upper bound of the pause
        #[serde(default = "default_max_delay", with = "humantime_serde")]
        max_delay: Duration,
    },
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::Simple {
            max_attempts: None,
            frequency: default_frequency(),
        }
    }
}

/// Scalar parameter value as written in a configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    String(String),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(b) => write!(f, "{}", b),
            ConfigValue::Int(i) => write!(f, "{}", i),
            ConfigValue::Float(x) => write!(f, "{}", x),
            ConfigValue::String(s) => write!(f, "{}", s),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, text)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_retry_max() -> u32 {
    DynamicModule::DEFAULT_RETRY_MAX
}

fn default_frequency() -> Duration {
    SimpleRetryPolicy::DEFAULT_FREQUENCY
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl HostConfig {
    /// Load and validate a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            RuntimeError::config(format!("Failed to read config file <{}>: {}", path.display(), e))
        })?;
        Self::parse(&content, ConfigFormat::from_path(path)?)
    }

    /// Parse and validate configuration text
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        let config: HostConfig = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(&expanded)
                .map_err(|e| RuntimeError::config(format!("Failed to parse YAML: {}", e)))?,
            ConfigFormat::Toml => toml::from_str(&expanded)
                .map_err(|e| RuntimeError::config(format!("Failed to parse TOML: {}", e)))?,
            ConfigFormat::Json => serde_json::from_str(&expanded)
                .map_err(|e| RuntimeError::config(format!("Failed to parse JSON: {}", e)))?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.artifacts.is_empty() {
            return Err(RuntimeError::config("At least one artifact is required"));
        }
        if self.retry_max == 0 {
            return Err(RuntimeError::config("retry_max must be > 0"));
        }

        match &self.retry {
            RetryConfig::Simple { max_attempts, .. } => {
                if *max_attempts == Some(0) {
                    return Err(RuntimeError::config("retry.max_attempts must be > 0"));
                }
            }
            RetryConfig::Backoff {
                max_attempts,
                initial_delay,
                multiplier,
                max_delay,
            } => {
                if *max_attempts == Some(0) {
                    return Err(RuntimeError::config("retry.max_attempts must be > 0"));
                }
                if *multiplier < 1.0 {
                    return Err(RuntimeError::config("retry.multiplier must be >= 1"));
                }
                if max_delay < initial_delay {
                    return Err(RuntimeError::config(
                        "retry.max_delay must not be shorter than retry.initial_delay",
                    ));
                }
            }
        }

        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(RuntimeError::config(format!(
                "Invalid log format: {} (must be text or json)",
                other
            ))),
        }
    }

    /// Build the configured retry policy
    pub fn build_policy(&self) -> Arc<dyn RetryPolicy> {
        match &self.retry {
            RetryConfig::Simple {
                max_attempts,
                frequency,
            } => Arc::new(SimpleRetryPolicy::new(
                max_attempts.unwrap_or(self.retry_max),
                *frequency,
            )),
            RetryConfig::Backoff {
                max_attempts,
                initial_delay,
                multiplier,
                max_delay,
            } => Arc::new(BackoffRetryPolicy::new(
                max_attempts.unwrap_or(self.retry_max),
                *initial_delay,
                *multiplier,
                *max_delay,
            )),
        }
    }

    /// Coerce configured parameters to the types `module` declares
    ///
    /// Keys the module does not declare are skipped with a warning.
    pub fn overrides_for(&self, module: &Module) -> Result<ParameterMap> {
        let converters = ConverterRegistry::with_defaults();
        let mut overrides = ParameterMap::new();

        for (name, value) in &self.parameters {
            let Some(parameter) = module.find_parameter(name) else {
                warn!(module = %module.name(), parameter = %name, "Skipping unknown parameter");
                continue;
            };

            let text = Value::from(value.to_string());
            let converted = match converters.lookup(&DataType::String, &parameter.data_type) {
                Some(converter) => converter.convert(&text).map_err(|e| {
                    RuntimeError::config(format!(
                        "Parameter <{}> is not a valid {}: {}",
                        name, parameter.data_type, e
                    ))
                })?,
                None => {
                    return Err(RuntimeError::config(format!(
                        "Parameter <{}> of type {} cannot be configured from a file",
                        name, parameter.data_type
                    )))
                }
            };
            overrides.insert(name.clone(), converted);
        }
        Ok(overrides)
    }
}

/// Expand `${VAR}` and `${VAR:-default}` from the environment
fn expand_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| RuntimeError::config(format!("Invalid regex: {}", e)))?;

    let mut result = String::new();
    let mut last_match = 0;

    for cap in re.captures_iter(content) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        let value = match (env::var(var_name.as_str()), cap.get(3)) {
            (Ok(value), _) => value,
            (Err(_), Some(default)) => default.as_str().to_string(),
            (Err(_), None) => {
                return Err(RuntimeError::config(format!(
                    "Environment variable '{}' not set and no default provided",
                    var_name.as_str()
                )))
            }
        };

        result.push_str(&content[last_match..full_match.start()]);
        result.push_str(&value);
        last_match = full_match.end();
    }

    result.push_str(&content[last_match..]);
    Ok(result)
}

/// Load the configured module and start it under the configured policy
pub async fn launch(catalog: Arc<TypeCatalog>, config: &HostConfig) -> Result<RetryingDynamicModule> {
    config.validate()?;
    let module = ArtifactLoader::new(catalog).load(&config.artifacts)?;
    let overrides = config.overrides_for(&module)?;

    info!(
        module = %module.name(),
        overrides = overrides.len(),
        retry_max = config.retry_max,
        "Launching module"
    );
    RetryingDynamicModule::new(module, overrides, config.retry_max, config.build_policy()).await
}
