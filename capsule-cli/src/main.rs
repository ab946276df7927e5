//! Capsule CLI

use anyhow::{Context, Result};
use capsule_runtime::artifact;
use capsule_runtime::artifact_loader::CONNECTION_MANAGER_TYPE_SUFFIX;
use capsule_runtime::{ArtifactLoader, ClassPath, HostConfig, LoggingConfig, TypeCatalog};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "capsule")]
#[command(about = "Capsule dynamic module host", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the host configuration file
    #[arg(short, long, global = true, default_value = "capsule.yaml", env = "CAPSULE_CONFIG")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error), overrides the configuration
    #[arg(short, long, global = true, env = "CAPSULE_LOG")]
    log_level: Option<String>,

    /// Log output format, overrides the configuration
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of an artifact
    Entries {
        /// Artifact archive or exploded directory
        artifact: PathBuf,
    },

    /// List candidate module types and their generated variants
    Candidates {
        /// Artifact archive or exploded directory
        artifact: PathBuf,
    },

    /// Validate the host configuration file
    Validate,

    /// Show version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let configured = configured_logging(&cli.config);
    let (level, format) = resolve_logging(
        cli.log_level.as_deref(),
        cli.log_format,
        configured.as_ref(),
    );
    init_tracing(&level, format)?;

    match cli.command {
        Commands::Entries { artifact } => {
            let entries = artifact::entry_names(&artifact)
                .with_context(|| format!("Failed to read {}", artifact.display()))?;
            for entry in &entries {
                println!("{}", entry);
            }
            tracing::debug!(artifact = %artifact.display(), entries = entries.len(), "Listed entries");
            Ok(())
        }

        Commands::Candidates { artifact } => {
            let class_path = ClassPath::new(Arc::new(TypeCatalog::new()), &[artifact.clone()])
                .with_context(|| format!("Failed to read {}", artifact.display()))?;
            let loader = ArtifactLoader::new(Arc::new(TypeCatalog::new()));

            let candidates = loader.candidate_entries(&class_path);
            if candidates.is_empty() {
                println!("No candidate module types in {}", artifact.display());
                return Ok(());
            }

            for entry in candidates {
                let type_name = artifact::extract_type_name(entry);
                println!("{}", type_name);

                for variant in variant_entries(class_path.entries(), entry) {
                    println!("  {}", artifact::extract_type_name(variant));
                }
            }
            Ok(())
        }

        Commands::Validate => {
            let config = cli.config;
            tracing::info!("Validating configuration: {}", config.display());

            match HostConfig::from_file(&config) {
                Ok(cfg) => {
                    tracing::info!("✓ Configuration is valid");
                    tracing::info!("  Artifacts: {}", cfg.artifacts.len());
                    for path in &cfg.artifacts {
                        match artifact::entry_names(path) {
                            Ok(entries) => {
                                tracing::info!("    {} ({} entries)", path.display(), entries.len())
                            }
                            Err(e) => tracing::warn!("    {} is not readable: {}", path.display(), e),
                        }
                    }
                    tracing::info!("  Retry max: {}", cfg.retry_max);
                    tracing::info!("  Parameters: {}", cfg.parameters.len());
                    Ok(())
                }
                Err(e) => {
                    tracing::error!("✗ Configuration validation failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Version => {
            println!("Capsule dynamic module host");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(())
        }
    }
}

/// Logging section of the configuration file, when it exists and loads
fn configured_logging(path: &Path) -> Option<LoggingConfig> {
    if !path.exists() {
        return None;
    }
    HostConfig::from_file(path).ok().map(|config| config.logging)
}

/// Command-line flags win over the configuration file
fn resolve_logging(
    level: Option<&str>,
    format: Option<LogFormat>,
    configured: Option<&LoggingConfig>,
) -> (String, LogFormat) {
    let defaults = LoggingConfig::default();
    let configured = configured.unwrap_or(&defaults);

    let level = level.unwrap_or(configured.level.as_str()).to_string();
    let format = format
        .or_else(|| LogFormat::from_str(&configured.format, true).ok())
        .unwrap_or(LogFormat::Text);
    (level, format)
}

/// Type entries generated for `candidate`, connection managers excluded
fn variant_entries<'a>(entries: &'a [String], candidate: &str) -> Vec<&'a str> {
    let type_name = artifact::extract_type_name(candidate);
    let simple_name = type_name.rsplit('.').next().unwrap_or(&type_name);
    let manager_suffix = format!("{}{}", CONNECTION_MANAGER_TYPE_SUFFIX, artifact::TYPE_ENTRY_EXTENSION);

    entries
        .iter()
        .map(String::as_str)
        .filter(|e| {
            *e != candidate
                && artifact::is_type_entry(e)
                && e.contains(simple_name)
                && !e.ends_with(&manager_suffix)
        })
        .collect()
}

fn init_tracing(level: &str, format: LogFormat) -> Result<()> {
    let filter = match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    };
    let filter = EnvFilter::from_default_env().add_directive(filter.into());

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_level(true),
            )
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().json())
            .with(filter)
            .init(),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_configured_logging() {
        let configured = LoggingConfig {
            level: "debug".to_string(),
            format: "json".to_string(),
        };

        assert_eq!(
            resolve_logging(None, None, Some(&configured)),
            ("debug".to_string(), LogFormat::Json)
        );
        assert_eq!(
            resolve_logging(Some("warn"), Some(LogFormat::Text), Some(&configured)),
            ("warn".to_string(), LogFormat::Text)
        );
        assert_eq!(
            resolve_logging(None, None, None),
            ("info".to_string(), LogFormat::Text)
        );
    }

    #[test]
    fn test_variants_exclude_connection_managers() {
        let entries: Vec<String> = [
            "org/acme/MailConnector.class",
            "org/acme/config/MailConnectorLifecycleAdapter.class",
            "org/acme/config/MailConnectorConnectionManager.class",
            "org/acme/config/SendMessageProcessor.class",
            "META-INF/MailConnector.txt",
        ]
        .iter()
        .map(|e| e.to_string())
        .collect();

        assert_eq!(
            variant_entries(&entries, "org/acme/MailConnector.class"),
            vec!["org/acme/config/MailConnectorLifecycleAdapter.class"]
        );
    }
}
