//! # Capsule Runtime
//!
//! Loading, configuration and execution of dynamic modules.
//!
//! ## Features
//!
//! - **Artifact Loading**: Discover a module and its generated variants in
//!   packaged artifacts
//! - **Dynamic Modules**: Configure a module once, then invoke processors and
//!   subscribe to sources by name
//! - **Retries**: Re-run failed operations under a simple or backoff policy
//! - **Host Configuration**: YAML, TOML or JSON with environment expansion
//!
//! ## Example
//!
//! ```rust,no_run
//! use capsule_runtime::*;
//! use capsule_api::{ParameterMap, Value};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # async fn example(catalog: Arc<TypeCatalog>) -> Result<()> {
//! let module = ArtifactLoader::new(catalog).load(&[PathBuf::from("echo-module.zip")])?;
//!
//! let mut overrides = ParameterMap::new();
//! overrides.insert("greeting".into(), Value::from("bye"));
//!
//! let dynamic = DynamicModule::new(module, overrides, DynamicModule::DEFAULT_RETRY_MAX).await?;
//! let reply = dynamic.invoke("echo", ParameterMap::new()).await?;
//! println!("{}", reply);
//!
//! dynamic.dispose().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod artifact;
pub mod artifact_loader;
pub mod catalog;
pub mod config;
pub mod dynamic;
pub mod error;
pub mod invoker;
mod lifecycle;
pub mod loader;
pub mod module;
pub mod registrar;
pub mod retry;
pub mod retrying;

pub use artifact_loader::{find_most_specific_subtype, ArtifactLoader};
pub use catalog::{ClassPath, TypeCatalog, TypeResolver};
pub use config::{launch, ConfigFormat, ConfigValue, HostConfig, LoggingConfig, RetryConfig};
pub use dynamic::DynamicModule;
pub use error::{Result, RuntimeError, TypeViolation};
pub use invoker::Invoker;
pub use loader::Loader;
pub use module::{Module, ModuleBuilder, Parameter, Processor, Source, Transformer};
pub use registrar::{Listener, Registrar};
pub use retry::{BackoffRetryPolicy, RetryCallback, RetryOutcome, RetryPolicy, SimpleRetryPolicy};
pub use retrying::RetryingDynamicModule;
