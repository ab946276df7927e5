//! Shared fixtures: a small catalog of generated types and artifact builders

#![allow(dead_code)]

use capsule_api::testing::{
    LifecycleProbe, MockCapability, MockConnectionManager, MockProcessor, MockResponse, MockSource,
};
use capsule_api::{
    ArgumentDescriptor, DataType, FieldDescriptor, OperationDescriptor, TypeDescriptor, Value,
};
use capsule_runtime::TypeCatalog;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::write::SimpleFileOptions;

/// Entries of the echo module artifact
pub const ECHO_ENTRIES: [&str; 6] = [
    "META-INF/MANIFEST.MF",
    "org/acme/EchoModule.class",
    "org/acme/EchoModuleLifecycleAdapter.class",
    "org/acme/EchoMessageProcessor.class",
    "org/acme/FlakyMessageProcessor.class",
    "org/acme/TicksMessageSource.class",
];

/// Catalog of the echo module
///
/// `greeting` is optional with default `hi`; processor `echo` replies with
/// the module's greeting and `flaky` fails `failures` times before replying
/// `done`. Source `ticks` emits 1, 2, 3.
pub fn echo_catalog(probe: LifecycleProbe, failures: usize) -> Arc<TypeCatalog> {
    let catalog = TypeCatalog::new();
    let processor_probe = probe.clone();
    let source_probe = probe;

    catalog
        .register_all([
            TypeDescriptor::builder("org.acme.EchoModule")
                .module("echo")
                .field(
                    FieldDescriptor::configurable("greeting", DataType::String)
                        .optional()
                        .default_value("hi"),
                )
                .operation(OperationDescriptor::processor("echo"))
                .operation(OperationDescriptor::processor("flaky"))
                .operation(
                    OperationDescriptor::source("ticks")
                        .argument(ArgumentDescriptor::callback()),
                )
                .build(),
            TypeDescriptor::builder("org.acme.EchoModuleLifecycleAdapter")
                .parent("org.acme.EchoModule")
                .capability_factory(|| {
                    Box::new(
                        MockCapability::new("org.acme.EchoModuleLifecycleAdapter").with_field(
                            "greeting",
                            DataType::String,
                            Value::Null,
                        ),
                    )
                })
                .build(),
            TypeDescriptor::builder("org.acme.EchoMessageProcessor")
                .processor_factory(move || {
                    Box::new(
                        MockProcessor::new("org.acme.EchoMessageProcessor")
                            .with_retry_max()
                            .responding(MockResponse::ModuleProperty("greeting".into()))
                            .with_probe(processor_probe.clone()),
                    )
                })
                .build(),
            TypeDescriptor::builder("org.acme.FlakyMessageProcessor")
                .processor_factory(move || {
                    Box::new(
                        MockProcessor::new("org.acme.FlakyMessageProcessor")
                            .responding(MockResponse::Fixed(Value::from("done")))
                            .failing(failures),
                    )
                })
                .build(),
            TypeDescriptor::builder("org.acme.TicksMessageSource")
                .source_factory(move || {
                    Box::new(
                        MockSource::new(
                            "org.acme.TicksMessageSource",
                            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
                        )
                        .with_probe(source_probe.clone()),
                    )
                })
                .build(),
        ])
        .expect("echo types register once");
    Arc::new(catalog)
}

/// Catalog of a connector with a required `apiKey` and a connection manager
pub fn vault_catalog() -> Arc<TypeCatalog> {
    let catalog = TypeCatalog::new();
    catalog
        .register_all([
            TypeDescriptor::builder("org.acme.VaultConnector")
                .connector("vault")
                .field(FieldDescriptor::configurable("apiKey", DataType::String))
                .operation(OperationDescriptor::processor("whoami"))
                .build(),
            TypeDescriptor::builder("org.acme.config.VaultConnectorConnectionIdentifierAdapter")
                .parent("org.acme.VaultConnector")
                .capability_factory(|| {
                    Box::new(
                        MockCapability::new(
                            "org.acme.config.VaultConnectorConnectionIdentifierAdapter",
                        )
                        .with_connection_management(),
                    )
                })
                .build(),
            TypeDescriptor::builder("org.acme.config.VaultConnectorConnectionManager")
                .connection_manager_factory(|| {
                    Box::new(
                        MockConnectionManager::new(
                            "org.acme.config.VaultConnectorConnectionManager",
                        )
                        .with_field("apiKey", DataType::String, Value::Null),
                    )
                })
                .build(),
            TypeDescriptor::builder("org.acme.config.WhoamiMessageProcessor")
                .processor_factory(|| {
                    Box::new(
                        MockProcessor::new("org.acme.config.WhoamiMessageProcessor")
                            .responding(MockResponse::ModuleProperty("username".into())),
                    )
                })
                .build(),
        ])
        .expect("vault types register once");
    Arc::new(catalog)
}

/// Entries of the vault connector artifact
pub const VAULT_ENTRIES: [&str; 4] = [
    "org/acme/VaultConnector.class",
    "org/acme/config/VaultConnectorConnectionIdentifierAdapter.class",
    "org/acme/config/VaultConnectorConnectionManager.class",
    "org/acme/config/WhoamiMessageProcessor.class",
];

/// Write a zip artifact holding empty `entries`
pub fn zip_artifact(dir: &Path, name: &str, entries: &[&str]) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).expect("create artifact");
    let mut writer = zip::ZipWriter::new(file);
    for entry in entries {
        writer
            .start_file(*entry, SimpleFileOptions::default())
            .expect("start entry");
        writer.write_all(b"").expect("write entry");
    }
    writer.finish().expect("finish artifact");
    path
}
