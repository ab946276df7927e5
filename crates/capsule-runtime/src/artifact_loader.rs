//! Module loading from packaged artifacts
//!
//! The first artifact is scanned for candidate module types (entries ending
//! in `Module` or `Connector`). The first candidate carrying a module
//! annotation is the module type; the code generator derives variants of it
//! (lifecycle adapters, connection identifiers, ...) and the most derived
//! one is what gets instantiated.

use crate::artifact;
use crate::catalog::{ClassPath, TypeCatalog, TypeResolver};
use crate::error::{Result, RuntimeError};
use crate::loader::Loader;
use crate::module::Module;
use capsule_api::{Capability, ConnectionManager, TypeDescriptor};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

const MODULE_TYPE_SUFFIX: &str = "Module";
const CONNECTOR_TYPE_SUFFIX: &str = "Connector";
/// Type name suffix of generated connection managers
pub const CONNECTION_MANAGER_TYPE_SUFFIX: &str = "ConnectionManager";

/// Loads modules from artifact locations
#[derive(Debug, Clone)]
pub struct ArtifactLoader {
    catalog: Arc<TypeCatalog>,
}

impl ArtifactLoader {
    /// Create a loader resolving types from `catalog`
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        Self { catalog }
    }

    /// Load the first module found in `artifacts`
    pub fn load(&self, artifacts: &[PathBuf]) -> Result<Module> {
        let class_path = Arc::new(ClassPath::new(self.catalog.clone(), artifacts)?);
        let module_type = self.find_module_type(&class_path)?;

        let variants = self.find_module_subtypes(&class_path, &module_type);
        let variant = find_most_specific_subtype(class_path.as_ref(), &variants).ok_or_else(|| {
            RuntimeError::load(format!(
                "Failed to find a generated variant of <{}>",
                module_type.name()
            ))
        })?;
        info!(
            module_type = %module_type.name(),
            variant = %variant.name(),
            candidates = variants.len(),
            "Selected module variant"
        );

        let capability = variant.new_capability().ok_or_else(|| {
            RuntimeError::load(format!("Failed to instantiate <{}>", variant.name()))
        })?;

        let connection_manager = if capability.is_capable_of(Capability::ConnectionManagement) {
            Some(self.load_connection_manager(&class_path, &variant, &module_type)?)
        } else {
            None
        };

        Loader::new(class_path).load(capability, connection_manager)
    }

    /// Entries of `class_path` that may denote a module type
    pub fn candidate_entries<'a>(&self, class_path: &'a ClassPath) -> Vec<&'a str> {
        class_path
            .entries()
            .iter()
            .map(String::as_str)
            .filter(|e| {
                e.ends_with(&format!("{}{}", MODULE_TYPE_SUFFIX, artifact::TYPE_ENTRY_EXTENSION))
                    || e.ends_with(&format!(
                        "{}{}",
                        CONNECTOR_TYPE_SUFFIX,
                        artifact::TYPE_ENTRY_EXTENSION
                    ))
            })
            .collect()
    }

    /// First candidate carrying a module annotation
    ///
    /// Candidates that cannot be resolved or carry no annotation are skipped.
    pub fn find_module_type(&self, class_path: &ClassPath) -> Result<Arc<TypeDescriptor>> {
        let candidates = self.candidate_entries(class_path);
        if candidates.is_empty() {
            return Err(RuntimeError::load(format!(
                "Failed to find a potential module type among {} entries of <{}>",
                class_path.entries().len(),
                class_path.module_artifact().display()
            )));
        }

        for entry in candidates {
            let name = artifact::extract_type_name(entry);
            match class_path.resolve(&name) {
                Some(descriptor) if descriptor.annotation().is_some() => {
                    debug!(module_type = %name, "Found module type");
                    return Ok(descriptor);
                }
                Some(_) => warn!(type_name = %name, "Skipping invalid module"),
                None => warn!(type_name = %name, "Skipping unresolvable module candidate"),
            }
        }

        Err(RuntimeError::load(format!(
            "Failed to find a module type in <{}>",
            class_path.module_artifact().display()
        )))
    }

    /// Generated subtypes of `module_type`, in entry order
    ///
    /// Only entries whose name contains the module type's simple name are
    /// considered.
    pub fn find_module_subtypes(
        &self,
        class_path: &ClassPath,
        module_type: &TypeDescriptor,
    ) -> Vec<Arc<TypeDescriptor>> {
        let simple_name = module_type.simple_name();
        class_path
            .entries()
            .iter()
            .filter(|e| artifact::is_type_entry(e) && e.contains(simple_name))
            .filter_map(|e| class_path.resolve(&artifact::extract_type_name(e)))
            .filter(|d| class_path.is_subtype_of(d, module_type.name()))
            .collect()
    }

    fn load_connection_manager(
        &self,
        class_path: &ClassPath,
        variant: &TypeDescriptor,
        module_type: &TypeDescriptor,
    ) -> Result<Box<dyn ConnectionManager>> {
        let name = format!(
            "{}.{}{}",
            variant.scope(),
            module_type.simple_name(),
            CONNECTION_MANAGER_TYPE_SUFFIX
        );
        let descriptor = class_path.resolve(&name).ok_or_else(|| {
            RuntimeError::load(format!("Failed to load connection manager type <{}>", name))
        })?;
        descriptor.new_connection_manager().ok_or_else(|| {
            RuntimeError::load(format!("Failed to instantiate connection manager <{}>", name))
        })
    }
}

/// Subtype with the most ancestors; ties keep the earliest
pub fn find_most_specific_subtype(
    resolver: &dyn TypeResolver,
    subtypes: &[Arc<TypeDescriptor>],
) -> Option<Arc<TypeDescriptor>> {
    let mut best: Option<(usize, &Arc<TypeDescriptor>)> = None;
    for subtype in subtypes {
        let depth = resolver.ancestors(subtype).len();
        if best.map_or(true, |(best_depth, _)| depth > best_depth) {
            best = Some((depth, subtype));
        }
    }
    best.map(|(_, d)| d.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsule_api::testing::{MockCapability, MockConnectionManager};
    use capsule_api::{DataType, FieldDescriptor};
    use std::fs;
    use std::path::Path;

    fn artifact(dir: &Path, entries: &[&str]) -> PathBuf {
        for entry in entries {
            let path = dir.join(entry);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"").unwrap();
        }
        dir.to_path_buf()
    }

    fn register_mail(catalog: &TypeCatalog) {
        catalog
            .register_all([
                TypeDescriptor::builder("org.acme.MailConnector")
                    .connector("mail")
                    .field(FieldDescriptor::configurable("host", DataType::String))
                    .build(),
                TypeDescriptor::builder("org.acme.config.MailConnectorLifecycleAdapter")
                    .parent("org.acme.MailConnector")
                    .capability_factory(|| {
                        Box::new(MockCapability::new("org.acme.config.MailConnectorLifecycleAdapter"))
                    })
                    .build(),
                TypeDescriptor::builder("org.acme.config.MailConnectorConnectionIdentifierAdapter")
                    .parent("org.acme.config.MailConnectorLifecycleAdapter")
                    .capability_factory(|| {
                        Box::new(
                            MockCapability::new(
                                "org.acme.config.MailConnectorConnectionIdentifierAdapter",
                            )
                            .with_connection_management(),
                        )
                    })
                    .build(),
                TypeDescriptor::builder("org.acme.config.MailConnectorConnectionManager")
                    .connection_manager_factory(|| {
                        Box::new(MockConnectionManager::new(
                            "org.acme.config.MailConnectorConnectionManager",
                        ))
                    })
                    .build(),
            ])
            .unwrap();
    }

    const MAIL_ENTRIES: [&str; 5] = [
        "META-INF/MANIFEST.MF",
        "org/acme/MailConnector.class",
        "org/acme/config/MailConnectorConnectionIdentifierAdapter.class",
        "org/acme/config/MailConnectorConnectionManager.class",
        "org/acme/config/MailConnectorLifecycleAdapter.class",
    ];

    #[test]
    fn test_load_picks_most_specific_variant() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact(dir.path(), &MAIL_ENTRIES);
        let catalog = Arc::new(TypeCatalog::new());
        register_mail(&catalog);

        let module = ArtifactLoader::new(catalog).load(&[path]).unwrap();
        assert_eq!(module.name(), "mail");
        assert!(module.connection_manager().is_some());
        assert_eq!(module.parameters()[0].name, "host");
    }

    #[test]
    fn test_most_specific_tie_keeps_first() {
        let catalog = TypeCatalog::new();
        catalog
            .register_all([
                TypeDescriptor::builder("a.Base").build(),
                TypeDescriptor::builder("a.First").parent("a.Base").build(),
                TypeDescriptor::builder("a.Second").parent("a.Base").build(),
            ])
            .unwrap();
        let subtypes = vec![
            catalog.resolve("a.First").unwrap(),
            catalog.resolve("a.Second").unwrap(),
        ];
        let best = find_most_specific_subtype(&catalog, &subtypes).unwrap();
        assert_eq!(best.name(), "a.First");
        assert!(find_most_specific_subtype(&catalog, &[]).is_none());
    }

    #[test]
    fn test_invalid_candidates_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut entries = vec!["org/acme/HelperModule.class"];
        entries.extend(MAIL_ENTRIES);
        let path = artifact(dir.path(), &entries);

        let catalog = Arc::new(TypeCatalog::new());
        register_mail(&catalog);
        catalog
            .register(TypeDescriptor::builder("org.acme.HelperModule").build())
            .unwrap();

        let loader = ArtifactLoader::new(catalog.clone());
        let class_path = ClassPath::new(catalog, &[path]).unwrap();
        assert_eq!(loader.candidate_entries(&class_path).len(), 2);
        let module_type = loader.find_module_type(&class_path).unwrap();
        assert_eq!(module_type.name(), "org.acme.MailConnector");

        let variants = loader.find_module_subtypes(&class_path, &module_type);
        let names: Vec<_> = variants.iter().map(|d| d.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "org.acme.config.MailConnectorConnectionIdentifierAdapter",
                "org.acme.config.MailConnectorLifecycleAdapter",
            ]
        );
    }

    #[test]
    fn test_no_candidate_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = artifact(dir.path(), &["org/acme/Helper.class"]);
        let err = ArtifactLoader::new(Arc::new(TypeCatalog::new()))
            .load(&[path])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Load(_)));
    }

    #[test]
    fn test_missing_connection_manager_fails() {
        let dir = tempfile::tempdir().unwrap();
        let entries: Vec<_> = MAIL_ENTRIES
            .iter()
            .copied()
            .filter(|e| !e.ends_with("ConnectionManager.class"))
            .collect();
        let path = artifact(dir.path(), &entries);
        let catalog = Arc::new(TypeCatalog::new());
        register_mail(&catalog);

        let err = ArtifactLoader::new(catalog).load(&[path]).unwrap_err();
        assert!(err.to_string().contains("MailConnectorConnectionManager"));
    }
}
