//! Type catalog and resolution
//!
//! The [`TypeCatalog`] holds every type descriptor the host was linked with.
//! A [`ClassPath`] narrows it down to the types listed by a set of
//! artifacts, which is what a module loaded from those artifacts can see.

use crate::artifact::{self, entry_names};
use crate::error::{Result, RuntimeError};
use capsule_api::{FieldDescriptor, ModuleAnnotation, OperationDescriptor, TypeDescriptor};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Resolves type names to descriptors
///
/// Only [`resolve`](TypeResolver::resolve) is required; the hierarchy walks
/// are provided on top of it.
pub trait TypeResolver: Send + Sync + fmt::Debug {
    /// Descriptor of the type named `name`, if visible
    fn resolve(&self, name: &str) -> Option<Arc<TypeDescriptor>>;

    /// Ancestors of `descriptor`, nearest first
    ///
    /// The walk stops at the first parent that cannot be resolved.
    fn ancestors(&self, descriptor: &TypeDescriptor) -> Vec<Arc<TypeDescriptor>> {
        let mut ancestors = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(descriptor.name().to_string());

        let mut next = descriptor.parent().map(str::to_string);
        while let Some(name) = next {
            if !seen.insert(name.clone()) {
                break;
            }
            match self.resolve(&name) {
                Some(parent) => {
                    next = parent.parent().map(str::to_string);
                    ancestors.push(parent);
                }
                None => break,
            }
        }
        ancestors
    }

    /// Module annotation declared on `descriptor` or inherited from an ancestor
    fn annotation(&self, descriptor: &TypeDescriptor) -> Option<ModuleAnnotation> {
        descriptor.annotation().cloned().or_else(|| {
            self.ancestors(descriptor)
                .iter()
                .find_map(|a| a.annotation().cloned())
        })
    }

    /// Every field of `descriptor`, inherited ones first
    ///
    /// A field redeclared by a subtype replaces the ancestor's in place.
    fn all_fields(&self, descriptor: &TypeDescriptor) -> Vec<FieldDescriptor> {
        let mut chain = self.ancestors(descriptor);
        chain.reverse();

        let mut fields: Vec<FieldDescriptor> = Vec::new();
        for field in chain
            .iter()
            .flat_map(|d| d.fields().iter())
            .chain(descriptor.fields().iter())
        {
            match fields.iter_mut().find(|f| f.name == field.name) {
                Some(slot) => *slot = field.clone(),
                None => fields.push(field.clone()),
            }
        }
        fields
    }

    /// Every operation of `descriptor`, inherited ones first
    ///
    /// An operation overridden by a subtype replaces the ancestor's in place.
    fn all_operations(&self, descriptor: &TypeDescriptor) -> Vec<OperationDescriptor> {
        let mut chain = self.ancestors(descriptor);
        chain.reverse();

        let mut operations: Vec<OperationDescriptor> = Vec::new();
        for operation in chain
            .iter()
            .flat_map(|d| d.operations().iter())
            .chain(descriptor.operations().iter())
        {
            match operations.iter_mut().find(|o| o.method == operation.method) {
                Some(slot) => *slot = operation.clone(),
                None => operations.push(operation.clone()),
            }
        }
        operations
    }

    /// Whether `descriptor` strictly derives from the type named `ancestor`
    fn is_subtype_of(&self, descriptor: &TypeDescriptor, ancestor: &str) -> bool {
        self.ancestors(descriptor)
            .iter()
            .any(|a| a.name() == ancestor)
    }
}

/// Registry of every type descriptor the host knows about
#[derive(Debug, Default)]
pub struct TypeCatalog {
    types: DashMap<String, Arc<TypeDescriptor>>,
}

impl TypeCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor
    pub fn register(&self, descriptor: TypeDescriptor) -> Result<()> {
        match self.types.entry(descriptor.name().to_string()) {
            Entry::Occupied(entry) => Err(RuntimeError::load(format!(
                "Type <{}> is already registered",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                debug!(type_name = %entry.key(), "Registering type descriptor");
                entry.insert(Arc::new(descriptor));
                Ok(())
            }
        }
    }

    /// Register every descriptor, stopping at the first duplicate
    pub fn register_all(&self, descriptors: impl IntoIterator<Item = TypeDescriptor>) -> Result<()> {
        descriptors.into_iter().try_for_each(|d| self.register(d))
    }

    /// Remove a descriptor
    pub fn unregister(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.remove(name).map(|(_, d)| d)
    }

    /// Check if a type is registered
    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Sorted names of every registered type
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.types.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

impl TypeResolver for TypeCatalog {
    fn resolve(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        self.types.get(name).map(|e| e.value().clone())
    }
}

/// Type-resolution context built from artifact locations
///
/// A type resolves only if it is registered in the catalog and listed as an
/// entry of one of the artifacts.
pub struct ClassPath {
    catalog: Arc<TypeCatalog>,
    artifacts: Vec<PathBuf>,
    entries: Vec<String>,
    visible: HashSet<String>,
}

impl ClassPath {
    /// Build a class path over `artifacts`
    ///
    /// The entries of the first artifact are kept in order, they are where
    /// module types are looked for.
    pub fn new(catalog: Arc<TypeCatalog>, artifacts: &[PathBuf]) -> Result<Self> {
        let first = artifacts
            .first()
            .ok_or_else(|| RuntimeError::load("No artifact location given"))?;
        let entries = entry_names(first)?;

        let mut visible: HashSet<String> = entries
            .iter()
            .filter(|e| artifact::is_type_entry(e))
            .map(|e| artifact::extract_type_name(e))
            .collect();
        for path in &artifacts[1..] {
            visible.extend(
                entry_names(path)?
                    .iter()
                    .filter(|e| artifact::is_type_entry(e))
                    .map(|e| artifact::extract_type_name(e)),
            );
        }

        info!(
            artifact = %first.display(),
            artifacts = artifacts.len(),
            visible_types = visible.len(),
            "Built class path"
        );

        Ok(Self {
            catalog,
            artifacts: artifacts.to_vec(),
            entries,
            visible,
        })
    }

    /// Entries of the first artifact, in archive order
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Artifact locations
    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// First artifact location
    pub fn module_artifact(&self) -> &Path {
        &self.artifacts[0]
    }

    /// Whether the artifacts list the type named `name`
    pub fn is_listed(&self, name: &str) -> bool {
        self.visible.contains(name)
    }
}

impl TypeResolver for ClassPath {
    fn resolve(&self, name: &str) -> Option<Arc<TypeDescriptor>> {
        if !self.visible.contains(name) {
            return None;
        }
        self.catalog.resolve(name)
    }
}

impl fmt::Debug for ClassPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassPath")
            .field("artifacts", &self.artifacts)
            .field("entries", &self.entries.len())
            .field("visible", &self.visible.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsule_api::{DataType, ModuleKind};

    fn hierarchy() -> TypeCatalog {
        let catalog = TypeCatalog::new();
        catalog
            .register_all([
                TypeDescriptor::builder("org.acme.EchoModule")
                    .module("echo")
                    .field(FieldDescriptor::configurable("greeting", DataType::String))
                    .field(FieldDescriptor::new("cache", DataType::Map))
                    .operation(OperationDescriptor::processor("echo"))
                    .build(),
                TypeDescriptor::builder("org.acme.config.EchoModuleLifecycleAdapter")
                    .parent("org.acme.EchoModule")
                    .field(FieldDescriptor::configurable("greeting", DataType::Url))
                    .field(FieldDescriptor::new("state", DataType::String))
                    .operation(OperationDescriptor::plain("initialise"))
                    .build(),
                TypeDescriptor::builder("org.acme.config.EchoModuleConnectionIdentifierAdapter")
                    .parent("org.acme.config.EchoModuleLifecycleAdapter")
                    .operation(OperationDescriptor::processor("echo").named("shout"))
                    .build(),
            ])
            .unwrap();
        catalog
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let catalog = hierarchy();
        let err = catalog
            .register(TypeDescriptor::builder("org.acme.EchoModule").build())
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Load(_)));
        assert_eq!(catalog.len(), 3);

        let kept = catalog.resolve("org.acme.EchoModule").unwrap();
        assert_eq!(kept.annotation().map(|a| a.name.as_str()), Some("echo"));
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let catalog = hierarchy();
        let leaf = catalog
            .resolve("org.acme.config.EchoModuleConnectionIdentifierAdapter")
            .unwrap();

        let names: Vec<_> = catalog
            .ancestors(&leaf)
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["org.acme.config.EchoModuleLifecycleAdapter", "org.acme.EchoModule"]
        );
        assert!(catalog.is_subtype_of(&leaf, "org.acme.EchoModule"));

        let root = catalog.resolve("org.acme.EchoModule").unwrap();
        assert!(!catalog.is_subtype_of(&root, "org.acme.EchoModule"));
    }

    #[test]
    fn test_inherited_annotation() {
        let catalog = hierarchy();
        let leaf = catalog
            .resolve("org.acme.config.EchoModuleConnectionIdentifierAdapter")
            .unwrap();
        let annotation = catalog.annotation(&leaf).unwrap();
        assert_eq!(annotation.kind, ModuleKind::Module);
        assert_eq!(annotation.name, "echo");
    }

    #[test]
    fn test_subtype_shadows_fields_and_operations() {
        let catalog = hierarchy();
        let leaf = catalog
            .resolve("org.acme.config.EchoModuleConnectionIdentifierAdapter")
            .unwrap();

        let fields = catalog.all_fields(&leaf);
        let names: Vec<_> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["greeting", "cache", "state"]);
        assert_eq!(fields[0].data_type, DataType::Url);

        let operations = catalog.all_operations(&leaf);
        assert_eq!(operations.len(), 2);
        assert_eq!(
            operations[0],
            OperationDescriptor::processor("echo").named("shout")
        );
    }

    #[test]
    fn test_cyclic_parents_terminate() {
        let catalog = TypeCatalog::new();
        catalog
            .register_all([
                TypeDescriptor::builder("a.A").parent("a.B").build(),
                TypeDescriptor::builder("a.B").parent("a.A").build(),
            ])
            .unwrap();
        let a = catalog.resolve("a.A").unwrap();
        assert_eq!(catalog.ancestors(&a).len(), 1);
    }

    #[test]
    fn test_class_path_restricts_to_listed_types() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("org/acme")).unwrap();
        std::fs::write(dir.path().join("org/acme/EchoModule.class"), b"").unwrap();

        let catalog = Arc::new(hierarchy());
        let class_path = ClassPath::new(catalog, &[dir.path().to_path_buf()]).unwrap();

        assert_eq!(class_path.entries(), ["org/acme/EchoModule.class"]);
        assert!(class_path.resolve("org.acme.EchoModule").is_some());
        assert!(class_path
            .resolve("org.acme.config.EchoModuleLifecycleAdapter")
            .is_none());
    }

    #[test]
    fn test_class_path_requires_an_artifact() {
        let err = ClassPath::new(Arc::new(TypeCatalog::new()), &[]).unwrap_err();
        assert!(matches!(err, RuntimeError::Load(_)));
    }
}
