use std::collections::HashMap;

use crate::model::Module;

/// What the registry knows about one workspace module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub module_name: String,
    pub module_path: String,
    pub bundle_symbolic_name: Option<String>,
    pub bundle_version: Option<String>,
    /// Declares the init resource that keeps cross-module links at classpath level.
    pub has_init_jsp: bool,
}

/// Bundle symbolic name and module name -> owning module.
///
/// Built in one pass over every module before any dependency is rewritten, and read-only
/// afterwards.
#[derive(Debug, Clone, Default)]
pub struct VersionRegistry {
    entries: Vec<RegistryEntry>,
    by_symbolic_name: HashMap<String, usize>,
    by_module_name: HashMap<String, usize>,
}

impl VersionRegistry {
    /// Register every module under its symbolic name and its module name. When two modules
    /// claim the same key the first in path order keeps it.
    pub fn build(modules: &[Module]) -> Self {
        let mut ordered: Vec<&Module> = modules.iter().collect();
        ordered.sort_by(|a, b| a.module_path.cmp(&b.module_path));

        let mut registry = Self::default();
        for module in ordered {
            let index = registry.entries.len();
            registry.entries.push(RegistryEntry {
                module_name: module.module_name.clone(),
                module_path: module.module_path.clone(),
                bundle_symbolic_name: module.bundle_symbolic_name.clone(),
                bundle_version: module.bundle_version.clone(),
                has_init_jsp: module.has_init_jsp,
            });

            if let Some(symbolic_name) = &module.bundle_symbolic_name {
                register(&mut registry.by_symbolic_name, symbolic_name, index, &registry.entries);
            }
            register(
                &mut registry.by_module_name,
                &module.module_name,
                index,
                &registry.entries,
            );
        }
        registry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn by_symbolic_name(&self, name: &str) -> Option<&RegistryEntry> {
        self.by_symbolic_name.get(name).map(|&i| &self.entries[i])
    }

    pub fn by_module_name(&self, name: &str) -> Option<&RegistryEntry> {
        self.by_module_name.get(name).map(|&i| &self.entries[i])
    }

    /// Symbolic name first, then module name.
    pub fn lookup(&self, name: &str) -> Option<&RegistryEntry> {
        self.by_symbolic_name(name)
            .or_else(|| self.by_module_name(name))
    }
}

fn register(
    index: &mut HashMap<String, usize>,
    key: &str,
    entry: usize,
    entries: &[RegistryEntry],
) {
    if let Some(&existing) = index.get(key) {
        tracing::debug!(
            target = "portalws.reconcile",
            key,
            kept = %entries[existing].module_path,
            ignored = %entries[entry].module_path,
            "duplicate registry key"
        );
        return;
    }
    index.insert(key.to_string(), entry);
}
