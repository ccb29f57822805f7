//! The component catalog.
//!
//! In-memory map `version_id -> ComponentVersion`, segmented by type.
//! The catalog is the authority: downstream readers obtain components
//! only through it. Read-mostly: readers hold an immutable `Arc`
//! snapshot; writers clone, mutate, and swap under a brief exclusive
//! lock, so an in-flight evaluation keeps its prior snapshot.

use crate::component::ComponentVersion;
use crate::error::{RegistryError, RegistryResult};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use updown_core::{ComponentType, ErrorCode};

/// Immutable view of the catalog at one instant.
#[derive(Default)]
pub struct CatalogSnapshot {
    components: HashMap<String, Arc<ComponentVersion>>,
}

impl CatalogSnapshot {
    pub fn get(&self, version_id: &str) -> Option<&Arc<ComponentVersion>> {
        self.components.get(version_id)
    }

    pub fn contains(&self, version_id: &str) -> bool {
        self.components.contains_key(version_id)
    }

    /// Components of one type, sorted by version id.
    pub fn list(&self, ctype: ComponentType) -> Vec<Arc<ComponentVersion>> {
        let mut out: Vec<Arc<ComponentVersion>> = self
            .components
            .values()
            .filter(|c| c.metadata.ctype == ctype)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.version_id.cmp(&b.version_id));
        out
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// The live catalog.
pub struct Catalog {
    inner: RwLock<Arc<CatalogSnapshot>>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Arc::new(CatalogSnapshot::default())),
        }
    }

    /// Current immutable snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.inner.read().clone()
    }

    /// Register a published component. Duplicate version ids fail.
    pub fn register(&self, component: ComponentVersion) -> RegistryResult<String> {
        let version_id = component.version_id.clone();
        let mut guard = self.inner.write();
        if guard.contains(&version_id) {
            return Err(RegistryError::new(
                ErrorCode::ComponentVersionExists,
                format!("component version '{version_id}' already registered"),
            )
            .with_context(json!({ "version_id": version_id })));
        }
        let mut next: HashMap<String, Arc<ComponentVersion>> = guard.components.clone();
        next.insert(version_id.clone(), Arc::new(component));
        *guard = Arc::new(CatalogSnapshot { components: next });
        debug!(%version_id, "Component registered");
        Ok(version_id)
    }

    /// Convenience lookup against the current snapshot.
    pub fn get(&self, version_id: &str) -> Option<Arc<ComponentVersion>> {
        self.snapshot().get(version_id).cloned()
    }
}
