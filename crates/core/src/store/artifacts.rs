//! Typed side-channel for structured per-stage intermediates that don't fit
//! the scalar `SignalValue` model (parsed syntax trees, token indices).
//! Keyed by a short tag rather than a type, since a `FactStore` clone needs
//! to carry the bag across the structural/temporal thread split without
//! knowing the concrete producer types at the call site.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default, Clone)]
pub struct ArtifactBag {
    entries: HashMap<&'static str, Arc<dyn Any + Send + Sync>>,
}

impl ArtifactBag {
    pub fn set<T: Any + Send + Sync>(&mut self, key: &'static str, value: T) {
        self.entries.insert(key, Arc::new(value));
    }

    pub fn set_arc(&mut self, key: &'static str, value: Arc<dyn Any + Send + Sync>) {
        self.entries.insert(key, value);
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Union another bag's entries into this one (spec §5 write-partitioning
    /// applies to artifacts too: the two chains never produce the same key).
    pub fn merge(&mut self, other: ArtifactBag) {
        self.entries.extend(other.entries);
    }
}

impl std::fmt::Debug for ArtifactBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactBag").field("keys", &self.entries.keys().collect::<Vec<_>>()).finish()
    }
}
