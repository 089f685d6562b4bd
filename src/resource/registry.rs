use crate::resource::{Resource, ResourceId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

/// Smallest size at which `register` sweeps dead entries.
const PRUNE_FLOOR: usize = 64;

/// Weak set of every resource that has been realized by the render thread.
///
/// Resources stay owned by the application; the registry only lets the
/// scheduler drop all realizations at shutdown.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    entries: HashMap<ResourceId, Weak<Resource>>,
    prune_at: usize,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dead entries are swept whenever the registry doubles, so short-lived
    /// resources do not pile up.
    pub fn register(&mut self, resource: &Arc<Resource>) {
        if !self.entries.contains_key(&resource.id()) && self.entries.len() >= self.prune_at {
            self.prune();
            self.prune_at = (self.entries.len() * 2).max(PRUNE_FLOOR);
        }
        self.entries
            .entry(resource.id())
            .or_insert_with(|| Arc::downgrade(resource));
    }

    /// Forgets resources the application has dropped.
    pub fn prune(&mut self) {
        self.entries.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Resources that are still alive.
    pub fn live(&self) -> Vec<Arc<Resource>> {
        self.entries.values().filter_map(Weak::upgrade).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every realization of every live resource and empties the
    /// registry. Returns the number of realizations dropped.
    pub fn purge_all(&mut self) -> usize {
        let dropped = self.live().iter().map(|r| r.purge()).sum();
        self.entries.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Color;
    use crate::resource::{AsResource, SolidBrush};

    #[test]
    fn registry_holds_resources_weakly() {
        let mut registry = ResourceRegistry::new();
        let kept = SolidBrush::new(Color::BLACK);
        let dropped = SolidBrush::new(Color::WHITE);

        registry.register(kept.resource());
        registry.register(dropped.resource());
        registry.register(kept.resource());
        assert_eq!(registry.len(), 2);

        drop(dropped);
        assert_eq!(registry.live().len(), 1);
        registry.prune();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn short_lived_resources_do_not_accumulate() {
        let mut registry = ResourceRegistry::new();
        let kept = SolidBrush::new(Color::BLACK);
        registry.register(kept.resource());

        for _ in 0..1000 {
            let scratch = SolidBrush::new(Color::WHITE);
            registry.register(scratch.resource());
        }

        assert!(registry.len() <= PRUNE_FLOOR, "registry grew to {}", registry.len());
        assert_eq!(registry.live().len(), 1);
    }
}
