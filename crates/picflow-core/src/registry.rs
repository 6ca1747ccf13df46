//! Capability registries.
//!
//! A [`Registry`] maps ids to [`Handler`]s for one capability (transformers,
//! uploaders, or one hook stage). Transformers, uploaders and hooks share the
//! same handler shape. Insertion order is the execution order for hook sets.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::config::Config;
use crate::context::SharedContext;
use crate::error::PipelineResult;
use crate::types::FieldDescriptor;

/// A pluggable stage behavior.
///
/// Uses `async_trait` because handlers are stored as `Arc<dyn Handler>`.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Display name for logs.
    fn name(&self) -> &str;

    /// Run against the whole context. Transformers populate `output`,
    /// uploaders fill in URLs on existing artifacts, hooks may do either.
    async fn handle(&self, ctx: &SharedContext) -> PipelineResult<()>;

    /// User-facing option descriptors, derived from current configuration.
    fn config(&self, _config: &Config) -> Vec<FieldDescriptor> {
        Vec::new()
    }

    /// Extensions (without dot) this handler refuses to accept.
    fn rejected_formats(&self) -> &[&'static str] {
        &[]
    }
}

/// Ordered id → handler table.
pub struct Registry {
    name: String,
    handlers: RwLock<IndexMap<String, Arc<dyn Handler>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handlers: RwLock::new(IndexMap::new()),
        }
    }

    /// Registry name, e.g. "uploader".
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a handler. A duplicate id replaces the previous handler in place.
    pub fn register(&self, id: impl Into<String>, handler: Arc<dyn Handler>) {
        let id = id.into();
        tracing::debug!(registry = %self.name, %id, "register");
        self.write().insert(id, handler);
    }

    /// Remove a handler, returning it if it was registered.
    pub fn unregister(&self, id: &str) -> Option<Arc<dyn Handler>> {
        self.write().shift_remove(id)
    }

    /// Look up a handler by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Handler>> {
        self.read().get(id).cloned()
    }

    /// Whether an id is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// All handlers in insertion order.
    pub fn get_list(&self) -> Vec<Arc<dyn Handler>> {
        self.read().values().cloned().collect()
    }

    /// All `(id, handler)` pairs in insertion order.
    pub fn entries(&self) -> Vec<(String, Arc<dyn Handler>)> {
        self.read()
            .iter()
            .map(|(id, handler)| (id.clone(), handler.clone()))
            .collect()
    }

    /// All ids in insertion order.
    pub fn get_id_list(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panicking handler cannot leave the map half-written, so a poisoned
    // lock still guards consistent data.
    fn read(&self) -> RwLockReadGuard<'_, IndexMap<String, Arc<dyn Handler>>> {
        self.handlers.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<String, Arc<dyn Handler>>> {
        self.handlers.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("ids", &self.get_id_list())
            .finish()
    }
}

/// The five registries of one environment.
#[derive(Debug)]
pub struct Helper {
    pub transformer: Registry,
    pub uploader: Registry,
    pub before_transform: Registry,
    pub before_upload: Registry,
    pub after_upload: Registry,
}

impl Helper {
    pub fn new() -> Self {
        Self {
            transformer: Registry::new("transformer"),
            uploader: Registry::new("uploader"),
            before_transform: Registry::new("beforeTransformPlugins"),
            before_upload: Registry::new("beforeUploadPlugins"),
            after_upload: Registry::new("afterUploadPlugins"),
        }
    }
}

impl Default for Helper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str);

    #[async_trait]
    impl Handler for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn handle(&self, _ctx: &SharedContext) -> PipelineResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_register_preserves_insertion_order() {
        let registry = Registry::new("hooks");
        registry.register("b", Arc::new(Named("b")));
        registry.register("a", Arc::new(Named("a")));
        registry.register("c", Arc::new(Named("c")));

        assert_eq!(registry.get_id_list(), vec!["b", "a", "c"]);
        let names: Vec<String> = registry
            .get_list()
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_duplicate_id_overwrites() {
        let registry = Registry::new("uploader");
        registry.register("x", Arc::new(Named("first")));
        registry.register("x", Arc::new(Named("second")));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("x").unwrap().name(), "second");
    }

    #[test]
    fn test_unregister_keeps_remaining_order() {
        let registry = Registry::new("hooks");
        for id in ["a", "b", "c"] {
            registry.register(id, Arc::new(Named("h")));
        }
        assert!(registry.unregister("b").is_some());
        assert!(registry.unregister("b").is_none());
        assert_eq!(registry.get_id_list(), vec!["a", "c"]);
    }

    #[test]
    fn test_get_missing_is_none() {
        let registry = Registry::new("transformer");
        assert!(registry.get("doesnotexist").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_default_handler_has_no_fields() {
        let handler = Named("h");
        assert!(handler.config(&Config::default()).is_empty());
        assert!(handler.rejected_formats().is_empty());
    }
}
