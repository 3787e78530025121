//! Process-local registry of declared capabilities and their handlers.

use async_trait::async_trait;
use mesh_kernel::MeshResult;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::descriptor::CapabilityDescriptor;

/// A callable capability implementation.
///
/// Both locally constructed instances and remote proxies implement this, so
/// dependency consumers never care where the capability actually runs.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn invoke(&self, params: Value) -> MeshResult<Value>;
}

impl std::fmt::Debug for dyn CapabilityHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityHandler").finish()
    }
}

/// One declared capability with its handler.
#[derive(Clone)]
pub struct Declaration {
    pub descriptor: CapabilityDescriptor,
    pub handler: Arc<dyn CapabilityHandler>,
}

/// Registry of declarations made by this process before `serve()`.
///
/// Registration is idempotent per capability name: re-registering a name
/// already present is skipped, matching the once-only processing of the
/// startup pipeline.
#[derive(Default)]
pub struct LocalRegistry {
    declarations: RwLock<Vec<Declaration>>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a capability with its handler. Returns false when a
    /// capability with the same name was already declared.
    pub fn register(
        &self,
        descriptor: CapabilityDescriptor,
        handler: Arc<dyn CapabilityHandler>,
    ) -> bool {
        let mut declarations = self.declarations.write();
        if declarations.iter().any(|d| d.descriptor.name == descriptor.name) {
            debug!(capability = %descriptor.name, "already declared; skipping");
            return false;
        }
        declarations.push(Declaration { descriptor, handler });
        true
    }

    pub fn declarations(&self) -> Vec<Declaration> {
        self.declarations.read().clone()
    }

    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        self.declarations
            .read()
            .iter()
            .map(|d| d.descriptor.clone())
            .collect()
    }

    /// Handler for a declared capability name, if any.
    pub fn handler(&self, capability: &str) -> Option<Arc<dyn CapabilityHandler>> {
        self.declarations
            .read()
            .iter()
            .find(|d| d.descriptor.name == capability)
            .map(|d| d.handler.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.read().is_empty()
    }

    /// Handlers keyed by capability name.
    pub fn handlers(&self) -> HashMap<String, Arc<dyn CapabilityHandler>> {
        self.declarations
            .read()
            .iter()
            .map(|d| (d.descriptor.name.clone(), d.handler.clone()))
            .collect()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::StaticHandler;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn register_and_invoke() {
        let registry = LocalRegistry::new();
        let added = registry.register(
            CapabilityDescriptor::builder("greeting").build(),
            Arc::new(StaticHandler(json!("hello"))),
        );
        assert!(added);

        let handler = registry.handler("greeting").unwrap();
        let result = handler.invoke(json!({})).await.unwrap();
        assert_eq!(result, json!("hello"));
    }

    #[test]
    fn duplicate_registration_is_skipped() {
        let registry = LocalRegistry::new();
        let first = registry.register(
            CapabilityDescriptor::builder("greeting").build(),
            Arc::new(StaticHandler(serde_json::Value::Null)),
        );
        let second = registry.register(
            CapabilityDescriptor::builder("greeting").build(),
            Arc::new(StaticHandler(serde_json::Value::Null)),
        );
        assert!(first);
        assert!(!second);
        assert_eq!(registry.declarations().len(), 1);
    }
}
