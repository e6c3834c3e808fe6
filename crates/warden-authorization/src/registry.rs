//! Registry of protected resource types

use crate::model::{ResourceAction, ResourceModel};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use warden_core::{Result, WardenError};

/// Resource models keyed by Rust type
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    models: RwLock<HashMap<TypeId, Arc<ResourceModel>>>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a model; each resource type may be registered once
    pub fn register(&self, model: ResourceModel) -> Result<Arc<ResourceModel>> {
        let type_id = model.type_id();
        let mut models = self.models.write();
        if let Some(existing) = models.get(&type_id) {
            return Err(WardenError::invalid_definition(
                existing.type_name(),
                "resource type is already registered",
            ));
        }
        let model = Arc::new(model);
        models.insert(type_id, model.clone());
        tracing::debug!(resource = model.type_name(), "Resource type registered");
        Ok(model)
    }

    /// Model registered for `R`
    pub fn model_for<R: Any>(&self) -> Option<Arc<ResourceModel>> {
        self.models.read().get(&TypeId::of::<R>()).cloned()
    }

    /// Model registered for the runtime type of `instance`
    pub fn model_of(&self, instance: &dyn Any) -> Option<Arc<ResourceModel>> {
        self.models.read().get(&instance.type_id()).cloned()
    }

    /// Resolve action `name` of resource type `R`
    pub fn action<R: Any>(&self, name: &str) -> Result<ResourceAction> {
        let model = self.model_for::<R>().ok_or_else(|| {
            WardenError::invalid_definition(
                std::any::type_name::<R>(),
                "resource type is not registered",
            )
        })?;
        ResourceAction::new(model, name)
    }

    /// Number of registered resource types
    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    /// Whether no resource types are registered
    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }
}
