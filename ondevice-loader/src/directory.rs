use crate::adapter::{Adapter, AdapterDescriptor};
use crate::error::LoadError;
use crate::types::{BackendId, Modality, ModelDescriptor};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

struct DirectoryEntry {
    adapter: Arc<dyn Adapter>,
    priority: i32,
}

/// Holds every registered adapter in lookup order.
///
/// Higher priority adapters come first; adapters with equal priority keep
/// their registration order.
#[derive(Default)]
pub struct AdapterDirectory {
    entries: RwLock<Vec<DirectoryEntry>>,
}

impl AdapterDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter with the default priority (0)
    pub async fn register(&self, adapter: Arc<dyn Adapter>) -> Result<(), LoadError> {
        self.register_with_priority(adapter, 0).await
    }

    pub async fn register_with_priority(
        &self,
        adapter: Arc<dyn Adapter>,
        priority: i32,
    ) -> Result<(), LoadError> {
        let mut entries = self.entries.write().await;
        let id = adapter.id().clone();

        if entries.iter().any(|entry| entry.adapter.id() == &id) {
            return Err(LoadError::AdapterAlreadyRegistered(id));
        }

        let position = entries
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(entries.len());
        entries.insert(position, DirectoryEntry { adapter, priority });

        info!(
            "Registered adapter '{}' with priority {} ({} adapters total)",
            id,
            priority,
            entries.len()
        );
        Ok(())
    }

    /// Remove an adapter, returning whether it was registered
    pub async fn unregister(&self, id: &BackendId) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|entry| entry.adapter.id() != id);

        let removed = entries.len() != before;
        if removed {
            info!("Unregistered adapter '{}'", id);
        }
        removed
    }

    /// Adapters that claim the model for the modality, in lookup order.
    /// An empty result is a normal outcome.
    pub async fn find_candidates(
        &self,
        model: &ModelDescriptor,
        modality: Modality,
    ) -> Vec<Arc<dyn Adapter>> {
        let entries = self.entries.read().await;
        let candidates: Vec<Arc<dyn Adapter>> = entries
            .iter()
            .filter(|entry| entry.adapter.can_handle(model, modality))
            .map(|entry| entry.adapter.clone())
            .collect();

        debug!(
            "Found {} candidate adapter(s) for model '{}' ({}, {})",
            candidates.len(),
            model.id,
            modality,
            model.format
        );
        candidates
    }

    pub async fn get(&self, id: &BackendId) -> Option<Arc<dyn Adapter>> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .find(|entry| entry.adapter.id() == id)
            .map(|entry| entry.adapter.clone())
    }

    pub async fn adapters(&self) -> Vec<Arc<dyn Adapter>> {
        let entries = self.entries.read().await;
        entries.iter().map(|entry| entry.adapter.clone()).collect()
    }

    pub async fn descriptors(&self) -> Vec<AdapterDescriptor> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|entry| entry.adapter.descriptor().clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
