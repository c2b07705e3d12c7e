use crate::InputError;
use async_trait::async_trait;
use ondevice_loader::{
    Adapter, AdapterDescriptor, AdapterDirectory, AdapterError, LoadError, LoaderConfig,
    Modality, ModelDescriptor, ServiceHandle,
};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One adapter declared in an adapter manifest file
#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    #[serde(flatten)]
    pub descriptor: AdapterDescriptor,
    /// Directory priority, higher first
    #[serde(default)]
    pub priority: i32,
    /// Fixed memory estimate; the model's size is used when absent
    #[serde(default)]
    pub memory_estimate_bytes: Option<u64>,
}

/// Adapter known only from its manifest entry. It takes part in candidate
/// discovery and ordering but refuses to load anything.
#[derive(Debug)]
pub struct ManifestAdapter {
    descriptor: AdapterDescriptor,
    memory_estimate_bytes: Option<u64>,
}

impl ManifestAdapter {
    pub fn new(entry: &ManifestEntry) -> Self {
        Self {
            descriptor: entry.descriptor.clone(),
            memory_estimate_bytes: entry.memory_estimate_bytes,
        }
    }
}

#[async_trait]
impl Adapter for ManifestAdapter {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn load_model(
        &self,
        model: &ModelDescriptor,
        _modality: Modality,
    ) -> Result<ServiceHandle, AdapterError> {
        Err(AdapterError::Unsupported(format!(
            "'{}' is declared in a manifest and cannot load '{}'",
            self.descriptor.id, model.id
        )))
    }

    fn estimate_memory_usage(&self, model: &ModelDescriptor) -> u64 {
        self.memory_estimate_bytes
            .or(model.size_bytes)
            .unwrap_or(0)
    }
}

/// Read an adapter manifest: a JSON array of adapter descriptors with
/// optional `priority` and `memory_estimate_bytes`
pub async fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>, InputError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| InputError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let entries: Vec<ManifestEntry> =
        serde_json::from_str(&contents).map_err(|source| InputError::Manifest {
            path: path.to_path_buf(),
            source,
        })?;

    debug!("Read {} adapter(s) from {}", entries.len(), path.display());
    Ok(entries)
}

/// Register every manifest entry in a fresh directory
pub async fn build_directory(entries: &[ManifestEntry]) -> Result<AdapterDirectory, LoadError> {
    let directory = AdapterDirectory::new();
    for entry in entries {
        directory
            .register_with_priority(Arc::new(ManifestAdapter::new(entry)), entry.priority)
            .await?;
    }
    Ok(directory)
}

/// Read a loader configuration (policy and memory budget) from JSON
pub async fn load_loader_config(path: &Path) -> Result<LoaderConfig, InputError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| InputError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    serde_json::from_str(&contents).map_err(|source| InputError::LoaderConfig {
        path: path.to_path_buf(),
        source,
    })
}
