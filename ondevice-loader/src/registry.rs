//! # Model registry
//!
//! The orchestrator resolves model identifiers through [`ModelRegistry`]. The
//! catalog behind it lives elsewhere; [`InMemoryModelRegistry`] is the
//! in-process implementation used by the CLI and by tests.

use crate::error::RegistryError;
use crate::types::ModelDescriptor;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Source of model metadata
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Metadata for a model, or `None` when the identifier is unknown
    async fn lookup(&self, model_id: &str) -> Result<Option<ModelDescriptor>, RegistryError>;
}

/// Model catalog held in memory
#[derive(Debug, Default)]
pub struct InMemoryModelRegistry {
    models: RwLock<HashMap<String, ModelDescriptor>>,
}

impl InMemoryModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from descriptors; later duplicates replace earlier ones
    pub fn from_models(models: impl IntoIterator<Item = ModelDescriptor>) -> Self {
        let models = models
            .into_iter()
            .map(|model| (model.id.clone(), model))
            .collect();
        Self {
            models: RwLock::new(models),
        }
    }

    /// Load a catalog file containing a JSON array of model descriptors
    pub async fn from_json_file(path: &Path) -> Result<Self, RegistryError> {
        let contents = async_fs::read_to_string(path).await?;
        let models: Vec<ModelDescriptor> = serde_json::from_str(&contents)?;

        let mut by_id = HashMap::with_capacity(models.len());
        for model in models {
            if by_id.contains_key(&model.id) {
                return Err(RegistryError::DuplicateModel(model.id));
            }
            by_id.insert(model.id.clone(), model);
        }

        info!(
            "Loaded {} model(s) from catalog {}",
            by_id.len(),
            path.display()
        );
        Ok(Self {
            models: RwLock::new(by_id),
        })
    }

    /// Insert or replace a model descriptor
    pub async fn save(&self, model: ModelDescriptor) {
        let mut models = self.models.write().await;
        debug!("Saving model '{}' to registry", model.id);
        models.insert(model.id.clone(), model);
    }

    /// Insert a model descriptor that must not exist yet
    pub async fn insert_new(&self, model: ModelDescriptor) -> Result<(), RegistryError> {
        let mut models = self.models.write().await;
        if models.contains_key(&model.id) {
            return Err(RegistryError::DuplicateModel(model.id));
        }
        models.insert(model.id.clone(), model);
        Ok(())
    }

    pub async fn get(&self, model_id: &str) -> Option<ModelDescriptor> {
        self.models.read().await.get(model_id).cloned()
    }

    pub async fn remove(&self, model_id: &str) -> Option<ModelDescriptor> {
        self.models.write().await.remove(model_id)
    }

    /// Every model, sorted by identifier
    pub async fn all(&self) -> Vec<ModelDescriptor> {
        let models = self.models.read().await;
        let mut all: Vec<ModelDescriptor> = models.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Models with local content, sorted by identifier
    pub async fn downloaded(&self) -> Vec<ModelDescriptor> {
        self.all()
            .await
            .into_iter()
            .filter(ModelDescriptor::is_downloaded)
            .collect()
    }

    /// Record where a model's content lives locally. Returns false for an
    /// unknown model.
    pub async fn set_local_path(&self, model_id: &str, path: Option<PathBuf>) -> bool {
        let mut models = self.models.write().await;
        match models.get_mut(model_id) {
            Some(model) => {
                model.local_path = path;
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.models.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.models.read().await.is_empty()
    }
}

#[async_trait]
impl ModelRegistry for InMemoryModelRegistry {
    async fn lookup(&self, model_id: &str) -> Result<Option<ModelDescriptor>, RegistryError> {
        Ok(self.get(model_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Modality, ModelFormat};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn model(id: &str) -> ModelDescriptor {
        ModelDescriptor::new(id, Modality::TextGeneration, ModelFormat::Gguf)
    }

    #[tokio::test]
    async fn test_save_get_remove() {
        let registry = InMemoryModelRegistry::new();
        assert!(registry.is_empty().await);

        registry.save(model("a")).await;
        assert_eq!(registry.get("a").await.map(|m| m.id), Some("a".to_string()));
        assert_eq!(registry.lookup("a").await.unwrap().map(|m| m.id), Some("a".to_string()));
        assert!(registry.lookup("missing").await.unwrap().is_none());

        assert!(registry.remove("a").await.is_some());
        assert!(registry.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_insert_new_rejects_duplicates() {
        let registry = InMemoryModelRegistry::new();
        registry.insert_new(model("a")).await.unwrap();
        let result = registry.insert_new(model("a")).await;
        assert!(matches!(result, Err(RegistryError::DuplicateModel(ref id)) if id == "a"));
    }

    #[tokio::test]
    async fn test_downloaded_filters_and_sorts() {
        let registry = InMemoryModelRegistry::from_models([model("c"), model("a"), model("b")]);
        assert!(registry.set_local_path("c", Some(PathBuf::from("/models/c"))).await);
        assert!(registry.set_local_path("a", Some(PathBuf::from("/models/a"))).await);
        assert!(!registry.set_local_path("zzz", None).await);

        let all: Vec<String> = registry.all().await.into_iter().map(|m| m.id).collect();
        assert_eq!(all, vec!["a", "b", "c"]);

        let downloaded: Vec<String> = registry
            .downloaded()
            .await
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(downloaded, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_from_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "llama", "modality": "text_generation", "format": "gguf", "local_path": "/m/llama"}},
                {{"id": "whisper", "modality": "speech_to_text", "format": "onnx"}}
            ]"#
        )
        .unwrap();

        let registry = InMemoryModelRegistry::from_json_file(file.path()).await.unwrap();
        assert_eq!(registry.len().await, 2);
        assert!(registry.get("llama").await.unwrap().is_downloaded());
        assert_eq!(
            registry.get("whisper").await.unwrap().modality,
            Modality::SpeechToText
        );
    }

    #[tokio::test]
    async fn test_from_json_file_errors() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let result = InMemoryModelRegistry::from_json_file(file.path()).await;
        assert!(matches!(result, Err(RegistryError::Parse(_))));

        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "a", "modality": "embedding", "format": "onnx"}},
               {{"id": "a", "modality": "embedding", "format": "onnx"}}]"#
        )
        .unwrap();
        let result = InMemoryModelRegistry::from_json_file(file.path()).await;
        assert!(matches!(result, Err(RegistryError::DuplicateModel(_))));

        let result =
            InMemoryModelRegistry::from_json_file(Path::new("/non/existent/catalog.json")).await;
        assert!(matches!(result, Err(RegistryError::Io(_))));
    }
}
