//! # Adapters
//!
//! An adapter bridges the orchestrator to one concrete inference backend. The
//! orchestrator only ever sees the [`Adapter`] trait and the [`ServiceHandle`]
//! an adapter returns; the backend itself stays opaque.

use crate::error::AdapterError;
use crate::types::{BackendId, Modality, ModelDescriptor, ModelFormat};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A running backend service created by an adapter
#[async_trait]
pub trait Service: Send + Sync {
    /// Release backend resources. Best effort, the outcome is not consulted.
    async fn cleanup(&self);
}

pub trait TextGenerationService: Service {}
pub trait SpeechToTextService: Service {}
pub trait TextToSpeechService: Service {}
pub trait VoiceActivityService: Service {}
pub trait EmbeddingService: Service {}
pub trait VisionLanguageService: Service {}
pub trait ImageGenerationService: Service {}

/// Service handle returned by an adapter, tagged with its capability kind
#[derive(Clone)]
pub enum ServiceHandle {
    TextGeneration(Arc<dyn TextGenerationService>),
    SpeechToText(Arc<dyn SpeechToTextService>),
    TextToSpeech(Arc<dyn TextToSpeechService>),
    VoiceActivity(Arc<dyn VoiceActivityService>),
    Embedding(Arc<dyn EmbeddingService>),
    VisionLanguage(Arc<dyn VisionLanguageService>),
    ImageGeneration(Arc<dyn ImageGenerationService>),
}

impl ServiceHandle {
    /// Capability kind of the wrapped service
    pub fn modality(&self) -> Modality {
        match self {
            ServiceHandle::TextGeneration(_) => Modality::TextGeneration,
            ServiceHandle::SpeechToText(_) => Modality::SpeechToText,
            ServiceHandle::TextToSpeech(_) => Modality::TextToSpeech,
            ServiceHandle::VoiceActivity(_) => Modality::VoiceActivity,
            ServiceHandle::Embedding(_) => Modality::Embedding,
            ServiceHandle::VisionLanguage(_) => Modality::VisionLanguage,
            ServiceHandle::ImageGeneration(_) => Modality::ImageGeneration,
        }
    }

    pub fn as_text_generation(&self) -> Option<&Arc<dyn TextGenerationService>> {
        match self {
            ServiceHandle::TextGeneration(service) => Some(service),
            _ => None,
        }
    }

    pub fn as_speech_to_text(&self) -> Option<&Arc<dyn SpeechToTextService>> {
        match self {
            ServiceHandle::SpeechToText(service) => Some(service),
            _ => None,
        }
    }

    pub fn as_text_to_speech(&self) -> Option<&Arc<dyn TextToSpeechService>> {
        match self {
            ServiceHandle::TextToSpeech(service) => Some(service),
            _ => None,
        }
    }

    pub fn as_embedding(&self) -> Option<&Arc<dyn EmbeddingService>> {
        match self {
            ServiceHandle::Embedding(service) => Some(service),
            _ => None,
        }
    }

    pub(crate) async fn cleanup(&self) {
        match self {
            ServiceHandle::TextGeneration(service) => service.cleanup().await,
            ServiceHandle::SpeechToText(service) => service.cleanup().await,
            ServiceHandle::TextToSpeech(service) => service.cleanup().await,
            ServiceHandle::VoiceActivity(service) => service.cleanup().await,
            ServiceHandle::Embedding(service) => service.cleanup().await,
            ServiceHandle::VisionLanguage(service) => service.cleanup().await,
            ServiceHandle::ImageGeneration(service) => service.cleanup().await,
        }
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceHandle({})", self.modality())
    }
}

/// Static description of what a backend adapter can serve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterDescriptor {
    /// Backend identifier, unique within a directory
    pub id: BackendId,
    /// Human readable backend name
    #[serde(default)]
    pub name: String,
    /// Modalities the backend can serve
    pub modalities: BTreeSet<Modality>,
    /// Model formats the backend can read
    #[serde(default)]
    pub formats: BTreeSet<ModelFormat>,
    /// Backend accepts any model format for its modalities
    #[serde(default)]
    pub format_agnostic: bool,
}

impl AdapterDescriptor {
    pub fn new(
        id: impl Into<BackendId>,
        modalities: impl IntoIterator<Item = Modality>,
        formats: impl IntoIterator<Item = ModelFormat>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            id,
            modalities: modalities.into_iter().collect(),
            formats: formats.into_iter().collect(),
            format_agnostic: false,
        }
    }

    /// Candidate rule: the modality is supported and the model's format is
    /// either supported or irrelevant to this backend.
    pub fn supports(&self, model: &ModelDescriptor, modality: Modality) -> bool {
        self.modalities.contains(&modality)
            && (self.format_agnostic || self.formats.contains(&model.format))
    }
}

/// Uniform interface over one inference backend
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Static capability description
    fn descriptor(&self) -> &AdapterDescriptor;

    fn id(&self) -> &BackendId {
        &self.descriptor().id
    }

    /// Whether this adapter claims the model for the given modality
    fn can_handle(&self, model: &ModelDescriptor, modality: Modality) -> bool {
        self.descriptor().supports(model, modality)
    }

    /// Load the model and return a running service
    async fn load_model(
        &self,
        model: &ModelDescriptor,
        modality: Modality,
    ) -> Result<ServiceHandle, AdapterError>;

    /// Estimated resident memory of the loaded model in bytes
    fn estimate_memory_usage(&self, model: &ModelDescriptor) -> u64 {
        model.size_bytes.unwrap_or(0)
    }
}

impl fmt::Debug for dyn Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Adapter({})", self.id())
    }
}
