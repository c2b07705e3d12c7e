use ondevice_loader::{LoadError, Modality};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use thiserror::Error;

/// A logical capability component of the SDK. Each kind is bound to at most
/// one model at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    Llm,
    Stt,
    Tts,
    Vad,
    Embeddings,
    Vlm,
    Diffusion,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 7] = [
        ComponentKind::Llm,
        ComponentKind::Stt,
        ComponentKind::Tts,
        ComponentKind::Vad,
        ComponentKind::Embeddings,
        ComponentKind::Vlm,
        ComponentKind::Diffusion,
    ];

    /// Modality a model must serve to back this component
    pub fn modality(&self) -> Modality {
        match self {
            ComponentKind::Llm => Modality::TextGeneration,
            ComponentKind::Stt => Modality::SpeechToText,
            ComponentKind::Tts => Modality::TextToSpeech,
            ComponentKind::Vad => Modality::VoiceActivity,
            ComponentKind::Embeddings => Modality::Embedding,
            ComponentKind::Vlm => Modality::VisionLanguage,
            ComponentKind::Diffusion => Modality::ImageGeneration,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Llm => "llm",
            ComponentKind::Stt => "stt",
            ComponentKind::Tts => "tts",
            ComponentKind::Vad => "vad",
            ComponentKind::Embeddings => "embeddings",
            ComponentKind::Vlm => "vlm",
            ComponentKind::Diffusion => "diffusion",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    NotInitialized,
    Initializing,
    Ready,
    Failed,
    Cleaning,
}

impl ComponentState {
    /// Lifecycle edges. `Initializing -> Initializing` is a newer initialize
    /// superseding a pending one.
    pub fn can_transition_to(&self, next: ComponentState) -> bool {
        use ComponentState::*;
        matches!(
            (self, next),
            (NotInitialized, Initializing)
                | (Initializing, Initializing)
                | (Initializing, Ready)
                | (Initializing, Failed)
                | (Ready, Initializing)
                | (Ready, Cleaning)
                | (Failed, Initializing)
                | (Failed, NotInitialized)
                | (Cleaning, NotInitialized)
        )
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentState::NotInitialized => "not_initialized",
            ComponentState::Initializing => "initializing",
            ComponentState::Ready => "ready",
            ComponentState::Failed => "failed",
            ComponentState::Cleaning => "cleaning",
        };
        f.write_str(name)
    }
}

/// Snapshot of one component's lifecycle. State and error always come from
/// the same transition.
#[derive(Debug, Clone)]
pub struct ComponentStatus {
    pub kind: ComponentKind,
    pub state: ComponentState,
    pub error: Option<ComponentError>,
    /// Model the component is bound to or being initialized with
    pub model_id: Option<String>,
    pub updated_at: SystemTime,
}

impl ComponentStatus {
    pub fn not_initialized(kind: ComponentKind) -> Self {
        Self {
            kind,
            state: ComponentState::NotInitialized,
            error: None,
            model_id: None,
            updated_at: SystemTime::now(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ComponentState::Ready
    }
}

/// Parameters for initializing a component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentParams {
    pub model_id: String,
}

impl ComponentParams {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ComponentError> {
        if self.model_id.trim().is_empty() {
            return Err(ComponentError::InvalidConfig(
                "model_id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Buffered lifecycle events per subscriber before the oldest are dropped
    pub event_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { event_capacity: 64 }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ComponentError> {
        if self.event_capacity == 0 {
            return Err(ComponentError::InvalidConfig(
                "event_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// A lifecycle transition, broadcast to subscribers
#[derive(Debug, Clone)]
pub struct ComponentEvent {
    pub kind: ComponentKind,
    pub from: ComponentState,
    pub to: ComponentState,
    pub model_id: Option<String>,
    pub at: SystemTime,
}

#[derive(Debug, Clone, Error)]
pub enum ComponentError {
    #[error("Component model load failed: {0}")]
    Load(#[from] LoadError),

    #[error("Model '{model_id}' serves {actual}, but component '{kind}' needs {expected}\n💡 Pick a model whose modality matches the component")]
    ModalityMismatch {
        kind: ComponentKind,
        model_id: String,
        expected: Modality,
        actual: Modality,
    },

    #[error("Invalid component transition for '{kind}': {from} -> {to}\n💡 Wait for the pending operation on this component to finish")]
    InvalidTransition {
        kind: ComponentKind,
        from: ComponentState,
        to: ComponentState,
    },

    #[error("Initialization of '{0}' was superseded by a newer initialize call")]
    Superseded(ComponentKind),

    #[error("Invalid component config: {0}")]
    InvalidConfig(String),
}
