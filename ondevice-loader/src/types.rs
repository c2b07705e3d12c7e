use crate::adapter::ServiceHandle;
use crate::error::LoadError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use ulid::Ulid;

/// Identifier of an inference backend (e.g. "llamacpp", "coreml", "mlx")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(String);

impl BackendId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BackendId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for BackendId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The kind of capability a model serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    TextGeneration,
    SpeechToText,
    TextToSpeech,
    VoiceActivity,
    Embedding,
    VisionLanguage,
    ImageGeneration,
}

impl Modality {
    pub const ALL: [Modality; 7] = [
        Modality::TextGeneration,
        Modality::SpeechToText,
        Modality::TextToSpeech,
        Modality::VoiceActivity,
        Modality::Embedding,
        Modality::VisionLanguage,
        Modality::ImageGeneration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::TextGeneration => "text_generation",
            Modality::SpeechToText => "speech_to_text",
            Modality::TextToSpeech => "text_to_speech",
            Modality::VoiceActivity => "voice_activity",
            Modality::Embedding => "embedding",
            Modality::VisionLanguage => "vision_language",
            Modality::ImageGeneration => "image_generation",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Modality::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| format!("Unknown modality: {}", s))
    }
}

/// Storage format of a model's files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    Gguf,
    Onnx,
    Ort,
    CoreMl,
    Mlx,
    SafeTensors,
    Bin,
    Unknown,
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFormat::Gguf => "gguf",
            ModelFormat::Onnx => "onnx",
            ModelFormat::Ort => "ort",
            ModelFormat::CoreMl => "core_ml",
            ModelFormat::Mlx => "mlx",
            ModelFormat::SafeTensors => "safe_tensors",
            ModelFormat::Bin => "bin",
            ModelFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Catalog metadata for a model, as supplied by the model registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique model identifier
    pub id: String,
    /// Human readable name
    #[serde(default)]
    pub name: String,
    /// Capability the model serves
    pub modality: Modality,
    /// Storage format of the model files
    pub format: ModelFormat,
    /// Backend that should be tried first, if any
    #[serde(default)]
    pub preferred_backend: Option<BackendId>,
    /// Backends known to work with this model, in preference order
    #[serde(default)]
    pub compatible_backends: Vec<BackendId>,
    /// Local content location, present only once downloaded
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    /// Size of the model files in bytes, when known
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, modality: Modality, format: ModelFormat) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            modality,
            format,
            preferred_backend: None,
            compatible_backends: Vec::new(),
            local_path: None,
            size_bytes: None,
        }
    }

    pub fn is_downloaded(&self) -> bool {
        self.local_path.is_some()
    }
}

/// A model loaded by one backend and owned by the loading orchestrator
pub struct LoadedModel {
    /// Unique id of this loaded instance
    pub instance_id: Ulid,
    /// Descriptor the model was loaded from
    pub descriptor: ModelDescriptor,
    /// Backend that served the load
    pub backend: BackendId,
    /// Memory estimate reported by the adapter at load time
    pub estimated_memory_bytes: u64,
    /// Number of adapters tried, including the successful one
    pub attempts: usize,
    /// Time taken by the successful adapter's load call
    pub load_time: Duration,
    pub(crate) service: ServiceHandle,
}

impl LoadedModel {
    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn modality(&self) -> Modality {
        self.service.modality()
    }

    /// The live service handle. Callers share it and must not clean it up;
    /// only the orchestrator's `unload` retires a model.
    pub fn service(&self) -> &ServiceHandle {
        &self.service
    }
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("instance_id", &self.instance_id)
            .field("model_id", &self.descriptor.id)
            .field("backend", &self.backend)
            .field("service", &self.service)
            .field("estimated_memory_bytes", &self.estimated_memory_bytes)
            .field("attempts", &self.attempts)
            .field("load_time", &self.load_time)
            .finish()
    }
}

/// One adapter attempt a load would make
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedAttempt {
    pub backend: BackendId,
    pub estimated_memory_bytes: u64,
}

/// Dry run of a load: the resolved model and the attempt order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadPlan {
    pub model: ModelDescriptor,
    pub policy: String,
    pub attempts: Vec<PlannedAttempt>,
}

/// Maps model identifiers matching `pattern` to a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    /// Case-insensitive regular expression matched against the model id
    pub pattern: String,
    pub backend: BackendId,
}

/// Which selection policy orders candidate adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyConfig {
    /// Preferred backend, then compatible backends, then directory order
    #[default]
    Metadata,
    /// Model id patterns promote backends, then metadata order
    Pattern { rules: Vec<PatternRule> },
    /// One backend always first, then directory order
    Forced { backend: BackendId },
}

impl PolicyConfig {
    /// Validate the policy, compiling pattern rules once
    pub fn validate(&self) -> Result<(), LoadError> {
        crate::policy::from_config(self).map(|_| ())
    }

    /// Checks that need no pattern compilation
    pub(crate) fn validate_backends(&self) -> Result<(), LoadError> {
        match self {
            PolicyConfig::Metadata => Ok(()),
            PolicyConfig::Pattern { rules } => {
                match rules.iter().find(|rule| rule.backend.as_str().is_empty()) {
                    Some(rule) => Err(LoadError::InvalidConfig(format!(
                        "Pattern rule '{}' has an empty backend",
                        rule.pattern
                    ))),
                    None => Ok(()),
                }
            }
            PolicyConfig::Forced { backend } => {
                if backend.as_str().is_empty() {
                    return Err(LoadError::InvalidConfig(
                        "Forced policy backend cannot be empty".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Configuration for the loading orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LoaderConfig {
    /// Policy used to order candidate adapters
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Upper bound for the summed memory estimates of loaded models
    #[serde(default)]
    pub memory_budget_bytes: Option<u64>,
}

impl LoaderConfig {
    /// Validate the loader configuration
    pub fn validate(&self) -> Result<(), LoadError> {
        self.policy.validate()?;
        self.validate_budget()
    }

    pub(crate) fn validate_budget(&self) -> Result<(), LoadError> {
        if self.memory_budget_bytes == Some(0) {
            return Err(LoadError::InvalidConfig(
                "Memory budget must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
