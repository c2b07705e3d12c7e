use crate::types::{BackendId, Modality};
use thiserror::Error;

/// Errors raised by the loading orchestrator and its collaborators.
///
/// `Clone` because a single load outcome is delivered to every caller that
/// awaited the same in-flight load.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The model registry has no entry for the identifier
    #[error("Model not found: {0}\n📁 Verify the model identifier is registered in the model catalog")]
    ModelNotFound(String),

    /// The model exists but has no local content yet
    #[error("Model not downloaded: {0}\n💾 Download the model files before loading it")]
    ModelNotDownloaded(String),

    /// No registered adapter claims the model's modality and format
    #[error(
        "No adapter available for model '{model_id}' ({modality}){}\n🔌 Register an adapter that supports this modality and format",
        requested_suffix(.requested_backend)
    )]
    NoAdapterAvailable {
        model_id: String,
        modality: Modality,
        requested_backend: Option<BackendId>,
    },

    /// Every candidate adapter failed to load the model
    #[error("All {attempts} adapter(s) failed to load model '{model_id}', last error: {last_error}\n🔧 Check backend logs for each attempt, available memory and model file integrity")]
    AllAdaptersFailed {
        model_id: String,
        attempts: usize,
        #[source]
        last_error: AdapterError,
    },

    /// An adapter returned a service for a different capability than requested
    #[error("Adapter '{backend}' returned a {actual} service, expected {expected}\n🐛 The adapter's load_model implementation returns the wrong service kind")]
    InvalidServiceType {
        backend: BackendId,
        expected: Modality,
        actual: Modality,
    },

    /// The orchestrator was torn down while the call was in progress
    #[error("Loading orchestrator unavailable: {0}")]
    OrchestratorUnavailable(String),

    /// The model registry failed to answer a lookup
    #[error("Model registry error: {0}")]
    Registry(String),

    /// Invalid loader or policy configuration
    #[error("Invalid loader config: {0}\n⚙️ Ensure policy backends are non-empty, patterns are valid regexes and the memory budget is > 0")]
    InvalidConfig(String),

    /// An adapter with the same backend identifier is already registered
    #[error("Adapter already registered: {0}")]
    AdapterAlreadyRegistered(BackendId),
}

fn requested_suffix(backend: &Option<BackendId>) -> String {
    backend
        .as_ref()
        .map(|b| format!(", requested backend '{}'", b))
        .unwrap_or_default()
}

impl LoadError {
    /// Whether trying the same load again later could succeed without
    /// changing the model catalog or the adapter set.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            LoadError::AllAdaptersFailed { .. } | LoadError::Registry(_)
        )
    }

    /// Number of adapters that were tried before this error was raised.
    pub fn attempts(&self) -> usize {
        match self {
            LoadError::AllAdaptersFailed { attempts, .. } => *attempts,
            LoadError::InvalidServiceType { .. } => 1,
            _ => 0,
        }
    }
}

/// Errors reported by a single adapter's load attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// The backend failed while loading the model
    #[error("Backend loading failed: {0}")]
    LoadingFailed(String),

    /// The backend does not support this model after all
    #[error("Unsupported by backend: {0}")]
    Unsupported(String),

    /// Loading would exceed the configured memory budget
    #[error("Insufficient memory: needs {required_bytes} bytes, budget allows {budget_bytes}")]
    InsufficientMemory { required_bytes: u64, budget_bytes: u64 },

    /// I/O failure while reading model content
    #[error("I/O error: {0}")]
    Io(String),
}

impl AdapterError {
    /// Create a new AdapterError from a string message
    pub fn new(message: impl Into<String>) -> Self {
        Self::LoadingFailed(message.into())
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        AdapterError::Io(err.to_string())
    }
}

/// Errors raised by model registry implementations
#[derive(Debug, Error)]
pub enum RegistryError {
    /// I/O error while reading a catalog file
    #[error("I/O error: {0}\n💾 Check the catalog path and file permissions")]
    Io(#[from] std::io::Error),

    /// The catalog file is not valid JSON for a list of model descriptors
    #[error("Catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A model with the same identifier already exists
    #[error("Duplicate model identifier: {0}")]
    DuplicateModel(String),
}

impl From<RegistryError> for LoadError {
    fn from(err: RegistryError) -> Self {
        LoadError::Registry(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_adapter_error_creation() {
        let err = AdapterError::new("backend crashed");
        assert!(matches!(err, AdapterError::LoadingFailed(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "weights missing");
        let adapter_err = AdapterError::from(io_err);
        assert!(matches!(adapter_err, AdapterError::Io(ref msg) if msg.contains("weights missing")));
    }

    #[test]
    fn test_error_retriability() {
        let exhausted = LoadError::AllAdaptersFailed {
            model_id: "m".to_string(),
            attempts: 2,
            last_error: AdapterError::new("oom"),
        };
        assert!(exhausted.is_retriable());
        assert!(LoadError::Registry("timeout".to_string()).is_retriable());
        assert!(!LoadError::ModelNotFound("m".to_string()).is_retriable());
        assert!(!LoadError::ModelNotDownloaded("m".to_string()).is_retriable());
    }

    #[test]
    fn test_attempt_count() {
        let err = LoadError::AllAdaptersFailed {
            model_id: "m".to_string(),
            attempts: 3,
            last_error: AdapterError::new("boom"),
        };
        assert_eq!(err.attempts(), 3);
        assert_eq!(LoadError::ModelNotFound("m".to_string()).attempts(), 0);
    }

    #[test]
    fn test_error_display() {
        let err = LoadError::NoAdapterAvailable {
            model_id: "whisper-tiny".to_string(),
            modality: Modality::SpeechToText,
            requested_backend: Some(BackendId::new("onnx")),
        };
        let display_str = format!("{}", err);
        assert!(display_str.contains("whisper-tiny"));
        assert!(display_str.contains("speech_to_text"));
        assert!(display_str.contains("requested backend 'onnx'"));
        assert!(display_str.contains("🔌"));

        let err = LoadError::NoAdapterAvailable {
            model_id: "m".to_string(),
            modality: Modality::TextGeneration,
            requested_backend: None,
        };
        assert!(!format!("{}", err).contains("requested backend"));
    }

    #[test]
    fn test_all_adapters_failed_keeps_source() {
        use std::error::Error as _;
        let err = LoadError::AllAdaptersFailed {
            model_id: "m".to_string(),
            attempts: 1,
            last_error: AdapterError::Unsupported("q4_k".to_string()),
        };
        let source = err.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("q4_k"));
    }

    #[test]
    fn test_registry_error_converts_to_load_error() {
        let err: LoadError = RegistryError::DuplicateModel("m".to_string()).into();
        assert!(matches!(err, LoadError::Registry(ref msg) if msg.contains("m")));
    }
}
