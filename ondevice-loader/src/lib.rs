//! # On-device Loader
//!
//! Backend adapter selection and deduplicated model loading for on-device
//! inference. A model identifier is resolved through a [`ModelRegistry`],
//! matched against the adapters in an [`AdapterDirectory`], ordered by a
//! [`SelectionPolicy`] and loaded by the first adapter that succeeds.
//!
//! [`LoadingOrchestrator`] guarantees at most one load per model identifier:
//! concurrent callers share the in-flight load and receive the same
//! [`LoadedModel`] or the same [`LoadError`].

pub mod adapter;
pub mod directory;
pub mod error;
pub mod loader;
pub mod policy;
pub mod registry;
pub mod types;

// Re-export main types for convenience
pub use adapter::{
    Adapter, AdapterDescriptor, EmbeddingService, ImageGenerationService, Service, ServiceHandle,
    SpeechToTextService, TextGenerationService, TextToSpeechService, VisionLanguageService,
    VoiceActivityService,
};
pub use directory::AdapterDirectory;
pub use error::{AdapterError, LoadError, RegistryError};
pub use loader::{LoadResult, LoadingOrchestrator};
pub use policy::{ForcedPolicy, MetadataPolicy, PatternPolicy, SelectionPolicy};
pub use registry::{InMemoryModelRegistry, ModelRegistry};
pub use types::{
    BackendId, LoadPlan, LoadedModel, LoaderConfig, Modality, ModelDescriptor, ModelFormat,
    PatternRule, PlannedAttempt, PolicyConfig,
};
