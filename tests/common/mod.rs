#![allow(dead_code)]

use async_trait::async_trait;
use ondevice_loader::{
    Adapter, AdapterDescriptor, AdapterDirectory, AdapterError, EmbeddingService,
    ImageGenerationService, InMemoryModelRegistry, LoaderConfig, LoadingOrchestrator, Modality,
    ModelDescriptor, ModelFormat, Service, ServiceHandle, SpeechToTextService,
    TextGenerationService, TextToSpeechService, VisionLanguageService, VoiceActivityService,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Test utilities and common setup functions

/// Service double that counts cleanups
#[derive(Default)]
pub struct TestService {
    pub cleanups: AtomicUsize,
}

#[async_trait]
impl Service for TestService {
    async fn cleanup(&self) {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
    }
}

impl TextGenerationService for TestService {}
impl SpeechToTextService for TestService {}
impl TextToSpeechService for TestService {}
impl VoiceActivityService for TestService {}
impl EmbeddingService for TestService {}
impl VisionLanguageService for TestService {}
impl ImageGenerationService for TestService {}

/// Wrap a service in the handle variant for `modality`
pub fn handle_for(modality: Modality, service: Arc<TestService>) -> ServiceHandle {
    match modality {
        Modality::TextGeneration => ServiceHandle::TextGeneration(service),
        Modality::SpeechToText => ServiceHandle::SpeechToText(service),
        Modality::TextToSpeech => ServiceHandle::TextToSpeech(service),
        Modality::VoiceActivity => ServiceHandle::VoiceActivity(service),
        Modality::Embedding => ServiceHandle::Embedding(service),
        Modality::VisionLanguage => ServiceHandle::VisionLanguage(service),
        Modality::ImageGeneration => ServiceHandle::ImageGeneration(service),
    }
}

/// What a scripted adapter does when asked to load
#[derive(Debug, Clone)]
pub enum Script {
    Succeed,
    Fail(String),
    Panic,
    /// Return a service of another kind than requested
    WrongKind(Modality),
}

/// Adapter double driven by a [`Script`]. Every call is counted and appended
/// to a shared log; a gate holds loads until notified.
pub struct ScriptedAdapter {
    descriptor: AdapterDescriptor,
    script: Script,
    gate: Option<Arc<Notify>>,
    memory_bytes: u64,
    pub calls: AtomicUsize,
    pub service: Arc<TestService>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedAdapter {
    pub fn new(id: &str, modalities: &[Modality], formats: &[ModelFormat], script: Script) -> Self {
        Self {
            descriptor: AdapterDescriptor::new(
                id,
                modalities.iter().copied(),
                formats.iter().copied(),
            ),
            script,
            gate: None,
            memory_bytes: 0,
            calls: AtomicUsize::new(0),
            service: Arc::new(TestService::default()),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Text generation adapter for GGUF models
    pub fn text(id: &str, script: Script) -> Self {
        Self::new(id, &[Modality::TextGeneration], &[ModelFormat::Gguf], script)
    }

    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.log = log;
        self
    }

    pub fn with_memory(mut self, bytes: u64) -> Self {
        self.memory_bytes = bytes;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn load_model(
        &self,
        model: &ModelDescriptor,
        modality: Modality,
    ) -> Result<ServiceHandle, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.descriptor.id, model.id));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.script {
            Script::Succeed => Ok(handle_for(modality, self.service.clone())),
            Script::Fail(message) => Err(AdapterError::new(message.clone())),
            Script::Panic => panic!("adapter {} crashed", self.descriptor.id),
            Script::WrongKind(other) => Ok(handle_for(*other, self.service.clone())),
        }
    }

    fn estimate_memory_usage(&self, _model: &ModelDescriptor) -> u64 {
        self.memory_bytes
    }
}

pub struct TestHelper;

impl TestHelper {
    /// A model descriptor with local content
    pub fn downloaded_model(id: &str, modality: Modality, format: ModelFormat) -> ModelDescriptor {
        let mut model = ModelDescriptor::new(id, modality, format);
        model.local_path = Some(PathBuf::from(format!("/models/{}", id)));
        model
    }

    pub fn text_model(id: &str) -> ModelDescriptor {
        Self::downloaded_model(id, Modality::TextGeneration, ModelFormat::Gguf)
    }

    /// Orchestrator over an in-memory catalog with the adapters registered in
    /// the given order
    pub async fn orchestrator(
        models: Vec<ModelDescriptor>,
        adapters: Vec<Arc<ScriptedAdapter>>,
        config: LoaderConfig,
    ) -> Arc<LoadingOrchestrator> {
        let directory = Arc::new(AdapterDirectory::new());
        for adapter in adapters {
            directory
                .register(adapter)
                .await
                .expect("Failed to register adapter");
        }
        let registry = Arc::new(InMemoryModelRegistry::from_models(models));
        Arc::new(
            LoadingOrchestrator::new(registry, directory, config)
                .expect("Failed to create orchestrator"),
        )
    }

    /// Yield until the adapter has been called `count` times
    pub async fn wait_for_calls(adapter: &ScriptedAdapter, count: usize) {
        tokio::time::timeout(constants::TEST_TIMEOUT, async {
            while adapter.call_count() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("Adapter was not called in time");
    }

    pub fn new_log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    /// Wait for a short duration in tests
    pub async fn short_delay() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Test constants
pub mod constants {
    use std::time::Duration;

    pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);
    pub const CONCURRENT_CALLERS: usize = 16;
}
