/// Walks one load through adapter fallback: the preferred backend fails and
/// the next capable backend serves the model.
use async_trait::async_trait;
use ondevice_loader::{
    Adapter, AdapterDescriptor, AdapterDirectory, AdapterError, InMemoryModelRegistry,
    LoaderConfig, LoadingOrchestrator, Modality, ModelDescriptor, ModelFormat, Service,
    ServiceHandle, TextGenerationService,
};
use std::path::PathBuf;
use std::sync::Arc;

struct DemoService;

#[async_trait]
impl Service for DemoService {
    async fn cleanup(&self) {
        println!("service cleaned up");
    }
}

impl TextGenerationService for DemoService {}

struct DemoAdapter {
    descriptor: AdapterDescriptor,
    works: bool,
}

#[async_trait]
impl Adapter for DemoAdapter {
    fn descriptor(&self) -> &AdapterDescriptor {
        &self.descriptor
    }

    async fn load_model(
        &self,
        model: &ModelDescriptor,
        _modality: Modality,
    ) -> Result<ServiceHandle, AdapterError> {
        if self.works {
            Ok(ServiceHandle::TextGeneration(Arc::new(DemoService)))
        } else {
            Err(AdapterError::new(format!(
                "{} cannot map {}",
                self.descriptor.id, model.id
            )))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let mut model = ModelDescriptor::new("llama-3.2-1b", Modality::TextGeneration, ModelFormat::Gguf);
    model.preferred_backend = Some("metal".into());
    model.local_path = Some(PathBuf::from("./models/llama-3.2-1b.gguf"));
    model.size_bytes = Some(800 * 1024 * 1024);

    let directory = Arc::new(AdapterDirectory::new());
    for (id, works) in [("cpu", true), ("metal", false)] {
        directory
            .register(Arc::new(DemoAdapter {
                descriptor: AdapterDescriptor::new(
                    id,
                    [Modality::TextGeneration],
                    [ModelFormat::Gguf],
                ),
                works,
            }))
            .await?;
    }

    let registry = Arc::new(InMemoryModelRegistry::from_models([model]));
    let loader = Arc::new(LoadingOrchestrator::new(
        registry,
        directory,
        LoaderConfig::default(),
    )?);

    let loaded = loader.load("llama-3.2-1b").await?;
    println!(
        "Loaded {} on {} after {} attempt(s), ~{} MB",
        loaded.id(),
        loaded.backend,
        loaded.attempts,
        loaded.estimated_memory_bytes / (1024 * 1024)
    );

    loader.shutdown().await;
    Ok(())
}
