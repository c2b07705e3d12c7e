use crate::InputError;
use clap::Args;
use ondevice_loader::{InMemoryModelRegistry, Modality, ModelDescriptor};
use std::fmt::Write;
use std::path::PathBuf;

#[derive(Args, Clone, Debug)]
#[command(about = "List the models in a catalog")]
pub struct ModelsArgs {
    /// Catalog file: JSON array of model descriptors
    #[arg(long, short)]
    pub catalog: PathBuf,

    /// Only list models with local content
    #[arg(long)]
    pub downloaded: bool,

    /// Only list models serving this modality (e.g. speech-to-text)
    #[arg(long)]
    pub modality: Option<Modality>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

pub async fn run_models(args: ModelsArgs) -> anyhow::Result<String> {
    if !args.catalog.exists() {
        return Err(InputError::MissingFile(args.catalog).into());
    }

    let registry = InMemoryModelRegistry::from_json_file(&args.catalog).await?;
    let models = if args.downloaded {
        registry.downloaded().await
    } else {
        registry.all().await
    };
    let models: Vec<ModelDescriptor> = models
        .into_iter()
        .filter(|model| args.modality.map_or(true, |m| model.modality == m))
        .collect();

    if args.json {
        return Ok(serde_json::to_string_pretty(&models)?);
    }
    Ok(render_models(&models))
}

fn render_models(models: &[ModelDescriptor]) -> String {
    if models.is_empty() {
        return "No models found".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<28} {:<16} {:<12} {:<10} PREFERRED",
        "ID", "MODALITY", "FORMAT", "LOCAL"
    );
    for model in models {
        let _ = writeln!(
            out,
            "{:<28} {:<16} {:<12} {:<10} {}",
            model.id,
            model.modality.to_string(),
            model.format.to_string(),
            if model.is_downloaded() { "yes" } else { "no" },
            model
                .preferred_backend
                .as_ref()
                .map(|b| b.to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn catalog() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "qwen", "modality": "text_generation", "format": "gguf",
                  "preferred_backend": "llamacpp", "local_path": "/m/qwen"}},
                {{"id": "whisper", "modality": "speech_to_text", "format": "onnx"}}
            ]"#
        )
        .unwrap();
        file
    }

    fn args(catalog: PathBuf) -> ModelsArgs {
        ModelsArgs {
            catalog,
            downloaded: false,
            modality: None,
            json: false,
            debug: false,
        }
    }

    #[tokio::test]
    async fn test_lists_all_models() {
        let file = catalog();
        let output = run_models(args(file.path().to_path_buf())).await.unwrap();
        assert!(output.starts_with("ID"));
        assert!(output.contains("qwen"));
        assert!(output.contains("llamacpp"));
        assert!(output.contains("whisper"));
    }

    #[tokio::test]
    async fn test_filters() {
        let file = catalog();

        let mut downloaded = args(file.path().to_path_buf());
        downloaded.downloaded = true;
        let output = run_models(downloaded).await.unwrap();
        assert!(output.contains("qwen"));
        assert!(!output.contains("whisper"));

        let mut speech = args(file.path().to_path_buf());
        speech.modality = Some(Modality::SpeechToText);
        speech.json = true;
        let output = run_models(speech).await.unwrap();
        let listed: Vec<ModelDescriptor> = serde_json::from_str(&output).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "whisper");
    }

    #[tokio::test]
    async fn test_missing_catalog() {
        let err = run_models(args(PathBuf::from("/no/such/catalog.json")))
            .await
            .unwrap_err();
        assert_eq!(crate::exit_code(&err), 2);
    }
}
