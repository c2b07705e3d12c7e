use crate::manifest::{build_directory, load_loader_config, load_manifest};
use crate::InputError;
use clap::Args;
use ondevice_loader::{InMemoryModelRegistry, LoadPlan, LoaderConfig, LoadingOrchestrator};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Args, Clone, Debug)]
#[command(about = "Show which backends would be tried for a model, in order")]
pub struct PlanArgs {
    /// Catalog file: JSON array of model descriptors
    #[arg(long, short)]
    pub catalog: PathBuf,

    /// Adapter manifest: JSON array of adapter descriptors
    #[arg(long, short)]
    pub adapters: PathBuf,

    /// Model identifier to plan
    #[arg(long, short)]
    pub model: String,

    /// Loader config with the selection policy and memory budget
    #[arg(long)]
    pub policy_config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
}

fn require_file(path: &Path) -> Result<(), InputError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(InputError::MissingFile(path.to_path_buf()))
    }
}

pub fn validate_plan_args(args: &PlanArgs) -> Result<(), InputError> {
    if args.model.trim().is_empty() {
        return Err(InputError::Empty("Model identifier"));
    }
    require_file(&args.catalog)?;
    require_file(&args.adapters)?;
    if let Some(path) = &args.policy_config {
        require_file(path)?;
    }
    Ok(())
}

pub async fn run_plan(args: PlanArgs) -> anyhow::Result<String> {
    validate_plan_args(&args)?;

    let registry = InMemoryModelRegistry::from_json_file(&args.catalog).await?;
    let entries = load_manifest(&args.adapters).await?;
    let directory = build_directory(&entries).await?;
    let config = match &args.policy_config {
        Some(path) => load_loader_config(path).await?,
        None => LoaderConfig::default(),
    };

    let orchestrator =
        LoadingOrchestrator::new(Arc::new(registry), Arc::new(directory), config)?;
    let plan = orchestrator.plan(&args.model).await?;
    info!(
        "Planned {} attempt(s) for '{}'",
        plan.attempts.len(),
        args.model
    );

    if args.json {
        return Ok(serde_json::to_string_pretty(&plan)?);
    }
    Ok(render_plan(&plan))
}

fn render_plan(plan: &LoadPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Model '{}' ({}, {}), policy: {}",
        plan.model.id, plan.model.modality, plan.model.format, plan.policy
    );
    for (index, attempt) in plan.attempts.iter().enumerate() {
        let role = if index == 0 { "primary" } else { "fallback" };
        let _ = writeln!(
            out,
            "  {}. {:<16} {:<9} ~{} bytes",
            index + 1,
            attempt.backend.to_string(),
            role,
            attempt.estimated_memory_bytes
        );
    }
    out.trim_end().to_string()
}
