pub mod manifest;
pub mod models;
pub mod plan;

pub use models::{run_models, ModelsArgs};
pub use plan::{run_plan, validate_plan_args, PlanArgs};

use ondevice_loader::{LoadError, RegistryError};
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the files and arguments handed to the CLI
#[derive(Debug, Error)]
pub enum InputError {
    #[error("File does not exist: {0}\n💡 Ensure the file path is correct and the file exists")]
    MissingFile(PathBuf),

    #[error("Cannot read {path}: {source}\n💡 Check file permissions")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid adapter manifest {path}: {source}\n💡 Expected a JSON array of adapter descriptors")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid loader config {path}: {source}\n💡 Expected {{\"policy\": {{\"kind\": ...}}, \"memory_budget_bytes\": ...}}")]
    LoaderConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} cannot be empty")]
    Empty(&'static str),
}

/// Process exit code for a failed command: 2 for bad input or configuration,
/// 3 for model resolution errors, 1 for anything else.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<InputError>().is_some() || err.downcast_ref::<RegistryError>().is_some()
    {
        return 2;
    }

    match err.downcast_ref::<LoadError>() {
        Some(LoadError::InvalidConfig(_)) | Some(LoadError::AdapterAlreadyRegistered(_)) => 2,
        Some(_) => 3,
        None => 1,
    }
}
