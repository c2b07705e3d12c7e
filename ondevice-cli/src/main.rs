use clap::{Parser, Subcommand};
use ondevice_cli::{exit_code, run_models, run_plan, ModelsArgs, PlanArgs};
use tracing::info;

#[derive(Parser)]
#[command(name = "ondevice")]
#[command(about = "Inspect model catalogs and dry-run on-device backend selection")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the models in a catalog
    Models(ModelsArgs),
    /// Show the adapter attempt order for a model
    Plan(PlanArgs),
}

fn init_logging(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Models(args) => {
            init_logging(args.debug);
            info!("Listing catalog {}", args.catalog.display());
            run_models(args).await
        }
        Commands::Plan(args) => {
            init_logging(args.debug);
            info!("Planning load of '{}'", args.model);
            run_plan(args).await
        }
    };

    match result {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            let code = exit_code(&e);
            match code {
                2 => eprintln!("Error: {:#}", e),
                3 => eprintln!("Model Error: {:#}", e),
                _ => eprintln!("Runtime Error: {:#}", e),
            }
            std::process::exit(code);
        }
    }
}
