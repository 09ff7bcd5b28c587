use ai_pipeline::config::PipelineConfig;
use ai_pipeline::generator::KfpPipeline;
use ai_pipeline::pipeline::PipelineGenerator;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "ai-pipeline",
    about = "Render train/deploy/predict workflows as Kubeflow pipelines",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the pipeline and write orchestration/pipeline.py
    Generate {
        /// Pipeline definition file (TOML)
        #[arg(long)]
        config: std::path::PathBuf,
        /// Directory the orchestration/ folder is created in
        #[arg(long, default_value = ".")]
        output: std::path::PathBuf,
    },
    /// Print every step with the ids of its children
    Structure {
        /// Pipeline definition file (TOML)
        #[arg(long)]
        config: std::path::PathBuf,
    },
    /// Print the flattened graph as JSON
    Graph {
        /// Pipeline definition file (TOML)
        #[arg(long)]
        config: std::path::PathBuf,
    },
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let now = Local::now().naive_local();
    match args.command {
        Commands::Generate { config, output } => {
            info!(?config, ?output, "starting generate");
            let pipeline = PipelineConfig::load(&config)?.build(now)?;
            let result = KfpPipeline::new(&output).generate_pipeline(&pipeline)?;
            println!("{}", result.output_path.display());
            info!(
                job_id = pipeline.job_id(),
                components = result.components,
                relations = result.relations,
                "generate completed"
            );
        }
        Commands::Structure { config } => {
            let pipeline = PipelineConfig::load(&config)?.build(now)?;
            pipeline.print_structure();
        }
        Commands::Graph { config } => {
            let pipeline = PipelineConfig::load(&config)?.build(now)?;
            let graph = serde_json::to_string_pretty(&pipeline.to_graph())
                .context("failed to serialize graph")?;
            println!("{graph}");
        }
    }

    Ok(())
}
