use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "crucible")]
#[command(version, about = "Drive a program through the remote verification pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project name to register the upload under. Defaults to the source
    /// file stem.
    #[arg(long, global = true)]
    pub name: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Upload a source file and drive it through restoration, bitcode
    /// generation and symbolic execution
    Run {
        /// Path to the source file
        file: PathBuf,

        /// Extra KLEE flags for the symbolic execution stage
        #[arg(long)]
        flags: Option<String>,

        /// Also run the program verification stage
        #[arg(long)]
        verify: bool,
    },
    /// Print the exact symbolic-execution command the worker will run
    Preview {
        /// Project id to interpolate into the command
        project_id: String,

        /// Extra KLEE flags
        #[arg(long)]
        flags: Option<String>,
    },
    /// Encode a source file the way the pipeline stores it
    Encode {
        /// Path to the source file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Run {
            file,
            flags,
            verify,
        } => {
            cmd::run_pipeline(&cli, file, flags.as_deref(), *verify).await?;
        }
        Commands::Preview { project_id, flags } => {
            cmd::cmd_preview(project_id, flags.as_deref())?;
        }
        Commands::Encode { file } => {
            let source = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read source file: {}", file.display()))?;
            cmd::cmd_encode(&source)?;
        }
    }

    Ok(())
}
