use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use greentext_core::export::{ExportFormat, Exporter};
use greentext_core::llm::{LlmDriver, LlmProviderKind};
use greentext_core::state::{AppState, SessionPhase};
use greentext_core::telemetry;
use std::path::PathBuf;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Greentext")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a post with the offline mock provider and export it in
    /// every format.
    Smoke {
        #[arg(long, default_value = "runs the smoke test")]
        prompt: String,
        /// Keep the exports here instead of a throwaway directory.
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    telemetry::init_tracing(telemetry::default_filter())?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke { prompt, out_dir } => smoke_test(&prompt, out_dir),
    }
}

fn smoke_test(prompt: &str, out_dir: Option<PathBuf>) -> Result<()> {
    let runtime = Runtime::new()?;
    let temp_dir = TempDir::new()?;
    let out_dir = out_dir.unwrap_or_else(|| temp_dir.path().to_path_buf());
    std::fs::create_dir_all(&out_dir)?;

    let state = AppState::new(LlmDriver::fake(), Exporter::default());
    let request = state.llm().request(LlmProviderKind::Mock, prompt, 1.0, 300);
    let fragments = runtime.block_on(async {
        let (_, mut stream) = state.generate_streaming(request, None).await?;
        let mut fragments = 0usize;
        while let Some(result) = stream.recv().await {
            if result?.done {
                break;
            }
            fragments += 1;
        }
        anyhow::Ok(fragments)
    })?;

    if state.phase() != SessionPhase::Complete {
        bail!("mock generation did not complete");
    }
    if let Some(post) = state.render_post() {
        info!(fragments, lines = post.lines.len(), "smoke generation complete");
    }

    for format in ExportFormat::ALL {
        let artifact = state.export(format)?;
        let path = out_dir.join(artifact.file_name());
        artifact.write_to(&path)?;
        info!(
            format = format.label(),
            bytes = artifact.bytes.len(),
            path = %path.display(),
            "export written"
        );
    }

    Ok(())
}
