//! Command-line front end: normalize exports and run the compression pipeline.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use crystal_rs::config::{CrystalConfig, LayeredConfigOptions};
use crystal_rs::core::CrystalService;
use crystal_rs::extract::ExtractorRegistry;
use crystal_rs::protocol::{CompressionConfig, ConversationSource};
use log::{debug, info};
use std::path::{Path, PathBuf};

/// Command-line options for the crystal CLI.
#[derive(Parser)]
#[command(name = "crystal", version)]
struct Cli {
    /// Optional crystal.json5 applied on top of the layered config
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the normalized conversations of an export as JSON
    Extract {
        /// Provider tag of the export
        #[arg(long)]
        source: String,
        file: PathBuf,
    },
    /// Ingest an export and run the pipeline for every conversation
    Run {
        #[arg(long)]
        source: String,
        file: PathBuf,
        /// Share of tokens to keep, in (0, 1]
        #[arg(long)]
        ratio: Option<f64>,
        /// Continuation prompt for the optimized output
        #[arg(long)]
        continuation: Option<String>,
        /// Keep conversations in memory instead of the on-disk store
        #[arg(long)]
        in_memory: bool,
    },
    /// List supported source tags
    Sources,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crystal_rs::init_logging();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Extract { source, file } => {
            let registry = ExtractorRegistry::with_defaults()
                .with_max_payload_bytes(config.extract.max_payload_bytes as u64);
            let conversations = registry
                .extract_file(&source, &file)
                .await
                .with_context(|| format!("failed to extract {}", file.display()))?;
            println!("{}", serde_json::to_string_pretty(&conversations)?);
        }
        Command::Run {
            source,
            file,
            ratio,
            continuation,
            in_memory,
        } => {
            let mut config = config;
            if in_memory {
                config.store.enabled = false;
            }
            run(&config, &source, &file, ratio, continuation).await?;
        }
        Command::Sources => {
            let registry = ExtractorRegistry::with_defaults();
            for source in ConversationSource::ALL {
                let status = if registry.get(source).is_ok() {
                    "supported"
                } else {
                    "unsupported"
                };
                println!("{}\t{status}", source.as_str());
            }
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CrystalConfig> {
    let cwd = std::env::current_dir().context("cwd")?;
    let mut options = LayeredConfigOptions::new(&cwd);
    if let Some(path) = path {
        info!("applying runtime config layer: {}", path.display());
        options = options.with_runtime_path(path);
    }
    let layered = CrystalConfig::load_layered_with_options(options)
        .context("failed to load layered config")?;
    debug!("layered config loaded (layers={})", layered.layers.len());
    Ok(layered.config)
}

async fn run(
    config: &CrystalConfig,
    source: &str,
    file: &Path,
    ratio: Option<f64>,
    continuation: Option<String>,
) -> anyhow::Result<()> {
    let service = CrystalService::from_config(config, None).context("failed to start service")?;
    let ids = service
        .ingest_file(source, file)
        .await
        .with_context(|| format!("failed to ingest {}", file.display()))?;
    if ids.is_empty() {
        bail!("no conversations found in {}", file.display());
    }

    let mut compression = service.default_compression_config();
    if let Some(ratio) = ratio {
        compression = CompressionConfig {
            compression_ratio: ratio,
            ..compression
        };
    }
    compression.user_continuation_prompt = continuation;

    let mut run_ids = Vec::with_capacity(ids.len());
    for id in &ids {
        run_ids.push(service.compress(id, compression.clone()).await?);
    }
    let mut statuses = Vec::with_capacity(run_ids.len());
    for run_id in &run_ids {
        statuses.push(service.orchestrator().wait(run_id).await?);
    }
    service.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&statuses)?);
    let failed = statuses.iter().filter(|status| status.error.is_some()).count();
    if failed > 0 {
        bail!("{failed} of {} pipeline runs failed", statuses.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn run_accepts_ratio_and_global_config() {
        let cli = Cli::try_parse_from([
            "crystal",
            "run",
            "--source",
            "claude",
            "export.json",
            "--ratio",
            "0.5",
            "--config",
            "override.json5",
        ])
        .expect("parse");
        assert_eq!(cli.config, Some(PathBuf::from("override.json5")));
        match cli.command {
            Command::Run {
                source,
                file,
                ratio,
                in_memory,
                ..
            } => {
                assert_eq!(source, "claude");
                assert_eq!(file, PathBuf::from("export.json"));
                assert_eq!(ratio, Some(0.5));
                assert!(!in_memory);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn extract_requires_a_source() {
        assert!(Cli::try_parse_from(["crystal", "extract", "export.json"]).is_err());
    }
}
