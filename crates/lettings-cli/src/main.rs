use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use lettings_match::{MatchPipeline, RunConfig, RunSummary};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lettings-cli")]
#[command(about = "Match rental listings across platforms")]
struct Cli {
    /// Workspace root holding `input/`, `matching.yaml` and `reports/`.
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,
    /// Rehash every gallery image and replace the stored records.
    #[arg(long, global = true)]
    force_refresh: bool,
    /// Compute visual embeddings alongside perceptual hashes.
    #[arg(long, global = true)]
    embeddings: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Gather image evidence, resolve and write reports.
    Run,
    /// Refresh per-listing image hashes only.
    HashImages,
    /// Resolve from stored hashes without network access.
    Score,
    /// Write uncertain pairs for manual labelling.
    ExportReview {
        #[arg(long, default_value = "review_queue.json")]
        out: PathBuf,
    },
}

fn print_summary(label: &str, summary: &RunSummary) {
    println!(
        "{label} complete: run_id={} listings={} pairs={} matches={} uncertain={} merged={} excluded={} reports={}",
        summary.run_id,
        summary.stats.listings,
        summary.stats.candidate_pairs,
        summary.stats.matches,
        summary.stats.uncertain,
        summary.merged_properties,
        summary.excluded_clusters,
        summary.reports_dir
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lettings=info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut config = match cli.workspace {
        Some(root) => RunConfig::with_workspace(root),
        None => RunConfig::from_env(),
    };
    config.force_refresh |= cli.force_refresh;
    config.embeddings |= cli.embeddings;
    let pipeline = MatchPipeline::new(config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let summary = pipeline.run_once().await?;
            print_summary("run", &summary);
            println!(
                "images: hashed={} downloaded={} reused={} failed={}",
                summary.evidence.images, summary.evidence.downloaded, summary.evidence.reused, summary.evidence.failed
            );
        }
        Commands::HashImages => {
            let stats = pipeline.hash_images().await?;
            println!(
                "hash-images complete: listings={} hashed={} downloaded={} reused={} unchanged={} failed={}",
                stats.listings_with_gallery, stats.images, stats.downloaded, stats.reused, stats.unchanged, stats.failed
            );
        }
        Commands::Score => {
            let summary = pipeline.score_offline().await?;
            print_summary("score", &summary);
        }
        Commands::ExportReview { out } => {
            let out = if out.is_relative() {
                pipeline.config().workspace_root.join(out)
            } else {
                out
            };
            let pairs = pipeline.export_review(&out).await?;
            println!("exported {pairs} uncertain pairs to {}", out.display());
        }
    }

    Ok(())
}
