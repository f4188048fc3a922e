//! Command-line front end for the `scroll_vision` engine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use image::RgbaImage;
use scroll_vision::refinement::annotate::render_preview;
use scroll_vision::snapshot::{AnalysisState, serialize_for_snapshot};
use scroll_vision::{
    AnalyzerConfig, DecompositionPipeline, DecompositionReport, HttpAnalyzer, MappingStrategy, PipelineConfig,
    RefinementConfig, RefinementReport, SemanticOrchestrator,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Strategy {
    /// One call with a numbered overlay of every block
    Annotated,
    /// One yes/no call per adjacent pair of blocks
    Pairwise,
}

impl From<Strategy> for MappingStrategy {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Annotated => MappingStrategy::AnnotatedPreview,
            Strategy::Pairwise => MappingStrategy::PairwiseRelevance,
        }
    }
}

#[derive(Parser)]
#[command(name = "scroll_vision")]
#[command(about = "Decompose tall mobile screenshots into content blocks")]
struct Args {
    /// JSON file with `pipeline`, `analyzer` and `refinement` sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API key for the analysis collaborator
    #[arg(long, global = true, env = "SCROLL_VISION_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the pixel-level decomposition as JSON
    Decompose {
        image: PathBuf,
    },

    /// Decompose, then merge blocks into semantic units with the collaborator
    Refine {
        image: PathBuf,

        /// Overrides the configured mapping strategy
        #[arg(long, value_enum)]
        strategy: Option<Strategy>,
    },

    /// Write the numbered block overlay
    Preview {
        image: PathBuf,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Write a restorable snapshot of the analysis
    Snapshot {
        image: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Run refinement too and store the refined list
        #[arg(long)]
        refine: bool,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    pipeline: PipelineConfig,
    analyzer: AnalyzerConfig,
    refinement: RefinementConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecompositionOutput<'a> {
    completeness: u8,
    pixel_segments: &'a [scroll_vision::Segment],
    invalid_segments: &'a [scroll_vision::Segment],
    separator_segments: &'a [scroll_vision::Segment],
}

impl<'a> From<&'a DecompositionReport> for DecompositionOutput<'a> {
    fn from(report: &'a DecompositionReport) -> Self {
        Self {
            completeness: report.completeness,
            pixel_segments: report.pixel_segments(),
            invalid_segments: report.invalid_segments(),
            separator_segments: report.separator_segments(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scroll_vision=info".parse().context("invalid log directive")?),
        )
        .init();

    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    if args.api_key.is_some() {
        config.analyzer.api_key = args.api_key;
    }

    match args.command {
        Command::Decompose { image } => {
            let source = load_image(&image)?;
            let report = decompose(&config, &source)?;
            print_json(&DecompositionOutput::from(&report))?;
        }
        Command::Refine { image, strategy } => {
            if let Some(strategy) = strategy {
                config.refinement.strategy = strategy.into();
            }
            let source = load_image(&image)?;
            let report = decompose(&config, &source)?;
            let refined = refine(&config, &source, &report).await?;
            print_json(&refined)?;
        }
        Command::Preview { image, output } => {
            let source = load_image(&image)?;
            let report = decompose(&config, &source)?;
            render_preview(&source, report.pixel_segments())?
                .save(&output)
                .with_context(|| format!("failed to write {}", output.display()))?;
            info!(path = %output.display(), blocks = report.pixel_segments().len(), "preview written");
        }
        Command::Snapshot { image, output, refine: with_refinement } => {
            let source = load_image(&image)?;
            let report = decompose(&config, &source)?;
            let refined = if with_refinement {
                Some(refine(&config, &source, &report).await?)
            } else {
                None
            };
            let record = serialize_for_snapshot(&AnalysisState {
                source: &source,
                config: config.pipeline,
                decomposition: &report,
                refinement: refined.as_ref(),
            })?;
            let json = serde_json::to_string_pretty(&record)?;
            std::fs::write(&output, json).with_context(|| format!("failed to write {}", output.display()))?;
            info!(path = %output.display(), "snapshot written");
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    let Some(path) = path else {
        return Ok(FileConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid config file {}", path.display()))
}

fn load_image(path: &Path) -> Result<RgbaImage> {
    let image = image::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(image.to_rgba8())
}

fn decompose(config: &FileConfig, source: &RgbaImage) -> Result<DecompositionReport> {
    let pipeline = DecompositionPipeline::new(config.pipeline)?;
    let report = pipeline.decompose(source).context("decomposition failed")?;
    info!(
        blocks = report.pixel_segments().len(),
        completeness = report.completeness,
        "decomposed"
    );
    Ok(report)
}

async fn refine(config: &FileConfig, source: &RgbaImage, report: &DecompositionReport) -> Result<RefinementReport> {
    let analyzer = HttpAnalyzer::new(config.analyzer.clone())?;
    let mut orchestrator = SemanticOrchestrator::new(Arc::new(analyzer), config.refinement.clone())?;
    orchestrator
        .refine(source, report)
        .await
        .context("refinement failed")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
