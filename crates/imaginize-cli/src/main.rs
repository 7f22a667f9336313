mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use imaginize_ai::{AiFacade, AiProvider};
use imaginize_core::{book_id_from_path, ChapterSpec, Config, MergeStrategy};
use imaginize_pipeline::{
    AnalyzeConfig, AnalyzePhase, ControllerError, ExtractConfig, ExtractPhase, IllustrateConfig,
    IllustratePhase, PipelineController, SeriesBridge,
};
use imaginize_resolve::ResolutionCache;
use imaginize_scheduler::Scheduler;
use imaginize_store::StateStore;

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() {
    imaginize_core::config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();
    let exit_code = match run(args).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, "pipeline run failed");
            exit_code_for(&err)
        }
    };
    std::process::exit(exit_code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(controller_err) = err.downcast_ref::<ControllerError>() {
        return controller_err.exit_code();
    }
    5
}

async fn run(args: CliArgs) -> Result<()> {
    let config = Config::from_env();
    config.log_summary();

    std::fs::create_dir_all(&args.book_dir)
        .with_context(|| format!("failed to create book directory {:?}", args.book_dir))?;

    let book_id = args.book_id.clone().unwrap_or_else(|| book_id_from_path(&args.book_dir));
    let chapters = load_chapters(&args.chapters)?;

    let ai_provider: Arc<dyn AiProvider> =
        Arc::new(AiFacade::from_config(&config.ai).context("failed to configure AI provider")?);
    let cache = Arc::new(ResolutionCache::with_defaults());
    let scheduler = Arc::new(Scheduler::new(config.scheduler.clone()));
    let state_store = Arc::new(StateStore::new(&args.book_dir));
    let events = Arc::new(imaginize_pipeline::EventBus::new());

    let series_merge_strategy =
        MergeStrategy::parse(&config.series.merge_strategy).unwrap_or(MergeStrategy::Enrich);

    let analyze = AnalyzePhase {
        book_dir: args.book_dir.clone(),
        book_id: book_id.clone(),
        state_store: state_store.clone(),
        scheduler: scheduler.clone(),
        ai: ai_provider.clone(),
        cache: cache.clone(),
        events: events.clone(),
        config: AnalyzeConfig {
            pages_per_image: config.catalog.pages_per_image,
            entity_match_confidence: config.catalog.entity_match_confidence,
            merge_strategy: MergeStrategy::Enrich,
            continue_on_failure: true,
            selection: args.select.clone(),
            limit: args.limit,
            force: args.force,
        },
    };

    let extract = ExtractPhase {
        book_dir: args.book_dir.clone(),
        book_id: book_id.clone(),
        state_store: state_store.clone(),
        ai: ai_provider.clone(),
        cache: cache.clone(),
        events: events.clone(),
        config: ExtractConfig {
            entity_match_confidence: config.catalog.entity_match_confidence,
            merge_strategy: MergeStrategy::Enrich,
            ai_description_enrichment: config.catalog.ai_description_enrichment,
        },
    };

    let illustrate = IllustratePhase {
        book_dir: args.book_dir.clone(),
        state_store: state_store.clone(),
        scheduler: scheduler.clone(),
        ai: ai_provider.clone(),
        events: events.clone(),
        config: IllustrateConfig {
            image_size: config.ai.image_size.clone(),
            chapter_title_slugs: true,
        },
    };

    let series_bridge = match (config.series.enabled, &args.series_root) {
        (true, Some(series_root)) => Some(SeriesBridge {
            series_root: series_root.clone(),
            book_id: book_id.clone(),
            merge_strategy: series_merge_strategy,
        }),
        _ => None,
    };

    let controller = PipelineController {
        book_dir: args.book_dir.clone(),
        state_store: state_store.clone(),
        analyze,
        extract,
        illustrate,
        series_bridge,
    };

    match args.command {
        Command::Analyze => controller.run_analyze(&chapters).await?,
        Command::Extract => controller.run_extract(&chapters).await?,
        Command::Illustrate => controller.run_illustrate(&chapters).await?,
        Command::Run | Command::Continue => controller.run_full(&chapters).await?,
    }

    Ok(())
}

fn load_chapters(path: &Path) -> Result<Vec<ChapterSpec>> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read chapters file {path:?}"))?;
    serde_json::from_slice(&bytes).with_context(|| format!("failed to parse chapters file {path:?}"))
}
