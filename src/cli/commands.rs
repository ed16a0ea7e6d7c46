//! CLI command definitions for news-forge.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::collaborators::{Collaborators, HttpFetcher, KeywordRelevanceFilter};
use crate::metrics::{export_metrics, init_metrics};
use crate::pipeline::{ContentJobHandler, ContentPipeline, PipelineConfig};
use crate::scheduler::{
    CategoryCatalog, ContentOptions, ContentRequest, JobStatus, PriorityJobQueue, QueueConfig,
    RecurringScheduler, SchedulerConfig,
};

/// Poll interval used while waiting for triggered jobs to drain.
const DRAIN_POLL: Duration = Duration::from_millis(500);

/// Scheduled content processing: priority queue, recurring triggers and a
/// quality-gated script pipeline.
#[derive(Parser)]
#[command(name = "news-forge")]
#[command(about = "Fetch, verify and script news content on a recurring schedule")]
#[command(version)]
#[command(
    long_about = "news-forge runs source URLs through fetch, relevance, verification, scripting and a quality-gated correction loop.\n\nJobs are served by a bounded priority queue with retry and backoff, fed by per-category recurring triggers.\n\nExample usage:\n  news-forge run --workers 5\n  news-forge trigger --category live\n  news-forge process https://www.bbc.com/news"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the queue and the recurring scheduler until Ctrl-C.
    Run(RunArgs),

    /// Submit jobs immediately and wait for them to finish.
    ///
    /// With a category and endpoint one job is submitted, with only a
    /// category one job per endpoint, and with neither one job per category.
    Trigger(TriggerArgs),

    /// Process a single URL in the foreground without the queue.
    Process(ProcessArgs),

    /// Print the category catalog as YAML.
    Categories(CategoriesArgs),
}

/// Arguments for `news-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// YAML category catalog replacing the built-in one.
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Number of workers (overrides QUEUE_WORKERS).
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Only serve the queue; do not register recurring triggers.
    #[arg(long)]
    pub no_scheduler: bool,

    /// Print Prometheus metrics on shutdown.
    #[arg(long)]
    pub print_metrics: bool,
}

/// Arguments for `news-forge trigger`.
#[derive(Parser, Debug)]
pub struct TriggerArgs {
    /// Category to trigger.
    #[arg(short, long)]
    pub category: Option<String>,

    /// Source endpoint to trigger.
    #[arg(short, long)]
    pub endpoint: Option<String>,

    /// YAML category catalog replacing the built-in one.
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Number of workers (overrides QUEUE_WORKERS).
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Seconds to wait for the submitted jobs to finish.
    #[arg(long, default_value = "600")]
    pub timeout: u64,
}

/// Arguments for `news-forge process`.
#[derive(Parser, Debug)]
pub struct ProcessArgs {
    /// Source URL to process.
    pub url: String,

    /// Print the processed content as JSON.
    #[arg(long)]
    pub json: bool,

    /// Use the fallback authenticity score instead of verifying.
    #[arg(long)]
    pub skip_verification: bool,

    /// Run one correction round even if the first script passes.
    #[arg(long)]
    pub force_correction: bool,
}

/// Arguments for `news-forge categories`.
#[derive(Parser, Debug)]
pub struct CategoriesArgs {
    /// YAML category catalog replacing the built-in one.
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_service_command(args).await,
        Commands::Trigger(args) => run_trigger_command(args).await,
        Commands::Process(args) => run_process_command(args).await,
        Commands::Categories(args) => run_categories_command(args),
    }
}

// ============================================================================
// Shared setup
// ============================================================================

fn load_catalog(path: Option<&PathBuf>) -> anyhow::Result<CategoryCatalog> {
    match path {
        Some(path) => CategoryCatalog::from_yaml_file(path)
            .with_context(|| format!("Failed to load catalog {}", path.display())),
        None => Ok(CategoryCatalog::default()),
    }
}

fn build_pipeline() -> anyhow::Result<ContentPipeline> {
    let config = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    let fetcher = HttpFetcher::new(config.fetch_timeout)
        .map_err(|e| anyhow::anyhow!("Failed to create fetcher: {}", e))?;
    let collaborators = Collaborators::local(Arc::new(fetcher)).with_relevance(Arc::new(
        KeywordRelevanceFilter::with_threshold(config.relevance_threshold),
    ));
    Ok(ContentPipeline::new(config, collaborators))
}

fn build_queue(workers: Option<usize>) -> anyhow::Result<PriorityJobQueue> {
    let mut config = QueueConfig::from_env().context("Invalid queue configuration")?;
    if let Some(workers) = workers {
        config = config.with_num_workers(workers);
    }
    config.validate().context("Invalid queue configuration")?;

    let handler = ContentJobHandler::new(Arc::new(build_pipeline()?));
    Ok(PriorityJobQueue::new(config, Arc::new(handler)))
}

// ============================================================================
// Command implementations
// ============================================================================

async fn run_service_command(args: RunArgs) -> anyhow::Result<()> {
    if let Err(e) = init_metrics() {
        warn!(error = %e, "Metrics unavailable");
    }

    let catalog = load_catalog(args.catalog.as_ref())?;
    let queue = build_queue(args.workers)?;
    let workers = queue.config().num_workers;
    queue.start(workers).await;

    let scheduler = RecurringScheduler::new(queue.clone(), catalog, SchedulerConfig::default());
    if args.no_scheduler {
        info!("Recurring scheduler disabled");
    } else {
        scheduler.start().await;
    }

    info!(workers = workers, "news-forge running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown requested");
    scheduler.stop().await;
    if let Err(e) = queue.stop().await {
        warn!(error = %e, "Queue did not drain cleanly");
    }

    let stats = queue.stats().await;
    let scheduler_stats = scheduler.stats().await;
    info!(
        submitted = stats.submitted,
        completed = stats.completed,
        failed = stats.failed,
        retried = stats.retried,
        pending = stats.pending,
        scheduled = scheduler_stats.jobs_scheduled,
        rejected = scheduler_stats.jobs_failed,
        "Final queue statistics"
    );

    if args.print_metrics {
        print!("{}", export_metrics());
    }
    Ok(())
}

async fn run_trigger_command(args: TriggerArgs) -> anyhow::Result<()> {
    let catalog = load_catalog(args.catalog.as_ref())?;
    let queue = build_queue(args.workers)?;
    let workers = queue.config().num_workers;
    queue.start(workers).await;

    let scheduler = RecurringScheduler::new(queue.clone(), catalog, SchedulerConfig::default());
    let report = scheduler
        .trigger_manual(args.category.as_deref(), args.endpoint.as_deref())
        .await?;

    for submission in &report.submissions {
        match (&submission.job_id, &submission.error) {
            (Some(id), _) => println!("submitted {} [{}] {}", id, submission.category, submission.endpoint),
            (None, error) => println!(
                "rejected [{}] {}: {}",
                submission.category,
                submission.endpoint,
                error.as_deref().unwrap_or("unknown error")
            ),
        }
    }

    let drained = queue
        .wait_idle(DRAIN_POLL, Duration::from_secs(args.timeout))
        .await;
    if !drained {
        warn!(timeout_secs = args.timeout, "Jobs still running at timeout");
    }
    if let Err(e) = queue.stop().await {
        warn!(error = %e, "Queue did not drain cleanly");
    }

    for id in report.job_ids() {
        let view = queue.status(id).await?;
        match view.status {
            JobStatus::Completed => {
                let score = view
                    .result
                    .as_ref()
                    .map(|output| output.content.reward_score)
                    .unwrap_or_default();
                println!("{} completed {} (reward {:.3})", view.id, view.url, score);
            }
            status => println!(
                "{} {} {} (retries {}): {}",
                view.id,
                status,
                view.url,
                view.retry_count,
                view.last_error.as_deref().unwrap_or("-")
            ),
        }
    }

    let stats = queue.stats().await;
    println!(
        "\n{} submitted, {} completed, {} failed, {} retried",
        stats.submitted, stats.completed, stats.failed, stats.retried
    );
    Ok(())
}

async fn run_process_command(args: ProcessArgs) -> anyhow::Result<()> {
    let pipeline = build_pipeline()?;
    let options = ContentOptions::default()
        .with_skip_verification(args.skip_verification)
        .with_force_correction(args.force_correction);
    let request = ContentRequest::new(args.url).with_options(options);
    request
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid URL: {}", e))?;

    let outcome = pipeline.run(&request).await;
    let content = match outcome.result {
        Ok(content) => content,
        Err(e) => {
            let stages: Vec<&str> = outcome.run.history.iter().map(|s| s.as_str()).collect();
            return Err(anyhow::anyhow!(
                "Processing failed after {}: {}",
                stages.join(" -> "),
                e
            ));
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&content)?);
        return Ok(());
    }

    println!("Title:        {}", content.title);
    println!("Categories:   {}", content.categories.join(", "));
    println!("Authenticity: {:.1} ({:?})", content.authenticity_score, content.credibility);
    println!(
        "Reward:       {:.3} (tone {:.2}, engagement {:.2}, quality {:.2})",
        content.reward_score,
        content.score_report.sub_scores.tone,
        content.score_report.sub_scores.engagement,
        content.score_report.sub_scores.quality
    );
    println!("Corrections:  {}", content.correction_attempts);
    println!("Summary:      {}", content.summary);
    println!("\n{}", content.script.text);
    for error in &content.errors {
        println!("warning: {}", error);
    }
    Ok(())
}

fn run_categories_command(args: CategoriesArgs) -> anyhow::Result<()> {
    let catalog = load_catalog(args.catalog.as_ref())?;
    print!("{}", catalog.to_yaml()?);
    Ok(())
}
