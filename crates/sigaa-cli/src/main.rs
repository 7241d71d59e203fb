use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sigaa_portal::{FixtureBrowser, HttpPortalBrowser, PageArchive, PortalBrowser, RecordingBrowser};
use sigaa_storage::{CatalogStore, MemoryCatalogStore, PgCatalogStore};
use sigaa_sync::{
    CurriculumSelector, IngestConfig, IngestPipeline, IngestRunSummary, IngestScope,
    ProgramSelector, StageKind,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sigaa-cli")]
#[command(about = "SIGAA academic catalog ingestion")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape the portal and upsert departments, programs, curricula and components.
    Sync(SyncArgs),
    /// Apply the catalog schema migrations.
    Migrate,
}

#[derive(Debug, Default, Args)]
struct SyncArgs {
    /// Portal id of a single program, e.g. 414924.
    #[arg(long)]
    program: Option<i64>,
    /// Code of a single curriculum, e.g. 6360/2.
    #[arg(long)]
    curriculum: Option<String>,
    /// Last stage to run: departments, programs, curricula or components.
    #[arg(long)]
    until: Option<StageKind>,
    /// Ingest mandatory components too, not only electives.
    #[arg(long)]
    include_mandatory: bool,
    /// Include inactive curricula.
    #[arg(long)]
    all_curricula: bool,
    /// Replay a recorded fixture directory instead of the live portal.
    #[arg(long, conflicts_with = "record")]
    fixtures: Option<PathBuf>,
    /// Archive every live page into this directory as a replayable bundle.
    #[arg(long)]
    record: Option<PathBuf>,
    /// Write into an in-memory catalog instead of Postgres.
    #[arg(long)]
    dry_run: bool,
    /// Print the run summary as JSON.
    #[arg(long)]
    json: bool,
}

impl SyncArgs {
    fn scope(&self, config: &IngestConfig) -> IngestScope {
        IngestScope {
            programs: self.program.map_or(ProgramSelector::All, ProgramSelector::One),
            curricula: self
                .curriculum
                .clone()
                .map_or(CurriculumSelector::All, CurriculumSelector::One),
            active_only: config.active_only && !self.all_curricula,
            include_mandatory: self.include_mandatory,
            until: self.until.unwrap_or(StageKind::Components),
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => sync(args).await?,
        Commands::Migrate => {
            let config = IngestConfig::from_env();
            let store = PgCatalogStore::connect(&config.database_url)
                .await
                .context("connecting to postgres")?;
            store.migrate().await.context("running migrations")?;
            println!("migrations applied");
        }
    }

    Ok(())
}

async fn sync(args: SyncArgs) -> Result<()> {
    let config = IngestConfig::from_env();
    let scope = args.scope(&config);

    let recorder = match &args.record {
        Some(dir) => {
            let live = HttpPortalBrowser::new(config.http())?;
            Some(Arc::new(RecordingBrowser::new(Arc::new(live), PageArchive::new(dir))))
        }
        None => None,
    };
    let browser: Arc<dyn PortalBrowser> = match (&args.fixtures, &recorder) {
        (Some(dir), _) => Arc::new(
            FixtureBrowser::from_dir(dir).with_context(|| format!("loading fixtures from {}", dir.display()))?,
        ),
        (None, Some(recorder)) => Arc::clone(recorder) as Arc<dyn PortalBrowser>,
        (None, None) => Arc::new(HttpPortalBrowser::new(config.http())?),
    };
    let pacing = if args.fixtures.is_some() {
        Duration::ZERO
    } else {
        config.pacing()
    };

    let memory = MemoryCatalogStore::new();
    let store: Arc<dyn CatalogStore> = if args.dry_run {
        Arc::new(memory.clone())
    } else {
        Arc::new(
            PgCatalogStore::connect(&config.database_url)
                .await
                .context("connecting to postgres")?,
        )
    };

    let mut pipeline = IngestPipeline::new(browser, store, config.urls(), pacing);
    let outcome = pipeline.run(&scope).await;

    // Pages recorded before a failure are still worth keeping.
    if let Some(recorder) = &recorder {
        let path = recorder.write_bundle("sigaa-live", &config.base_url).await?;
        info!(path = %path.display(), "recorded pages written");
    }
    let summary = outcome.context("ingest run failed")?;

    if args.json {
        let catalog = if args.dry_run {
            Some(memory.snapshot().await)
        } else {
            None
        };
        let out = serde_json::json!({ "summary": summary, "catalog": catalog });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn print_summary(summary: &IngestRunSummary) {
    println!(
        "sync complete: run_id={} stages={} curricula={}",
        summary.run_id,
        summary.stages.len(),
        summary.curricula.len()
    );
    for report in &summary.stages {
        println!(
            "  {:<12} scraped={} inserted={} updated={} unchanged={} skipped={} links={} relations={}",
            report.stage.to_string(),
            report.scraped,
            report.inserted,
            report.updated,
            report.unchanged,
            report.skipped,
            report.links_written,
            report.relations_replaced
        );
    }
}
