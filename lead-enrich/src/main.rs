//! lead-enrich - batch driver
//!
//! Runs one of the three pipelines over a record set, checkpointing as it goes
//! so an interrupted run can be resumed with the same `--batch-id`.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lead_common::EventBus;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lead_enrich::batch::{
    BatchOptions, BatchReport, BatchRunner, BuyerGroupProcessor, ChurnProcessor, ContactsProcessor, RecordProcessor,
};
use lead_enrich::buyer_group::criteria::BuyerCriteria;
use lead_enrich::buyer_group::BuyerGroupEngine;
use lead_enrich::checkpoint::{CheckpointManager, CheckpointStore, FileCheckpointStore, SqliteCheckpointStore};
use lead_enrich::churn::ChurnCalculator;
use lead_enrich::config::EngineConfig;
use lead_enrich::db;
use lead_enrich::ledger::CostLedger;
use lead_enrich::providers::ProviderSet;
use lead_enrich::sink::{PatchSink, SqlitePatchSink};
use lead_enrich::source::{JsonlSource, RecordFilter};
use lead_enrich::types::BatchKind;

/// Command-line arguments for lead-enrich
#[derive(Parser, Debug)]
#[command(name = "lead-enrich")]
#[command(about = "Contact verification, churn risk and buyer-group scoring for CRM records")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Engine configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data folder holding lead-enrich.db
    #[arg(long, global = true)]
    root_folder: Option<PathBuf>,

    /// Resume or name a batch; a new id is generated when omitted
    #[arg(long, global = true)]
    batch_id: Option<String>,

    /// Records processed concurrently
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Recompute fields that are already verified or fresh
    #[arg(long, global = true)]
    force: bool,

    /// Keep checkpoints as JSON files in this directory instead of SQLite
    #[arg(long, global = true)]
    checkpoint_dir: Option<PathBuf>,

    /// Stop paid calls once total cost reaches this amount
    #[arg(long, global = true)]
    budget: Option<f64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify and discover email and phone for person records
    Contacts(RecordArgs),
    /// Compute churn risk from career history
    Churn(RecordArgs),
    /// Score companies and tag buyer-group members
    BuyerGroup {
        /// Qualification criteria (TOML)
        #[arg(long)]
        criteria: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct RecordArgs {
    /// Person records as JSON lines
    #[arg(long)]
    input: PathBuf,

    /// Only records of this workspace
    #[arg(long)]
    workspace: Option<String>,

    /// Only these records (repeatable)
    #[arg(long = "record-id")]
    record_ids: Vec<String>,

    /// Process at most this many records
    #[arg(long)]
    limit: Option<usize>,
}

impl RecordArgs {
    fn filter(&self) -> RecordFilter {
        RecordFilter {
            workspace: self.workspace.clone(),
            record_ids: self.record_ids.iter().cloned().collect::<BTreeSet<_>>(),
            limit: self.limit,
        }
    }
}

impl Command {
    fn kind(&self) -> BatchKind {
        match self {
            Command::Contacts(_) => BatchKind::Contacts,
            Command::Churn(_) => BatchKind::Churn,
            Command::BuyerGroup { .. } => BatchKind::BuyerGroup,
        }
    }
}

/// Everything a batch run needs besides the processor
struct RunContext {
    config: EngineConfig,
    providers: ProviderSet,
    ledger: Arc<CostLedger>,
    events: EventBus,
    store: Arc<dyn CheckpointStore>,
    sink: Arc<dyn PatchSink>,
    cancel: CancellationToken,
    batch_id: String,
    force: bool,
}

impl RunContext {
    async fn load_checkpoint(&self, kind: BatchKind) -> Result<CheckpointManager> {
        CheckpointManager::load(
            Arc::clone(&self.store),
            Arc::clone(&self.sink),
            Arc::clone(&self.ledger),
            self.events.clone(),
            &self.batch_id,
            kind,
        )
        .await
        .context("Failed to load checkpoint")
    }

    async fn execute<P: RecordProcessor>(self, processor: P, items: Vec<P::Item>) -> Result<BatchReport> {
        let checkpoint = self.load_checkpoint(processor.kind()).await?;
        self.run(checkpoint, processor, items).await
    }

    async fn run<P: RecordProcessor>(
        self,
        checkpoint: CheckpointManager,
        processor: P,
        items: Vec<P::Item>,
    ) -> Result<BatchReport> {
        let options = BatchOptions::from_config(&self.batch_id, &self.config.batch);
        let runner = BatchRunner::new(options, checkpoint, self.ledger, self.events, self.cancel);
        let report = runner.run(Arc::new(processor), items).await?;
        Ok(report)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_enrich=info,lead_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let kind = args.command.kind();

    let (mut config, config_path) =
        EngineConfig::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(workers) = args.workers {
        config.batch.workers = workers.max(1);
    }
    if args.budget.is_some() {
        config.batch.budget = args.budget;
    }

    let root_folder = lead_common::config::resolve_root_folder(args.root_folder.as_deref(), config_path.as_deref());
    let batch_id = args
        .batch_id
        .clone()
        .unwrap_or_else(|| format!("{}-{}", kind.as_str(), uuid::Uuid::new_v4().simple()));

    info!(
        batch_id = %batch_id,
        kind = kind.as_str(),
        root_folder = %root_folder.display(),
        "Starting lead-enrich"
    );

    let events = EventBus::default();
    let ledger = Arc::new(CostLedger::new(config.batch.budget));
    let providers = ProviderSet::from_config(&config, Arc::clone(&ledger), events.clone())
        .context("Failed to configure providers")?;

    let lock_wait = config.batch.db_lock_wait_ms;
    let pool = db::init_database(&db::database_path(&root_folder), lock_wait)
        .await
        .context("Failed to open database")?;

    let store: Arc<dyn CheckpointStore> = match &args.checkpoint_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "Using file checkpoints");
            Arc::new(FileCheckpointStore::new(dir))
        }
        None => Arc::new(SqliteCheckpointStore::new(pool.clone(), lock_wait)),
    };
    let sink: Arc<dyn PatchSink> = Arc::new(SqlitePatchSink::new(pool.clone(), lock_wait));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight records");
            interrupt.cancel();
        }
    });

    let context = RunContext {
        config,
        providers,
        ledger,
        events,
        store,
        sink,
        cancel,
        batch_id,
        force: args.force,
    };

    let report = match args.command {
        Command::Contacts(record_args) => {
            let processor =
                ContactsProcessor::from_providers(&context.providers, context.config.cascade.clone(), context.force)
                    .context("Contact verification is not configured")?;
            let records = JsonlSource::new(&record_args.input).load(&record_args.filter()).await?;
            context.execute(processor, records).await?
        }
        Command::Churn(record_args) => {
            let processor = ChurnProcessor::new(
                ChurnCalculator::new(context.config.churn.clone()),
                context.providers.profile_fetcher.clone(),
                context.force,
            );
            let records = JsonlSource::new(&record_args.input).load(&record_args.filter()).await?;
            context.execute(processor, records).await?
        }
        Command::BuyerGroup { criteria } => {
            let criteria = BuyerCriteria::load(&criteria).context("Failed to load buyer criteria")?;
            let engine = BuyerGroupEngine::new(&context.providers, context.config.scoring.clone())
                .context("Buyer-group scoring is not configured")?;
            let processor = BuyerGroupProcessor::new(engine, criteria);
            // The ranking lives in the checkpoint, so load it before searching
            let mut checkpoint = context.load_checkpoint(BatchKind::BuyerGroup).await?;
            let companies = processor.plan(&mut checkpoint).await?;
            context.run(checkpoint, processor, companies).await?
        }
    };

    pool.close().await;
    print!("{}", report.render());
    Ok(())
}
