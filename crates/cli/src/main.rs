use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use qguard_briefing::BriefingComposer;
use qguard_core::{
    BatchWindow, ComplaintRecord, ComplaintStatus, ResolutionTable, ReworkRiskScorer,
    SignalLexicon, WorkOrderRecord,
};
use qguard_knowledge::KnowledgeCorpus;
use qguard_ml::UrgencyClassifier;
use qguard_observability::{init_tracing, QualityMetrics};
use qguard_storage::Store;
use qguard_tools::{
    KnowledgeLookupTool, ScoreReworkTool, ToolRegistry, UrgencyTool, KNOWLEDGE_LOOKUP_TOOL,
    SCORE_REWORK_TOOL, URGENCY_TOOL,
};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "qguard")]
#[command(about = "QualityGuard scoring and briefing CLI")]
struct Cli {
    #[arg(long, default_value = "kb")]
    kb_root: PathBuf,

    /// Alternative signal lexicon (JSON); defaults to the builtin v1 table.
    #[arg(long)]
    lexicon: Option<PathBuf>,

    /// Alternative resolution factor table (JSON).
    #[arg(long)]
    resolution_table: Option<PathBuf>,

    /// JSON batch loaded into the in-memory store, standing in for the
    /// ingestion collaborator.
    #[arg(long)]
    fixtures: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Compose the briefing for a time window.
    Brief {
        #[arg(long)]
        since: DateTime<Utc>,
        #[arg(long)]
        until: DateTime<Utc>,
    },
    /// Assess a single complaint narrative.
    Assess {
        #[arg(long)]
        narrative: String,
        #[arg(long, default_value = "GENERAL")]
        category: String,
        #[arg(long, default_value = "UNKNOWN")]
        location: String,
    },
    /// Score a single work order.
    Score {
        #[arg(long)]
        asset_age_months: u32,
        #[arg(long)]
        resolution_code: String,
        #[arg(long)]
        contractor_rate: Option<f64>,
    },
    Kb {
        #[command(subcommand)]
        command: KbCommand,
    },
    Tools {
        #[command(subcommand)]
        command: ToolsCommand,
    },
}

#[derive(Debug, Subcommand)]
enum KbCommand {
    Search {
        query: String,
        #[arg(long, default_value_t = 3)]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
enum ToolsCommand {
    /// List registered tool names and schemas.
    List,
}

#[derive(Debug, Default, Deserialize)]
struct FixtureFile {
    #[serde(default)]
    complaints: Vec<ComplaintRecord>,
    #[serde(default)]
    work_orders: Vec<WorkOrderRecord>,
    #[serde(default)]
    contractor_history: HashMap<String, f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("qguard_cli");
    let cli = Cli::parse();

    let registry = Arc::new(build_registry(&cli)?);
    let metrics = QualityMetrics::shared();
    let store = Arc::new(build_store(cli.fixtures.as_deref()).await?);

    match cli.command {
        Command::Brief { since, until } => {
            let composer = BriefingComposer::new(registry, store, metrics);
            let run = composer.compose(BatchWindow { since, until }).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        Command::Assess {
            narrative,
            category,
            location,
        } => {
            let record = ComplaintRecord {
                complaint_id: "adhoc-complaint".to_string(),
                narrative,
                category,
                reported_at: Utc::now(),
                location_id: location,
                status: ComplaintStatus::Open,
            };
            let output = registry.invoke(URGENCY_TOOL, serde_json::to_value(&record)?)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Score {
            asset_age_months,
            resolution_code,
            contractor_rate,
        } => {
            let order = WorkOrderRecord {
                work_order_id: "adhoc-work-order".to_string(),
                asset_id: "adhoc-asset".to_string(),
                asset_age_months,
                resolution_code,
                contractor_id: "adhoc-contractor".to_string(),
                completed_at: Utc::now(),
            };
            let output = registry.invoke(
                SCORE_REWORK_TOOL,
                json!({ "work_order": order, "contractor_rework_rate": contractor_rate }),
            )?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Kb { command } => match command {
            KbCommand::Search { query, limit } => {
                let keywords = query
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>();
                let output = registry.invoke(
                    KNOWLEDGE_LOOKUP_TOOL,
                    json!({ "keywords": keywords, "limit": limit }),
                )?;
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
        },
        Command::Tools { command } => match command {
            ToolsCommand::List => {
                println!("{}", serde_json::to_string_pretty(&registry.list_tools())?);
            }
        },
    }

    Ok(())
}

fn build_registry(cli: &Cli) -> Result<ToolRegistry> {
    let lexicon = match &cli.lexicon {
        Some(path) => SignalLexicon::from_json_file(path)?,
        None => SignalLexicon::builtin(),
    };
    let resolution_table = match &cli.resolution_table {
        Some(path) => ResolutionTable::from_json_file(path)?,
        None => ResolutionTable::builtin(),
    };

    let classifier = Arc::new(UrgencyClassifier::load_default(lexicon));
    let corpus = Arc::new(
        KnowledgeCorpus::from_dir(&cli.kb_root, "v1").with_context(|| {
            format!("failed loading knowledge corpus from {}", cli.kb_root.display())
        })?,
    );

    // A duplicate name here means a misconfigured registry; fail startup.
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(UrgencyTool::new(classifier)))?;
    registry.register(Arc::new(ScoreReworkTool::new(ReworkRiskScorer::new(
        resolution_table,
    ))))?;
    registry.register(Arc::new(KnowledgeLookupTool::new(corpus)))?;

    Ok(registry)
}

async fn build_store(fixtures: Option<&Path>) -> Result<Store> {
    let store = if let Ok(database_url) = env::var("QGUARD_DATABASE_URL") {
        Store::sqlite(&database_url).await?
    } else {
        Store::memory()
    };

    if let Some(path) = fixtures {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading fixtures at {}", path.display()))?;
        let fixtures: FixtureFile = serde_json::from_str(&raw).context("invalid fixtures json")?;

        for record in &fixtures.complaints {
            store.upsert_complaint(record).await?;
        }
        for record in &fixtures.work_orders {
            store.upsert_work_order(record).await?;
        }
        for (contractor_id, rate) in &fixtures.contractor_history {
            store.set_rework_rate(contractor_id, *rate).await?;
        }
    }

    Ok(store)
}
