//! decisions CLI
//!
//! Submit a decision for analysis and inspect stored decisions.
//!
//! Run with: cargo run -- analyze decision.json

use anyhow::{bail, Context, Result};
use decisions_architect::{
    AppConfig, DecisionStore, DecisionSubmission, RunOutcome, ServiceError, Services,
};
use std::path::Path;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const USAGE: &str = r#"decisions - critique the reasoning behind a decision

USAGE:
    decisions analyze <submission.json> [--user=<uuid>]
    decisions status <decision_id> [--user=<uuid>]
    decisions history [--user=<uuid>] [--skip=N] [--limit=N]
    decisions outcome <decision_id> <text...> [--selected=<variant>] [--user=<uuid>]
    decisions delete <decision_id> [--user=<uuid>]
    decisions health

ENVIRONMENT:
    DECISIONS_DATA_DIR, DECISIONS_DB_PATH, DECISIONS_MODEL_DIR,
    DECISIONS_CROSS_ENCODER_DIR, ANTHROPIC_API_KEY, DECISIONS_LLM_MODEL,
    DECISIONS_LLM_URL, DECISIONS_LLM_TIMEOUT_SECS, DECISIONS_RETRIEVAL_TOP_K,
    DECISIONS_SCORING_SEED, DECISIONS_FAILURE_POLICY (preserve | rollback),
    RUST_LOG"#;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = AppConfig::from_env();

    let Some(command) = args.get(1) else {
        println!("{}", USAGE);
        return Ok(());
    };
    let positional: Vec<&str> = args[2..]
        .iter()
        .filter(|a| !a.starts_with("--"))
        .map(String::as_str)
        .collect();
    let user = flag(&args, "--user=").map(parse_id).transpose()?;

    match command.as_str() {
        "analyze" => {
            let path = positional
                .first()
                .context("Usage: decisions analyze <submission.json>")?;
            run_analyze(&config, Path::new(path), user.unwrap_or_else(Uuid::nil)).await
        }
        "status" => {
            let id = positional
                .first()
                .context("Usage: decisions status <decision_id>")?;
            let id = parse_id(id)?;
            let store = DecisionStore::open(&config.db_path)?;
            match store.get(id)? {
                Some(record) if user.map_or(true, |u| u == record.user_id) => {
                    println!("{}", serde_json::to_string_pretty(&record.status_view())?);
                    Ok(())
                }
                _ => bail!("decision {} not found", id),
            }
        }
        "history" => {
            let skip = flag(&args, "--skip=").and_then(|v| v.parse().ok()).unwrap_or(0);
            let limit = flag(&args, "--limit=").and_then(|v| v.parse().ok()).unwrap_or(10);
            let store = DecisionStore::open(&config.db_path)?;
            let records = store.history(user, skip, limit)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
            Ok(())
        }
        "outcome" => run_outcome(&config, &positional, flag(&args, "--selected="), user),
        "delete" => {
            let id = positional
                .first()
                .context("Usage: decisions delete <decision_id>")?;
            let id = parse_id(id)?;
            let services = Services::build(&config)?;
            match services.decisions.delete_decision(id, user).await {
                Ok(()) => {
                    println!("Deleted decision {}", id);
                    Ok(())
                }
                Err(ServiceError::NotFound) => bail!("decision {} not found", id),
                Err(e) => Err(e.into()),
            }
        }
        "health" => run_health(&config),
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    }
}

async fn run_analyze(config: &AppConfig, path: &Path, user: Uuid) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read submission {:?}", path))?;
    let submission: DecisionSubmission =
        serde_json::from_str(&raw).context("Submission is not valid JSON")?;

    let services = Services::build(config)?;
    let dispatched = services.decisions.submit(submission, user)?;
    let id = dispatched.receipt.decision_id;
    eprintln!("{}", dispatched.receipt.message);

    match dispatched.job.await.context("analysis task failed")? {
        RunOutcome::RolledBack { code } => {
            bail!("analysis failed with {} and the decision was rolled back", code)
        }
        RunOutcome::Completed | RunOutcome::Failed { .. } | RunOutcome::Skipped => {}
    }

    let view = services.decisions.status(id, Some(user))?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

fn run_outcome(
    config: &AppConfig,
    positional: &[&str],
    selected: Option<&str>,
    user: Option<Uuid>,
) -> Result<()> {
    let (Some(id), rest) = (positional.first(), positional.get(1..).unwrap_or_default()) else {
        bail!("Usage: decisions outcome <decision_id> <text...> [--selected=<variant>]");
    };
    let id = parse_id(id)?;
    let text = rest.join(" ");
    if text.trim().is_empty() {
        bail!("outcome text is required");
    }

    let store = DecisionStore::open(&config.db_path)?;
    let Some(record) = store.get(id)?.filter(|r| user.map_or(true, |u| u == r.user_id)) else {
        bail!("decision {} not found", id);
    };
    if let Some(variant) = selected {
        if !record.variants.iter().any(|v| v == variant) {
            bail!("'{}' is not one of the decision's variants: {:?}", variant, record.variants);
        }
    }

    let updated = store
        .record_outcome(id, text.trim(), selected)?
        .with_context(|| format!("decision {} disappeared", id))?;
    println!("{}", serde_json::to_string_pretty(&updated)?);
    Ok(())
}

/// Report which pieces of the pipeline are usable without loading them
fn run_health(config: &AppConfig) -> Result<()> {
    let model_ready =
        |dir: &Path| dir.join("model.onnx").exists() && dir.join("tokenizer.json").exists();

    let database = match DecisionStore::open(&config.db_path) {
        Ok(_) => "ok".to_string(),
        Err(e) => format!("error: {:#}", e),
    };

    let report = serde_json::json!({
        "database": database,
        "db_path": config.db_path,
        "embedding_model": model_ready(&config.embedding_model_dir),
        "cross_encoder": model_ready(&config.cross_encoder_dir),
        "reasoning_api_key": !config.reasoner.api_key.is_empty(),
        "reasoning_model": config.reasoner.model,
        "failure_policy": config.failure_policy,
        "retrieval_top_k": config.retrieval_top_k,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn flag<'a>(args: &'a [String], prefix: &str) -> Option<&'a str> {
    args.iter().find_map(|a| a.strip_prefix(prefix))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("'{}' is not a valid id", raw))
}
