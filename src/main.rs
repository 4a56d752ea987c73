use std::sync::Arc;

use anyhow::Context;
use email_triage::config::TriageConfig;
use email_triage::ingest::{self, ExportSource};
use email_triage::pipeline::actions::{self, JsonLineModifier, LabelChanges, LabelMap};
use email_triage::pipeline::evaluate;
use email_triage::rules::Rule;
use email_triage::store::{LibSqlBackend, MessageStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = TriageConfig::from_env()?;

    eprintln!("📬 Email Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Rules: {}", config.rules_path.display());
    eprintln!("   Database: {}", config.db_path.display());

    // The rule is validated before anything touches the database.
    let rule = Rule::from_file(&config.rules_path)
        .with_context(|| format!("loading rule from {}", config.rules_path.display()))?;

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn MessageStore> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("opening database at {}", config.db_path.display()))?,
    );

    // ── Ingest ──────────────────────────────────────────────────────────
    if let Some(import_path) = &config.import_path {
        let source = ExportSource::from_file(import_path)
            .with_context(|| format!("loading export from {}", import_path.display()))?
            .with_fallback_user(&config.user_email);
        let report = ingest::ingest(&source, store.as_ref(), config.ingest_options()).await?;
        eprintln!(
            "   Ingested: {} new, {} already stored, {} skipped",
            report.inserted, report.duplicates, report.skipped
        );
    }

    // ── Evaluate ────────────────────────────────────────────────────────
    let ids = evaluate(store.as_ref(), &rule).await?;
    eprintln!(
        "   Matched {} message(s) ({} rule)",
        ids.len(),
        rule.collection_predicate().as_str()
    );
    for id in &ids {
        println!("{id}");
    }

    // ── Actions ─────────────────────────────────────────────────────────
    if let Some(labels_path) = &config.labels_path {
        let labels = LabelMap::from_file(labels_path)
            .with_context(|| format!("loading labels from {}", labels_path.display()))?;
        let changes = LabelChanges::from_rule(&rule, &labels).await?;
        let batches = changes.batches(&ids, config.modify_batch);
        let modifier = JsonLineModifier::new(std::io::stdout());
        let modified = actions::apply(&modifier, &batches).await?;
        eprintln!(
            "   Planned actions for {modified} message(s) in {} batch(es)",
            batches.len()
        );
    }

    Ok(())
}
