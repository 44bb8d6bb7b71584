//! CLI command implementations.
//!
//! Each `run_*` function opens the [`App`], performs one operation and
//! prints a human-readable summary to stdout.

use anyhow::{bail, Context, Result};
use std::path::Path;

use concierge_harness_core::models::{NewEntry, SyncReport};
use concierge_harness_core::store::EntryFilter;

use crate::app::App;
use crate::config::Config;
use crate::llm::ChatMessage;
use crate::sync::{configured_sources, run_sync};
use crate::tools::TurnContext;
use crate::trace::Feedback;

/// `concierge import <file>`: bulk import a JSON array of entries.
pub async fn run_import(config: &Config, file: &Path, keep_duplicates: bool) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read import file: {}", file.display()))?;
    let entries: Vec<NewEntry> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of entries", file.display()))?;

    let app = App::open(config).await?;
    let outcome = app.kb.bulk_import(&entries, !keep_duplicates).await?;

    println!("import {}", file.display());
    println!("  entries read: {}", entries.len());
    println!("  created: {}", outcome.created);
    println!("  skipped: {}", outcome.skipped);
    for warning in &outcome.warnings {
        println!("  warning: {}", warning);
    }
    println!("ok");
    Ok(())
}

/// `concierge sync [source]`: resync configured sources.
pub async fn run_sync_command(config: &Config, source: Option<&str>) -> Result<()> {
    let sources = configured_sources(config, source)?;
    if sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    let app = App::open(config).await?;
    let report = run_sync(&app.kb, &sources).await;
    print_report(&report);

    if !report.is_clean() {
        bail!("sync finished with {} error(s)", report.errors.len());
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    for phase in &report.phases {
        println!("sync {}", phase.source);
        println!("  created: {}", phase.created);
        println!("  skipped: {}", phase.skipped);
        for e in &phase.errors {
            println!("  error: {}", e);
        }
        println!("  duration: {}ms", phase.duration_ms);
    }
    println!(
        "total: {} entries in {}ms",
        report.kb_entries, report.duration_ms
    );
}

/// `concierge search <query>`: run retrieval and print ranked entries.
pub async fn run_search(config: &Config, query: &str, category: Option<&str>) -> Result<()> {
    let app = App::open(config).await?;
    let outcome = app.retriever.retrieve(query, category).await;

    if !outcome.found {
        println!("No results.");
        if let Some(message) = outcome.message {
            println!("{}", message);
        }
        return Ok(());
    }

    for (i, entry) in outcome.entries.iter().enumerate() {
        let title = match &entry.section {
            Some(section) => format!("{} / {}", entry.title, section),
            None => entry.title.clone(),
        };
        println!("{}. [{:.2}] {}", i + 1, entry.score, title);
        println!("    {}", entry.content.replace('\n', " "));
        println!("    id: {}", entry.id);
        println!();
    }
    if outcome.used_hyde {
        println!("(expanded with a hypothetical answer)");
    }
    Ok(())
}

/// `concierge ask <question>`: run one agent turn.
pub async fn run_ask(
    config: &Config,
    question: &str,
    category: Option<String>,
    actor: Option<String>,
) -> Result<()> {
    let app = App::open(config).await?;
    let turn = TurnContext {
        category_id: category,
        actor_id: actor,
    };
    let outcome = app.ask(&[ChatMessage::user(question)], &turn).await?;

    for invocation in &outcome.invocations {
        let status = if invocation.success { "ok" } else { "failed" };
        println!("tool {} {} ({})", invocation.name, invocation.input, status);
    }
    if !outcome.invocations.is_empty() {
        println!();
    }
    println!("{}", outcome.answer);
    Ok(())
}

/// `concierge feedback <query>`: rate the latest answer to `query`.
pub async fn run_feedback(
    config: &Config,
    query: &str,
    actor: Option<&str>,
    channel: Option<&str>,
    value: Feedback,
) -> Result<()> {
    let app = App::open(config).await?;
    let channel = channel.unwrap_or(app.trace.channel()).to_string();
    let resolution_id = app
        .trace
        .submit_feedback(query, actor, &channel, value)
        .await?;
    println!("feedback {} recorded on resolution {}", i64::from(value), resolution_id);
    Ok(())
}

/// `concierge queries`: newest traced queries with their latest resolution.
pub async fn run_queries(config: &Config, limit: usize) -> Result<()> {
    let app = App::open(config).await?;
    let traces = app.trace.recent(limit).await?;
    if traces.is_empty() {
        println!("No queries.");
        return Ok(());
    }
    for q in &traces {
        println!(
            "{} [{}] {:.2} {}",
            q.id, q.status, q.confidence_score, q.guest_input
        );
        if let Some(r) = &q.resolution {
            let feedback = r.feedback.map(|f| f.to_string()).unwrap_or_else(|| "-".to_string());
            println!("    {} (feedback {}): {}", r.source, feedback, r.response_text.replace('\n', " "));
        }
    }
    Ok(())
}

/// `concierge resolve <query-id> <text>`: answer a traced query by hand.
pub async fn run_resolve(config: &Config, query_id: &str, response_text: &str) -> Result<()> {
    let app = App::open(config).await?;
    let resolution_id = app.trace.resolve_manually(query_id, response_text).await?;
    println!("query {} resolved by staff (resolution {})", query_id, resolution_id);
    Ok(())
}

/// `concierge reindex`: re-embed stored entries and rewrite their vectors.
pub async fn run_reindex(config: &Config, source: Option<String>, batch_size: usize) -> Result<()> {
    let app = App::open(config).await?;
    let filter = EntryFilter {
        source,
        ..Default::default()
    };
    let outcome = app.kb.reindex(&filter, batch_size).await?;
    println!("reindex");
    println!("  indexed: {}", outcome.indexed);
    println!("  failed: {}", outcome.failed);
    Ok(())
}

/// Parse `1`, `+1`, `up`, `-1` or `down`.
pub fn parse_feedback(s: &str) -> Result<Feedback, String> {
    match s.trim() {
        "1" | "+1" | "up" => Ok(Feedback::Positive),
        "-1" | "down" => Ok(Feedback::Negative),
        other => Err(format!("feedback must be 1 or -1, got '{}'", other)),
    }
}
