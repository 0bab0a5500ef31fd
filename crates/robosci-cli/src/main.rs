//! RoboSci CLI - offline inspection of persisted discovery archives
//!
//! The `robosci` command reads archive files written at the end of a run.
//!
//! ## Commands
//!
//! - `inspect`: Verify the content digest and summarize the archive
//! - `events`: List the development history, optionally filtered by kind
//! - `replay`: Rebuild the working set from the log and compare
//! - `provenance`: Show where a model came from and what was learned after it

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use robosci_archive::{
    load_archive, summarize, verify, Archive, ArchiveSummary, EventKind, EventRecord,
    LoadedArchive, ModelId, ReplayReport,
};
use robosci_core::obs::RunSpan;
use robosci_core::telemetry::{init_tracing, level_for};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "robosci")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect RoboSci discovery archives", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the digest and print a summary of an archive
    Inspect {
        /// Persisted archive file
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List recorded events
    Events {
        /// Persisted archive file
        file: PathBuf,

        /// Only show events of this kind (e.g. CheckPointFail)
        #[arg(short, long)]
        kind: Option<EventKind>,

        /// Show at most this many events
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Replay the log and compare against the stored working set
    Replay {
        /// Persisted archive file
        file: PathBuf,
    },

    /// Show the origin of a model and the results gathered after it
    Provenance {
        /// Persisted archive file
        file: PathBuf,

        /// Model ID, e.g. m_3
        model: ModelId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, level_for(cli.verbose));

    match cli.command {
        Commands::Inspect { file, format } => cmd_inspect(&file, format),
        Commands::Events { file, kind, limit } => cmd_events(&file, kind, limit),
        Commands::Replay { file } => cmd_replay(&file),
        Commands::Provenance { file, model } => cmd_provenance(&file, model),
    }
}

fn open(path: &Path) -> Result<LoadedArchive> {
    let loaded = load_archive(path)
        .with_context(|| format!("Failed to load archive: {:?}", path))?;
    debug!(
        path = %path.display(),
        suffix = %loaded.suffix,
        events = loaded.archive.development_history().len(),
        "archive loaded"
    );
    Ok(loaded)
}

/// Digest check + summary
fn cmd_inspect(path: &Path, format: OutputFormat) -> Result<()> {
    let loaded = open(path)?;
    let _span = RunSpan::enter(&loaded.suffix);
    let summary = summarize(&loaded.archive);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => println!("{}", render_summary_text(&loaded, &summary)),
    }
    Ok(())
}

fn cmd_events(path: &Path, kind: Option<EventKind>, limit: Option<usize>) -> Result<()> {
    let loaded = open(path)?;
    let selected = select_events(&loaded.archive, kind, limit);
    if selected.is_empty() {
        println!("No matching events");
        return Ok(());
    }
    println!("{}", render_events_text(&selected));
    Ok(())
}

fn cmd_replay(path: &Path) -> Result<()> {
    let loaded = open(path)?;
    let _span = RunSpan::enter(&loaded.suffix);
    let report = check_replay(&loaded.archive)?;
    info!(events = loaded.archive.development_history().len(), "replay verified");
    println!("{}", render_replay_text(&report));
    Ok(())
}

fn cmd_provenance(path: &Path, model: ModelId) -> Result<()> {
    let loaded = open(path)?;
    let provenance = provenance(&loaded.archive, model)?;
    println!("{}", render_provenance_text(&provenance));
    Ok(())
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

fn select_events(
    archive: &Archive,
    kind: Option<EventKind>,
    limit: Option<usize>,
) -> Vec<&EventRecord> {
    archive
        .development_history()
        .iter()
        .filter(|record| kind.map_or(true, |k| record.kind() == k))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Fails when replaying the log does not reproduce the stored archive.
fn check_replay(archive: &Archive) -> Result<ReplayReport> {
    let report = verify(archive);
    if !report.is_consistent() {
        bail!(
            "Replay diverges from the stored archive:\n{}",
            render_replay_text(&report)
        );
    }
    Ok(report)
}

#[derive(Debug, Serialize)]
struct Provenance {
    model: String,
    origin_sequence: u64,
    origin_kind: EventKind,
    origin_timestamp: f64,
    working: bool,
    quality: Option<i64>,
    results_after: Vec<ResultLine>,
}

#[derive(Debug, Serialize)]
struct ResultLine {
    id: Option<String>,
    experiment: String,
    outcome: bool,
}

fn provenance(archive: &Archive, model: ModelId) -> Result<Provenance> {
    let origin = archive
        .get_model_origin_event(model)
        .with_context(|| format!("Model {} is not in this archive", model))?;
    let results_after = archive
        .get_results_after_model(model)?
        .into_iter()
        .map(|result| ResultLine {
            id: result.id.map(|id| id.to_string()),
            experiment: format!("{:?}", result.exp_description.experiment_type),
            outcome: result.outcome,
        })
        .collect();

    Ok(Provenance {
        model: model.to_string(),
        origin_sequence: origin.sequence,
        origin_kind: origin.kind(),
        origin_timestamp: origin.timestamp,
        working: archive.working_model_ids().contains(&model),
        quality: archive.model(model).and_then(|m| m.quality),
        results_after,
    })
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_summary_text(loaded: &LoadedArchive, summary: &ArchiveSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Archive:   {}\n", summary.archive_id));
    out.push_str(&format!("Run:       {}\n", loaded.suffix));
    out.push_str(&format!("Saved at:  {}\n", loaded.saved_at.to_rfc3339()));
    out.push_str(&format!("Digest:    {} (verified)\n", loaded.content_digest));
    out.push_str(&format!(
        "Events:    {} (last at {:.3}s)\n",
        summary.events, summary.last_timestamp
    ));
    out.push_str(&format!(
        "Models:    {} introduced, {} working [{}]\n",
        summary.models_introduced,
        summary.working_models.len(),
        summary.working_models.join(", ")
    ));
    out.push_str(&format!("Best:      [{}]\n", summary.best_models.join(", ")));
    out.push_str(&format!(
        "Results:   {} in {} experiments{}\n",
        summary.known_results,
        summary.known_experiments,
        if summary.pending_results {
            ", new results pending"
        } else {
            ""
        }
    ));
    out.push_str(&format!(
        "Flags:     error={} revision={}\n",
        summary.error_flag, summary.revflag
    ));
    out.push_str(&format!(
        "Drift:     {} collapses, {} checkpoints passed\n",
        summary.drift_count, summary.checkpoints_passed
    ));
    if let Some(failure) = &summary.last_failure {
        out.push_str(&format!("Failure:   {}\n", failure));
    }
    out.push_str("\nEvents by kind:\n");
    for (kind, count) in &summary.events_by_kind {
        out.push_str(&format!("  {:<32} {}\n", kind, count));
    }
    out.trim_end().to_string()
}

fn render_events_text(records: &[&EventRecord]) -> String {
    records
        .iter()
        .map(|r| format!("{:>6}  {:>10.3}s  {}", r.sequence, r.timestamp, r.kind()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_replay_text(report: &ReplayReport) -> String {
    let mark = |ok: bool| if ok { "ok" } else { "FAILED" };
    let mut out = format!(
        "working set:  {}\nsequences:    {}\ntimestamps:   {}",
        mark(report.working_set_matches),
        mark(report.sequences_contiguous),
        mark(report.timestamps_monotonic),
    );
    if !report.duplicate_model_ids.is_empty() {
        out.push_str(&format!(
            "\nduplicate IDs: {}",
            report.duplicate_model_ids.join(", ")
        ));
    }
    out
}

fn render_provenance_text(p: &Provenance) -> String {
    let mut out = format!(
        "{} introduced by {} (event {}, {:.3}s)\n",
        p.model, p.origin_kind, p.origin_sequence, p.origin_timestamp
    );
    out.push_str(&format!(
        "status: {}, quality: {}\n",
        if p.working { "working" } else { "refuted" },
        p.quality
            .map(|q| q.to_string())
            .unwrap_or_else(|| "unscored".to_string())
    ));
    if p.results_after.is_empty() {
        out.push_str("no results recorded after this model");
    } else {
        out.push_str(&format!("{} results recorded after it:", p.results_after.len()));
        for line in &p.results_after {
            out.push_str(&format!(
                "\n  {:<8} {:<5} {}",
                line.id.as_deref().unwrap_or("-"),
                line.outcome,
                line.experiment
            ));
        }
    }
    out
}
