use crate::blast::BlastClient;
use crate::config::Config;
use crate::error::PipelineError;
use crate::export::{ReportWriter, RunSummary};
use crate::pipeline::{
    ProgressCallback, ProgressEvent, ProgressState, ProgressStore, RunOutcome, Scheduler, SchedulerSettings, Shutdown,
    StopStage,
};
use crate::sequence;
use crate::types::{AnalysisResult, JobStatus, SequenceRecord};
use crate::utils::init_logging;
use crate::utils::progress_bar_builder::ProgressBarBuilder;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Number of sequences processed by `--test`.
pub const TEST_SEQUENCES: usize = 5;

const PROGRESS_FILE: &str = "progress.json";

/// Command-line options of `webblast search`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub fasta: PathBuf,
    pub output_dir: PathBuf,
    pub start: usize,
    pub max: Option<usize>,
    pub concurrency: Option<usize>,
    pub stagger_secs: Option<f64>,
    pub timeout_hours: Option<f64>,
    pub test: bool,
    pub fresh: bool,
    pub config: Option<PathBuf>,
}

impl SearchOptions {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(concurrency) = self.concurrency {
            config.scheduler.concurrency = concurrency;
        }
        if let Some(stagger) = self.stagger_secs {
            config.scheduler.stagger_secs = stagger;
        }
        if let Some(hours) = self.timeout_hours {
            config.scheduler.run_timeout_secs = (hours.max(0.0) * 3600.0).round() as u64;
        }
    }

    /// The slice of input this run covers, and its first index.
    fn select(&self, records: Vec<SequenceRecord>) -> Result<(usize, Vec<SequenceRecord>), PipelineError> {
        let (start, max) = if self.test {
            (0, Some(TEST_SEQUENCES))
        } else {
            (self.start, self.max)
        };

        if start >= records.len() {
            return Err(PipelineError::input(
                &self.fasta,
                format!("start index {} is past the last of {} sequences", start, records.len()),
            ));
        }

        let selected: Vec<SequenceRecord> = records
            .into_iter()
            .skip(start)
            .take(max.unwrap_or(usize::MAX))
            .collect();
        Ok((start, selected))
    }
}

pub fn run(options: SearchOptions) -> Result<()> {
    let mut config = match &options.config {
        Some(path) => Config::from_path(path)?,
        None => Config::load(),
    };
    options.apply_overrides(&mut config);
    let settings = SchedulerSettings::try_from(config.scheduler.clone())?;

    fs::create_dir_all(&options.output_dir)
        .with_context(|| format!("Failed to create output directory {}", options.output_dir.display()))?;
    let log_path = init_logging(Some(&options.output_dir.join("logs")))?;
    if let Some(path) = &log_path {
        info!(path = %path.display(), "Logging to file");
    }

    if !options.fasta.is_file() {
        return Err(PipelineError::input(&options.fasta, "file not found").into());
    }
    let records = sequence::parse(&options.fasta)?;
    let (first_index, selected) = options.select(records)?;
    info!(
        first_index,
        sequences = selected.len(),
        concurrency = settings.concurrency,
        timeout_hours = settings.run_timeout.map(|d| d.as_secs_f64() / 3600.0),
        "Selected input"
    );

    let store = ProgressStore::new(options.output_dir.join(PROGRESS_FILE));
    let mut state = restore_progress(&store, first_index, &selected, options.fresh)?;
    store.save(&state)?;

    let results_dir = options.output_dir.join("results");
    fs::create_dir_all(&results_dir)
        .with_context(|| format!("Failed to create {}", results_dir.display()))?;

    let client = BlastClient::new(&config.service).context("Failed to build HTTP client")?;
    let shutdown = Arc::new(Shutdown::new());
    {
        let shutdown = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || match shutdown.request_stop() {
            StopStage::Interrupted => {
                eprintln!("\nStopping: no new submissions, waiting for submitted searches (Ctrl-C again to abandon them)...");
            }
            StopStage::Aborted => {
                eprintln!("\nAbandoning submitted searches; they will be retried on resume.");
            }
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }
    }

    let progress = ProgressBarBuilder::new("Searching")
        .with_length(selected.len() as u64)
        .with_tick(Duration::from_secs(1))
        .build()?;
    progress.set_position(state.completed_count() as u64);

    let mut scheduler = Scheduler::new(Arc::new(client), settings)
        .with_search(config.search.clone())
        .with_poll(config.polling.settings())
        .with_filter(config.filter.clone())
        .with_max_stored_hits(config.output.max_stored_hits)
        .with_progress(progress_callback(progress.clone()));

    if config.output.save_raw_payloads {
        let raw_dir = results_dir.join("raw");
        fs::create_dir_all(&raw_dir).with_context(|| format!("Failed to create {}", raw_dir.display()))?;
        scheduler = scheduler.with_raw_dir(raw_dir);
    }

    let outcome = scheduler.run(&selected, &mut state, &store, &shutdown);
    progress.finish_and_clear();
    let outcome = outcome?;

    let rows = report_rows(&state, &selected, &outcome);
    let writer = ReportWriter::new(&results_dir);
    writer.write_results(&rows)?;
    if config.output.write_hit_tables {
        writer.write_hit_tables(&state.results)?;
    }
    let summary = RunSummary::from_results(&rows, &outcome, &config.filter);
    writer.write_summary(&summary)?;
    summary.print();

    println!("\nResults saved to: {}", writer.results_dir().display());
    if !state.is_finished() {
        println!("Progress saved to {}; rerun the same command to resume.", store.path().display());
    }
    Ok(())
}

/// Loads saved progress for this selection, or starts fresh.
fn restore_progress(
    store: &ProgressStore,
    first_index: usize,
    selected: &[SequenceRecord],
    fresh: bool,
) -> Result<ProgressState, PipelineError> {
    let expected = ProgressState::for_records(first_index, selected);

    if fresh {
        if store.path().exists() {
            info!(path = %store.path().display(), "Discarding saved progress");
        }
        return Ok(expected);
    }

    match store.load()? {
        Some(saved) => {
            saved.ensure_matches(&expected, store.path())?;
            info!(
                completed = saved.completed_count(),
                remaining = selected.len().saturating_sub(saved.completed_count()),
                "Resuming"
            );
            Ok(saved)
        }
        None => Ok(expected),
    }
}

/// Persisted results plus a not-attempted row for everything still open.
fn report_rows(state: &ProgressState, selected: &[SequenceRecord], outcome: &RunOutcome) -> Vec<AnalysisResult> {
    let reason = if outcome.timed_out {
        "run timeout reached"
    } else if outcome.interrupted {
        "run interrupted"
    } else {
        "not reached"
    };

    let mut rows = state.results.clone();
    rows.extend(
        selected
            .iter()
            .filter(|record| !state.is_completed(record.index))
            .map(|record| AnalysisResult::not_attempted(record, reason)),
    );
    rows
}

fn progress_callback(progress: indicatif::ProgressBar) -> ProgressCallback {
    Arc::new(move |event: ProgressEvent| match event {
        ProgressEvent::Finished { id, status, hit_count, .. } => {
            if status != JobStatus::NotAttempted {
                progress.inc(1);
            }
            progress.set_message(format!("{id}: {status} ({hit_count} hits)"));
        }
        ProgressEvent::Message { message } => progress.println(message),
        _ => {}
    })
}
