use crate::error::{PipelineError, PipelineResult};
use crate::types::{AnalysisResult, JobStatus, SequenceRecord};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Persisted progress of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Input index the run started at (the `--start` offset).
    pub first_index: usize,
    /// Highest index such that it and every index before it (down to
    /// `first_index`) has a persisted result.
    pub last_completed_index: Option<usize>,
    pub total_inputs: usize,
    pub input_digest: String,
    pub results: Vec<AnalysisResult>,
    pub timestamp: DateTime<Local>,
    #[serde(skip)]
    completed: BTreeSet<usize>,
}

impl ProgressState {
    pub fn new(first_index: usize, total_inputs: usize, input_digest: impl Into<String>) -> Self {
        Self {
            first_index,
            last_completed_index: None,
            total_inputs,
            input_digest: input_digest.into(),
            results: Vec::new(),
            timestamp: Local::now(),
            completed: BTreeSet::new(),
        }
    }

    /// Fresh state for the given selection of input records.
    pub fn for_records(first_index: usize, records: &[SequenceRecord]) -> Self {
        Self::new(first_index, records.len(), input_digest(records))
    }

    /// Appends a terminal result and advances the watermark.
    /// Not-attempted results and duplicates are ignored.
    pub fn record(&mut self, result: AnalysisResult) {
        if result.status == JobStatus::NotAttempted || self.completed.contains(&result.index) {
            debug!(index = result.index, status = %result.status, "Not recording result");
            return;
        }

        self.completed.insert(result.index);
        self.results.push(result);

        let mut next = self.resume_index();
        while self.completed.contains(&next) {
            self.last_completed_index = Some(next);
            next += 1;
        }
        self.timestamp = Local::now();
    }

    /// First index at or after which work may still be outstanding.
    pub fn resume_index(&self) -> usize {
        self.last_completed_index
            .map(|k| k + 1)
            .unwrap_or(self.first_index)
    }

    pub fn is_completed(&self, index: usize) -> bool {
        index < self.resume_index() || self.completed.contains(&index)
    }

    pub fn completed_count(&self) -> usize {
        self.results.len()
    }

    pub fn is_finished(&self) -> bool {
        self.results.len() >= self.total_inputs
    }

    /// Refuses to resume from a file written for a different input selection.
    pub fn ensure_matches(&self, expected: &ProgressState, path: &Path) -> PipelineResult<()> {
        let mismatch = |message: String| PipelineError::ProgressMismatch {
            path: path.to_path_buf(),
            message,
        };

        if self.input_digest != expected.input_digest {
            return Err(mismatch("input sequences differ".to_string()));
        }
        if self.first_index != expected.first_index {
            return Err(mismatch(format!(
                "run started at index {}, current run starts at {}",
                self.first_index, expected.first_index
            )));
        }
        if self.total_inputs != expected.total_inputs {
            return Err(mismatch(format!(
                "{} inputs recorded, current run has {}",
                self.total_inputs, expected.total_inputs
            )));
        }
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.completed = self.results.iter().map(|r| r.index).collect();
    }
}

/// SHA-256 over identifiers and sequences, in order.
pub fn input_digest(records: &[SequenceRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.index.to_le_bytes());
        hasher.update(record.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(record.sequence.as_bytes());
        hasher.update([b'\n']);
    }
    format!("{:x}", hasher.finalize())
}

/// Durable home of a `ProgressState`. Saves replace the file atomically.
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> PipelineResult<Option<ProgressState>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| PipelineError::persistence(&self.path, e))?;
        let mut state: ProgressState =
            serde_json::from_str(&content).map_err(|e| PipelineError::persistence(&self.path, e))?;
        state.rebuild_index();

        info!(
            path = %self.path.display(),
            completed = state.completed_count(),
            resume_index = state.resume_index(),
            "Loaded saved progress"
        );
        Ok(Some(state))
    }

    /// Writes to a temporary file next to the target, syncs it, then renames
    /// it over the target. A crash leaves either the old or the new file.
    pub fn save(&self, state: &ProgressState) -> PipelineResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let fail = |e: &dyn std::fmt::Display| PipelineError::persistence(&self.path, e);

        let tmp = NamedTempFile::new_in(dir).map_err(|e| fail(&e))?;
        let mut writer = BufWriter::new(tmp);
        serde_json::to_writer_pretty(&mut writer, state).map_err(|e| fail(&e))?;
        writer.flush().map_err(|e| fail(&e))?;
        let tmp = writer.into_inner().map_err(|e| fail(&e.error().to_string()))?;
        tmp.as_file().sync_all().map_err(|e| fail(&e))?;
        tmp.persist(&self.path).map_err(|e| fail(&e.error))?;
        Ok(())
    }
}
