use crate::sequence::{classify, FunctionalCategory};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One query sequence loaded from the input dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceRecord {
    /// Position in the ordered input, before any `--start` offset is applied.
    pub index: usize,
    pub id: String,
    pub name: String,
    pub locus_tag: Option<String>,
    pub sequence: String,
}

impl SequenceRecord {
    pub fn new(index: usize, id: impl Into<String>, name: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self {
            index,
            id: id.into(),
            name: name.into(),
            locus_tag: None,
            sequence: sequence.into(),
        }
    }

    pub fn with_locus_tag(mut self, locus_tag: Option<String>) -> Self {
        self.locus_tag = locus_tag;
        self
    }

    /// Functional category guessed from the protein name.
    pub fn category(&self) -> FunctionalCategory {
        classify(&self.name)
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

/// A single normalized hit taken from the best alignment segment of a hit block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub accession: String,
    pub description: String,
    pub subject_length: u32,
    pub evalue: f64,
    pub identity: u32,
    pub align_len: u32,
    pub identity_percent: f64,
    pub coverage_percent: f64,
    pub bit_score: f64,
}

/// Terminal status tag of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    SubmitFailed,
    RemoteFailed,
    Expired,
    TimedOut,
    Error,
    /// The run stopped (deadline or interrupt) before this job finished.
    /// Distinct from every failure tag and never persisted as complete.
    NotAttempted,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Success,
        JobStatus::SubmitFailed,
        JobStatus::RemoteFailed,
        JobStatus::Expired,
        JobStatus::TimedOut,
        JobStatus::Error,
        JobStatus::NotAttempted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Success => "success",
            JobStatus::SubmitFailed => "submit_failed",
            JobStatus::RemoteFailed => "remote_failed",
            JobStatus::Expired => "expired",
            JobStatus::TimedOut => "timed_out",
            JobStatus::Error => "error",
            JobStatus::NotAttempted => "not_attempted",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, JobStatus::Success | JobStatus::NotAttempted)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal record for one job. This is what gets persisted and reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub index: usize,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub locus_tag: Option<String>,
    #[serde(default)]
    pub category: FunctionalCategory,
    pub sequence_length: usize,
    pub rid: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub detail: Option<String>,
    pub hit_count: usize,
    pub best_hit: Option<Hit>,
    #[serde(default)]
    pub hits: Vec<Hit>,
    pub completed_at: DateTime<Local>,
}

impl AnalysisResult {
    /// A finished search. `hits` must already be sorted best first; only the
    /// first `max_stored` are kept, `hit_count` still reflects all of them.
    pub fn success(record: &SequenceRecord, rid: &str, mut hits: Vec<Hit>, max_stored: Option<usize>) -> Self {
        let hit_count = hits.len();
        let best_hit = hits.first().cloned();
        if let Some(limit) = max_stored {
            hits.truncate(limit);
        }

        Self {
            index: record.index,
            id: record.id.clone(),
            name: record.name.clone(),
            locus_tag: record.locus_tag.clone(),
            category: record.category(),
            sequence_length: record.len(),
            rid: Some(rid.to_string()),
            status: JobStatus::Success,
            detail: None,
            hit_count,
            best_hit,
            hits,
            completed_at: Local::now(),
        }
    }

    pub fn failed(record: &SequenceRecord, rid: Option<&str>, status: JobStatus, detail: impl Into<String>) -> Self {
        Self {
            index: record.index,
            id: record.id.clone(),
            name: record.name.clone(),
            locus_tag: record.locus_tag.clone(),
            category: record.category(),
            sequence_length: record.len(),
            rid: rid.map(str::to_string),
            status,
            detail: Some(detail.into()),
            hit_count: 0,
            best_hit: None,
            hits: Vec::new(),
            completed_at: Local::now(),
        }
    }

    pub fn not_attempted(record: &SequenceRecord, reason: &str) -> Self {
        Self::failed(record, None, JobStatus::NotAttempted, reason)
    }

    pub fn has_hits(&self) -> bool {
        self.hit_count > 0
    }
}
