pub mod client;
pub mod extract;
pub mod poller;

pub use client::BlastClient;
pub use extract::{extract, FilterConfig};
pub use poller::{classify, JobState, PollSettings, PollStatus, Poller, PollingStateMachine};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result format requested on submit and on every status query. The
/// extractor only understands BLAST XML.
pub const RESULT_FORMAT: &str = "XML";

/// The remote search service as seen by the pipeline. `BlastClient` talks to
/// NCBI over HTTP; tests substitute scripted implementations.
pub trait SearchService: Send + Sync {
    /// Submits one query and returns the job handle (RID).
    fn submit(&self, query: &str, params: &SearchParameters) -> Result<String, SubmitError>;

    /// Issues one status query for `rid` and returns the raw response body.
    fn fetch(&self, rid: &str) -> Result<String, ServiceError>;
}

/// Why a submission produced no job handle. Submissions are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("empty_query")]
    EmptyQuery,

    #[error("transport_error: {0}")]
    Transport(String),

    #[error("bad_status:{0}")]
    BadStatus(u16),

    /// The request reached the service but the reply had no `RID = ...` line.
    #[error("no_handle_found")]
    NoHandleFound,
}

/// A failed status query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),
}

impl ServiceError {
    /// Transient failures are retried inside the poll attempt budget.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Transport(_) => true,
            ServiceError::Status(code) => *code == 429 || *code >= 500,
        }
    }
}

/// Parameters sent with every submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParameters {
    pub program: String,
    pub database: String,
    pub hitlist_size: u32,
    pub expect: f64,
    pub word_size: u32,
    pub matrix: String,
    pub low_complexity_filter: bool,
    /// Entrez expression used by the service to drop organisms server-side.
    pub entrez_query: String,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            program: "blastp".to_string(),
            database: "nr".to_string(),
            hitlist_size: 50,
            expect: 0.01,
            word_size: 6,
            matrix: "BLOSUM62".to_string(),
            low_complexity_filter: false,
            entrez_query: "NOT mycoplasma[Organism]".to_string(),
        }
    }
}

impl SearchParameters {
    /// Form fields for a `CMD=Put` submission, in wire order.
    pub fn form_fields(&self, query: &str) -> Vec<(&'static str, String)> {
        vec![
            ("CMD", "Put".to_string()),
            ("PROGRAM", self.program.clone()),
            ("DATABASE", self.database.clone()),
            ("QUERY", query.to_string()),
            ("FORMAT_TYPE", RESULT_FORMAT.to_string()),
            ("HITLIST_SIZE", self.hitlist_size.to_string()),
            ("EXPECT", self.expect.to_string()),
            ("WORD_SIZE", self.word_size.to_string()),
            ("MATRIX", self.matrix.clone()),
            ("FILTER", if self.low_complexity_filter { "L" } else { "F" }.to_string()),
            ("ENTREZ_QUERY", self.entrez_query.clone()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_error_classes() {
        assert_eq!(
            SubmitError::Transport("connection reset".into()).to_string(),
            "transport_error: connection reset"
        );
        assert_eq!(SubmitError::BadStatus(503).to_string(), "bad_status:503");
        assert_eq!(SubmitError::NoHandleFound.to_string(), "no_handle_found");
    }

    #[test]
    fn test_transient_service_errors() {
        assert!(ServiceError::Transport("timeout".into()).is_transient());
        assert!(ServiceError::Status(502).is_transient());
        assert!(ServiceError::Status(429).is_transient());
        assert!(!ServiceError::Status(404).is_transient());
    }

    #[test]
    fn test_form_fields() {
        let params = SearchParameters::default();
        let fields = params.form_fields("MKVL");

        assert_eq!(fields[0], ("CMD", "Put".to_string()));
        assert!(fields.contains(&("QUERY", "MKVL".to_string())));
        assert!(fields.contains(&("EXPECT", "0.01".to_string())));
        assert!(fields.contains(&("FILTER", "F".to_string())));
        assert!(fields.contains(&("FORMAT_TYPE", RESULT_FORMAT.to_string())));
        assert!(fields.contains(&("ENTREZ_QUERY", "NOT mycoplasma[Organism]".to_string())));
    }
}
