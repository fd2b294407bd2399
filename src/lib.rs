pub mod blast;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod sequence;
pub mod types;
pub mod utils;

pub use error::{PipelineError, PipelineResult};
pub use types::{AnalysisResult, Hit, JobStatus, SequenceRecord};
