pub mod progress;
pub mod scheduler;
pub mod shutdown;

pub use progress::{input_digest, ProgressState, ProgressStore};
pub use scheduler::{RunOutcome, Scheduler, SchedulerSettings};
pub use shutdown::{Shutdown, StopStage};

use crate::types::JobStatus;
use std::sync::Arc;

/// Progress callback for terminal or embedding front ends
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Progress events emitted by the scheduler thread
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    Started { pending: usize, already_done: usize },
    Dispatched { index: usize, id: String },
    Finished { index: usize, id: String, status: JobStatus, hit_count: usize },
    Message { message: String },
    Stopped { completed: usize, not_attempted: usize },
}
