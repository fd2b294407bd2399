//! Lifecycle of a single remote job.
//!
//! A job starts in `Submitted`, moves to `Waiting` once it has a handle and
//! then repeatedly queries the service until it reaches exactly one terminal
//! state. The state machine itself is synchronous and clock-free; `Poller`
//! adds the waits between queries.

use super::{SearchService, ServiceError, SubmitError};
use crate::types::{JobStatus, SequenceRecord};
use chrono::{DateTime, Local};
use crossbeam_channel::{after, select, Receiver, TryRecvError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const STATUS_WAITING: &str = "Status=WAITING";
pub const STATUS_FAILED: &str = "Status=FAILED";
pub const STATUS_UNKNOWN: &str = "Status=UNKNOWN";

#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    /// Added to the interval once per completed attempt.
    pub backoff: Duration,
    pub max_attempts: u32,
    pub min_payload_bytes: usize,
    pub result_marker: String,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            backoff: Duration::ZERO,
            max_attempts: 60,
            min_payload_bytes: 1000,
            result_marker: "<BlastOutput>".to_string(),
        }
    }
}

impl PollSettings {
    pub fn delay_before(&self, attempt: u32) -> Duration {
        self.interval + self.backoff * attempt
    }
}

/// Classification of one status query response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    StillWaiting,
    Ready,
    RemoteFailed,
    ExpiredOrUnknown,
    Malformed,
}

pub fn classify(body: &str, settings: &PollSettings) -> PollStatus {
    let has_payload =
        body.len() > settings.min_payload_bytes && body.contains(settings.result_marker.as_str());

    if body.contains(STATUS_WAITING) {
        return if has_payload {
            PollStatus::Ready
        } else {
            PollStatus::StillWaiting
        };
    }
    if body.contains(STATUS_FAILED) {
        return PollStatus::RemoteFailed;
    }
    if body.contains(STATUS_UNKNOWN) {
        return PollStatus::ExpiredOrUnknown;
    }
    if has_payload {
        PollStatus::Ready
    } else {
        PollStatus::Malformed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureOrigin {
    Submit(SubmitError),
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Submitted,
    Waiting,
    /// Holds the complete result payload.
    Ready(String),
    Failed(FailureOrigin),
    Expired,
    TimedOut,
    Error(String),
    /// The run was stopped while this job was still waiting.
    Abandoned,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Submitted | JobState::Waiting)
    }

    /// Status tag for a terminal state; `None` while the job is still live.
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            JobState::Submitted | JobState::Waiting => None,
            JobState::Ready(_) => Some(JobStatus::Success),
            JobState::Failed(FailureOrigin::Submit(_)) => Some(JobStatus::SubmitFailed),
            JobState::Failed(FailureOrigin::Remote) => Some(JobStatus::RemoteFailed),
            JobState::Expired => Some(JobStatus::Expired),
            JobState::TimedOut => Some(JobStatus::TimedOut),
            JobState::Error(_) => Some(JobStatus::Error),
            JobState::Abandoned => Some(JobStatus::NotAttempted),
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            JobState::Failed(FailureOrigin::Submit(e)) => Some(format!("submit_failed: {e}")),
            JobState::Failed(FailureOrigin::Remote) => Some("service reported failure".to_string()),
            JobState::Expired => Some("handle expired or unknown".to_string()),
            JobState::TimedOut => Some("attempt budget exhausted".to_string()),
            JobState::Error(message) => Some(message.clone()),
            JobState::Abandoned => Some("run stopped before completion".to_string()),
            _ => None,
        }
    }
}

/// One submitted sequence.
#[derive(Debug, Clone)]
pub struct Job {
    pub record: SequenceRecord,
    pub rid: Option<String>,
    pub state: JobState,
    pub attempts: u32,
    pub submitted_at: Option<DateTime<Local>>,
}

pub struct PollingStateMachine {
    job: Job,
    settings: PollSettings,
}

impl PollingStateMachine {
    pub fn new(record: SequenceRecord, settings: PollSettings) -> Self {
        Self {
            job: Job {
                record,
                rid: None,
                state: JobState::Submitted,
                attempts: 0,
                submitted_at: None,
            },
            settings,
        }
    }

    /// Leaves `Submitted`: to `Waiting` with a handle, or straight to
    /// `Failed(submit)` without one.
    pub fn submitted(&mut self, submission: Result<String, SubmitError>) -> &JobState {
        if self.job.state != JobState::Submitted {
            return &self.job.state;
        }

        self.job.submitted_at = Some(Local::now());
        match submission {
            Ok(rid) => {
                self.job.rid = Some(rid);
                self.job.state = JobState::Waiting;
            }
            Err(e) => self.finish(JobState::Failed(FailureOrigin::Submit(e))),
        }
        &self.job.state
    }

    /// Feeds the outcome of one status query. Ignored unless `Waiting`.
    pub fn apply(&mut self, response: Result<String, ServiceError>) -> &JobState {
        if self.job.state != JobState::Waiting {
            return &self.job.state;
        }
        self.job.attempts += 1;

        let next = match response {
            Ok(body) => match classify(&body, &self.settings) {
                PollStatus::Ready => Some(JobState::Ready(body)),
                PollStatus::RemoteFailed => Some(JobState::Failed(FailureOrigin::Remote)),
                PollStatus::ExpiredOrUnknown => Some(JobState::Expired),
                PollStatus::StillWaiting => None,
                PollStatus::Malformed => {
                    debug!(id = %self.job.record.id, attempt = self.job.attempts, "Unrecognized status response");
                    None
                }
            },
            Err(e) if e.is_transient() => {
                warn!(id = %self.job.record.id, attempt = self.job.attempts, "Status query failed: {}", e);
                None
            }
            Err(e) => Some(JobState::Error(e.to_string())),
        };

        match next {
            Some(state) => self.finish(state),
            None if self.job.attempts >= self.settings.max_attempts => self.finish(JobState::TimedOut),
            None => {}
        }
        &self.job.state
    }

    /// Ends a live job because the run is stopping.
    pub fn abandon(&mut self) {
        self.finish(JobState::Abandoned);
    }

    /// Ends a live job with an unexpected error.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.finish(JobState::Error(message.into()));
    }

    fn finish(&mut self, state: JobState) {
        if self.job.state.is_terminal() {
            return;
        }
        self.job.state = state;
    }

    pub fn state(&self) -> &JobState {
        &self.job.state
    }

    pub fn is_waiting(&self) -> bool {
        self.job.state == JobState::Waiting
    }

    pub fn attempts(&self) -> u32 {
        self.job.attempts
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn into_job(self) -> Job {
        self.job
    }
}

/// Drives a `PollingStateMachine` against a live service: wait, query, repeat.
pub struct Poller<'a> {
    service: &'a dyn SearchService,
    settings: &'a PollSettings,
}

impl<'a> Poller<'a> {
    pub fn new(service: &'a dyn SearchService, settings: &'a PollSettings) -> Self {
        Self { service, settings }
    }

    /// Polls until the machine is terminal. A disconnect on `abort` during a
    /// wait abandons the job; an in-progress query is always allowed to finish.
    pub fn run(&self, machine: &mut PollingStateMachine, abort: &Receiver<()>) {
        let Some(rid) = machine.job().rid.clone() else {
            return;
        };

        while machine.is_waiting() {
            if matches!(abort.try_recv(), Err(TryRecvError::Disconnected)) {
                info!(%rid, "Abandoning job, run is stopping");
                machine.abandon();
                return;
            }

            let delay = self.settings.delay_before(machine.attempts());
            select! {
                recv(abort) -> _ => {
                    info!(%rid, "Abandoning job, run is stopping");
                    machine.abandon();
                    return;
                }
                recv(after(delay)) -> _ => {}
            }

            let response = self.service.fetch(&rid);
            machine.apply(response);
            let state = machine.state();
            if state.is_terminal() {
                debug!(%rid, attempts = machine.attempts(), status = ?state.status(), "Job reached terminal state");
            } else if machine.attempts() % 4 == 0 {
                debug!(%rid, attempt = machine.attempts(), max = self.settings.max_attempts, "Still running");
            }
        }
    }
}
