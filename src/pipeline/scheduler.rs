//! Bounded-concurrency execution of a whole run.
//!
//! A fixed set of worker threads pulls dispatched jobs off a channel. Only the
//! scheduler thread touches `ProgressState`: workers hand their terminal
//! `AnalysisResult` back over a second channel and the scheduler records and
//! persists it before dispatching the next job.

use super::progress::{ProgressState, ProgressStore};
use super::shutdown::Shutdown;
use super::{ProgressCallback, ProgressEvent};
use crate::blast::{extract, FilterConfig, JobState, PollSettings, Poller, PollingStateMachine, SearchParameters, SearchService};
use crate::config::{SchedulerConfig, MAX_CONCURRENCY};
use crate::error::{PipelineError, PipelineResult};
use crate::types::{AnalysisResult, JobStatus, SequenceRecord};
use crate::utils::safe_file_name;
use crossbeam_channel::{at, never, select, unbounded, Receiver, Sender, TryRecvError};
use std::any::Any;
use std::collections::VecDeque;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSettings {
    pub concurrency: usize,
    pub stagger: Duration,
    pub run_timeout: Option<Duration>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        let config = SchedulerConfig::default();
        Self {
            concurrency: config.concurrency(),
            stagger: config.stagger().unwrap_or_default(),
            run_timeout: config.run_timeout(),
        }
    }
}

impl TryFrom<SchedulerConfig> for SchedulerSettings {
    type Error = PipelineError;

    fn try_from(config: SchedulerConfig) -> PipelineResult<Self> {
        Ok(Self {
            concurrency: config.concurrency(),
            stagger: config.stagger()?,
            run_timeout: config.run_timeout(),
        })
    }
}

/// Summary of one `Scheduler::run` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOutcome {
    /// Jobs that were outstanding when the run started.
    pub pending: usize,
    /// Terminal results recorded and persisted during this run.
    pub completed: usize,
    pub not_attempted: usize,
    pub timed_out: bool,
    pub interrupted: bool,
    pub elapsed: Duration,
}

struct Dispatch {
    record: SequenceRecord,
    /// `None` when the stagger offset is past any representable instant.
    not_before: Option<Instant>,
}

/// Everything a worker needs to carry one job to a terminal result.
#[derive(Clone)]
struct JobRunner {
    service: Arc<dyn SearchService>,
    search: SearchParameters,
    poll: PollSettings,
    filter: FilterConfig,
    max_stored_hits: Option<usize>,
    raw_dir: Option<PathBuf>,
}

pub struct Scheduler {
    runner: JobRunner,
    settings: SchedulerSettings,
    progress: Option<ProgressCallback>,
}

impl Scheduler {
    pub fn new(service: Arc<dyn SearchService>, settings: SchedulerSettings) -> Self {
        let concurrency = settings.concurrency.clamp(1, MAX_CONCURRENCY);
        Self {
            runner: JobRunner {
                service,
                search: SearchParameters::default(),
                poll: PollSettings::default(),
                filter: FilterConfig::default(),
                max_stored_hits: None,
                raw_dir: None,
            },
            settings: SchedulerSettings {
                concurrency,
                ..settings
            },
            progress: None,
        }
    }

    pub fn with_search(mut self, search: SearchParameters) -> Self {
        self.runner.search = search;
        self
    }

    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.runner.poll = poll;
        self
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.runner.filter = filter;
        self
    }

    pub fn with_max_stored_hits(mut self, max: Option<usize>) -> Self {
        self.runner.max_stored_hits = max;
        self
    }

    /// Directory that receives each successful job's raw result payload.
    pub fn with_raw_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runner.raw_dir = Some(dir.into());
        self
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }

    /// Runs every record not yet completed in `state` and persists each
    /// terminal result to `store` as it arrives.
    ///
    /// Returns `Err` only for run-level failures (a progress save that does
    /// not succeed). Stopping early through `shutdown` or the run timeout is
    /// a normal, partial outcome.
    pub fn run(
        &self,
        records: &[SequenceRecord],
        state: &mut ProgressState,
        store: &ProgressStore,
        shutdown: &Shutdown,
    ) -> PipelineResult<RunOutcome> {
        let start = Instant::now();
        let mut queue: VecDeque<SequenceRecord> = records
            .iter()
            .filter(|record| !state.is_completed(record.index))
            .cloned()
            .collect();

        let mut outcome = RunOutcome {
            pending: queue.len(),
            ..RunOutcome::default()
        };
        self.emit(ProgressEvent::Started {
            pending: queue.len(),
            already_done: state.completed_count(),
        });

        if queue.is_empty() {
            info!("Nothing left to do, all sequences have results");
            self.emit(ProgressEvent::Stopped { completed: 0, not_attempted: 0 });
            return Ok(outcome);
        }

        let num_workers = self.settings.concurrency.min(queue.len());
        info!(
            pending = queue.len(),
            workers = num_workers,
            stagger_secs = self.settings.stagger.as_secs_f64(),
            resume_index = state.resume_index(),
            "Starting run"
        );

        let runner = Arc::new(self.runner.clone());
        let (job_tx, job_rx) = unbounded::<Dispatch>();
        let (done_tx, done_rx) = unbounded::<AnalysisResult>();
        let mut handles = Vec::with_capacity(num_workers);

        for worker in 0..num_workers {
            let runner = Arc::clone(&runner);
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let admission = shutdown.admission();
            let abort = shutdown.aborted();
            let handle = thread::Builder::new()
                .name(format!("webblast-worker-{worker}"))
                .spawn(move || {
                    while let Ok(dispatch) = jobs.recv() {
                        let result = runner.run(dispatch, &admission, &abort);
                        if done.send(result).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|e| PipelineError::Worker(e.to_string()))?;
            handles.push(handle);
        }
        drop(done_tx);

        let mut dispatched = 0usize;
        let mut in_flight = 0usize;
        for _ in 0..num_workers {
            if let Some(record) = queue.pop_front() {
                self.dispatch(&job_tx, record, start, &mut dispatched);
                in_flight += 1;
            }
        }

        let mut deadline = match self.settings.run_timeout.and_then(|limit| start.checked_add(limit)) {
            Some(when) => at(when),
            None => never(),
        };
        let mut admission = shutdown.admission();
        let mut failure: Option<PipelineError> = None;

        while in_flight > 0 {
            select! {
                recv(done_rx) -> msg => {
                    let Ok(result) = msg else {
                        error!("All workers exited with jobs still in flight");
                        break;
                    };
                    in_flight -= 1;

                    if failure.is_none() {
                        if let Err(e) = self.accept(result, state, store, &mut outcome, start) {
                            error!("{}", e);
                            shutdown.abort();
                            failure = Some(e);
                        }
                    }

                    if failure.is_none() && !shutdown.is_interrupted() {
                        if let Some(record) = queue.pop_front() {
                            self.dispatch(&job_tx, record, start, &mut dispatched);
                            in_flight += 1;
                        }
                    }
                }
                recv(deadline) -> _ => {
                    warn!(
                        limit_hours = self.settings.run_timeout.map(|d| d.as_secs_f64() / 3600.0),
                        "Run timeout reached, stopping outstanding jobs"
                    );
                    outcome.timed_out = true;
                    shutdown.abort();
                    deadline = never();
                }
                recv(admission) -> _ => {
                    info!(in_flight, "Stop requested, letting submitted jobs finish");
                    self.emit(ProgressEvent::Message {
                        message: "Stop requested, finishing submitted jobs".to_string(),
                    });
                    admission = never();
                }
            }
        }

        drop(job_tx);
        for handle in handles {
            if handle.join().is_err() {
                warn!("Worker thread panicked outside a job");
            }
        }

        for record in queue.drain(..) {
            debug!(index = record.index, id = %record.id, "Not attempted");
            outcome.not_attempted += 1;
        }

        outcome.interrupted = shutdown.is_interrupted() && !outcome.timed_out;
        if outcome.interrupted && failure.is_none() && shutdown.is_aborted() {
            warn!(not_attempted = outcome.not_attempted, "Run aborted, submitted jobs were abandoned");
        }
        outcome.elapsed = start.elapsed();
        self.emit(ProgressEvent::Stopped {
            completed: outcome.completed,
            not_attempted: outcome.not_attempted,
        });

        if let Some(e) = failure {
            return Err(e);
        }

        info!(
            completed = outcome.completed,
            not_attempted = outcome.not_attempted,
            elapsed_secs = outcome.elapsed.as_secs(),
            "Run finished"
        );
        Ok(outcome)
    }

    fn dispatch(&self, jobs: &Sender<Dispatch>, record: SequenceRecord, start: Instant, dispatched: &mut usize) {
        let offset = self.settings.stagger.saturating_mul(*dispatched as u32);
        *dispatched += 1;
        self.emit(ProgressEvent::Dispatched {
            index: record.index,
            id: record.id.clone(),
        });
        let dispatch = Dispatch {
            record,
            not_before: start.checked_add(offset),
        };
        // Workers only exit once `jobs` is dropped, so the send cannot fail here.
        let _ = jobs.send(dispatch);
    }

    /// Records and persists one terminal result. Not-attempted results are
    /// counted but never written.
    fn accept(
        &self,
        result: AnalysisResult,
        state: &mut ProgressState,
        store: &ProgressStore,
        outcome: &mut RunOutcome,
        start: Instant,
    ) -> PipelineResult<()> {
        let index = result.index;
        let id = result.id.clone();
        let status = result.status;
        let hit_count = result.hit_count;

        if status == JobStatus::NotAttempted {
            outcome.not_attempted += 1;
            debug!(index, %id, "Job stopped before completion");
        } else {
            state.record(result);
            store.save(state)?;
            outcome.completed += 1;
            self.log_rate(index, &id, status, hit_count, outcome, start);
        }

        self.emit(ProgressEvent::Finished {
            index,
            id,
            status,
            hit_count,
        });
        Ok(())
    }

    fn log_rate(&self, index: usize, id: &str, status: JobStatus, hits: usize, outcome: &RunOutcome, start: Instant) {
        let elapsed_min = start.elapsed().as_secs_f64() / 60.0;
        let rate = if elapsed_min > 0.0 {
            outcome.completed as f64 / elapsed_min
        } else {
            0.0
        };
        let remaining = outcome.pending.saturating_sub(outcome.completed);
        let eta_hours = if rate > 0.0 {
            remaining as f64 / rate / 60.0
        } else {
            0.0
        };

        info!(
            index,
            id,
            %status,
            hits,
            done = outcome.completed,
            of = outcome.pending,
            rate_per_min = %format!("{rate:.1}"),
            eta_hours = %format!("{eta_hours:.1}"),
            "Job finished"
        );
    }
}

impl JobRunner {
    fn run(&self, dispatch: Dispatch, admission: &Receiver<()>, abort: &Receiver<()>) -> AnalysisResult {
        let record = dispatch.record;

        if is_closed(admission) {
            return AnalysisResult::not_attempted(&record, "run stopped before submission");
        }
        let timer = match dispatch.not_before {
            Some(when) if when <= Instant::now() => None,
            Some(when) => Some(at(when)),
            None => Some(never()),
        };
        if let Some(timer) = timer {
            select! {
                recv(admission) -> _ => {
                    return AnalysisResult::not_attempted(&record, "run stopped before submission");
                }
                recv(timer) -> _ => {}
            }
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.search(record.clone(), abort)));
        outcome.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!(index = record.index, id = %record.id, "Job panicked: {}", message);
            AnalysisResult::failed(&record, None, JobStatus::Error, format!("worker panic: {message}"))
        })
    }

    fn search(&self, record: SequenceRecord, abort: &Receiver<()>) -> AnalysisResult {
        let mut machine = PollingStateMachine::new(record, self.poll.clone());

        let submission = self.service.submit(&machine.job().record.sequence, &self.search);
        match &submission {
            Ok(rid) => info!(id = %machine.job().record.id, %rid, "Submitted"),
            Err(e) => warn!(id = %machine.job().record.id, "Submission failed: {}", e),
        }
        machine.submitted(submission);

        Poller::new(self.service.as_ref(), &self.poll).run(&mut machine, abort);
        if !machine.state().is_terminal() {
            machine.fail("polling stopped in a non-terminal state");
        }
        self.finish(machine)
    }

    fn finish(&self, machine: PollingStateMachine) -> AnalysisResult {
        let job = machine.into_job();
        let rid = job.rid.as_deref();

        match &job.state {
            JobState::Ready(payload) => {
                if let Some(dir) = &self.raw_dir {
                    let path = dir.join(format!("{}_blast.xml", safe_file_name(&job.record.id)));
                    if let Err(e) = fs::write(&path, payload) {
                        warn!(path = %path.display(), "Could not save raw result: {}", e);
                    }
                }
                let hits = extract(payload, job.record.len(), &self.filter);
                AnalysisResult::success(&job.record, rid.unwrap_or_default(), hits, self.max_stored_hits)
            }
            state => {
                let status = state.status().unwrap_or(JobStatus::Error);
                let detail = state.detail().unwrap_or_else(|| "unknown failure".to_string());
                AnalysisResult::failed(&job.record, rid, status, detail)
            }
        }
    }
}

fn is_closed(rx: &Receiver<()>) -> bool {
    matches!(rx.try_recv(), Err(TryRecvError::Disconnected))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config_clamps() {
        let settings = SchedulerSettings::try_from(SchedulerConfig {
            concurrency: 0,
            stagger_secs: 0.5,
            run_timeout_secs: 0,
        })
        .unwrap();

        assert_eq!(settings.concurrency, 1);
        assert_eq!(settings.stagger, Duration::from_millis(500));
        assert_eq!(settings.run_timeout, None);
    }

    #[test]
    fn test_settings_reject_huge_stagger() {
        let result = SchedulerSettings::try_from(SchedulerConfig {
            stagger_secs: 1e20,
            ..SchedulerConfig::default()
        });
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
