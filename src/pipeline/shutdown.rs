use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use std::sync::Mutex;

/// What a stop request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStage {
    /// Admission closed; submitted jobs keep polling.
    Interrupted,
    /// Waiting jobs give up as well.
    Aborted,
}

/// Two-stage stop signal shared by the scheduler and its workers.
///
/// Nothing is ever sent on the channels; dropping a sender disconnects every
/// receiver at once, which wakes any `select!` waiting on it.
///
/// * `interrupt` closes admission: no new submissions, in-flight jobs finish.
/// * `abort` additionally makes waiting jobs give up at their next wait.
pub struct Shutdown {
    admission_tx: Mutex<Option<Sender<()>>>,
    abort_tx: Mutex<Option<Sender<()>>>,
    admission_rx: Receiver<()>,
    abort_rx: Receiver<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (admission_tx, admission_rx) = bounded(0);
        let (abort_tx, abort_rx) = bounded(0);
        Self {
            admission_tx: Mutex::new(Some(admission_tx)),
            abort_tx: Mutex::new(Some(abort_tx)),
            admission_rx,
            abort_rx,
        }
    }

    pub fn interrupt(&self) {
        close(&self.admission_tx);
    }

    pub fn abort(&self) {
        close(&self.admission_tx);
        close(&self.abort_tx);
    }

    /// Escalating stop used by the Ctrl-C handler: the first request
    /// interrupts, any later one aborts.
    pub fn request_stop(&self) -> StopStage {
        if self.is_interrupted() {
            self.abort();
            StopStage::Aborted
        } else {
            self.interrupt();
            StopStage::Interrupted
        }
    }

    /// Disconnects when admission closes.
    pub fn admission(&self) -> Receiver<()> {
        self.admission_rx.clone()
    }

    /// Disconnects when the run aborts.
    pub fn aborted(&self) -> Receiver<()> {
        self.abort_rx.clone()
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self.admission_rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.abort_rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

fn close(slot: &Mutex<Option<Sender<()>>>) {
    let mut guard = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.take();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_only_closes_admission() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_interrupted());

        shutdown.interrupt();

        assert!(shutdown.is_interrupted());
        assert!(!shutdown.is_aborted());
        assert!(shutdown.admission().recv().is_err());
    }

    #[test]
    fn test_abort_closes_both() {
        let shutdown = Shutdown::new();
        shutdown.abort();
        shutdown.abort();

        assert!(shutdown.is_interrupted());
        assert!(shutdown.is_aborted());
        assert!(shutdown.aborted().recv().is_err());
    }

    #[test]
    fn test_second_stop_request_aborts() {
        let shutdown = Shutdown::new();

        assert_eq!(shutdown.request_stop(), StopStage::Interrupted);
        assert!(!shutdown.is_aborted());

        assert_eq!(shutdown.request_stop(), StopStage::Aborted);
        assert!(shutdown.is_aborted());
        assert_eq!(shutdown.request_stop(), StopStage::Aborted);
    }
}
