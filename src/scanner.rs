use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};

use crate::error::ScanError;
use crate::scan::geoip::GeoLookup;
use crate::scan::ping::{PingProbe, Probe};
use crate::scan::task::{ProbeTask, RunControl};
use crate::target::Target;
use crate::types::{ScanEvent, ScanState, TargetResult};

const DEFAULT_CONCURRENCY: usize = 50;
const MAX_CONCURRENCY: usize = 1_000;
const DEFAULT_PROBE_COUNT: u8 = 4;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 2;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Maximum number of targets probed at the same time
    pub concurrency: usize,
    /// Echo requests sent per target
    pub probe_count: u8,
    /// Reply timeout per echo request
    pub probe_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            probe_count: DEFAULT_PROBE_COUNT,
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
        }
    }
}

struct Shared {
    state: AtomicU8,
    control: Mutex<Option<Arc<RunControl>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn state(&self) -> ScanState {
        ScanState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: ScanState, to: ScanState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn control(&self) -> Option<Arc<RunControl>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Bounded-concurrency scan scheduler.
///
/// A run fans targets out to at most `concurrency` probe tasks, streams each
/// finished [`TargetResult`] in completion order, and closes the stream with a
/// single [`ScanEvent::Done`] once every admitted task has finished. Clones
/// drive the same scheduler.
#[derive(Clone)]
pub struct ScanScheduler {
    shared: Arc<Shared>,
    task: ProbeTask,
    concurrency: usize,
}

impl ScanScheduler {
    pub fn new(probe: Arc<dyn Probe>, geo: Arc<GeoLookup>, concurrency: usize) -> Self {
        let concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        log::debug!("[scanner] new: concurrency={}", concurrency);

        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(ScanState::Idle as u8),
                control: Mutex::new(None),
                driver: Mutex::new(None),
            }),
            task: ProbeTask::new(probe, geo),
            concurrency,
        }
    }

    /// Scheduler backed by the system ping binary
    pub fn from_config(config: &ScanConfig, geo: Arc<GeoLookup>) -> Self {
        let probe = PingProbe::new(config.probe_timeout, config.probe_count);
        Self::new(Arc::new(probe), geo, config.concurrency)
    }

    pub fn state(&self) -> ScanState {
        self.shared.state()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Start a run over `targets`; rejected while another run is active
    pub fn start(&self, targets: Vec<Target>) -> Result<ResultStream, ScanError> {
        if targets.is_empty() {
            return Err(ScanError::NoTargets);
        }

        let control = Arc::new(RunControl::new());
        {
            // Hold the control slot across the transition so pause and cancel never see
            // a running state without the run's controls installed
            let mut slot = self.shared.control.lock().unwrap_or_else(PoisonError::into_inner);
            let current = self.state();
            if current.is_active() || !self.shared.transition(current, ScanState::Running) {
                let state = self.state();
                log::warn!("[scanner] start_rejected: state={}", state);
                return Err(ScanError::AlreadyRunning { state });
            }
            *slot = Some(control.clone());
        }

        let total = targets.len();

        let (tx, rx) = mpsc::unbounded_channel();
        log::info!("[scanner] run_starting: targets={} concurrency={}", total, self.concurrency);

        let handle = tokio::spawn(drive(
            targets,
            self.task.clone(),
            control,
            tx,
            self.shared.clone(),
            self.concurrency,
        ));
        *self.shared.driver.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        Ok(ResultStream::new(rx, total))
    }

    pub fn start_single(&self, target: Target) -> Result<ResultStream, ScanError> {
        self.start(vec![target])
    }

    /// Hold workers at the pause gate; probes already underway finish
    pub fn pause(&self) -> Result<(), ScanError> {
        if !self.shared.transition(ScanState::Running, ScanState::Paused) {
            return Err(ScanError::NotActive { state: self.state() });
        }
        if let Some(control) = self.shared.control() {
            control.pause();
        }
        log::info!("[scanner] paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<(), ScanError> {
        if !self.shared.transition(ScanState::Paused, ScanState::Running) {
            return Err(ScanError::NotActive { state: self.state() });
        }
        if let Some(control) = self.shared.control() {
            control.resume();
        }
        log::info!("[scanner] resumed");
        Ok(())
    }

    /// Stop admitting work; returns false when there was no active run to cancel
    pub fn cancel(&self) -> bool {
        let signalled = self.shared.transition(ScanState::Running, ScanState::Cancelling)
            || self.shared.transition(ScanState::Paused, ScanState::Cancelling);
        if !signalled {
            return self.state() == ScanState::Cancelling;
        }

        if let Some(control) = self.shared.control() {
            control.cancel();
        }
        log::info!("[scanner] cancel_requested");
        true
    }

    /// Wait for the current run's worker pool to drain
    pub async fn wait(&self) {
        let handle = self.shared.driver.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::error!("[scanner] driver_failed: error={}", e);
            }
        }
    }
}

async fn drive(
    targets: Vec<Target>,
    task: ProbeTask,
    control: Arc<RunControl>,
    tx: UnboundedSender<ScanEvent>,
    shared: Arc<Shared>,
    concurrency: usize,
) {
    let run_start = Instant::now();
    let total = targets.len();
    let sem = Arc::new(Semaphore::new(concurrency));
    let mut set = JoinSet::new();
    let mut dispatched = 0usize;

    for target in targets {
        let permit = tokio::select! {
            biased;
            _ = control.cancelled() => break,
            permit = sem.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        dispatched += 1;
        let task = task.clone();
        let control = control.clone();
        let tx = tx.clone();
        set.spawn(async move {
            let _permit = permit; // keep permit until task completes
            if let Some(result) = task.run_controlled(target, &control).await {
                // The consumer may have gone away; results are simply discarded then
                let _ = tx.send(ScanEvent::Result(result));
            }
        });
    }

    log::debug!("[scanner] dispatch_finished: dispatched={} total={} cancelled={}",
        dispatched, total, control.is_cancelled());

    while let Some(joined) = set.join_next().await {
        if let Err(e) = joined {
            log::error!("[scanner] task_failed: error={}", e);
        }
    }

    let final_state = {
        // Release the run's controls before the state allows a new run to install its own
        let mut slot = shared.control.lock().unwrap_or_else(PoisonError::into_inner);
        slot.take();
        finish_run(&shared, control.is_cancelled())
    };

    log::info!("[scanner] run_finished: state={} dispatched={} total={} duration={}ms",
        final_state, dispatched, total, run_start.elapsed().as_millis());

    let _ = tx.send(ScanEvent::Done);
}

/// Settle the final state; a cancel that landed while the pool drained still ends the run idle
fn finish_run(shared: &Shared, cancelled: bool) -> ScanState {
    let previous = shared
        .state
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            let state = ScanState::from_u8(current);
            let next = if cancelled || state == ScanState::Cancelling {
                ScanState::Idle
            } else {
                ScanState::Completed
            };
            Some(next as u8)
        })
        .unwrap_or_else(|current| current);

    let previous = ScanState::from_u8(previous);
    if cancelled || previous == ScanState::Cancelling {
        ScanState::Idle
    } else {
        ScanState::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }
}

/// Consumer side of a run's result channel
#[derive(Debug)]
pub struct ResultStream {
    rx: UnboundedReceiver<ScanEvent>,
    total: usize,
    completed: usize,
    done: bool,
}

impl ResultStream {
    fn new(rx: UnboundedReceiver<ScanEvent>, total: usize) -> Self {
        Self {
            rx,
            total,
            completed: 0,
            done: false,
        }
    }

    /// Take everything currently queued without blocking.
    ///
    /// The flag is true once the terminal sentinel has been seen.
    pub fn drain(&mut self) -> (Vec<TargetResult>, bool) {
        let mut results = Vec::new();
        while !self.done {
            match self.rx.try_recv() {
                Ok(ScanEvent::Result(result)) => {
                    self.completed += 1;
                    results.push(result);
                }
                Ok(ScanEvent::Done) => self.finish(),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log::warn!("[scanner] stream_disconnected: completed={} total={}",
                        self.completed, self.total);
                    self.finish();
                }
            }
        }
        (results, self.done)
    }

    /// Wait for the next result; `None` once the run is over
    pub async fn next(&mut self) -> Option<TargetResult> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(ScanEvent::Result(result)) => {
                self.completed += 1;
                Some(result)
            }
            Some(ScanEvent::Done) | None => {
                self.finish();
                None
            }
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.rx.close();
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.completed,
            total: self.total,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}
