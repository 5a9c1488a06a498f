use crate::scan::geoip::GeoLookup;
use crate::scan::ping::Probe;
use crate::target::Target;
use crate::types::TargetResult;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Pause gate and cancellation flag shared by every task of one run
#[derive(Debug)]
pub struct RunControl {
    cancel: CancellationToken,
    gate: watch::Sender<bool>,
}

impl RunControl {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            cancel: CancellationToken::new(),
            gate,
        }
    }

    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    pub fn is_paused(&self) -> bool {
        !*self.gate.borrow()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Wait until the gate is open; false if the run was cancelled first
    pub async fn admit(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        let mut gate = self.gate.subscribe();
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            open = async { gate.wait_for(|open| *open).await.is_ok() } => open && !self.cancel.is_cancelled(),
        }
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

/// One unit of work: probe a target, then resolve its geo metadata
#[derive(Clone)]
pub struct ProbeTask {
    probe: Arc<dyn Probe>,
    geo: Arc<GeoLookup>,
}

impl ProbeTask {
    pub fn new(probe: Arc<dyn Probe>, geo: Arc<GeoLookup>) -> Self {
        Self { probe, geo }
    }

    /// Always yields a result; component failures arrive as sentinel values
    pub async fn run(&self, target: Target) -> TargetResult {
        let task_start = Instant::now();

        let outcome = self.probe.probe(&target).await;
        let geo = self.geo.lookup(&target);

        log::debug!("[scan::task] run_completed: target={} duration={}ms latency={:?} loss={}% country={} org={}",
            target, task_start.elapsed().as_millis(), outcome.average_latency_ms,
            outcome.packet_loss_percent, geo.country_name, geo.organization_name);

        TargetResult { target, outcome, geo }
    }

    /// Run under a scan's controls.
    ///
    /// Returns `None` only when the run is cancelled before this task starts
    /// probing; once started, the task always completes.
    pub async fn run_controlled(&self, target: Target, control: &RunControl) -> Option<TargetResult> {
        if !control.admit().await {
            log::debug!("[scan::task] dropped_before_start: target={}", target);
            return None;
        }
        Some(self.run(target).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::geoip::tests::MapTable;
    use crate::types::{GeoInfo, ProbeOutcome};
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedProbe(ProbeOutcome);

    #[async_trait]
    impl Probe for FixedProbe {
        async fn probe(&self, _target: &Target) -> ProbeOutcome {
            self.0
        }
    }

    fn task(outcome: ProbeOutcome, geo: GeoLookup) -> ProbeTask {
        ProbeTask::new(Arc::new(FixedProbe(outcome)), Arc::new(geo))
    }

    #[tokio::test]
    async fn test_run_reachable_target() {
        let geo = GeoLookup::new(
            Some(Box::new(MapTable::with(&[("8.8.8.8", "United States")]))),
            Some(Box::new(MapTable::with(&[("8.8.8.8", "Google LLC")]))),
        );
        let result = task(ProbeOutcome::new(Some(12.3), 0), geo)
            .run(Target::parse("8.8.8.8").unwrap())
            .await;

        assert_eq!(result.target.original, "8.8.8.8");
        assert_eq!(result.outcome, ProbeOutcome::new(Some(12.3), 0));
        assert_eq!(result.geo, GeoInfo::new("United States", "Google LLC"));
    }

    #[tokio::test]
    async fn test_run_failed_components_yield_sentinels() {
        let result = task(ProbeOutcome::failed(), GeoLookup::disabled())
            .run(Target::parse("not an address").unwrap())
            .await;

        assert_eq!(result.outcome, ProbeOutcome::failed());
        assert_eq!(result.geo, GeoInfo::unavailable());
    }

    #[tokio::test]
    async fn test_run_hostname_with_tables_is_lookup_error() {
        let geo = GeoLookup::new(Some(Box::new(MapTable::with(&[]))), Some(Box::new(MapTable::with(&[]))));
        let result = task(ProbeOutcome::failed(), geo)
            .run(Target::parse("not an address").unwrap())
            .await;

        assert_eq!(result.geo, GeoInfo::error());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_is_dropped() {
        let control = RunControl::new();
        control.cancel();

        let result = task(ProbeOutcome::failed(), GeoLookup::disabled())
            .run_controlled(Target::parse("1.1.1.1").unwrap(), &control)
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_paused_task_waits_for_resume() {
        let control = Arc::new(RunControl::new());
        control.pause();
        assert!(control.is_paused());

        let runner = task(ProbeOutcome::new(Some(1.0), 0), GeoLookup::disabled());
        let waiting = {
            let control = control.clone();
            tokio::spawn(async move {
                runner.run_controlled(Target::parse("1.1.1.1").unwrap(), &control).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());

        control.resume();
        let result = waiting.await.unwrap();
        assert!(result.is_some());
    }

    #[tokio::test]
    async fn test_cancel_releases_paused_task() {
        let control = Arc::new(RunControl::new());
        control.pause();

        let runner = task(ProbeOutcome::new(Some(1.0), 0), GeoLookup::disabled());
        let waiting = {
            let control = control.clone();
            tokio::spawn(async move {
                runner.run_controlled(Target::parse("1.1.1.1").unwrap(), &control).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        control.cancel();
        assert!(waiting.await.unwrap().is_none());
    }
}
