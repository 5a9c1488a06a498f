use async_trait::async_trait;
use dnscheck::scan::{AsnTable, CityTable};
use dnscheck::{
    ExportFormat, GeoInfo, GeoLookup, Probe, ProbeOutcome, ResultSet, ResultStream, ScanError,
    ScanScheduler, ScanState, SortField, Target, TargetResult,
};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted probe: per-address outcomes, everything else times out
struct ScriptedProbe {
    outcomes: HashMap<String, ProbeOutcome>,
    delay: Duration,
    started: AtomicUsize,
}

impl ScriptedProbe {
    fn new(delay: Duration, outcomes: &[(&str, ProbeOutcome)]) -> Arc<Self> {
        Arc::new(Self {
            outcomes: outcomes.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            delay,
            started: AtomicUsize::new(0),
        })
    }

    fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn probe(&self, target: &Target) -> ProbeOutcome {
        self.started.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.outcomes
            .get(&target.original)
            .copied()
            .unwrap_or_else(ProbeOutcome::failed)
    }
}

struct StaticTable(HashMap<IpAddr, String>);

impl StaticTable {
    fn boxed(entries: &[(&str, &str)]) -> Box<Self> {
        Box::new(Self(
            entries
                .iter()
                .map(|(ip, v)| (ip.parse().unwrap(), v.to_string()))
                .collect(),
        ))
    }
}

impl CityTable for StaticTable {
    fn country_name(&self, ip: IpAddr) -> eyre::Result<Option<String>> {
        Ok(self.0.get(&ip).cloned())
    }
}

impl AsnTable for StaticTable {
    fn organization(&self, ip: IpAddr) -> eyre::Result<Option<String>> {
        Ok(self.0.get(&ip).cloned())
    }
}

fn google_geo() -> Arc<GeoLookup> {
    Arc::new(GeoLookup::new(
        Some(StaticTable::boxed(&[("8.8.8.8", "United States")])),
        Some(StaticTable::boxed(&[("8.8.8.8", "Google LLC")])),
    ))
}

fn targets(addrs: &[&str]) -> Vec<Target> {
    addrs.iter().map(|a| Target::parse(a).unwrap()).collect()
}

fn numbered_targets(n: usize) -> Vec<Target> {
    (1..=n)
        .map(|i| Target::parse(&format!("198.51.100.{}", i)).unwrap())
        .collect()
}

async fn drain_to_end(stream: &mut ResultStream, poll: Duration) -> Vec<TargetResult> {
    let mut all = Vec::new();
    loop {
        let (batch, done) = stream.drain();
        all.extend(batch);
        if done {
            return all;
        }
        tokio::time::sleep(poll).await;
    }
}

#[tokio::test]
async fn reachable_server_is_fully_described() {
    let probe = ScriptedProbe::new(Duration::ZERO, &[("8.8.8.8", ProbeOutcome::new(Some(12.3), 0))]);
    let scheduler = ScanScheduler::new(probe, google_geo(), 50);

    let mut stream = scheduler.start_single(Target::parse("8.8.8.8").unwrap()).unwrap();
    let results = drain_to_end(&mut stream, Duration::from_millis(5)).await;

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.target.original, "8.8.8.8");
    assert_eq!(result.outcome.average_latency_ms, Some(12.3));
    assert_eq!(result.outcome.packet_loss_percent, 0);
    assert_eq!(result.geo, GeoInfo::new("United States", "Google LLC"));
    assert_eq!(scheduler.state(), ScanState::Completed);
}

#[tokio::test]
async fn unreachable_server_gets_sentinel_values() {
    let probe = ScriptedProbe::new(Duration::ZERO, &[]);
    let scheduler = ScanScheduler::new(probe, google_geo(), 50);

    let mut stream = scheduler.start(targets(&["203.0.113.5"])).unwrap();
    let results = drain_to_end(&mut stream, Duration::from_millis(5)).await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].outcome.average_latency_ms, None);
    assert_eq!(results[0].outcome.packet_loss_percent, 100);
    assert_eq!(results[0].geo, GeoInfo::unavailable());
}

#[tokio::test]
async fn pause_stops_new_probes_but_keeps_delivered_results() {
    let probe = ScriptedProbe::new(Duration::from_millis(40), &[]);
    let scheduler = ScanScheduler::new(probe.clone(), Arc::new(GeoLookup::disabled()), 1);

    let mut stream = scheduler.start(numbered_targets(5)).unwrap();
    let mut received = Vec::new();
    while received.len() < 2 {
        received.extend(stream.next().await);
    }
    scheduler.pause().unwrap();
    assert_eq!(scheduler.state(), ScanState::Paused);

    // With one worker, at most the probe already underway can finish while paused
    tokio::time::sleep(Duration::from_millis(150)).await;
    let frozen = probe.started();
    assert!(frozen <= 3);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(probe.started(), frozen);

    let (batch, done) = stream.drain();
    assert!(!done);
    received.extend(batch);
    assert_eq!(received.len(), frozen);

    scheduler.resume().unwrap();
    received.extend(drain_to_end(&mut stream, Duration::from_millis(10)).await);
    assert_eq!(received.len(), 5);
}

#[tokio::test]
async fn cancel_stops_dispatch_and_drains_in_flight() {
    let probe = ScriptedProbe::new(Duration::from_millis(100), &[]);
    let scheduler = ScanScheduler::new(probe.clone(), Arc::new(GeoLookup::disabled()), 10);

    let mut stream = scheduler.start(numbered_targets(50)).unwrap();
    while probe.started() < 10 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(scheduler.cancel());

    let results = drain_to_end(&mut stream, Duration::from_millis(10)).await;
    scheduler.wait().await;

    assert_eq!(results.len(), 10);
    assert_eq!(probe.started(), 10);
    assert_eq!(stream.progress().total, 50);
    assert_eq!(scheduler.state(), ScanState::Idle);
}

#[tokio::test]
async fn second_start_is_rejected_while_active() {
    let probe = ScriptedProbe::new(Duration::from_millis(30), &[]);
    let scheduler = ScanScheduler::new(probe.clone(), Arc::new(GeoLookup::disabled()), 4);

    let mut stream = scheduler.start(numbered_targets(4)).unwrap();
    let err = scheduler.start(numbered_targets(2)).unwrap_err();
    assert!(matches!(err, ScanError::AlreadyRunning { .. }));

    let results = drain_to_end(&mut stream, Duration::from_millis(5)).await;
    assert_eq!(results.len(), 4);
    assert_eq!(probe.started(), 4);
}

#[tokio::test]
async fn export_after_scan_writes_header_and_rows() {
    let probe = ScriptedProbe::new(
        Duration::from_millis(1),
        &[
            ("8.8.8.8", ProbeOutcome::new(Some(12.3), 0)),
            ("1.1.1.1", ProbeOutcome::new(Some(4.0), 0)),
        ],
    );
    let scheduler = ScanScheduler::new(probe, google_geo(), 50);

    let mut stream = scheduler.start(targets(&["8.8.8.8", "1.1.1.1", "203.0.113.5"])).unwrap();
    let mut set = ResultSet::new();
    set.extend(drain_to_end(&mut stream, Duration::from_millis(5)).await);
    set.sort_by(SortField::Ping);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.csv");
    set.export(ExportFormat::Csv, &path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let text = text.strip_prefix('\u{feff}').unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], "DNS ADDRESS,PING (MS),PACKET LOSS (%),LOCATION,SERVICE PROVIDER");
    assert_eq!(lines[1], "1.1.1.1,4.00,0%,N/A,N/A");
    assert_eq!(lines[2], "8.8.8.8,12.30,0%,United States,Google LLC");
    assert_eq!(lines[3], "203.0.113.5,FAILED,100%,N/A,N/A");
}
