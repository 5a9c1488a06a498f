use crate::target::Target;
use crate::types::ProbeOutcome;
use async_trait::async_trait;
use eyre::{Result, WrapErr};
use regex::Regex;
use std::net::IpAddr;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::process::Command;

const DEFAULT_PING_TIMEOUT_SECS: u64 = 2;
const DEFAULT_PING_PACKET_COUNT: u8 = 4;
const PROCESS_GRACE_SECS: u64 = 2;

// Windows: "Lost = 0 (0% loss)"; iputils/BSD: "0% packet loss" or "0.0% packet loss"
static LOSS_WINDOWS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+(?:\.\d+)?)% loss\)").expect("valid loss regex"));
static LOSS_UNIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)%\s+packet loss").expect("valid loss regex"));

// Windows: "Average = 12ms"; iputils: "rtt min/avg/max/mdev = a/b/c/d"; BSD: "round-trip min/avg/max/stddev = a/b/c/d"
static AVG_WINDOWS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Average = (\d+(?:\.\d+)?)ms").expect("valid average regex"));
static AVG_UNIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:rtt|round-trip) min/avg/max/(?:mdev|stddev) = [\d.]+/([\d.]+)/")
        .expect("valid average regex")
});

/// A single reachability check against one target
#[async_trait]
pub trait Probe: Send + Sync {
    /// Probe the target; failures are folded into the outcome, never returned
    async fn probe(&self, target: &Target) -> ProbeOutcome;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Unix
        }
    }
}

/// Probe that shells out to the system `ping` binary
#[derive(Debug, Clone)]
pub struct PingProbe {
    timeout: Duration,
    packet_count: u8,
    platform: Platform,
}

impl PingProbe {
    pub fn new(timeout: Duration, packet_count: u8) -> Self {
        log::debug!("[scan::ping] new: timeout={}ms packet_count={}",
            timeout.as_millis(), packet_count);

        Self {
            timeout,
            packet_count: packet_count.max(1),
            platform: Platform::current(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn packet_count(&self) -> u8 {
        self.packet_count
    }

    /// Command-line arguments for the configured platform
    pub fn command_args(&self, target: &str) -> Vec<String> {
        let count = self.packet_count.to_string();
        match self.platform {
            Platform::Windows => vec![
                "-n".into(), count,
                "-w".into(), self.timeout.as_millis().to_string(),
                target.into(),
            ],
            Platform::MacOs => vec![
                "-c".into(), count,
                "-W".into(), self.timeout.as_millis().to_string(),
                target.into(),
            ],
            Platform::Unix => vec![
                "-c".into(), count,
                "-W".into(), self.timeout.as_secs().max(1).to_string(),
                target.into(),
            ],
        }
    }

    /// Binary to run; BSD ping on macOS only speaks IPv4
    pub fn program(&self, target: &Target) -> &'static str {
        match (self.platform, target.ip()) {
            (Platform::MacOs, Some(IpAddr::V6(_))) => "ping6",
            _ => "ping",
        }
    }

    /// Upper bound for the whole ping process
    fn deadline(&self) -> Duration {
        self.timeout
            .saturating_mul(u32::from(self.packet_count))
            .saturating_add(Duration::from_secs(PROCESS_GRACE_SECS))
    }

    async fn do_ping(&self, target: &Target) -> Result<String> {
        let program = self.program(target);
        let target = target.network_target();
        log::debug!("[scan::ping] do_ping: program={} target={} packet_count={} timeout={}ms",
            program, target, self.packet_count, self.timeout.as_millis());

        let ping_start = Instant::now();
        let mut command = Command::new(program);
        command.args(self.command_args(&target)).kill_on_drop(true);

        let output = tokio::time::timeout(self.deadline(), command.output())
            .await
            .wrap_err_with(|| format!("Ping process exceeded {}ms", self.deadline().as_millis()))?
            .wrap_err("Failed to execute ping command")?;

        log::trace!("[scan::ping] ping_command_completed: target={} duration={}ms status={}",
            target, ping_start.elapsed().as_millis(), output.status);

        // A non-zero exit status is normal for unreachable hosts; the transcript still has statistics
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for PingProbe {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_PING_TIMEOUT_SECS),
            DEFAULT_PING_PACKET_COUNT,
        )
    }
}

#[async_trait]
impl Probe for PingProbe {
    async fn probe(&self, target: &Target) -> ProbeOutcome {
        let ping_target = target.network_target();
        let scan_start = Instant::now();

        match self.do_ping(target).await {
            Ok(stdout) => {
                let outcome = parse_ping_output(&stdout);
                log::trace!("[scan::ping] ping_completed: target={} duration={}ms latency={:?} loss={}%",
                    ping_target, scan_start.elapsed().as_millis(),
                    outcome.average_latency_ms, outcome.packet_loss_percent);
                outcome
            }
            Err(e) => {
                log::warn!("[scan::ping] ping_failed: target={} duration={}ms error={:#}",
                    ping_target, scan_start.elapsed().as_millis(), e);
                ProbeOutcome::failed()
            }
        }
    }
}

/// Extract loss and mean round-trip time from a ping transcript.
///
/// Unparseable loss counts as 100%; unparseable latency is absent.
pub fn parse_ping_output(output: &str) -> ProbeOutcome {
    let loss = LOSS_WINDOWS
        .captures(output)
        .or_else(|| LOSS_UNIX.captures(output))
        .and_then(|caps| caps[1].parse::<f64>().ok())
        .map(|pct| pct.round().clamp(0.0, 100.0) as u8);

    let average = AVG_WINDOWS
        .captures(output)
        .or_else(|| AVG_UNIX.captures(output))
        .and_then(|caps| caps[1].parse::<f64>().ok());

    if loss.is_none() {
        log::debug!("[scan::ping] loss_not_found: output_lines={}", output.lines().count());
    }

    ProbeOutcome::new(average, loss.unwrap_or(100))
}
