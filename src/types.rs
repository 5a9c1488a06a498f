use std::fmt;

use crate::target::Target;

/// Placeholder used when a lookup table is missing or has no entry
pub const NOT_AVAILABLE: &str = "N/A";
/// Placeholder used when a lookup failed unexpectedly
pub const LOOKUP_ERROR: &str = "Error";
/// Display value for a probe that never got a reply
pub const PING_FAILED: &str = "FAILED";

const TOTAL_LOSS_PERCENT: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutcome {
    pub average_latency_ms: Option<f64>,
    pub packet_loss_percent: u8,
}

impl ProbeOutcome {
    /// Build an outcome, clamping loss to 0..=100 and dropping latency on total loss
    pub fn new(average_latency_ms: Option<f64>, packet_loss_percent: u8) -> Self {
        let packet_loss_percent = packet_loss_percent.min(TOTAL_LOSS_PERCENT);
        let average_latency_ms = if packet_loss_percent == TOTAL_LOSS_PERCENT {
            None
        } else {
            average_latency_ms
        };

        Self {
            average_latency_ms,
            packet_loss_percent,
        }
    }

    /// Outcome for a target that could not be probed at all
    pub fn failed() -> Self {
        Self {
            average_latency_ms: None,
            packet_loss_percent: TOTAL_LOSS_PERCENT,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.average_latency_ms.is_none()
    }

    pub fn latency_display(&self) -> String {
        match self.average_latency_ms {
            Some(ms) => format!("{:.2}", ms),
            None => PING_FAILED.to_string(),
        }
    }

    pub fn loss_display(&self) -> String {
        format!("{}%", self.packet_loss_percent)
    }
}

impl Default for ProbeOutcome {
    fn default() -> Self {
        Self::failed()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoInfo {
    pub country_name: String,
    pub organization_name: String,
}

impl GeoInfo {
    pub fn new(country_name: impl Into<String>, organization_name: impl Into<String>) -> Self {
        Self {
            country_name: country_name.into(),
            organization_name: organization_name.into(),
        }
    }

    pub fn unavailable() -> Self {
        Self::new(NOT_AVAILABLE, NOT_AVAILABLE)
    }

    pub fn error() -> Self {
        Self::new(LOOKUP_ERROR, LOOKUP_ERROR)
    }
}

impl Default for GeoInfo {
    fn default() -> Self {
        Self::unavailable()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetResult {
    pub target: Target,
    pub outcome: ProbeOutcome,
    pub geo: GeoInfo,
}

impl TargetResult {
    /// Display cells in column order: address, ping, loss, location, provider
    pub fn cells(&self) -> [String; 5] {
        [
            self.target.to_string(),
            self.outcome.latency_display(),
            self.outcome.loss_display(),
            self.geo.country_name.clone(),
            self.geo.organization_name.clone(),
        ]
    }

    /// Whole row joined with commas, as copied to a clipboard
    pub fn row_text(&self) -> String {
        self.cells().join(", ")
    }
}

/// Lifecycle of one scan run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ScanState {
    Idle = 0,
    Running = 1,
    Paused = 2,
    Cancelling = 3,
    Completed = 4,
}

impl ScanState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ScanState::Running,
            2 => ScanState::Paused,
            3 => ScanState::Cancelling,
            4 => ScanState::Completed,
            _ => ScanState::Idle,
        }
    }

    /// A run is in progress and owns the scheduler
    pub fn is_active(&self) -> bool {
        matches!(self, ScanState::Running | ScanState::Paused | ScanState::Cancelling)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Idle => "idle",
            ScanState::Running => "running",
            ScanState::Paused => "paused",
            ScanState::Cancelling => "cancelling",
            ScanState::Completed => "completed",
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values carried by the result channel
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Result(TargetResult),
    /// Terminal sentinel, always the last event of a run
    Done,
}
