use thiserror::Error;

use crate::types::ScanState;

/// Rejected control operations on the scan scheduler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("A scan is already {state}")]
    AlreadyRunning { state: ScanState },

    #[error("No targets to scan")]
    NoTargets,

    #[error("No scan is in progress (state: {state})")]
    NotActive { state: ScanState },
}
