pub mod cli;
pub mod error;
pub mod logging;
pub mod pretty;
pub mod report;
pub mod scan;
pub mod scanner;
pub mod target;
pub mod types;

// Re-export key types and functions at the crate root
pub use error::ScanError;
pub use logging::{get_log_file_path, init_logging};
pub use report::{ExportFormat, ResultSet, SortDirection, SortField};
pub use scan::{GeoLookup, PingProbe, Probe, ProbeTask};
pub use scanner::{Progress, ResultStream, ScanConfig, ScanScheduler};
pub use target::{Target, load_targets};
pub use types::{GeoInfo, ProbeOutcome, ScanEvent, ScanState, TargetResult};
