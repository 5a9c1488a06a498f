use clap::Parser;
use eyre::Result;
use std::path::PathBuf;
use std::time::Duration;

use crate::report::SortField;
use crate::scanner::ScanConfig;
use crate::target::{Target, load_targets};

const CITY_DB_FILE: &str = "GeoLite2-City.mmdb";
const ASN_DB_FILE: &str = "GeoLite2-ASN.mmdb";

#[derive(Debug, Parser)]
#[command(name = "dnscheck")]
#[command(about = "Probe DNS servers for latency and packet loss, with GeoLite2 location and provider lookup")]
pub struct Cli {
    /// File with one DNS server address per line (`#` starts a comment)
    #[arg(required_unless_present = "single", conflicts_with = "single")]
    pub targets: Option<PathBuf>,

    /// Test a single DNS server address instead of a list
    #[arg(short, long)]
    pub single: Option<String>,

    /// GeoLite2 city database
    #[arg(long, env = "DNSCHECK_CITY_DB")]
    pub city_db: Option<PathBuf>,

    /// GeoLite2 ASN database
    #[arg(long, env = "DNSCHECK_ASN_DB")]
    pub asn_db: Option<PathBuf>,

    /// Maximum number of servers probed at once
    #[arg(short, long, default_value_t = 50)]
    pub concurrency: usize,

    /// Echo requests per server
    #[arg(long, default_value_t = 4)]
    pub count: u8,

    /// Reply timeout per echo request, in seconds
    #[arg(long, default_value_t = 2)]
    pub timeout_secs: u64,

    /// Result polling interval in milliseconds
    #[arg(long, default_value_t = 200)]
    pub poll_ms: u64,

    /// Sort the final table by this column
    #[arg(long, value_enum)]
    pub sort: Option<SortField>,

    /// Sort in descending order
    #[arg(long, requires = "sort")]
    pub descending: bool,

    /// Export results as CSV to this path
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Export results as an aligned text table to this path
    #[arg(long)]
    pub txt: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn scan_config(&self) -> ScanConfig {
        ScanConfig {
            concurrency: self.concurrency,
            probe_count: self.count,
            probe_timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }

    /// Targets from `--single` or the list file
    pub fn load_targets(&self) -> Result<Vec<Target>> {
        match (&self.single, &self.targets) {
            (Some(single), _) => Ok(vec![Target::parse(single)?]),
            (None, Some(path)) => load_targets(path),
            (None, None) => eyre::bail!("No targets given"),
        }
    }

    pub fn city_db_path(&self) -> PathBuf {
        self.city_db.clone().unwrap_or_else(|| default_db_path(CITY_DB_FILE))
    }

    pub fn asn_db_path(&self) -> PathBuf {
        self.asn_db.clone().unwrap_or_else(|| default_db_path(ASN_DB_FILE))
    }
}

/// Database next to the executable, else in the working directory
fn default_db_path(file_name: &str) -> PathBuf {
    let beside_exe = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(file_name)));

    match beside_exe {
        Some(path) if path.exists() => path,
        _ => PathBuf::from(file_name),
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}
