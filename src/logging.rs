use std::fs;
use std::io::Write;
use std::path::PathBuf;
use log::LevelFilter;

const APP_NAME: &str = "dnscheck";

/// Initialize logging to a system-specific log file
pub fn init_logging(verbose: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let log_path = get_log_file_path()?;

    // Ensure the log directory exists
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let log_level = resolve_level(std::env::var("RUST_LOG").ok().as_deref(), verbose);

    env_logger::Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(
            fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)?
        )))
        .try_init()?;

    log::info!("Logging initialized to: {}", log_path.display());
    log::info!("Log level: {}", log_level);

    Ok(log_path)
}

/// `RUST_LOG` wins when set and valid; otherwise info, or debug with `--verbose`
fn resolve_level(env_value: Option<&str>, verbose: bool) -> LevelFilter {
    let fallback = if verbose { LevelFilter::Debug } else { LevelFilter::Info };
    env_value
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(fallback)
}

/// Get the system-specific log file path
pub fn get_log_file_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    let log_dir = if cfg!(target_os = "macos") {
        // macOS: ~/Library/Logs/dnscheck/
        dirs::home_dir()
            .ok_or("Could not find home directory")?
            .join("Library")
            .join("Logs")
            .join(APP_NAME)
    } else if cfg!(target_os = "linux") {
        // Linux: ~/.local/share/dnscheck/logs/ or /var/log/dnscheck/ if running as root
        if is_root() {
            PathBuf::from("/var/log").join(APP_NAME)
        } else {
            dirs::data_local_dir()
                .ok_or("Could not find local data directory")?
                .join(APP_NAME)
                .join("logs")
        }
    } else {
        dirs::data_local_dir()
            .ok_or("Could not find local data directory")?
            .join(APP_NAME)
            .join("logs")
    };

    Ok(log_dir.join(format!("{}.log", APP_NAME)))
}

#[cfg(unix)]
fn is_root() -> bool {
    nix::unistd::getuid().is_root()
}

#[cfg(not(unix))]
fn is_root() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path_generation() {
        let path = get_log_file_path().unwrap();
        assert!(path.to_string_lossy().contains("dnscheck"));
        assert!(path.to_string_lossy().ends_with("dnscheck.log"));
    }

    #[test]
    fn test_resolve_level() {
        assert_eq!(resolve_level(None, false), LevelFilter::Info);
        assert_eq!(resolve_level(None, true), LevelFilter::Debug);
        assert_eq!(resolve_level(Some("trace"), false), LevelFilter::Trace);
        assert_eq!(resolve_level(Some("bogus"), true), LevelFilter::Debug);
    }
}
