use eyre::{Result, WrapErr};
use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

const COMMENT_PREFIX: char = '#';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub original: String,
    pub target_type: TargetType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetType {
    IpAddress(IpAddr),
    Hostname(String),
}

impl Target {
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            eyre::bail!("Empty target address");
        }

        // Bracketed IPv6 literal, e.g. [2001:4860:4860::8888]
        let unbracketed = input
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(input);

        if let Ok(ip) = unbracketed.parse::<IpAddr>() {
            return Ok(Self {
                original: input.to_string(),
                target_type: TargetType::IpAddress(ip),
            });
        }

        Ok(Self {
            original: input.to_string(),
            target_type: TargetType::Hostname(input.to_string()),
        })
    }

    pub fn ip(&self) -> Option<IpAddr> {
        match &self.target_type {
            TargetType::IpAddress(ip) => Some(*ip),
            TargetType::Hostname(_) => None,
        }
    }

    /// Get the target for ping commands (IP or hostname)
    pub fn network_target(&self) -> String {
        match &self.target_type {
            TargetType::IpAddress(ip) => ip.to_string(),
            TargetType::Hostname(host) => host.clone(),
        }
    }

    pub fn display_name(&self) -> &str {
        &self.original
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// Parse a newline-delimited target list, skipping blank lines and `#` comments
pub fn parse_target_list(text: &str) -> Vec<Target> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT_PREFIX))
        .filter_map(|line| match Target::parse(line) {
            Ok(target) => Some(target),
            Err(e) => {
                log::warn!("[target] skipping_line: line={} error={}", line, e);
                None
            }
        })
        .collect()
}

/// Read a target list file
pub fn load_targets(path: impl AsRef<Path>) -> Result<Vec<Target>> {
    let path = path.as_ref();
    log::debug!("[target] load_targets: path={}", path.display());

    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read target list: {}", path.display()))?;
    // Files saved by spreadsheet tools often carry a UTF-8 BOM
    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

    let targets = parse_target_list(text);
    log::info!("[target] targets_loaded: path={} count={}", path.display(), targets.len());
    Ok(targets)
}
