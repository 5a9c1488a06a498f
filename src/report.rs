use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use clap::ValueEnum;
use eyre::{Result, WrapErr};
use serde::Serialize;

use crate::target::Target;
use crate::types::TargetResult;

pub const COLUMN_HEADERS: [&str; 5] = [
    "DNS ADDRESS",
    "PING (MS)",
    "PACKET LOSS (%)",
    "LOCATION",
    "SERVICE PROVIDER",
];

const COLUMN_SEPARATOR: &str = " | ";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortField {
    Address,
    Ping,
    Loss,
    Location,
    Isp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn toggled(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Comma-separated values with a UTF-8 byte-order mark
    Csv,
    /// Aligned plain-text table
    Txt,
}

/// A result tagged with its arrival position
#[derive(Debug, Clone)]
pub struct Row {
    pub seq: usize,
    pub result: TargetResult,
}

#[derive(Serialize)]
struct ExportRecord<'a> {
    address: &'a str,
    ping: String,
    loss: String,
    location: &'a str,
    provider: &'a str,
}

impl<'a> From<&'a TargetResult> for ExportRecord<'a> {
    fn from(result: &'a TargetResult) -> Self {
        Self {
            address: &result.target.original,
            ping: result.outcome.latency_display(),
            loss: result.outcome.loss_display(),
            location: &result.geo.country_name,
            provider: &result.geo.organization_name,
        }
    }
}

/// Accumulated results of a run, in display order
#[derive(Debug, Default)]
pub struct ResultSet {
    rows: Vec<Row>,
    next_seq: usize,
    sort: Option<(SortField, SortDirection)>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: TargetResult) {
        self.rows.push(Row {
            seq: self.next_seq,
            result,
        });
        self.next_seq += 1;
    }

    pub fn extend(&mut self, results: impl IntoIterator<Item = TargetResult>) {
        for result in results {
            self.push(result);
        }
    }

    /// Forget every row, as when a new run starts
    pub fn clear(&mut self) {
        self.rows.clear();
        self.next_seq = 0;
        self.sort = None;
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn results(&self) -> impl Iterator<Item = &TargetResult> {
        self.rows.iter().map(|row| &row.result)
    }

    pub fn current_sort(&self) -> Option<(SortField, SortDirection)> {
        self.sort
    }

    /// Sort by `field`; repeating the same field flips the direction.
    ///
    /// Failed pings always end up last, whichever the direction.
    pub fn sort_by(&mut self, field: SortField) -> SortDirection {
        let direction = match self.sort {
            Some((current, direction)) if current == field => direction.toggled(),
            _ => SortDirection::Ascending,
        };
        self.sort_with(field, direction);
        direction
    }

    pub fn sort_with(&mut self, field: SortField, direction: SortDirection) {
        log::debug!("[report] sort: field={:?} direction={:?} rows={}", field, direction, self.rows.len());
        self.rows
            .sort_by(|a, b| compare(&a.result, &b.result, field, direction));
        self.sort = Some((field, direction));
    }

    pub fn export(&self, format: ExportFormat, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.is_empty() {
            eyre::bail!("There are no results to export");
        }

        let file = File::create(path)
            .wrap_err_with(|| format!("Failed to create export file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);

        let written = match format {
            ExportFormat::Csv => self.write_csv(&mut writer),
            ExportFormat::Txt => writer
                .write_all(self.render_table().as_bytes())
                .wrap_err("Failed to write text table"),
        };
        written
            .and_then(|_| writer.flush().wrap_err("Failed to flush export file"))
            .wrap_err_with(|| format!("Export to {} failed", path.display()))?;

        log::info!("[report] exported: format={:?} path={} rows={}", format, path.display(), self.len());
        Ok(())
    }

    /// CSV with BOM: header row, then one record per result in display order
    pub fn write_csv<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(UTF8_BOM).wrap_err("Failed to write byte-order mark")?;

        let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        csv.write_record(COLUMN_HEADERS).wrap_err("Failed to write CSV header")?;
        for result in self.results() {
            csv.serialize(ExportRecord::from(result))
                .wrap_err_with(|| format!("Failed to write CSV row for {}", result.target))?;
        }
        csv.flush().wrap_err("Failed to flush CSV writer")?;
        Ok(())
    }

    /// Fixed-width table: header, dash rule, one left-justified line per result
    pub fn render_table(&self) -> String {
        let data: Vec<[String; 5]> = self.results().map(TargetResult::cells).collect();

        let mut widths = COLUMN_HEADERS.map(|h| h.chars().count());
        for row in &data {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let header = format_line(COLUMN_HEADERS.iter().copied(), &widths);
        let mut out = String::new();
        out.push_str(&header);
        out.push('\n');
        out.push_str(&"-".repeat(header.chars().count()));
        out.push('\n');
        for row in &data {
            out.push_str(&format_line(row.iter().map(String::as_str), &widths));
            out.push('\n');
        }
        out
    }
}

fn format_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize; 5]) -> String {
    cells
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect::<Vec<_>>()
        .join(COLUMN_SEPARATOR)
}

fn compare(a: &TargetResult, b: &TargetResult, field: SortField, direction: SortDirection) -> Ordering {
    match field {
        SortField::Address => direction.apply(compare_targets(&a.target, &b.target)),
        SortField::Ping => match (a.outcome.average_latency_ms, b.outcome.average_latency_ms) {
            (Some(x), Some(y)) => direction.apply(x.total_cmp(&y)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
        SortField::Loss => direction.apply(a.outcome.packet_loss_percent.cmp(&b.outcome.packet_loss_percent)),
        SortField::Location => direction.apply(compare_text(&a.geo.country_name, &b.geo.country_name)),
        SortField::Isp => direction.apply(compare_text(&a.geo.organization_name, &b.geo.organization_name)),
    }
}

// IP literals in numeric order, then hostnames alphabetically
fn compare_targets(a: &Target, b: &Target) -> Ordering {
    match (a.ip(), b.ip()) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => compare_text(&a.original, &b.original),
    }
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}
