use crate::report::ResultSet;
use crate::scanner::Progress;
use crate::types::TargetResult;
use std::time::Duration;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3600;
const SEPARATOR_WIDTH: usize = 80;

pub fn print_result_line(result: &TargetResult, progress: Progress) {
    let status_icon = if result.outcome.is_failed() { "❌" } else { "✅" };
    println!("{} [{}/{}] {}", status_icon, progress.completed, progress.total, result.row_text());
}

pub fn print_summary(results: &ResultSet, progress: Progress, elapsed: Duration) {
    let reachable = results.results().filter(|r| !r.outcome.is_failed()).count();

    print_separator();
    println!("{}", results.render_table().trim_end());
    print_separator();
    println!("{} of {} targets tested, {} reachable ({})",
        progress.completed, progress.total, reachable, format_duration(elapsed));
}

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs < SECONDS_PER_MINUTE {
        format!("{}s", total_secs)
    } else if total_secs < SECONDS_PER_HOUR {
        format!("{}m{}s", total_secs / SECONDS_PER_MINUTE, total_secs % SECONDS_PER_MINUTE)
    } else {
        let hours = total_secs / SECONDS_PER_HOUR;
        let minutes = (total_secs % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
        format!("{}h{}m", hours, minutes)
    }
}

pub fn print_separator() {
    println!("{}", "─".repeat(SEPARATOR_WIDTH));
}

pub fn print_header(target_count: usize) {
    println!("🎯 Testing {} DNS server(s)", target_count);
    print_separator();
}
