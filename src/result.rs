//! Per-dork reports and the run summary.

use std::path::PathBuf;
use std::time::Duration;

/// Terminal state of one dork after the retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DorkOutcome {
    /// At least one attempt returned links.
    Found(Vec<String>),
    /// Some attempt got a response, but no attempt returned links.
    NotFound,
    /// Every attempt failed at transport level.
    Exhausted,
}

impl DorkOutcome {
    /// Links to persist; empty for both `NotFound` and `Exhausted`.
    pub fn links(&self) -> &[String] {
        match self {
            DorkOutcome::Found(links) => links,
            DorkOutcome::NotFound | DorkOutcome::Exhausted => &[],
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, DorkOutcome::Found(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            DorkOutcome::Found(_) => "found",
            DorkOutcome::NotFound => "not found",
            DorkOutcome::Exhausted => "exhausted",
        }
    }
}

/// Everything known about one completed dork.
#[derive(Debug, Clone)]
pub struct DorkReport {
    pub dork: String,
    pub outcome: DorkOutcome,
    /// Base-proxy attempts, initial one included.
    pub attempts: u32,
    /// Paid-gateway attempts.
    pub paid_attempts: u32,
    /// Per-dork result file, once persisted.
    pub output_file: Option<PathBuf>,
    pub elapsed: Duration,
}

impl DorkReport {
    pub fn links(&self) -> &[String] {
        self.outcome.links()
    }
}

/// Reports for every dork of a run, in input order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    reports: Vec<DorkReport>,
    /// Number of dorks.
    pub count: usize,
    /// Run duration in milliseconds.
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn new(reports: Vec<DorkReport>, duration: Duration) -> Self {
        Self {
            count: reports.len(),
            reports,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn reports(&self) -> &[DorkReport] {
        &self.reports
    }

    /// Dorks that returned at least one link.
    pub fn found(&self) -> usize {
        self.reports.iter().filter(|r| r.outcome.is_found()).count()
    }

    pub fn total_links(&self) -> usize {
        self.reports.iter().map(|r| r.links().len()).sum()
    }

    /// Renders the summary as an aligned text table.
    pub fn render_table(&self) -> String {
        let headers = ["Dork", "Results File", "Results", "Outcome"];
        let rows: Vec<[String; 4]> = self
            .reports
            .iter()
            .map(|r| {
                [
                    r.dork.clone(),
                    r.output_file
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    r.links().len().to_string(),
                    r.outcome.label().to_string(),
                ]
            })
            .collect();

        let mut widths = headers.map(|h| h.chars().count());
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row.iter()) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        let line = |cells: [&str; 4]| -> String {
            cells
                .iter()
                .zip(widths.iter())
                .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        out.push_str(&line(headers));
        out.push('\n');
        out.push_str(&line(widths.map(|w| "-".repeat(w)).each_ref().map(String::as_str)));
        out.push('\n');
        for row in &rows {
            out.push_str(&line(row.each_ref().map(String::as_str)));
            out.push('\n');
        }
        out
    }
}
