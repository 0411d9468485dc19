use std::io::{self, Write};

use owo_colors::{OwoColorize, Stream, Style};
use serde::Serialize;

use crate::driver::CompletedRun;
use crate::histogram::Histogram;

/// Percentiles reported in every distribution table, in order.
pub const PERCENTILE_CHECKPOINTS: [f64; 8] = [50.0, 75.0, 90.0, 95.0, 99.0, 99.9, 99.99, 100.0];

/// One line of the percentile distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PercentileRow {
    pub percentile: f64,
    pub value: u64,
    pub scaled_value: f64,
    pub total_count: u64,
}

impl PercentileRow {
    /// `1/(1-p)` for `p` as a fraction; `None` at 100%.
    pub fn inverse_percentile(&self) -> Option<f64> {
        let fraction = self.percentile / 100.0;
        if fraction >= 1.0 {
            None
        } else {
            Some(1.0 / (1.0 - fraction))
        }
    }
}

pub fn percentile_rows(histogram: &Histogram, scale_factor: f64) -> Vec<PercentileRow> {
    PERCENTILE_CHECKPOINTS
        .iter()
        .map(|&percentile| {
            let value = histogram.value_at_percentile(percentile);
            PercentileRow {
                percentile,
                value,
                scaled_value: value as f64 / scale_factor,
                total_count: histogram.count_at_or_below(value),
            }
        })
        .collect()
}

/// Fixed-width percentile table followed by the summary trailer.
pub fn write_percentile_distribution<W: Write + ?Sized>(
    histogram: &Histogram,
    sink: &mut W,
    scale_factor: f64,
) -> io::Result<()> {
    writeln!(
        sink,
        "{:>12} {:>14} {:>10} {:>14}\n",
        "Value", "Percentile", "TotalCount", "1/(1-Percentile)"
    )?;

    for row in percentile_rows(histogram, scale_factor) {
        let fraction = row.percentile / 100.0;
        match row.inverse_percentile() {
            Some(inverse) => writeln!(
                sink,
                "{:>12.3} {:>14.12} {:>10} {:>14.2}",
                row.scaled_value, fraction, row.total_count, inverse
            )?,
            None => writeln!(
                sink,
                "{:>12.3} {:>14.12} {:>10}",
                row.scaled_value, fraction, row.total_count
            )?,
        }
    }

    writeln!(
        sink,
        "#[Mean    = {:>12.3}, StdDeviation   = {:>12.3}]",
        histogram.mean() / scale_factor,
        histogram.stdev() / scale_factor
    )?;
    writeln!(
        sink,
        "#[Min     = {:>12.3}, Max            = {:>12.3}]",
        histogram.min() as f64 / scale_factor,
        histogram.max() as f64 / scale_factor
    )?;
    writeln!(
        sink,
        "#[Total count    = {:>12}, Buckets = {:>4}, SubBuckets = {:>6}]",
        histogram.count(),
        histogram.bucket_count(),
        histogram.sub_bucket_count()
    )?;
    Ok(())
}

fn style_title() -> Style {
    Style::new().cyan().bold()
}

/// Two-line banner printed above the table.
pub fn format_run_header(run: &CompletedRun) -> String {
    let report = &run.report;
    let mut out = String::new();

    let title = format!(
        "Latency of {} over {} iterations",
        report.simulator, report.iterations
    );
    out.push_str(
        &title
            .if_supports_color(Stream::Stdout, |s| s.style(style_title()))
            .to_string(),
    );
    out.push('\n');

    let mut detail = format!(
        "started {}, {:.1}s, values in ns / {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.wall_time_secs(),
        run.scale_factor()
    );
    if report.aborted > 0 {
        detail.push_str(&format!(", {} aborted", report.aborted));
    }
    if report.clamped > 0 {
        detail.push_str(&format!(", {} clamped", report.clamped));
    }
    out.push_str(
        &detail
            .if_supports_color(Stream::Stdout, |s| s.dimmed())
            .to_string(),
    );
    out.push_str("\n\n");

    if report.clamped > 0 {
        let warning = format!(
            "Warning: {} samples exceeded {}ns and were clamped",
            report.clamped,
            run.histogram.highest_trackable_value()
        );
        out.push_str(
            &warning
                .if_supports_color(Stream::Stdout, |s| s.yellow())
                .to_string(),
        );
        out.push_str("\n\n");
    }

    out
}

#[derive(Serialize)]
struct JsonRun<'a> {
    simulator: &'a str,
    started_at: String,
    finished_at: String,
    iterations: u64,
    recorded: u64,
    aborted: u64,
    clamped: u64,
    scale_factor: f64,
    count: u64,
    min: u64,
    max: u64,
    mean: f64,
    stdev: f64,
    percentiles: Vec<PercentileRow>,
}

/// Machine-readable report. Values are raw nanoseconds except `scaled_value`.
pub fn format_json(run: &CompletedRun) -> String {
    let report = &run.report;
    let histogram = &run.histogram;
    let json = JsonRun {
        simulator: &report.simulator,
        started_at: report.started_at.to_rfc3339(),
        finished_at: report.finished_at.to_rfc3339(),
        iterations: report.iterations,
        recorded: report.recorded,
        aborted: report.aborted,
        clamped: report.clamped,
        scale_factor: run.scale_factor(),
        count: histogram.count(),
        min: histogram.min(),
        max: histogram.max(),
        mean: histogram.mean(),
        stdev: histogram.stdev(),
        percentiles: percentile_rows(histogram, run.scale_factor()),
    };

    serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string())
}
