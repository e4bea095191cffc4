use std::io::{self, Write};
use std::time::Duration;

use crate::aggregate::{AggregateState, TIMEOUT_STATUS};
use crate::config::RunConfig;
use crate::stats::{histogram, DistributionStats, HistogramBin};

const HISTOGRAM_BAR_WIDTH: usize = 50;

/// Latency figures, only available when at least one request did not time out.
#[derive(Debug, Clone)]
pub struct Latency {
    pub ttfb: DistributionStats,
    pub total: DistributionStats,
    pub histogram: Vec<HistogramBin>,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub url: String,
    pub concurrency: usize,
    pub timeout: Duration,
    pub elapsed: Duration,
    pub aggregate: AggregateState,
    pub latency: Option<Latency>,
}

impl Report {
    pub fn build(config: &RunConfig, aggregate: AggregateState, elapsed: Duration) -> Self {
        let latency = if aggregate.all_timed_out() {
            None
        } else {
            DistributionStats::from_samples(&aggregate.ttfb_samples)
                .zip(DistributionStats::from_samples(&aggregate.total_time_samples))
                .map(|(ttfb, total)| Latency {
                    ttfb,
                    total,
                    histogram: histogram(&aggregate.total_time_samples, config.histogram_bins),
                })
        };

        Report {
            url: config.url.clone(),
            concurrency: config.concurrency,
            timeout: config.timeout,
            elapsed,
            aggregate,
            latency,
        }
    }

    /// Requests per second over the whole run. `None` when every request timed out.
    pub fn throughput(&self) -> Option<f64> {
        let seconds = self.elapsed.as_secs_f64();
        (self.latency.is_some() && seconds > 0.0).then(|| self.aggregate.requests as f64 / seconds)
    }

    pub fn print(&self) -> io::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        self.write_to(&mut out)?;
        out.flush()
    }

    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        let state = &self.aggregate;
        let Some(latency) = &self.latency else {
            writeln!(out, "{}", field("Requests sent", state.requests))?;
            writeln!(out, "{}", field("Concurrency", self.concurrency))?;
            writeln!(out, "{}", field("Timeouts", state.timeouts))?;
            writeln!(
                out,
                "All requests failed by timeout of {}",
                format_seconds(self.timeout.as_secs_f64(), false)
            )?;
            return Ok(());
        };

        writeln!(out, "{}", field("URL", &self.url))?;
        writeln!(out, "{}", field("Requests sent", state.requests))?;
        writeln!(out, "{}", field("Concurrency", self.concurrency))?;
        writeln!(out, "{}", field("Timeouts", state.timeouts))?;
        if state.connection_errors > 0 {
            writeln!(out, "{}", field("No response", state.connection_errors))?;
        }
        writeln!(out, "{}", field("2xx statuses", state.count_2xx))?;
        writeln!(out, "{}", field("Non-2xx statuses", state.count_non_2xx))?;
        writeln!(
            out,
            "{}",
            field(
                "Timings",
                format!(
                    "{} ± {}  (avg ± std dev)",
                    format_seconds(latency.total.mean, true),
                    format_seconds(latency.total.std_dev, true)
                )
            )
        )?;
        write_table(out, &timing_table(&latency.ttfb, &latency.total))?;
        writeln!(
            out,
            "{}",
            field(
                "Total bytes",
                format!(
                    "{} B received, {} B sent",
                    state.bytes_downloaded, state.bytes_uploaded
                )
            )
        )?;

        writeln!(out, "{:>16}:", "HTTP codes")?;
        for (status, count) in state.status_counts_by_frequency() {
            if status == TIMEOUT_STATUS {
                writeln!(out, "{}", field("timeout", count))?;
            } else {
                writeln!(out, "{}", field(status, count))?;
            }
        }

        if !latency.histogram.is_empty() {
            writeln!(out, "Timing histogram:")?;
            write_table(out, &histogram_table(&latency.histogram))?;
        }

        if let Some(rps) = self.throughput() {
            writeln!(
                out,
                "{} requests done in {} ({:.0} average RPS).",
                state.requests,
                format_seconds(self.elapsed.as_secs_f64(), true),
                rps
            )?;
        }
        Ok(())
    }
}

fn field(name: impl std::fmt::Display, value: impl std::fmt::Display) -> String {
    format!("{:>16}:  {}", name.to_string(), value)
}

fn timing_table(ttfb: &DistributionStats, total: &DistributionStats) -> Vec<Vec<String>> {
    let row = |label: &str, a: f64, b: f64, note: &str| {
        let mut cells = vec![
            label.to_string(),
            format_seconds(a, true),
            format_seconds(b, true),
        ];
        if !note.is_empty() {
            cells.push(note.to_string());
        }
        cells
    };
    let pct = |stats: &DistributionStats, p: u32| stats.percentile(p).unwrap_or(f64::NAN);

    let mut rows = vec![vec![String::new(), "TTFB".to_string(), "Total".to_string()]];
    rows.push(row("minimum:", ttfb.min, total.min, "(fastest response)"));
    for (p, note) in [
        (25, "(first quartile)"),
        (50, "(median)"),
        (75, "(third quartile)"),
        (90, ""),
        (95, ""),
        (99, ""),
    ] {
        rows.push(row(&format!("{p} percentile:"), pct(ttfb, p), pct(total, p), note));
    }
    rows.push(row("maximum:", ttfb.max, total.max, "(slowest response)"));

    for cells in rows.iter_mut().skip(1) {
        cells[0] = format!("{:>15}", cells[0]);
    }
    rows
}

fn histogram_table(bins: &[HistogramBin]) -> Vec<Vec<String>> {
    let max_count = bins.iter().map(|b| b.count).max().unwrap_or(0).max(1);
    bins.iter()
        .map(|bin| {
            let width =
                (bin.count as f64 * HISTOGRAM_BAR_WIDTH as f64 / max_count as f64).round() as usize;
            vec![
                format!(
                    "{} .. {}",
                    format_seconds(bin.lower, true),
                    format_seconds(bin.upper, true)
                ),
                "#".repeat(width),
                bin.count.to_string(),
            ]
        })
        .collect()
}

/// Writes rows with every column padded to its widest cell plus one space.
fn write_table(out: &mut impl Write, rows: &[Vec<String>]) -> io::Result<()> {
    let mut widths: Vec<usize> = Vec::new();
    for row in rows {
        for (col, cell) in row.iter().enumerate() {
            let len = cell.chars().count();
            match widths.get_mut(col) {
                Some(width) => *width = (*width).max(len),
                None => widths.push(len),
            }
        }
    }

    for row in rows {
        let mut line = String::new();
        for (col, cell) in row.iter().enumerate() {
            let pad = widths[col] + 1 - cell.chars().count();
            line.push(' ');
            line.push_str(cell);
            line.push_str(&" ".repeat(pad));
        }
        writeln!(out, "{}", line.trim_end())?;
    }
    Ok(())
}

/// Human readable duration with a unit picked by magnitude.
///
/// With `micro == false` everything below a second is shown in whole milliseconds.
pub fn format_seconds(seconds: f64, micro: bool) -> String {
    if seconds >= 10.0 {
        format!("{:.1} s", seconds)
    } else if seconds >= 1.0 {
        format!("{:.2} s", seconds)
    } else if seconds >= 0.1 || !micro {
        format!("{:.0} ms", seconds * 1_000.0)
    } else if seconds >= 0.01 {
        format!("{:.1} ms", seconds * 1_000.0)
    } else if seconds >= 0.001 {
        format!("{:.2} ms", seconds * 1_000.0)
    } else if seconds >= 0.000_1 {
        format!("{:.0} µs", seconds * 1_000_000.0)
    } else if seconds >= 0.000_01 {
        format!("{:.1} µs", seconds * 1_000_000.0)
    } else if seconds >= 0.000_000_01 {
        format!("{:.2} µs", seconds * 1_000_000.0)
    } else {
        "< 10 ns".to_string()
    }
}
