//! Dashboard text rendering

use std::fmt::Write;

use super::{aggregate, AggregateReport};
use crate::store::ReadingStore;

/// Text rendered when nothing has been collected
pub const NO_DATA_NOTICE: &str = "No data collected yet.";

const HEADER: &str = "--- TELEMETRY DASHBOARD ---";
const FOOTER: &str = "---------------------------";

/// Render a report as dashboard text
///
/// `None` renders only the no-data notice. Output depends on the report
/// alone, so rendering the same report twice gives identical text.
pub fn render(report: Option<&AggregateReport>) -> String {
    let Some(report) = report else {
        return format!("{}\n{}\n", HEADER, NO_DATA_NOTICE);
    };

    let mut out = String::with_capacity(512);
    // writes into a String cannot fail
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut String, report: &AggregateReport) -> std::fmt::Result {
    writeln!(out, "{}", HEADER)?;
    writeln!(out, "Total readings: {}", report.total)?;

    writeln!(out)?;
    writeln!(out, "--- Distribution by region ---")?;
    for share in &report.regions {
        writeln!(
            out,
            "- {}: {:.2}% ({} readings)",
            share.region.as_str().to_uppercase(),
            share.percentage,
            share.count
        )?;
    }

    writeln!(out)?;
    writeln!(out, "--- Global averages ---")?;
    for metric in &report.metrics {
        writeln!(out, "{}: {:.2}", metric.metric, metric.global_average)?;
    }

    writeln!(out)?;
    writeln!(out, "--- Rankings by average (highest first) ---")?;
    for metric in &report.metrics {
        writeln!(out, ">> {}", metric.metric)?;
        for entry in &metric.ranking {
            writeln!(out, "   - {}: {:.2}", entry.region, entry.average)?;
        }
    }
    writeln!(out, "{}", FOOTER)
}

/// Renders the current contents of a store
#[derive(Debug, Default, Clone, Copy)]
pub struct DashboardRenderer;

impl DashboardRenderer {
    /// Snapshot the store, aggregate and render
    pub fn render_store(store: &ReadingStore) -> String {
        let snapshot = store.snapshot_all();
        render(aggregate(&snapshot).as_ref())
    }
}
