//! Statistical aggregation over reading snapshots
//!
//! # Components
//!
//! - **`aggregate`**: snapshot → [`AggregateReport`] (counts, shares, averages, rankings)
//! - **`render`**: report → dashboard text
//! - **`AggregatorService`**: renders a store on a fixed period
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use drone_gateway::aggregation::aggregate;
//! use drone_gateway::types::{Metric, Reading, Region};
//!
//! let snapshot = vec![
//!     Arc::new(Reading::new(Region::Sul, 1000.0, 1.0, 20.0, 50.0).unwrap()),
//!     Arc::new(Reading::new(Region::Norte, 1000.0, 1.0, 30.0, 50.0).unwrap()),
//!     Arc::new(Reading::new(Region::Sul, 1000.0, 1.0, 10.0, 50.0).unwrap()),
//! ];
//!
//! let report = aggregate(&snapshot).unwrap();
//! let temps = report.ranking(Metric::Temperature).unwrap();
//! assert_eq!(temps.ranking[0].region, Region::Norte);
//! assert_eq!(temps.ranking[1].average, 15.0);
//! ```

pub mod render;
pub mod service;

pub use render::{render, DashboardRenderer, NO_DATA_NOTICE};
pub use service::AggregatorService;

use std::sync::Arc;

use serde::Serialize;

use crate::types::{Metric, Reading, Region};

/// One region's share of the snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionShare {
    pub region: Region,
    pub count: usize,
    /// Share of the total, 0..=100
    pub percentage: f64,
}

/// One entry of a metric ranking
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankEntry {
    pub region: Region,
    pub average: f64,
}

/// Averages for one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRanking {
    pub metric: Metric,
    /// Average across every reading in the snapshot
    pub global_average: f64,
    /// Per-region averages, highest first
    pub ranking: Vec<RankEntry>,
}

/// Aggregates of a non-empty snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    pub total: usize,
    /// Regions in order of first appearance in the snapshot
    pub regions: Vec<RegionShare>,
    /// One entry per metric in `Metric::ALL` order
    pub metrics: Vec<MetricRanking>,
}

impl AggregateReport {
    /// Ranking for one metric
    pub fn ranking(&self, metric: Metric) -> Option<&MetricRanking> {
        self.metrics.iter().find(|m| m.metric == metric)
    }

    /// Share entry for one region
    pub fn share(&self, region: Region) -> Option<&RegionShare> {
        self.regions.iter().find(|s| s.region == region)
    }
}

/// Per-region running sums while grouping
struct Group {
    region: Region,
    count: usize,
    sums: [f64; Metric::COUNT],
}

/// Compute the report for a snapshot; `None` when the snapshot is empty
///
/// Pure: the same snapshot always yields the same report. Ranking ties keep
/// the grouping (first appearance) order.
pub fn aggregate(snapshot: &[Arc<Reading>]) -> Option<AggregateReport> {
    if snapshot.is_empty() {
        return None;
    }

    let mut slots: [Option<usize>; Region::COUNT] = [None; Region::COUNT];
    let mut groups: Vec<Group> = Vec::with_capacity(Region::COUNT);
    let mut totals = [0.0; Metric::COUNT];

    for reading in snapshot {
        let slot = *slots[reading.region().index()].get_or_insert_with(|| {
            groups.push(Group {
                region: reading.region(),
                count: 0,
                sums: [0.0; Metric::COUNT],
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.count += 1;
        for (i, metric) in Metric::ALL.iter().enumerate() {
            let value = metric.value_of(reading);
            group.sums[i] += value;
            totals[i] += value;
        }
    }

    let total = snapshot.len();
    let regions = groups
        .iter()
        .map(|g| RegionShare {
            region: g.region,
            count: g.count,
            percentage: g.count as f64 * 100.0 / total as f64,
        })
        .collect();

    let metrics = Metric::ALL
        .iter()
        .enumerate()
        .map(|(i, &metric)| {
            let mut ranking: Vec<RankEntry> = groups
                .iter()
                .map(|g| RankEntry {
                    region: g.region,
                    average: g.sums[i] / g.count as f64,
                })
                .collect();
            // stable: equal averages keep grouping order
            ranking.sort_by(|a, b| b.average.total_cmp(&a.average));

            MetricRanking {
                metric,
                global_average: totals[i] / total as f64,
                ranking,
            }
        })
        .collect();

    Some(AggregateReport {
        total,
        regions,
        metrics,
    })
}
