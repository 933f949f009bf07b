//! Turnover analysis over the snapshots of a monitoring session.
//!
//! Everything here is a pure function of the snapshot history, so a report
//! can be recomputed at any time from persisted snapshots.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::deals::Source;

/// The deal hashes observed live at one check of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotObservation {
    pub check_number: i32,
    pub taken_at: DateTime<Utc>,
    /// Deal hash → source of that deal.
    pub deals: BTreeMap<String, Source>,
}

impl SnapshotObservation {
    fn hashes(&self, source: Option<Source>) -> BTreeSet<&str> {
        self.deals
            .iter()
            .filter(|(_, s)| source.is_none_or(|wanted| **s == wanted))
            .map(|(hash, _)| hash.as_str())
            .collect()
    }
}

/// Counts and rate for one source between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTurnover {
    pub source: Source,
    pub new_count: usize,
    pub removed_count: usize,
    pub persisted_count: usize,
    pub turnover_rate: f64,
}

/// Difference between snapshot `from_check` and snapshot `to_check`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnoverStep {
    pub from_check: i32,
    pub to_check: i32,
    pub new: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub persisted: BTreeSet<String>,
    pub turnover_rate: f64,
    pub by_source: Vec<SourceTurnover>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckRecommendation {
    pub min_interval_minutes: u32,
    pub max_interval_minutes: u32,
    pub rationale: &'static str,
}

/// Session-wide statistics for one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSummary {
    pub source: Source,
    /// Σ |new ∪ removed| over all steps.
    pub changed: usize,
    /// Σ |Sₙ ∪ Sₙ₊₁| over all steps.
    pub observed: usize,
    pub turnover_rate: f64,
    pub total_deals_seen: usize,
    /// Deals seen in at least two checks that were gone by the last check.
    pub disappeared_deals: usize,
    /// Mean lifetime of deals seen in at least two checks.
    pub avg_lifetime_minutes: f64,
    pub recommendation: Option<CheckRecommendation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnoverReport {
    pub snapshot_count: usize,
    pub steps: Vec<TurnoverStep>,
    pub sources: Vec<SourceSummary>,
    pub overall: Option<CheckRecommendation>,
}

/// `|new ∪ removed| / |prev ∪ next|`, or `0.0` when both sets are empty.
#[must_use]
pub fn turnover_rate<T: Ord>(prev: &BTreeSet<T>, next: &BTreeSet<T>) -> f64 {
    ratio(
        prev.symmetric_difference(next).count(),
        prev.union(next).count(),
    )
}

/// Builds a [`TurnoverReport`] from a session's snapshots.
///
/// Snapshots are ordered by `check_number` first. Fewer than two snapshots
/// produce an empty step series.
#[must_use]
pub fn analyze_snapshots(
    snapshots: &[SnapshotObservation],
    check_interval_minutes: i32,
) -> TurnoverReport {
    let mut ordered: Vec<&SnapshotObservation> = snapshots.iter().collect();
    ordered.sort_by_key(|s| s.check_number);

    let steps: Vec<TurnoverStep> = ordered
        .windows(2)
        .map(|pair| compare_snapshots(pair[0], pair[1]))
        .collect();

    let sources_present: BTreeSet<Source> = ordered
        .iter()
        .flat_map(|s| s.deals.values().copied())
        .collect();

    let sources: Vec<SourceSummary> = sources_present
        .into_iter()
        .map(|source| summarize_source(source, &ordered, &steps, check_interval_minutes))
        .collect();

    let overall = sources
        .iter()
        .filter(|s| s.avg_lifetime_minutes > 0.0)
        .map(|s| s.avg_lifetime_minutes)
        .min_by(f64::total_cmp)
        .map(overall_recommendation);

    TurnoverReport {
        snapshot_count: ordered.len(),
        steps,
        sources,
        overall,
    }
}

/// Suggested scraping band for a source given its average deal lifetime.
#[must_use]
pub fn recommend_check_interval(avg_lifetime_minutes: f64) -> CheckRecommendation {
    let (min_interval_minutes, max_interval_minutes, rationale) = if avg_lifetime_minutes < 30.0 {
        (10, 15, "very high turnover: deals disappear quickly")
    } else if avg_lifetime_minutes < 60.0 {
        (20, 30, "high turnover: frequent checking needed")
    } else if avg_lifetime_minutes < 120.0 {
        (30, 60, "moderate turnover: hourly checking is enough")
    } else if avg_lifetime_minutes < 240.0 {
        (60, 120, "low turnover: less frequent checking is fine")
    } else {
        (120, 240, "very low turnover: deals stay available for hours")
    };
    CheckRecommendation {
        min_interval_minutes,
        max_interval_minutes,
        rationale,
    }
}

fn overall_recommendation(min_avg_lifetime_minutes: f64) -> CheckRecommendation {
    let (minutes, rationale) = if min_avg_lifetime_minutes < 60.0 {
        (30, "shortest average deal lifetime is under an hour")
    } else if min_avg_lifetime_minutes < 120.0 {
        (60, "shortest average deal lifetime is under two hours")
    } else {
        (120, "every source keeps deals for two hours or more")
    };
    CheckRecommendation {
        min_interval_minutes: minutes,
        max_interval_minutes: minutes,
        rationale,
    }
}

fn compare_snapshots(prev: &SnapshotObservation, next: &SnapshotObservation) -> TurnoverStep {
    let before = prev.hashes(None);
    let after = next.hashes(None);

    let new: BTreeSet<String> = after
        .difference(&before)
        .map(|h| (*h).to_string())
        .collect();
    let removed: BTreeSet<String> = before
        .difference(&after)
        .map(|h| (*h).to_string())
        .collect();
    let persisted: BTreeSet<String> = before
        .intersection(&after)
        .map(|h| (*h).to_string())
        .collect();

    let step_sources: BTreeSet<Source> = prev
        .deals
        .values()
        .chain(next.deals.values())
        .copied()
        .collect();

    let by_source = step_sources
        .into_iter()
        .map(|source| {
            let before = prev.hashes(Some(source));
            let after = next.hashes(Some(source));
            SourceTurnover {
                source,
                new_count: after.difference(&before).count(),
                removed_count: before.difference(&after).count(),
                persisted_count: before.intersection(&after).count(),
                turnover_rate: turnover_rate(&before, &after),
            }
        })
        .collect();

    TurnoverStep {
        from_check: prev.check_number,
        to_check: next.check_number,
        turnover_rate: turnover_rate(&before, &after),
        new,
        removed,
        persisted,
        by_source,
    }
}

fn summarize_source(
    source: Source,
    ordered: &[&SnapshotObservation],
    steps: &[TurnoverStep],
    check_interval_minutes: i32,
) -> SourceSummary {
    let (changed, observed) = steps
        .iter()
        .flat_map(|step| step.by_source.iter())
        .filter(|t| t.source == source)
        .fold((0usize, 0usize), |(changed, observed), t| {
            (
                changed + t.new_count + t.removed_count,
                observed + t.new_count + t.removed_count + t.persisted_count,
            )
        });

    // hash -> (first check, last check, number of checks seen in)
    let mut timeline: BTreeMap<&str, (i32, i32, usize)> = BTreeMap::new();
    for snapshot in ordered {
        for hash in snapshot.hashes(Some(source)) {
            timeline
                .entry(hash)
                .and_modify(|(_, last, count)| {
                    *last = snapshot.check_number;
                    *count += 1;
                })
                .or_insert((snapshot.check_number, snapshot.check_number, 1));
        }
    }

    let final_check = ordered.last().map_or(0, |s| s.check_number);
    let mut disappeared_deals = 0usize;
    let mut lifetimes: Vec<f64> = Vec::new();
    for &(first, last, count) in timeline.values() {
        if count < 2 {
            continue;
        }
        if last < final_check {
            disappeared_deals += 1;
        }
        lifetimes.push(f64::from((last - first + 1).saturating_mul(check_interval_minutes)));
    }

    #[allow(clippy::cast_precision_loss)]
    let avg_lifetime_minutes = if lifetimes.is_empty() {
        0.0
    } else {
        lifetimes.iter().sum::<f64>() / lifetimes.len() as f64
    };

    SourceSummary {
        source,
        changed,
        observed,
        turnover_rate: ratio(changed, observed),
        total_deals_seen: timeline.len(),
        disappeared_deals,
        avg_lifetime_minutes,
        recommendation: (avg_lifetime_minutes > 0.0)
            .then(|| recommend_check_interval(avg_lifetime_minutes)),
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[cfg(test)]
#[path = "turnover_test.rs"]
mod tests;
