use chrono::{Duration, TimeZone, Utc};

use super::*;

fn snapshot(check_number: i32, deals: &[(&str, Source)]) -> SnapshotObservation {
    let base = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
    SnapshotObservation {
        check_number,
        taken_at: base + Duration::minutes(i64::from(check_number) * 10),
        deals: deals
            .iter()
            .map(|(hash, source)| ((*hash).to_string(), *source))
            .collect(),
    }
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

const G: Source = Source::Gcx;
const C: Source = Source::CardCash;

// -----------------------------------------------------------------------
// turnover_rate
// -----------------------------------------------------------------------

#[test]
fn rate_of_two_empty_sets_is_zero() {
    let empty: BTreeSet<&str> = BTreeSet::new();
    assert!(turnover_rate(&empty, &empty).abs() < f64::EPSILON);
}

#[test]
fn rate_of_disjoint_sets_is_one() {
    let a: BTreeSet<&str> = ["a"].into_iter().collect();
    let b: BTreeSet<&str> = ["b"].into_iter().collect();
    assert!((turnover_rate(&a, &b) - 1.0).abs() < f64::EPSILON);
}

// -----------------------------------------------------------------------
// analyze_snapshots
// -----------------------------------------------------------------------

#[test]
fn consecutive_snapshots_produce_new_removed_persisted() {
    let snapshots = vec![
        snapshot(1, &[("A", G), ("B", G), ("C", G)]),
        snapshot(2, &[("B", G), ("C", G), ("D", G)]),
    ];
    let report = analyze_snapshots(&snapshots, 10);

    assert_eq!(report.snapshot_count, 2);
    assert_eq!(report.steps.len(), 1);
    let step = &report.steps[0];
    assert_eq!(step.from_check, 1);
    assert_eq!(step.to_check, 2);
    assert_eq!(step.new, set(&["D"]));
    assert_eq!(step.removed, set(&["A"]));
    assert_eq!(step.persisted, set(&["B", "C"]));
    assert!((step.turnover_rate - 0.5).abs() < f64::EPSILON);

    assert_eq!(step.by_source.len(), 1);
    assert_eq!(step.by_source[0].source, G);
    assert!((step.by_source[0].turnover_rate - 0.5).abs() < f64::EPSILON);
}

#[test]
fn single_snapshot_yields_empty_series() {
    let report = analyze_snapshots(&[snapshot(1, &[("A", G)])], 10);
    assert_eq!(report.snapshot_count, 1);
    assert!(report.steps.is_empty());
    assert_eq!(report.sources.len(), 1);
    assert!(report.sources[0].turnover_rate.abs() < f64::EPSILON);
    assert!(report.overall.is_none());
}

#[test]
fn no_snapshots_yields_empty_report() {
    let report = analyze_snapshots(&[], 10);
    assert_eq!(report.snapshot_count, 0);
    assert!(report.steps.is_empty());
    assert!(report.sources.is_empty());
    assert!(report.overall.is_none());
}

#[test]
fn empty_consecutive_snapshots_have_zero_rate() {
    let report = analyze_snapshots(&[snapshot(1, &[]), snapshot(2, &[])], 10);
    assert_eq!(report.steps.len(), 1);
    assert!(report.steps[0].turnover_rate.abs() < f64::EPSILON);
    assert!(report.steps[0].by_source.is_empty());
}

#[test]
fn snapshots_are_ordered_by_check_number() {
    let snapshots = vec![
        snapshot(2, &[("B", G)]),
        snapshot(1, &[("A", G)]),
        snapshot(3, &[("B", G)]),
    ];
    let report = analyze_snapshots(&snapshots, 10);
    assert_eq!(report.steps[0].from_check, 1);
    assert_eq!(report.steps[0].new, set(&["B"]));
    assert_eq!(report.steps[1].from_check, 2);
    assert!(report.steps[1].turnover_rate.abs() < f64::EPSILON);
}

#[test]
fn rates_are_split_per_source() {
    let snapshots = vec![
        snapshot(1, &[("g1", G), ("g2", G), ("c1", C)]),
        snapshot(2, &[("g1", G), ("g2", G), ("c2", C)]),
    ];
    let report = analyze_snapshots(&snapshots, 10);
    let step = &report.steps[0];

    let gcx = step.by_source.iter().find(|t| t.source == G).unwrap();
    assert_eq!(gcx.persisted_count, 2);
    assert!(gcx.turnover_rate.abs() < f64::EPSILON);

    let cardcash = step.by_source.iter().find(|t| t.source == C).unwrap();
    assert_eq!(cardcash.new_count, 1);
    assert_eq!(cardcash.removed_count, 1);
    assert!((cardcash.turnover_rate - 1.0).abs() < f64::EPSILON);

    // 2 changed out of 4 distinct hashes overall
    assert!((step.turnover_rate - 0.5).abs() < f64::EPSILON);
}

#[test]
fn source_summary_aggregates_over_all_steps() {
    let snapshots = vec![
        snapshot(1, &[("A", G), ("B", G)]),
        snapshot(2, &[("A", G), ("C", G)]),
        snapshot(3, &[("A", G), ("C", G)]),
    ];
    let report = analyze_snapshots(&snapshots, 10);
    let gcx = &report.sources[0];
    // step 1: changed {B, C} of {A, B, C}; step 2: nothing changed of {A, C}
    assert_eq!(gcx.changed, 2);
    assert_eq!(gcx.observed, 5);
    assert!((gcx.turnover_rate - 0.4).abs() < 1e-9);
}

#[test]
fn lifetime_statistics_follow_check_timeline() {
    let snapshots = vec![
        snapshot(1, &[("A", G), ("B", G)]),
        snapshot(2, &[("A", G), ("B", G)]),
        snapshot(3, &[("A", G), ("C", G)]),
    ];
    let report = analyze_snapshots(&snapshots, 10);
    let gcx = &report.sources[0];

    assert_eq!(gcx.total_deals_seen, 3);
    // B was seen twice and is gone at check 3; C was only seen once.
    assert_eq!(gcx.disappeared_deals, 1);
    // A lived 30 minutes, B 20 minutes.
    assert!((gcx.avg_lifetime_minutes - 25.0).abs() < 1e-9);

    let rec = gcx.recommendation.expect("lifetime data present");
    assert_eq!(rec.min_interval_minutes, 10);
    assert_eq!(rec.max_interval_minutes, 15);

    let overall = report.overall.expect("overall recommendation");
    assert_eq!(overall.min_interval_minutes, 30);
}

#[test]
fn overall_recommendation_uses_fastest_source() {
    let mut snapshots = Vec::new();
    for check in 1..=12 {
        let mut deals = vec![("slow", C)];
        if check <= 9 {
            deals.push(("fast", G));
        }
        snapshots.push(snapshot(check, &deals));
    }
    let report = analyze_snapshots(&snapshots, 10);
    // fast lived 90 minutes, slow 120 minutes
    let overall = report.overall.unwrap();
    assert_eq!(overall.min_interval_minutes, 60);
}

// -----------------------------------------------------------------------
// recommend_check_interval
// -----------------------------------------------------------------------

#[test]
fn recommendation_bands() {
    let cases = [
        (5.0, 10, 15),
        (45.0, 20, 30),
        (90.0, 30, 60),
        (180.0, 60, 120),
        (600.0, 120, 240),
    ];
    for (lifetime, min, max) in cases {
        let rec = recommend_check_interval(lifetime);
        assert_eq!(rec.min_interval_minutes, min, "lifetime {lifetime}");
        assert_eq!(rec.max_interval_minutes, max, "lifetime {lifetime}");
    }
}
