//! Aggregates over an owner's full report history. Always a full
//! recomputation; nothing is cached between calls.

use chrono::{DateTime, Datelike, Utc};
use shared::{DashboardSummary, InsightsSummary, LabelCount, MonthCount, ReportCard, ScanReport};
use std::collections::BTreeMap;

pub const RECENT_REPORTS: usize = 5;

/// Label counts sorted by count descending. Ties keep first-encounter order.
pub fn label_frequency(reports: &[ScanReport]) -> Vec<LabelCount> {
    let mut counts: Vec<LabelCount> = Vec::new();
    for report in reports {
        match counts
            .iter_mut()
            .find(|entry| entry.label == report.prediction.label)
        {
            Some(entry) => entry.count += 1,
            None => counts.push(LabelCount {
                label: report.prediction.label.clone(),
                count: 1,
            }),
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

pub fn average_confidence(reports: &[ScanReport]) -> f64 {
    if reports.is_empty() {
        return 0.0;
    }
    reports.iter().map(|r| r.prediction.confidence).sum::<f64>() / reports.len() as f64
}

/// Scan counts per `YYYY-MM`, oldest month first.
pub fn monthly_counts(reports: &[ScanReport]) -> Vec<MonthCount> {
    let mut months: BTreeMap<String, usize> = BTreeMap::new();
    for report in reports {
        *months
            .entry(report.created_at.format("%Y-%m").to_string())
            .or_default() += 1;
    }
    months
        .into_iter()
        .map(|(month, count)| MonthCount { month, count })
        .collect()
}

/// Busiest month; the earliest one wins a tie.
pub fn most_active_month(monthly: &[MonthCount]) -> Option<String> {
    monthly
        .iter()
        .fold(None::<&MonthCount>, |best, current| match best {
            Some(best) if best.count >= current.count => Some(best),
            _ => Some(current),
        })
        .map(|entry| entry.month.clone())
}

pub fn summarize(reports: &[ScanReport]) -> InsightsSummary {
    let label_frequency = label_frequency(reports);
    let monthly_counts = monthly_counts(reports);
    InsightsSummary {
        total_scans: reports.len(),
        unique_labels: label_frequency.len(),
        most_common_label: label_frequency.first().map(|entry| entry.label.clone()),
        average_confidence: average_confidence(reports),
        most_active_month: most_active_month(&monthly_counts),
        monthly_counts,
        label_frequency,
    }
}

/// `reports` must be newest first, as `listByOwner` returns them.
pub fn dashboard(reports: &[ScanReport], now: DateTime<Utc>) -> DashboardSummary {
    let scans_this_month = reports
        .iter()
        .filter(|r| r.created_at.year() == now.year() && r.created_at.month() == now.month())
        .count();

    DashboardSummary {
        total_scans: reports.len(),
        average_confidence: average_confidence(reports),
        most_common_label: label_frequency(reports).into_iter().next().map(|e| e.label),
        scans_this_month,
        recent: reports
            .iter()
            .take(RECENT_REPORTS)
            .map(ReportCard::from)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use shared::{ImageReference, ModelChoice, Prediction};
    use uuid::Uuid;

    fn report(label: &str, confidence: f64, created_at: DateTime<Utc>) -> ScanReport {
        ScanReport {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            image_reference: ImageReference::Stored("s3://b/k.png".into()),
            model_used: ModelChoice::Fast,
            prediction: Prediction {
                class_index: 0,
                label: label.to_string(),
                confidence,
            },
            narrative_report: None,
            created_at,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn most_common_label_and_unique_count() {
        let reports = vec![
            report("Rust", 0.9, at(2024, 3, 1)),
            report("Rust", 0.7, at(2024, 3, 2)),
            report("Blight", 0.5, at(2024, 4, 1)),
        ];
        let summary = summarize(&reports);
        assert_eq!(summary.most_common_label.as_deref(), Some("Rust"));
        assert_eq!(summary.unique_labels, 2);
        assert_eq!(summary.total_scans, 3);
        assert!((summary.average_confidence - 0.7).abs() < 1e-9);
        assert_eq!(
            summary.monthly_counts,
            vec![
                MonthCount { month: "2024-03".into(), count: 2 },
                MonthCount { month: "2024-04".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn ties_keep_encounter_order() {
        let reports = vec![
            report("Scab", 0.9, at(2024, 1, 1)),
            report("Blight", 0.9, at(2024, 1, 2)),
            report("Blight", 0.9, at(2024, 1, 3)),
            report("Scab", 0.9, at(2024, 1, 4)),
            report("Healthy", 0.9, at(2024, 1, 5)),
        ];
        let labels: Vec<_> = label_frequency(&reports)
            .into_iter()
            .map(|entry| entry.label)
            .collect();
        assert_eq!(labels, vec!["Scab", "Blight", "Healthy"]);
    }

    #[test]
    fn empty_history_yields_zeroes() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_scans, 0);
        assert_eq!(summary.average_confidence, 0.0);
        assert!(summary.most_common_label.is_none());
        assert!(summary.monthly_counts.is_empty());
        assert!(summary.most_active_month.is_none());
    }

    #[test]
    fn busiest_month_prefers_the_earliest_on_ties() {
        let reports = vec![
            report("Rust", 0.9, at(2024, 2, 1)),
            report("Rust", 0.9, at(2024, 4, 1)),
            report("Rust", 0.9, at(2024, 4, 2)),
            report("Blight", 0.9, at(2024, 5, 1)),
            report("Blight", 0.9, at(2024, 5, 9)),
        ];
        assert_eq!(summarize(&reports).most_active_month.as_deref(), Some("2024-04"));

        let single = vec![report("Rust", 0.9, at(2023, 11, 30))];
        assert_eq!(summarize(&single).most_active_month.as_deref(), Some("2023-11"));
    }

    #[test]
    fn dashboard_counts_this_month_and_keeps_five_recent() {
        let now = at(2024, 6, 20);
        let mut reports: Vec<_> = (1..=7)
            .rev()
            .map(|day| report("Rust", 0.8, at(2024, 6, day)))
            .collect();
        reports.push(report("Blight", 0.4, at(2024, 5, 30)));

        let summary = dashboard(&reports, now);
        assert_eq!(summary.total_scans, 8);
        assert_eq!(summary.scans_this_month, 7);
        assert_eq!(summary.recent.len(), RECENT_REPORTS);
        assert_eq!(summary.recent[0].created_at, at(2024, 6, 7));
        assert_eq!(summary.most_common_label.as_deref(), Some("Rust"));
    }
}
