use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{CategoryScore, FeedbackStats, MonthlyBucket, Scope, Submission, TrendWindows};
use crate::rating::{self, RATING_RANGE};

pub const TREND_WINDOWS_DAYS: [i64; 3] = [7, 30, 90];

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    sum: i64,
    count: usize,
}

impl Tally {
    fn add(&mut self, rating: i32) {
        self.sum += rating as i64;
        self.count += 1;
    }

    fn average(&self) -> f64 {
        rating::mean(self.sum, self.count)
    }
}

pub fn compute_stats(submissions: &[Submission], now: DateTime<Utc>) -> FeedbackStats {
    let mut overall = Tally::default();
    let mut distribution: BTreeMap<i32, usize> = RATING_RANGE.map(|r| (r, 0)).collect();
    let mut categories: BTreeMap<String, Tally> = BTreeMap::new();
    let mut months: BTreeMap<String, Tally> = BTreeMap::new();
    let mut windows = [Tally::default(); TREND_WINDOWS_DAYS.len()];
    let cutoffs = TREND_WINDOWS_DAYS.map(|days| now - Duration::days(days));
    let mut excluded = 0usize;

    for submission in submissions {
        if !rating::is_valid_rating(submission.rating) {
            warn!(
                submission_id = %submission.id,
                faculty_id = %submission.faculty_id,
                rating = submission.rating,
                "excluding submission with out-of-range rating"
            );
            excluded += 1;
            continue;
        }

        overall.add(submission.rating);
        *distribution.entry(submission.rating).or_insert(0) += 1;

        for (category, &value) in &submission.category_ratings {
            if !rating::is_valid_rating(value) {
                warn!(
                    submission_id = %submission.id,
                    category = %category,
                    rating = value,
                    "dropping out-of-range category rating"
                );
                continue;
            }
            categories.entry(category.clone()).or_default().add(value);
        }

        let month = submission.submitted_at.format("%Y-%m").to_string();
        months.entry(month).or_default().add(submission.rating);

        for (tally, cutoff) in windows.iter_mut().zip(cutoffs.iter()) {
            if submission.submitted_at >= *cutoff {
                tally.add(submission.rating);
            }
        }
    }

    debug!(
        total = overall.count,
        excluded,
        categories = categories.len(),
        months = months.len(),
        "computed feedback stats"
    );

    FeedbackStats {
        scope: None,
        average_rating: overall.average(),
        total_submissions: overall.count,
        rating_distribution: distribution,
        category_scores: categories
            .into_iter()
            .map(|(name, tally)| {
                (
                    name,
                    CategoryScore {
                        average: tally.average(),
                        count: tally.count,
                    },
                )
            })
            .collect(),
        monthly: months
            .into_iter()
            .map(|(month, tally)| {
                (
                    month,
                    MonthlyBucket {
                        submissions: tally.count,
                        average_rating: tally.average(),
                    },
                )
            })
            .collect(),
        trend: TrendWindows {
            last_7_days: windows[0].average(),
            last_30_days: windows[1].average(),
            last_90_days: windows[2].average(),
        },
        excluded_submissions: excluded,
        last_updated: now,
    }
}

/// Aggregates the raw submissions inside `scope`. Department and college stats
/// come from the union of their faculty's submissions, never from per-faculty
/// averages.
pub fn compute_scope_stats(
    scope: Scope,
    submissions: &[Submission],
    now: DateTime<Utc>,
) -> FeedbackStats {
    let in_scope: Vec<Submission> = submissions
        .iter()
        .filter(|submission| scope.contains(submission))
        .cloned()
        .collect();

    let mut stats = compute_stats(&in_scope, now);
    stats.scope = Some(scope);
    stats
}

/// Per-faculty stats ranked by average rating, then by volume.
pub fn compute_faculty_breakdown(
    submissions: &[Submission],
    now: DateTime<Utc>,
) -> Vec<(Uuid, FeedbackStats)> {
    let mut by_faculty: HashMap<Uuid, Vec<Submission>> = HashMap::new();
    for submission in submissions {
        by_faculty
            .entry(submission.faculty_id)
            .or_default()
            .push(submission.clone());
    }

    let mut values: Vec<(Uuid, FeedbackStats)> = by_faculty
        .into_iter()
        .map(|(faculty_id, rows)| {
            let mut stats = compute_stats(&rows, now);
            stats.scope = Some(Scope::Faculty(faculty_id));
            (faculty_id, stats)
        })
        .collect();

    values.sort_by(|a, b| {
        b.1.average_rating
            .partial_cmp(&a.1.average_rating)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.1.total_submissions.cmp(&a.1.total_submissions))
            .then(a.0.cmp(&b.0))
    });
    values
}
