use std::fmt::Write;

use uuid::Uuid;

use crate::models::FeedbackStats;

/// Display rounding for averages. Aggregation keeps full precision.
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn trend_label(value: f64) -> String {
    if value == 0.0 {
        "no data".to_string()
    } else {
        format!("{:.1}", round_to_tenth(value))
    }
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

fn write_excluded(output: &mut String, excluded: usize) {
    if excluded > 0 {
        let _ = writeln!(output, "({excluded} submissions excluded for invalid ratings)");
    }
}

pub fn build_report(
    label: &str,
    stats: &FeedbackStats,
    breakdown: &[(Uuid, FeedbackStats)],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Feedback Report");
    let _ = writeln!(
        output,
        "Generated for {} at {}",
        label,
        stats.last_updated.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);

    if stats.total_submissions == 0 {
        let _ = writeln!(output, "No feedback submitted for this scope yet.");
        write_excluded(&mut output, stats.excluded_submissions);
        return output;
    }

    let _ = writeln!(
        output,
        "Average rating {:.1} across {} submissions",
        round_to_tenth(stats.average_rating),
        stats.total_submissions
    );
    write_excluded(&mut output, stats.excluded_submissions);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rating Distribution");
    for (rating, count) in stats.rating_distribution.iter().rev() {
        let _ = writeln!(
            output,
            "- {} stars: {} ({:.1}%)",
            rating,
            count,
            percentage(*count, stats.total_submissions)
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Categories");
    if stats.category_scores.is_empty() {
        let _ = writeln!(output, "No category ratings recorded.");
    } else {
        for (name, score) in &stats.category_scores {
            let _ = writeln!(
                output,
                "- {}: {:.1} ({} ratings)",
                name,
                round_to_tenth(score.average),
                score.count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Trend");
    let _ = writeln!(output, "- Last 7 days: {}", trend_label(stats.trend.last_7_days));
    let _ = writeln!(output, "- Last 30 days: {}", trend_label(stats.trend.last_30_days));
    let _ = writeln!(output, "- Last 90 days: {}", trend_label(stats.trend.last_90_days));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Monthly");
    let _ = writeln!(output, "| Month | Submissions | Average |");
    let _ = writeln!(output, "|-------|-------------|---------|");
    for (month, bucket) in stats.monthly.iter().rev() {
        let _ = writeln!(
            output,
            "| {} | {} | {:.1} |",
            month,
            bucket.submissions,
            round_to_tenth(bucket.average_rating)
        );
    }

    if !breakdown.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Faculty");
        for (faculty_id, faculty_stats) in breakdown {
            let _ = writeln!(
                output,
                "- {}: {:.1} across {} submissions",
                faculty_id,
                round_to_tenth(faculty_stats.average_rating),
                faculty_stats.total_submissions
            );
        }
    }

    output
}
