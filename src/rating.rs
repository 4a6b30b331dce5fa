use std::ops::RangeInclusive;

/// Accepted bounds for overall and category ratings everywhere in the crate.
pub const RATING_RANGE: RangeInclusive<i32> = 1..=5;

pub fn is_valid_rating(rating: i32) -> bool {
    RATING_RANGE.contains(&rating)
}

pub fn mean(sum: i64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}
