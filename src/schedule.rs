//! Check-cadence and retry-backoff policy.
//!
//! Pure functions over epoch-second timestamps. Freshly released files are
//! checked often because that is when corruption from an incomplete or
//! damaged fetch surfaces; aged files back off to weekly checks.

const HOUR: i64 = 3600;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;

/// Largest backoff exponent we bother computing; beyond this the cap always
/// wins for any sane base.
const MAX_BACKOFF_SHIFT: u32 = 20;

/// When the next routine check of a file is due, given its release date.
///
/// The cadence curve:
/// - released < 24 h ago: check again in 1 hour
/// - released < 7 d ago: 6 hours
/// - released < 30 d ago: 24 hours
/// - older: 7 days
///
/// A release date in the future counts as age zero.
pub fn next_check_at(release_date: i64, now: i64) -> i64 {
    let age = (now - release_date).max(0);

    if age < DAY {
        now + HOUR
    } else if age < WEEK {
        now + 6 * HOUR
    } else if age < 30 * DAY {
        now + DAY
    } else {
        now + WEEK
    }
}

/// Exponential backoff for failed checks: `min(base * 2^retry_count, cap)`.
///
/// `retry_count` is the counter value after the failing attempt was recorded.
pub fn retry_backoff(retry_count: i64, base_seconds: i64, cap_seconds: i64) -> i64 {
    let shift = retry_count.clamp(0, MAX_BACKOFF_SHIFT as i64) as u32;
    base_seconds
        .saturating_mul(1i64 << shift)
        .min(cap_seconds)
        .max(0)
}
