use chrono::{DateTime, Utc};

pub struct Utils {}

impl Utils {
    /// Current wall-clock time as a UTC epoch-seconds timestamp.
    pub fn now_ts() -> i64 {
        Utc::now().timestamp()
    }

    /// Format a UTC timestamp for log output.
    pub fn format_ts(ts: i64) -> String {
        DateTime::<Utc>::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string())
    }
}
