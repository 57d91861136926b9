use log::warn;
use serde::{Deserialize, Serialize};

/// Health status enum: lifecycle state of a record in the `file_health` table.
///
/// Stored as integers in `file_health.status`. The status doubles as the
/// phase discriminator for the retry automaton: `Pending`/`Corrupted` records
/// are in the health-check phase, `RepairTriggered` records are in the repair
/// phase.
#[repr(i64)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Pending = 0,              // Waiting for its next check
    Checking = 1,             // A probe is in flight right now
    Healthy = 2,              // Last probe passed
    Corrupted = 3,            // Failing checks, retries remaining
    RepairTriggered = 4,      // Handed to the library manager for re-fetch
    PermanentlyCorrupted = 5, // Repair retries exhausted; operator action required
}

impl HealthStatus {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            0 => HealthStatus::Pending,
            1 => HealthStatus::Checking,
            2 => HealthStatus::Healthy,
            3 => HealthStatus::Corrupted,
            4 => HealthStatus::RepairTriggered,
            5 => HealthStatus::PermanentlyCorrupted,
            _ => {
                warn!(
                    "Invalid HealthStatus value in database: {}, defaulting to Pending",
                    value
                );
                HealthStatus::Pending
            }
        }
    }

    pub fn full_name(&self) -> &'static str {
        match self {
            HealthStatus::Pending => "Pending",
            HealthStatus::Checking => "Checking",
            HealthStatus::Healthy => "Healthy",
            HealthStatus::Corrupted => "Corrupted",
            HealthStatus::RepairTriggered => "Repair Triggered",
            HealthStatus::PermanentlyCorrupted => "Permanently Corrupted",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Some(HealthStatus::Pending),
            "CHECKING" => Some(HealthStatus::Checking),
            "HEALTHY" => Some(HealthStatus::Healthy),
            "CORRUPTED" => Some(HealthStatus::Corrupted),
            "REPAIR_TRIGGERED" => Some(HealthStatus::RepairTriggered),
            "PERMANENTLY_CORRUPTED" => Some(HealthStatus::PermanentlyCorrupted),
            _ => None,
        }
    }

    /// Returns true if no further automatic transitions are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, HealthStatus::PermanentlyCorrupted)
    }

    /// Returns true if the record is in the repair phase of the automaton.
    pub fn is_repair_phase(&self) -> bool {
        matches!(self, HealthStatus::RepairTriggered)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_integer_values() {
        assert_eq!(HealthStatus::Pending.as_i64(), 0);
        assert_eq!(HealthStatus::Checking.as_i64(), 1);
        assert_eq!(HealthStatus::Healthy.as_i64(), 2);
        assert_eq!(HealthStatus::Corrupted.as_i64(), 3);
        assert_eq!(HealthStatus::RepairTriggered.as_i64(), 4);
        assert_eq!(HealthStatus::PermanentlyCorrupted.as_i64(), 5);
    }

    #[test]
    fn test_health_status_from_i64() {
        for status in [
            HealthStatus::Pending,
            HealthStatus::Checking,
            HealthStatus::Healthy,
            HealthStatus::Corrupted,
            HealthStatus::RepairTriggered,
            HealthStatus::PermanentlyCorrupted,
        ] {
            assert_eq!(HealthStatus::from_i64(status.as_i64()), status);
        }
        // Invalid values should default to Pending
        assert_eq!(HealthStatus::from_i64(999), HealthStatus::Pending);
        assert_eq!(HealthStatus::from_i64(-1), HealthStatus::Pending);
    }

    #[test]
    fn test_health_status_terminal() {
        assert!(HealthStatus::PermanentlyCorrupted.is_terminal());
        assert!(!HealthStatus::Corrupted.is_terminal());
        assert!(!HealthStatus::RepairTriggered.is_terminal());
        assert!(!HealthStatus::Healthy.is_terminal());
    }

    #[test]
    fn test_health_status_phase() {
        assert!(HealthStatus::RepairTriggered.is_repair_phase());
        assert!(!HealthStatus::Pending.is_repair_phase());
        assert!(!HealthStatus::Corrupted.is_repair_phase());
        assert!(!HealthStatus::Checking.is_repair_phase());
    }

    #[test]
    fn test_health_status_serde_roundtrip() {
        let status = HealthStatus::RepairTriggered;
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "\"repair_triggered\"");
        let restored: HealthStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(status, restored);
    }

    #[test]
    fn test_health_status_from_string() {
        assert_eq!(
            HealthStatus::from_string("pending"),
            Some(HealthStatus::Pending)
        );
        assert_eq!(
            HealthStatus::from_string("HEALTHY"),
            Some(HealthStatus::Healthy)
        );
        assert_eq!(
            HealthStatus::from_string("repair_triggered"),
            Some(HealthStatus::RepairTriggered)
        );
        assert_eq!(HealthStatus::from_string("bogus"), None);
    }
}
