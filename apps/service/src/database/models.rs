use serde::{Deserialize, Serialize};

use crate::monitoring::types::{Check, Target};

/// A target joined with its most recent check and trailing uptime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetStatus {
    #[serde(flatten)]
    pub target: Target,
    pub latest_check: Option<Check>,
    /// Percentage of up checks over the last 24 hours, `None` without checks
    pub uptime_24h: Option<f64>,
}

/// Aggregate counts across all active targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub up: usize,
    pub down: usize,
    /// Targets without any check yet
    pub pending: usize,
    /// Mean latest response time over targets that are currently up
    pub avg_response_time_ms: u64,
}

impl Summary {
    pub fn from_statuses(statuses: &[TargetStatus]) -> Self {
        let mut summary =
            Summary { total: statuses.len(), up: 0, down: 0, pending: 0, avg_response_time_ms: 0 };
        let mut up_response_total: u64 = 0;

        for status in statuses {
            match &status.latest_check {
                Some(check) if check.is_up => {
                    summary.up += 1;
                    up_response_total += check.response_time_ms;
                }
                Some(_) => summary.down += 1,
                None => summary.pending += 1,
            }
        }

        let divisor = summary.up.max(1) as f64;
        summary.avg_response_time_ms = (up_response_total as f64 / divisor).round() as u64;
        summary
    }
}

/// `100 * up / total` rounded to two decimals, `None` when there is nothing to count
pub fn uptime_percentage(up: i64, total: i64) -> Option<f64> {
    if total <= 0 {
        return None;
    }
    let percentage = 100.0 * up as f64 / total as f64;
    Some((percentage * 100.0).round() / 100.0)
}
