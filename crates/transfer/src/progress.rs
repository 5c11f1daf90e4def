use std::time::Duration;

use filedrop_protocol::messages::TransferProgress;

/// Point-in-time view of a transfer, emitted after every accepted chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub transfer_id: String,
    /// Whole percent, clamped to 0-100.
    pub percent: u8,
    pub received_bytes: u64,
    pub total_bytes: u64,
    /// Average bytes per second since the session started.
    pub speed: u64,
    /// Rendered remaining time, `None` while the speed is zero.
    pub estimated_time: Option<String>,
}

impl ProgressSnapshot {
    /// Computes a snapshot from raw counters.
    pub fn compute(
        transfer_id: &str,
        received_bytes: u64,
        total_bytes: u64,
        elapsed: Duration,
    ) -> Self {
        let speed = throughput(received_bytes, elapsed);
        let remaining = total_bytes.saturating_sub(received_bytes);
        Self {
            transfer_id: transfer_id.to_string(),
            percent: percent_complete(received_bytes, total_bytes),
            received_bytes,
            total_bytes,
            speed,
            estimated_time: estimate_remaining(remaining, speed).map(format_eta),
        }
    }
}

impl From<ProgressSnapshot> for TransferProgress {
    fn from(s: ProgressSnapshot) -> Self {
        TransferProgress {
            transfer_id: s.transfer_id,
            progress: s.percent,
            received_size: s.received_bytes,
            total_size: s.total_bytes,
            speed: s.speed,
            estimated_time: s.estimated_time,
        }
    }
}

/// Rounded percentage of `total` covered by `received`.
///
/// An empty file is 100% complete as soon as it is asked about.
pub fn percent_complete(received: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (received as f64 / total as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

/// Average throughput in bytes/second, rounded to a whole byte.
///
/// Returns 0 when no whole millisecond has elapsed yet.
pub fn throughput(received: u64, elapsed: Duration) -> u64 {
    let millis = elapsed.as_millis();
    if millis == 0 {
        return 0;
    }
    (received as f64 / millis as f64 * 1000.0).round() as u64
}

/// Seconds needed to move `remaining` bytes at `speed`, rounded up.
fn estimate_remaining(remaining: u64, speed: u64) -> Option<u64> {
    if speed == 0 {
        return None;
    }
    Some(remaining.div_ceil(speed))
}

/// Renders a remaining-time estimate: `"42s"`, `"3m"` or `"2h"`.
///
/// Minutes and hours round up, so 61 seconds reads as `"2m"`.
pub fn format_eta(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs.div_ceil(60))
    } else {
        format!("{}h", secs.div_ceil(3600))
    }
}
