//! Wall-clock alignment for the refresh loop

use crate::models::Timeframe;
use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};

/// Next `interval`-aligned boundary plus `slack` that lies strictly after `now`
///
/// With a 15 minute interval and 30s slack the wake-ups are XX:00:30,
/// XX:15:30, XX:30:30 and XX:45:30.
pub fn next_boundary(now: DateTime<Utc>, interval: Duration, slack: Duration) -> DateTime<Utc> {
    let floor = now.duration_trunc(interval).unwrap_or(now);
    let candidate = floor + slack;
    if candidate > now {
        candidate
    } else {
        candidate + interval
    }
}

/// Timeframes whose bars close at the boundary containing `at`
pub fn timeframes_due(at: DateTime<Utc>) -> Vec<Timeframe> {
    let minute = at.minute();
    let mut due = vec![Timeframe::M15];
    if minute % 30 == 0 {
        due.push(Timeframe::M30);
    }
    if minute == 0 {
        due.push(Timeframe::H1);
        if at.hour() % 4 == 0 {
            due.push(Timeframe::H4);
        }
    }
    due
}

/// Sleep until the given wall-clock instant (returns at once if it has passed)
pub async fn sleep_until(at: DateTime<Utc>) {
    let delay = (at - Utc::now()).to_std().unwrap_or_default();
    tokio::time::sleep(delay).await;
}
