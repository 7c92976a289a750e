use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveTime};
use tokio::task::JoinHandle;
use tracing::info;

use crate::tokio_tools::spawn_named_task;

use super::registry::Registry;

const LOG_TARGET: &str = "boardroom::room::lifecycle";
/// Dormant rooms are reaped once a day at 04:00 local time.
const SWEEP_HOUR: u32 = 4;

/// How long until the next local occurrence of `time`.
pub fn until_next_local(time: NaiveTime) -> Duration {
    let now = Local::now().naive_local();
    let mut next = now.date().and_time(time);
    if next <= now {
        next += chrono::Duration::days(1);
    }
    (next - now).to_std().unwrap_or_default()
}

/// Background task that clears long-dormant rooms every night.
pub fn spawn_daily_sweep(registry: Arc<Registry>) -> JoinHandle<()> {
    spawn_named_task("room-daily-sweep", async move {
        let at = NaiveTime::from_hms_opt(SWEEP_HOUR, 0, 0).expect("valid sweep time");
        loop {
            let wait = until_next_local(at);
            info!(target: LOG_TARGET, in_secs = wait.as_secs(), "next room sweep scheduled");
            tokio::time::sleep(wait).await;
            registry.sweep_dormant().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_sweep_is_within_a_day() {
        let at = NaiveTime::from_hms_opt(SWEEP_HOUR, 0, 0).unwrap();
        let wait = until_next_local(at);
        assert!(wait <= Duration::from_secs(24 * 60 * 60));
    }
}
