//! Background sweep that destroys rooms left empty past the grace period.

use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::services::registry::Registry;

/// Spawn the reaper. It runs `Registry::reap` every `interval` until the
/// runtime shuts down.
#[must_use]
pub fn spawn_reaper_task(registry: Registry, interval: Duration) -> JoinHandle<()> {
    info!(
        interval_secs = interval.as_secs(),
        grace_secs = registry.config().grace_period.as_secs(),
        "room reaper configured"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let reaped = registry.reap(Instant::now()).await;
            if !reaped.is_empty() {
                debug!(count = reaped.len(), "reaper sweep destroyed rooms");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomConfig;

    #[tokio::test]
    async fn reaper_destroys_abandoned_room() {
        let registry = Registry::new(RoomConfig { grace_period: Duration::ZERO, ..RoomConfig::default() });
        let admission = registry
            .create_room("Ana", "Biology", None)
            .await
            .expect("create should succeed");
        let code = admission.snapshot.room_code.clone();
        admission
            .room
            .lock()
            .await
            .remove_participant(&admission.participant.id);

        let task = spawn_reaper_task(registry.clone(), Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.room_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("room should be reaped");
        task.abort();

        assert!(matches!(registry.lookup(&code).await, Err(crate::error::SyncError::RoomNotFound(_))));
        assert!(admission.room.lock().await.is_destroyed());
    }

    #[tokio::test]
    async fn reaper_keeps_occupied_room() {
        let registry = Registry::new(RoomConfig { grace_period: Duration::ZERO, ..RoomConfig::default() });
        let _admission = registry
            .create_room("Ana", "Biology", None)
            .await
            .expect("create should succeed");

        let task = spawn_reaper_task(registry.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();

        assert_eq!(registry.room_count().await, 1);
    }
}
