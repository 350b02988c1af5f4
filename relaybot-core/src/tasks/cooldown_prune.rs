// relaybot-core/src/tasks/cooldown_prune.rs

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::trace;
use crate::services::cooldown::CooldownManager;

/// Spawns a background task that periodically drops expired inhibitors.
pub fn spawn_cooldown_prune_task(cooldowns: Arc<CooldownManager>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            sleep(interval).await;
            let removed = cooldowns.prune();
            trace!("Cooldown prune pass removed {} inhibitors", removed);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_prune_task_removes_expired_entries() {
        let cooldowns = Arc::new(CooldownManager::default());
        cooldowns.set(Some(1), Some(2), Some("ping"), 1_000);
        cooldowns.set(Some(1), Some(2), Some("echo"), 120_000);

        let handle = spawn_cooldown_prune_task(cooldowns.clone(), Duration::from_secs(60));
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(cooldowns.len(), 1);
        handle.abort();
    }
}
