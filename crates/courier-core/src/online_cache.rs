use crate::error::CoreError;
use crate::presence::PresenceRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// Process-local view of "is this user online". A stale positive is fine: the
// gateway reports per-user failure and the recipient falls through to the
// offline pusher.
pub struct OnlineCache {
    registry: Arc<PresenceRegistry>,
    ttl: Duration,
    entries: Mutex<HashMap<String, (bool, Instant)>>,
}

impl OnlineCache {
    pub fn new(registry: Arc<PresenceRegistry>, ttl: Duration) -> Arc<OnlineCache> {
        let cache = Arc::new(OnlineCache {
            registry,
            ttl,
            entries: Mutex::new(HashMap::new()),
        });
        cache.clone().spawn_invalidator();
        cache
    }

    pub async fn get_user_online(&self, user_id: &str) -> Result<bool, CoreError> {
        {
            let mut entries = self.entries.lock().await;
            if let Some((online, at)) = entries.get(user_id) {
                if at.elapsed() < self.ttl {
                    return Ok(*online);
                }
                entries.remove(user_id);
            }
        }
        let online = self.registry.user_online(user_id).await?;
        let mut entries = self.entries.lock().await;
        entries.insert(user_id.to_string(), (online, Instant::now()));
        Ok(online)
    }

    pub async fn invalidate(&self, user_id: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(user_id);
    }

    fn spawn_invalidator(self: Arc<Self>) {
        let mut changes = self.registry.subscribe_changes();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => self.invalidate(&change.user_id).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                        let mut entries = self.entries.lock().await;
                        entries.clear();
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
