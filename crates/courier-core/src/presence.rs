use crate::cache::{
    PresenceCacheOps, SetOfflineOutcome, SetOnlineOutcome, GROUP_ONLINE_PLACEHOLDER,
};
use crate::error::CoreError;
use crate::group_cache::GroupApi;
use crate::time::now_secs;
use courier_api::types::UserStatusChangeTips;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const ONLINE_TTL: Duration = Duration::from_secs(24 * 3600);
const SUBSCRIPTION_TTL: Duration = Duration::from_secs(3600);
const GROUP_ONLINE_TTL: Duration = Duration::from_secs(3600);
const CHANGE_BUS_DEPTH: usize = 256;

// A platform's connection count crossed zero in either direction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    pub user_id: String,
    pub platform_id: i32,
    pub online: bool,
}

pub struct PresenceRegistry {
    cache: Arc<dyn PresenceCacheOps>,
    groups: Arc<dyn GroupApi>,
    changes: broadcast::Sender<StatusChange>,
}

impl PresenceRegistry {
    pub fn new(cache: Arc<dyn PresenceCacheOps>, groups: Arc<dyn GroupApi>) -> PresenceRegistry {
        let (changes, _) = broadcast::channel(CHANGE_BUS_DEPTH);
        PresenceRegistry {
            cache,
            groups,
            changes,
        }
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<StatusChange> {
        self.changes.subscribe()
    }

    // Returns whether this connection brought its platform online. A reused
    // connection ID is an application error.
    pub async fn set_online(
        &self,
        user_id: &str,
        conn_id: &str,
        platform_id: i32,
    ) -> Result<bool, CoreError> {
        match self
            .cache
            .set_online(user_id, conn_id, platform_id, ONLINE_TTL)
            .await?
        {
            SetOnlineOutcome::Duplicate => {
                Err(CoreError::Conflict(format!("duplicate conn {}", conn_id)))
            }
            SetOnlineOutcome::Added { first_for_platform } => {
                if first_for_platform {
                    let platforms = self.cache.user_platforms(user_id).await?;
                    if platforms.len() == 1 {
                        self.mark_groups(user_id, true).await?;
                    }
                    self.publish(user_id, platform_id, true);
                }
                Ok(first_for_platform)
            }
        }
    }

    // Returns whether this was the platform's last connection.
    pub async fn set_offline(&self, user_id: &str, conn_id: &str) -> Result<bool, CoreError> {
        match self.cache.set_offline(user_id, conn_id).await? {
            SetOfflineOutcome::UnknownConn => Err(CoreError::NotFound),
            SetOfflineOutcome::Removed {
                platform_id,
                last_for_platform,
            } => {
                if last_for_platform {
                    let platforms = self.cache.user_platforms(user_id).await?;
                    if platforms.is_empty() {
                        self.mark_groups(user_id, false).await?;
                    }
                    self.publish(user_id, platform_id, false);
                }
                Ok(last_for_platform)
            }
        }
    }

    pub async fn user_platforms(&self, user_id: &str) -> Result<Vec<i32>, CoreError> {
        self.cache.user_platforms(user_id).await
    }

    pub async fn user_online(&self, user_id: &str) -> Result<bool, CoreError> {
        Ok(!self.cache.user_platforms(user_id).await?.is_empty())
    }

    pub async fn add_subscriptions(
        &self,
        user_id: &str,
        targets: &[String],
    ) -> Result<(), CoreError> {
        self.cache
            .add_subscriptions(user_id, targets, SUBSCRIPTION_TTL)
            .await
    }

    pub async fn remove_subscriptions(
        &self,
        user_id: &str,
        targets: &[String],
    ) -> Result<(), CoreError> {
        self.cache.remove_subscriptions(user_id, targets).await
    }

    pub async fn subscriptions_of(&self, user_id: &str) -> Result<Vec<String>, CoreError> {
        self.cache.subscriptions_of(user_id).await
    }

    pub async fn subscribers_of(&self, user_id: &str) -> Result<Vec<String>, CoreError> {
        self.cache.subscribers_of(user_id).await
    }

    // Fan a zero-crossing change out to the users subscribed to this one.
    pub async fn change_tips(
        &self,
        change: &StatusChange,
    ) -> Result<Vec<UserStatusChangeTips>, CoreError> {
        let subscribers = self.cache.subscribers_of(&change.user_id).await?;
        Ok(subscribers
            .into_iter()
            .map(|to_user_id| UserStatusChangeTips {
                from_user_id: change.user_id.clone(),
                to_user_id,
                online: change.online,
                platform_id: change.platform_id,
            })
            .collect())
    }

    pub async fn get_group_online(
        &self,
        group_id: &str,
        page_number: i64,
        show_number: i64,
        desc: bool,
    ) -> Result<(i64, Vec<String>), CoreError> {
        if page_number < 1 || show_number < 1 {
            return Err(CoreError::ArgInvalid("pagination"));
        }
        self.init_group_online(group_id).await?;
        let mut total = self.cache.group_online_card(group_id).await?;
        if total > 0 {
            total -= 1;
        }
        let (start, stop) = if desc {
            let start = -(page_number * show_number);
            (start, start + show_number - 1)
        } else {
            // The ascending window starts past the placeholder rank and runs
            // one element wider than the descending one.
            let start = (page_number - 1) * show_number + 1;
            (start, start + show_number)
        };
        let mut user_ids = self.cache.group_online_range(group_id, start, stop).await?;
        user_ids.retain(|user_id| user_id != GROUP_ONLINE_PLACEHOLDER);
        if desc {
            user_ids.reverse();
        }
        Ok((total, user_ids))
    }

    // Lazily rebuilds the group online set; the claim tag distinguishes a
    // rebuilt-but-empty set from a never-built one.
    async fn init_group_online(&self, group_id: &str) -> Result<(), CoreError> {
        if !self
            .cache
            .try_claim_group_init(group_id, GROUP_ONLINE_TTL)
            .await?
        {
            return Ok(());
        }
        let built = self.rebuild_group_online(group_id).await;
        if built.is_err() {
            self.cache.clear_group_init(group_id).await?;
        }
        built
    }

    async fn rebuild_group_online(&self, group_id: &str) -> Result<(), CoreError> {
        let members = self.groups.member_ids(group_id).await?;
        let mut online = Vec::new();
        for member in members {
            if !self.cache.user_platforms(&member).await?.is_empty() {
                online.push(member);
            }
        }
        self.cache
            .group_online_init(group_id, &online, now_secs(), GROUP_ONLINE_TTL)
            .await
    }

    async fn mark_groups(&self, user_id: &str, online: bool) -> Result<(), CoreError> {
        let group_ids = self.groups.joined_groups(user_id).await?;
        if group_ids.is_empty() {
            return Ok(());
        }
        if online {
            self.cache
                .group_online_add(user_id, &group_ids, now_secs())
                .await
        } else {
            self.cache.group_online_remove(user_id, &group_ids).await
        }
    }

    fn publish(&self, user_id: &str, platform_id: i32, online: bool) {
        let _ = self.changes.send(StatusChange {
            user_id: user_id.to_string(),
            platform_id,
            online,
        });
    }
}
