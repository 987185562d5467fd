use crate::error::CoreError;
use async_trait::async_trait;
use courier_api::types::GroupMemberBrief;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

// Contract against the group service. Membership management itself lives
// elsewhere; the push core only reads membership and asks for dismissal.
#[async_trait]
pub trait GroupApi: Send + Sync {
    async fn member_ids(&self, group_id: &str) -> Result<Vec<String>, CoreError>;

    async fn member_info(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> Result<Vec<GroupMemberBrief>, CoreError>;

    async fn joined_groups(&self, user_id: &str) -> Result<Vec<String>, CoreError>;

    async fn dismiss_group(&self, group_id: &str) -> Result<(), CoreError>;

    // Truncated, sorted member ID list backing the partial hash.
    async fn hash_part_member_ids(&self, group_id: &str) -> Result<Vec<String>, CoreError>;
}

pub struct LocalGroupCache {
    api: Arc<dyn GroupApi>,
    ttl: Duration,
    members: Mutex<HashMap<String, (Vec<String>, Instant)>>,
}

impl LocalGroupCache {
    pub fn new(api: Arc<dyn GroupApi>, ttl: Duration) -> LocalGroupCache {
        LocalGroupCache {
            api,
            ttl,
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn api(&self) -> Arc<dyn GroupApi> {
        self.api.clone()
    }

    pub async fn member_ids(&self, group_id: &str) -> Result<Vec<String>, CoreError> {
        {
            let mut members = self.members.lock().await;
            if let Some((ids, at)) = members.get(group_id) {
                if at.elapsed() < self.ttl {
                    return Ok(ids.clone());
                }
                members.remove(group_id);
            }
        }
        let ids = self.api.member_ids(group_id).await?;
        let mut members = self.members.lock().await;
        members.insert(group_id.to_string(), (ids.clone(), Instant::now()));
        Ok(ids)
    }

    pub async fn invalidate(&self, group_id: &str) {
        let mut members = self.members.lock().await;
        members.remove(group_id);
    }
}

fn digest_to_u64(bytes: &[u8]) -> u64 {
    let digest = Sha256::digest(bytes);
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

// Membership fingerprints used by clients to detect stale member lists.
pub struct GroupHash {
    api: Arc<dyn GroupApi>,
}

impl GroupHash {
    pub fn new(api: Arc<dyn GroupApi>) -> GroupHash {
        GroupHash { api }
    }

    pub async fn hash_all(&self, group_id: &str) -> Result<u64, CoreError> {
        let mut user_ids = self.api.member_ids(group_id).await?;
        if user_ids.is_empty() {
            return Ok(0);
        }
        user_ids.sort_unstable();
        let members = self.api.member_info(group_id, &user_ids).await?;
        let by_id: HashMap<&str, &GroupMemberBrief> =
            members.iter().map(|m| (m.user_id.as_str(), m)).collect();
        let mut ordered: Vec<&GroupMemberBrief> = Vec::with_capacity(members.len());
        for user_id in &user_ids {
            if let Some(member) = by_id.get(user_id.as_str()) {
                ordered.push(member);
            }
        }
        let data = serde_json::to_vec(&ordered)
            .map_err(|e| CoreError::Internal(format!("group hash encode: {}", e)))?;
        Ok(digest_to_u64(&data))
    }

    pub async fn hash_part(&self, group_id: &str) -> Result<u64, CoreError> {
        let user_ids = self.api.hash_part_member_ids(group_id).await?;
        if user_ids.is_empty() {
            return Ok(0);
        }
        let members = self.api.member_info(group_id, &user_ids).await?;
        if members.len() != user_ids.len() {
            return Err(CoreError::Internal(
                "inconsistent group member fetch".to_string(),
            ));
        }
        let by_id: HashMap<&str, &GroupMemberBrief> =
            members.iter().map(|m| (m.user_id.as_str(), m)).collect();
        let mut rows = Vec::with_capacity(user_ids.len());
        for user_id in &user_ids {
            let Some(member) = by_id.get(user_id.as_str()) else {
                return Err(CoreError::Internal(format!(
                    "group member missing: {}",
                    user_id
                )));
            };
            rows.push(
                [
                    member.user_id.clone(),
                    member.nickname.clone(),
                    member.face_url.clone(),
                    member.role_level.to_string(),
                    member.join_time.to_string(),
                    member.join_source.to_string(),
                    member.inviter_user_id.clone(),
                    member.mute_end_time.to_string(),
                    member.operator_user_id.clone(),
                    member.ex.clone(),
                ]
                .join(","),
            );
        }
        Ok(digest_to_u64(rows.join(";").as_bytes()))
    }
}

#[derive(Default)]
struct InMemoryGroupState {
    groups: HashMap<String, Vec<GroupMemberBrief>>,
    dismissed: Vec<String>,
    hash_part_limit: usize,
}

#[derive(Default)]
pub struct InMemoryGroupApi {
    state: Mutex<InMemoryGroupState>,
}

impl InMemoryGroupApi {
    pub fn new() -> InMemoryGroupApi {
        InMemoryGroupApi {
            state: Mutex::new(InMemoryGroupState {
                hash_part_limit: 100,
                ..InMemoryGroupState::default()
            }),
        }
    }

    pub async fn insert_group(&self, group_id: &str, user_ids: &[&str]) {
        let members = user_ids
            .iter()
            .map(|user_id| GroupMemberBrief {
                user_id: user_id.to_string(),
                ..GroupMemberBrief::default()
            })
            .collect();
        let mut state = self.state.lock().await;
        state.groups.insert(group_id.to_string(), members);
    }

    pub async fn remove_member(&self, group_id: &str, user_id: &str) {
        let mut state = self.state.lock().await;
        if let Some(members) = state.groups.get_mut(group_id) {
            members.retain(|m| m.user_id != user_id);
        }
    }

    pub async fn dismissed_groups(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.dismissed.clone()
    }
}

#[async_trait]
impl GroupApi for InMemoryGroupApi {
    async fn member_ids(&self, group_id: &str) -> Result<Vec<String>, CoreError> {
        let state = self.state.lock().await;
        Ok(state
            .groups
            .get(group_id)
            .map(|members| members.iter().map(|m| m.user_id.clone()).collect())
            .unwrap_or_default())
    }

    async fn member_info(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> Result<Vec<GroupMemberBrief>, CoreError> {
        let wanted: HashSet<&str> = user_ids.iter().map(|u| u.as_str()).collect();
        let state = self.state.lock().await;
        Ok(state
            .groups
            .get(group_id)
            .map(|members| {
                members
                    .iter()
                    .filter(|m| wanted.contains(m.user_id.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn joined_groups(&self, user_id: &str) -> Result<Vec<String>, CoreError> {
        let state = self.state.lock().await;
        let mut joined: Vec<String> = state
            .groups
            .iter()
            .filter(|(_, members)| members.iter().any(|m| m.user_id == user_id))
            .map(|(group_id, _)| group_id.clone())
            .collect();
        joined.sort_unstable();
        Ok(joined)
    }

    async fn dismiss_group(&self, group_id: &str) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        state.groups.remove(group_id);
        state.dismissed.push(group_id.to_string());
        Ok(())
    }

    async fn hash_part_member_ids(&self, group_id: &str) -> Result<Vec<String>, CoreError> {
        let state = self.state.lock().await;
        let mut ids: Vec<String> = state
            .groups
            .get(group_id)
            .map(|members| members.iter().map(|m| m.user_id.clone()).collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids.truncate(state.hash_part_limit);
        Ok(ids)
    }
}
