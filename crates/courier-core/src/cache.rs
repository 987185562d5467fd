use crate::cachekey;
use crate::error::CoreError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

// Sentinel member keeping a rebuilt-but-empty group online set distinguishable
// from a never-built one.
pub const GROUP_ONLINE_PLACEHOLDER: &str = "$placeholder$";

#[async_trait]
pub trait SeqCacheOps: Send + Sync {
    // Atomically pops up to `size` pre-allocated seqs from the head of the
    // conversation's cache list. Emptying the list also drops the allocation
    // lock, so an orphaned lock cannot outlive the seqs it guarded.
    async fn lpop_seqs(&self, conversation_id: &str, size: usize) -> Result<Vec<i64>, CoreError>;

    // Replaces the cache list with `seqs` and arms the expiry.
    async fn push_seqs(
        &self,
        conversation_id: &str,
        seqs: &[i64],
        ttl: Duration,
    ) -> Result<(), CoreError>;

    // Returns a release token when the allocation lock was acquired.
    async fn acquire_malloc_lock(
        &self,
        conversation_id: &str,
        ttl: Duration,
    ) -> Result<Option<String>, CoreError>;

    async fn release_malloc_lock(
        &self,
        conversation_id: &str,
        token: &str,
    ) -> Result<(), CoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadSeqUpdate {
    // No cached slot; the caller must initialize from the store.
    Missing,
    // Cached value is >= the incoming seq.
    Stale,
    // Cached, persistence deferred.
    Cached,
    // Cached and the write-ratio counter elected this update for persistence.
    PersistDue,
}

#[async_trait]
pub trait SeqUserCacheOps: Send + Sync {
    async fn update_read_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        seq: i64,
        write_ratio: i64,
        ttl: Duration,
    ) -> Result<ReadSeqUpdate, CoreError>;

    // Installs the slot only when absent; returns whether it was installed.
    async fn init_read_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        seq: i64,
        ttl: Duration,
    ) -> Result<bool, CoreError>;

    async fn get_read_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Option<i64>, CoreError>;

    async fn acquire_read_init_lock(
        &self,
        conversation_id: &str,
        user_id: &str,
        ttl: Duration,
    ) -> Result<Option<String>, CoreError>;

    async fn release_read_init_lock(
        &self,
        conversation_id: &str,
        user_id: &str,
        token: &str,
    ) -> Result<(), CoreError>;

    // Read-through scalar cells for per-user max/min seqs, keyed by cachekey.
    async fn get_seq_value(&self, key: &str) -> Result<Option<i64>, CoreError>;

    async fn set_seq_value(&self, key: &str, value: i64, ttl: Duration) -> Result<(), CoreError>;

    async fn tag_deleted(&self, key: &str) -> Result<(), CoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOnlineOutcome {
    // The connection ID was already registered.
    Duplicate,
    Added { first_for_platform: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOfflineOutcome {
    UnknownConn,
    Removed {
        platform_id: i32,
        last_for_platform: bool,
    },
}

#[async_trait]
pub trait PresenceCacheOps: Send + Sync {
    async fn set_online(
        &self,
        user_id: &str,
        conn_id: &str,
        platform_id: i32,
        ttl: Duration,
    ) -> Result<SetOnlineOutcome, CoreError>;

    async fn set_offline(&self, user_id: &str, conn_id: &str)
        -> Result<SetOfflineOutcome, CoreError>;

    // Distinct platform IDs with at least one live connection, ascending.
    async fn user_platforms(&self, user_id: &str) -> Result<Vec<i32>, CoreError>;

    // Adds user -> targets and the reverse edges in one atomic step.
    async fn add_subscriptions(
        &self,
        user_id: &str,
        targets: &[String],
        ttl: Duration,
    ) -> Result<(), CoreError>;

    // Forward edges only; stale reverse edges expire naturally.
    async fn remove_subscriptions(
        &self,
        user_id: &str,
        targets: &[String],
    ) -> Result<(), CoreError>;

    async fn subscriptions_of(&self, user_id: &str) -> Result<Vec<String>, CoreError>;

    async fn subscribers_of(&self, user_id: &str) -> Result<Vec<String>, CoreError>;

    async fn group_online_add(
        &self,
        user_id: &str,
        group_ids: &[String],
        score: i64,
    ) -> Result<(), CoreError>;

    async fn group_online_remove(
        &self,
        user_id: &str,
        group_ids: &[String],
    ) -> Result<(), CoreError>;

    // Rebuilds the set: placeholder at score 0, then every online member.
    async fn group_online_init(
        &self,
        group_id: &str,
        user_ids: &[String],
        score: i64,
        ttl: Duration,
    ) -> Result<(), CoreError>;

    async fn group_online_card(&self, group_id: &str) -> Result<i64, CoreError>;

    // Redis ZRANGE index semantics, placeholder included.
    async fn group_online_range(
        &self,
        group_id: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, CoreError>;

    // True when this caller won the right to rebuild the group online set.
    async fn try_claim_group_init(&self, group_id: &str, ttl: Duration)
        -> Result<bool, CoreError>;

    async fn clear_group_init(&self, group_id: &str) -> Result<(), CoreError>;
}

struct Expiring<T> {
    value: T,
    deadline: Option<Instant>,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Option<Duration>) -> Expiring<T> {
        Expiring {
            value,
            deadline: ttl.map(|t| Instant::now() + t),
        }
    }

    fn live(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }

    fn refresh(&mut self, ttl: Duration) {
        self.deadline = Some(Instant::now() + ttl);
    }
}

struct ReadSlot {
    seq: i64,
    count: i64,
}

#[derive(Default)]
struct MemCacheInner {
    seq_lists: HashMap<String, Expiring<VecDeque<i64>>>,
    locks: HashMap<String, (String, Instant)>,
    read_slots: HashMap<String, Expiring<ReadSlot>>,
    seq_values: HashMap<String, Expiring<i64>>,
    conns: HashMap<String, Expiring<HashMap<String, i32>>>,
    subscriptions: HashMap<String, Expiring<HashSet<String>>>,
    subscribed: HashMap<String, Expiring<HashSet<String>>>,
    group_online: HashMap<String, Expiring<Vec<(i64, String)>>>,
    claims: HashMap<String, Instant>,
    strings: HashMap<String, Expiring<String>>,
}

impl MemCacheInner {
    fn live_entry<'a, T>(
        map: &'a mut HashMap<String, Expiring<T>>,
        key: &str,
    ) -> Option<&'a mut Expiring<T>> {
        if let Some(entry) = map.get(key) {
            if !entry.live() {
                map.remove(key);
                return None;
            }
        }
        map.get_mut(key)
    }

    fn acquire_lock(&mut self, key: String, ttl: Duration) -> Option<String> {
        if let Some((_, deadline)) = self.locks.get(&key) {
            if Instant::now() < *deadline {
                return None;
            }
        }
        let token = Uuid::new_v4().to_string();
        self.locks
            .insert(key, (token.clone(), Instant::now() + ttl));
        Some(token)
    }

    fn release_lock(&mut self, key: &str, token: &str) {
        if let Some((held, _)) = self.locks.get(key) {
            if held == token {
                self.locks.remove(key);
            }
        }
    }

    fn zadd(set: &mut Vec<(i64, String)>, score: i64, member: &str) {
        set.retain(|(_, m)| m != member);
        let at = set
            .binary_search_by(|(s, m)| (*s, m.as_str()).cmp(&(score, member)))
            .unwrap_or_else(|i| i);
        set.insert(at, (score, member.to_string()));
    }
}

// Process-local cache engine with the same atomicity guarantees the Lua
// scripts give the Redis deployment. One mutex per engine; every contract
// method is a single critical section.
#[derive(Default)]
pub struct MemCache {
    inner: Mutex<MemCacheInner>,
}

impl MemCache {
    pub fn new() -> MemCache {
        MemCache::default()
    }

    // Simulates cache loss: drops the seq list and the allocation lock.
    pub async fn flush_seq(&self, conversation_id: &str) {
        let mut inner = self.inner.lock().await;
        inner.seq_lists.remove(&cachekey::malloc_seq(conversation_id));
        inner.locks.remove(&cachekey::malloc_seq_lock(conversation_id));
    }

    pub async fn set_fcm_token(&self, user_id: &str, platform_id: i32, token: &str, ttl: Duration) {
        let mut inner = self.inner.lock().await;
        inner.strings.insert(
            cachekey::fcm_token(platform_id, user_id),
            Expiring::new(token.to_string(), Some(ttl)),
        );
    }

    pub async fn get_string(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock().await;
        MemCacheInner::live_entry(&mut inner.strings, key).map(|e| e.value.clone())
    }
}

#[async_trait]
impl SeqCacheOps for MemCache {
    async fn lpop_seqs(&self, conversation_id: &str, size: usize) -> Result<Vec<i64>, CoreError> {
        let mut inner = self.inner.lock().await;
        let key = cachekey::malloc_seq(conversation_id);
        let Some(entry) = MemCacheInner::live_entry(&mut inner.seq_lists, &key) else {
            return Ok(Vec::new());
        };
        let take = size.min(entry.value.len());
        let out: Vec<i64> = entry.value.drain(..take).collect();
        if entry.value.is_empty() {
            inner.seq_lists.remove(&key);
            inner
                .locks
                .remove(&cachekey::malloc_seq_lock(conversation_id));
        }
        Ok(out)
    }

    async fn push_seqs(
        &self,
        conversation_id: &str,
        seqs: &[i64],
        ttl: Duration,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        let key = cachekey::malloc_seq(conversation_id);
        if seqs.is_empty() {
            inner.seq_lists.remove(&key);
            return Ok(());
        }
        inner.seq_lists.insert(
            key,
            Expiring::new(seqs.iter().copied().collect(), Some(ttl)),
        );
        Ok(())
    }

    async fn acquire_malloc_lock(
        &self,
        conversation_id: &str,
        ttl: Duration,
    ) -> Result<Option<String>, CoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.acquire_lock(cachekey::malloc_seq_lock(conversation_id), ttl))
    }

    async fn release_malloc_lock(
        &self,
        conversation_id: &str,
        token: &str,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        inner.release_lock(&cachekey::malloc_seq_lock(conversation_id), token);
        Ok(())
    }
}

#[async_trait]
impl SeqUserCacheOps for MemCache {
    async fn update_read_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        seq: i64,
        write_ratio: i64,
        ttl: Duration,
    ) -> Result<ReadSeqUpdate, CoreError> {
        if write_ratio <= 0 {
            return Err(CoreError::ArgInvalid("write_ratio"));
        }
        let mut inner = self.inner.lock().await;
        let key = cachekey::seq_user_read_seq(conversation_id, user_id);
        let Some(entry) = MemCacheInner::live_entry(&mut inner.read_slots, &key) else {
            return Ok(ReadSeqUpdate::Missing);
        };
        if entry.value.seq >= seq {
            return Ok(ReadSeqUpdate::Stale);
        }
        entry.value.seq = seq;
        entry.value.count += 1;
        entry.refresh(ttl);
        if entry.value.count % write_ratio != 0 {
            Ok(ReadSeqUpdate::Cached)
        } else {
            Ok(ReadSeqUpdate::PersistDue)
        }
    }

    async fn init_read_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        seq: i64,
        ttl: Duration,
    ) -> Result<bool, CoreError> {
        let mut inner = self.inner.lock().await;
        let key = cachekey::seq_user_read_seq(conversation_id, user_id);
        if MemCacheInner::live_entry(&mut inner.read_slots, &key).is_some() {
            return Ok(false);
        }
        inner
            .read_slots
            .insert(key, Expiring::new(ReadSlot { seq, count: 1 }, Some(ttl)));
        Ok(true)
    }

    async fn get_read_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<Option<i64>, CoreError> {
        let mut inner = self.inner.lock().await;
        let key = cachekey::seq_user_read_seq(conversation_id, user_id);
        Ok(MemCacheInner::live_entry(&mut inner.read_slots, &key).map(|e| e.value.seq))
    }

    async fn acquire_read_init_lock(
        &self,
        conversation_id: &str,
        user_id: &str,
        ttl: Duration,
    ) -> Result<Option<String>, CoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.acquire_lock(cachekey::seq_user_read_lock(conversation_id, user_id), ttl))
    }

    async fn release_read_init_lock(
        &self,
        conversation_id: &str,
        user_id: &str,
        token: &str,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        inner.release_lock(&cachekey::seq_user_read_lock(conversation_id, user_id), token);
        Ok(())
    }

    async fn get_seq_value(&self, key: &str) -> Result<Option<i64>, CoreError> {
        let mut inner = self.inner.lock().await;
        Ok(MemCacheInner::live_entry(&mut inner.seq_values, key).map(|e| e.value))
    }

    async fn set_seq_value(&self, key: &str, value: i64, ttl: Duration) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .seq_values
            .insert(key.to_string(), Expiring::new(value, Some(ttl)));
        Ok(())
    }

    async fn tag_deleted(&self, key: &str) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        inner.seq_values.remove(key);
        Ok(())
    }
}

#[async_trait]
impl PresenceCacheOps for MemCache {
    async fn set_online(
        &self,
        user_id: &str,
        conn_id: &str,
        platform_id: i32,
        ttl: Duration,
    ) -> Result<SetOnlineOutcome, CoreError> {
        let mut inner = self.inner.lock().await;
        let key = cachekey::user_state_conn(user_id);
        let _ = MemCacheInner::live_entry(&mut inner.conns, &key);
        let entry = inner
            .conns
            .entry(key)
            .or_insert_with(|| Expiring::new(HashMap::new(), None));
        entry.refresh(ttl);
        if entry.value.contains_key(conn_id) {
            return Ok(SetOnlineOutcome::Duplicate);
        }
        entry.value.insert(conn_id.to_string(), platform_id);
        let count = entry
            .value
            .values()
            .filter(|p| **p == platform_id)
            .count();
        Ok(SetOnlineOutcome::Added {
            first_for_platform: count == 1,
        })
    }

    async fn set_offline(
        &self,
        user_id: &str,
        conn_id: &str,
    ) -> Result<SetOfflineOutcome, CoreError> {
        let mut inner = self.inner.lock().await;
        let key = cachekey::user_state_conn(user_id);
        let Some(entry) = MemCacheInner::live_entry(&mut inner.conns, &key) else {
            return Ok(SetOfflineOutcome::UnknownConn);
        };
        let Some(platform_id) = entry.value.remove(conn_id) else {
            return Ok(SetOfflineOutcome::UnknownConn);
        };
        let remaining = entry
            .value
            .values()
            .filter(|p| **p == platform_id)
            .count();
        if entry.value.is_empty() {
            inner.conns.remove(&key);
        }
        Ok(SetOfflineOutcome::Removed {
            platform_id,
            last_for_platform: remaining == 0,
        })
    }

    async fn user_platforms(&self, user_id: &str) -> Result<Vec<i32>, CoreError> {
        let mut inner = self.inner.lock().await;
        let key = cachekey::user_state_conn(user_id);
        let Some(entry) = MemCacheInner::live_entry(&mut inner.conns, &key) else {
            return Ok(Vec::new());
        };
        let mut platforms: Vec<i32> = entry.value.values().copied().collect();
        platforms.sort_unstable();
        platforms.dedup();
        Ok(platforms)
    }

    async fn add_subscriptions(
        &self,
        user_id: &str,
        targets: &[String],
        ttl: Duration,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        for target in targets {
            let key = cachekey::subscribed(target);
            let _ = MemCacheInner::live_entry(&mut inner.subscribed, &key);
            let entry = inner
                .subscribed
                .entry(key)
                .or_insert_with(|| Expiring::new(HashSet::new(), None));
            entry.value.insert(user_id.to_string());
            entry.refresh(ttl);
        }
        let key = cachekey::subscription(user_id);
        let _ = MemCacheInner::live_entry(&mut inner.subscriptions, &key);
        let entry = inner
            .subscriptions
            .entry(key)
            .or_insert_with(|| Expiring::new(HashSet::new(), None));
        entry.value.extend(targets.iter().cloned());
        entry.refresh(ttl);
        Ok(())
    }

    async fn remove_subscriptions(
        &self,
        user_id: &str,
        targets: &[String],
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        let key = cachekey::subscription(user_id);
        if let Some(entry) = MemCacheInner::live_entry(&mut inner.subscriptions, &key) {
            for target in targets {
                entry.value.remove(target);
            }
        }
        Ok(())
    }

    async fn subscriptions_of(&self, user_id: &str) -> Result<Vec<String>, CoreError> {
        let mut inner = self.inner.lock().await;
        let key = cachekey::subscription(user_id);
        Ok(MemCacheInner::live_entry(&mut inner.subscriptions, &key)
            .map(|e| e.value.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn subscribers_of(&self, user_id: &str) -> Result<Vec<String>, CoreError> {
        let mut inner = self.inner.lock().await;
        let key = cachekey::subscribed(user_id);
        Ok(MemCacheInner::live_entry(&mut inner.subscribed, &key)
            .map(|e| e.value.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn group_online_add(
        &self,
        user_id: &str,
        group_ids: &[String],
        score: i64,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        for group_id in group_ids {
            let key = cachekey::group_online(group_id);
            if let Some(entry) = MemCacheInner::live_entry(&mut inner.group_online, &key) {
                MemCacheInner::zadd(&mut entry.value, score, user_id);
            }
        }
        Ok(())
    }

    async fn group_online_remove(
        &self,
        user_id: &str,
        group_ids: &[String],
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        for group_id in group_ids {
            let key = cachekey::group_online(group_id);
            if let Some(entry) = MemCacheInner::live_entry(&mut inner.group_online, &key) {
                entry.value.retain(|(_, m)| m != user_id);
            }
        }
        Ok(())
    }

    async fn group_online_init(
        &self,
        group_id: &str,
        user_ids: &[String],
        score: i64,
        ttl: Duration,
    ) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        let mut set = vec![(0, GROUP_ONLINE_PLACEHOLDER.to_string())];
        for user_id in user_ids {
            MemCacheInner::zadd(&mut set, score, user_id);
        }
        inner
            .group_online
            .insert(cachekey::group_online(group_id), Expiring::new(set, Some(ttl)));
        Ok(())
    }

    async fn group_online_card(&self, group_id: &str) -> Result<i64, CoreError> {
        let mut inner = self.inner.lock().await;
        let key = cachekey::group_online(group_id);
        Ok(MemCacheInner::live_entry(&mut inner.group_online, &key)
            .map(|e| e.value.len() as i64)
            .unwrap_or(0))
    }

    async fn group_online_range(
        &self,
        group_id: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, CoreError> {
        let mut inner = self.inner.lock().await;
        let key = cachekey::group_online(group_id);
        let Some(entry) = MemCacheInner::live_entry(&mut inner.group_online, &key) else {
            return Ok(Vec::new());
        };
        let len = entry.value.len() as i64;
        let mut from = if start < 0 { len + start } else { start };
        let mut to = if stop < 0 { len + stop } else { stop };
        if from < 0 {
            from = 0;
        }
        if to >= len {
            to = len - 1;
        }
        if len == 0 || from > to || from >= len {
            return Ok(Vec::new());
        }
        Ok(entry.value[from as usize..=to as usize]
            .iter()
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn try_claim_group_init(
        &self,
        group_id: &str,
        ttl: Duration,
    ) -> Result<bool, CoreError> {
        let mut inner = self.inner.lock().await;
        let key = cachekey::group_online_tag(group_id);
        if let Some(deadline) = inner.claims.get(&key) {
            if Instant::now() < *deadline {
                return Ok(false);
            }
        }
        inner.claims.insert(key, Instant::now() + ttl);
        Ok(true)
    }

    async fn clear_group_init(&self, group_id: &str) -> Result<(), CoreError> {
        let mut inner = self.inner.lock().await;
        inner.claims.remove(&cachekey::group_online_tag(group_id));
        Ok(())
    }
}
