use crate::cache::{ReadSeqUpdate, SeqUserCacheOps};
use crate::cachekey;
use crate::config::PushConfig;
use crate::error::CoreError;
use crate::store::SeqUserStore;
use std::sync::Arc;
use std::time::Duration;

const READ_INIT_LOCK_TTL: Duration = Duration::from_secs(10);
const READ_INIT_WAIT: Duration = Duration::from_millis(20);
const READ_INIT_ATTEMPTS: usize = 50;

// Per-(conversation, user) seq slots. Max/min are read-through cached with
// tag-as-deleted invalidation; the read seq is write-coalesced, persisting one
// update in every `write_ratio`.
pub struct SeqUserService {
    cache: Arc<dyn SeqUserCacheOps>,
    store: Arc<dyn SeqUserStore>,
    write_ratio: i64,
    seq_ttl: Duration,
    read_ttl: Duration,
}

impl SeqUserService {
    pub fn new(
        cache: Arc<dyn SeqUserCacheOps>,
        store: Arc<dyn SeqUserStore>,
        cfg: &PushConfig,
    ) -> SeqUserService {
        SeqUserService {
            cache,
            store,
            write_ratio: cfg.read_seq_write_ratio,
            seq_ttl: cfg.user_seq_expire(),
            read_ttl: cfg.read_seq_expire(),
        }
    }

    pub async fn get_user_max_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<i64, CoreError> {
        let key = cachekey::seq_user_max_seq(conversation_id, user_id);
        if let Some(value) = self.cache.get_seq_value(&key).await? {
            return Ok(value);
        }
        let value = self.store.get_max_seq(conversation_id, user_id).await?;
        self.cache.set_seq_value(&key, value, self.seq_ttl).await?;
        Ok(value)
    }

    pub async fn set_user_max_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        seq: i64,
    ) -> Result<(), CoreError> {
        self.store.set_max_seq(conversation_id, user_id, seq).await?;
        self.cache
            .tag_deleted(&cachekey::seq_user_max_seq(conversation_id, user_id))
            .await
    }

    pub async fn get_user_min_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<i64, CoreError> {
        let key = cachekey::seq_user_min_seq(conversation_id, user_id);
        if let Some(value) = self.cache.get_seq_value(&key).await? {
            return Ok(value);
        }
        let value = self.store.get_min_seq(conversation_id, user_id).await?;
        self.cache.set_seq_value(&key, value, self.seq_ttl).await?;
        Ok(value)
    }

    pub async fn set_user_min_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        seq: i64,
    ) -> Result<(), CoreError> {
        self.store.set_min_seq(conversation_id, user_id, seq).await?;
        self.cache
            .tag_deleted(&cachekey::seq_user_min_seq(conversation_id, user_id))
            .await
    }

    pub async fn set_user_read_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        seq: i64,
    ) -> Result<(), CoreError> {
        match self
            .cache
            .update_read_seq(conversation_id, user_id, seq, self.write_ratio, self.read_ttl)
            .await?
        {
            ReadSeqUpdate::Missing => self.init_read_seq(conversation_id, user_id, seq).await,
            ReadSeqUpdate::Stale | ReadSeqUpdate::Cached => Ok(()),
            ReadSeqUpdate::PersistDue => {
                self.store.set_read_seq(conversation_id, user_id, seq).await
            }
        }
    }

    pub async fn get_user_read_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> Result<i64, CoreError> {
        for _ in 0..2 {
            if let Some(value) = self.cache.get_read_seq(conversation_id, user_id).await? {
                return Ok(value);
            }
            self.init_read_seq(conversation_id, user_id, -1).await?;
        }
        Err(CoreError::Internal("read seq fetch failed".to_string()))
    }

    // Builds the cached slot from the store under the init lock, merging a
    // positive incoming seq. Losers wait for the winner and then merge their
    // own seq into the freshly installed slot.
    async fn init_read_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        incoming: i64,
    ) -> Result<(), CoreError> {
        for _ in 0..READ_INIT_ATTEMPTS {
            if let Some(token) = self
                .cache
                .acquire_read_init_lock(conversation_id, user_id, READ_INIT_LOCK_TTL)
                .await?
            {
                let installed = self
                    .install_read_slot(conversation_id, user_id, incoming)
                    .await;
                self.cache
                    .release_read_init_lock(conversation_id, user_id, &token)
                    .await?;
                return installed;
            }
            tokio::time::sleep(READ_INIT_WAIT).await;
            match self
                .cache
                .update_read_seq(
                    conversation_id,
                    user_id,
                    incoming,
                    self.write_ratio,
                    self.read_ttl,
                )
                .await?
            {
                ReadSeqUpdate::Missing => continue,
                ReadSeqUpdate::Stale | ReadSeqUpdate::Cached => return Ok(()),
                ReadSeqUpdate::PersistDue => {
                    return self
                        .store
                        .set_read_seq(conversation_id, user_id, incoming)
                        .await;
                }
            }
        }
        Err(CoreError::Internal("read seq init failed".to_string()))
    }

    async fn install_read_slot(
        &self,
        conversation_id: &str,
        user_id: &str,
        incoming: i64,
    ) -> Result<(), CoreError> {
        let mut seq = self.store.get_read_seq(conversation_id, user_id).await?;
        if incoming > 0 && incoming > seq {
            seq = incoming;
        }
        let installed = self
            .cache
            .init_read_seq(conversation_id, user_id, seq, self.read_ttl)
            .await?;
        if !installed && incoming > 0 {
            // Slot appeared despite the lock; fold the incoming seq in.
            if let ReadSeqUpdate::PersistDue = self
                .cache
                .update_read_seq(
                    conversation_id,
                    user_id,
                    incoming,
                    self.write_ratio,
                    self.read_ttl,
                )
                .await?
            {
                self.store
                    .set_read_seq(conversation_id, user_id, incoming)
                    .await?;
            }
        }
        Ok(())
    }
}
