use crate::cache::SeqCacheOps;
use crate::config::PushConfig;
use crate::error::CoreError;
use crate::store::SeqStore;
use courier_api::content::SessionType;
use courier_api::conversation::conversation_kind;
use std::sync::Arc;
use std::time::Duration;

const MALLOC_RETRY: usize = 10;
const LOCK_WAIT: Duration = Duration::from_millis(10);

// Two-tier allocator: a durable counter fronted by a per-conversation list of
// pre-allocated seqs. The durable counter is the sole source of truth; cached
// seqs may be lost and consumers must tolerate the resulting gaps.
pub struct SeqAllocator {
    cache: Arc<dyn SeqCacheOps>,
    store: Arc<dyn SeqStore>,
    single_step: i64,
    group_step: i64,
    lock_expire: Duration,
    seq_expire: Duration,
}

impl SeqAllocator {
    pub fn new(cache: Arc<dyn SeqCacheOps>, store: Arc<dyn SeqStore>, cfg: &PushConfig) -> SeqAllocator {
        SeqAllocator {
            cache,
            store,
            single_step: cfg.single_seq_step,
            group_step: cfg.group_seq_step,
            lock_expire: cfg.seq_lock_expire(),
            seq_expire: cfg.seq_cache_expire(),
        }
    }

    fn step_base(&self, conversation_id: &str) -> i64 {
        match conversation_kind(conversation_id) {
            Some(SessionType::ReadGroup) => self.group_step,
            _ => self.single_step,
        }
    }

    pub async fn malloc(&self, conversation_id: &str, size: usize) -> Result<Vec<i64>, CoreError> {
        if size == 0 {
            return Err(CoreError::ArgInvalid("size"));
        }
        for _ in 0..MALLOC_RETRY {
            // A short pop is retried from scratch; the popped prefix becomes a
            // tolerated gap unless the refill turns out contiguous with it.
            let mut out = self.cache.lpop_seqs(conversation_id, size).await?;
            if out.len() == size {
                return Ok(out);
            }
            match self
                .cache
                .acquire_malloc_lock(conversation_id, self.lock_expire)
                .await?
            {
                Some(token) => {
                    let refill = self.refill(conversation_id, size, &mut out).await;
                    self.cache
                        .release_malloc_lock(conversation_id, &token)
                        .await?;
                    refill?;
                    if out.len() == size {
                        return Ok(out);
                    }
                }
                None => tokio::time::sleep(LOCK_WAIT).await,
            }
        }
        Err(CoreError::Internal("malloc seq failed".to_string()))
    }

    // Advances the durable counter and merges the fresh range with whatever
    // was already popped. A non-contiguous range restarts the return buffer;
    // the popped prefix is discarded as a tolerated gap.
    async fn refill(
        &self,
        conversation_id: &str,
        size: usize,
        out: &mut Vec<i64>,
    ) -> Result<(), CoreError> {
        let step = (size as i64).max(self.step_base(conversation_id));
        let range = self.store.malloc(conversation_id, step).await?;
        if range.len() < size {
            return Err(CoreError::StoreUnavailable("short seq range".to_string()));
        }
        let contiguous = match out.last() {
            Some(last) => last + 1 == range[0],
            None => false,
        };
        let rest = if !out.is_empty() && contiguous {
            let need = size - out.len();
            out.extend(&range[..need]);
            &range[need..]
        } else {
            out.clear();
            out.extend(&range[..size]);
            &range[size..]
        };
        self.cache
            .push_seqs(conversation_id, rest, self.seq_expire)
            .await
    }

    // Highest seq ever reserved for the conversation, 0 when none.
    pub async fn get_max_seq(&self, conversation_id: &str) -> Result<i64, CoreError> {
        self.store.get_max_seq(conversation_id).await
    }

    pub async fn get_min_seq(&self, conversation_id: &str) -> Result<i64, CoreError> {
        self.store.get_min_seq(conversation_id).await
    }

    // Low-water mark used by history pruning.
    pub async fn set_min_seq(
        &self,
        conversation_id: &str,
        min_seq: i64,
    ) -> Result<(), CoreError> {
        self.store.set_min_seq(conversation_id, min_seq).await
    }
}
