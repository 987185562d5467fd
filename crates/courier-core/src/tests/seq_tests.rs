use super::harness;
use crate::error::CoreError;
use crate::store::SeqStore;
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

#[tokio::test]
async fn malloc_hands_out_contiguous_blocks_per_conversation() {
    let h = harness().await;
    assert_eq!(h.seq.malloc("g1", 3).await.expect("malloc"), vec![1, 2, 3]);
    assert_eq!(h.seq.malloc("g1", 2).await.expect("malloc"), vec![4, 5]);
    assert_eq!(h.seq.malloc("u1", 1).await.expect("malloc"), vec![1]);
}

#[tokio::test]
async fn malloc_zero_is_rejected() {
    let h = harness().await;
    assert!(matches!(
        h.seq.malloc("g1", 0).await,
        Err(CoreError::ArgInvalid("size"))
    ));
}

#[tokio::test]
async fn max_seq_tracks_the_persisted_counter() {
    let h = harness().await;
    assert_eq!(h.seq.get_max_seq("c1").await.expect("max"), 0);
    h.seq.malloc("c1", 1).await.expect("malloc");
    // The checkpoint advances by the amortization step, not by one.
    assert_eq!(h.seq.get_max_seq("c1").await.expect("max"), 50);
}

#[tokio::test]
async fn min_seq_round_trips() {
    let h = harness().await;
    assert_eq!(h.seq.get_min_seq("c1").await.expect("min"), 0);
    h.seq.set_min_seq("c1", 42).await.expect("set min");
    assert_eq!(h.seq.get_min_seq("c1").await.expect("min"), 42);
}

#[tokio::test]
async fn cache_flush_never_reissues_seqs() {
    let h = harness().await;
    let first = h.seq.malloc("c1", 3).await.expect("malloc");
    assert_eq!(first, vec![1, 2, 3]);
    h.cache.flush_seq("c1").await;
    let second = h.seq.malloc("c1", 2).await.expect("malloc");
    let max_first = *first.last().expect("nonempty");
    assert!(second.iter().all(|s| *s > max_first), "{:?}", second);
    let mut unique: HashSet<i64> = first.into_iter().collect();
    for seq in second {
        assert!(unique.insert(seq));
    }
}

#[tokio::test]
async fn concurrent_malloc_with_flushes_stays_unique() {
    let h = Arc::new(harness().await);
    let seen = Arc::new(Mutex::new(Vec::<i64>::new()));
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = h.clone();
        let seen = seen.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..25 {
                let size = rand::thread_rng().gen_range(1..=7);
                let block = h.seq.malloc("hot", size).await.expect("malloc");
                assert_eq!(block.len(), size);
                for pair in block.windows(2) {
                    assert_eq!(pair[1], pair[0] + 1);
                }
                seen.lock().await.extend(block);
            }
        }));
    }
    let flusher = {
        let h = h.clone();
        tokio::spawn(async move {
            for _ in 0..5 {
                tokio::time::sleep(std::time::Duration::from_millis(3)).await;
                h.cache.flush_seq("hot").await;
            }
        })
    };
    for task in tasks {
        task.await.expect("task");
    }
    flusher.await.expect("flusher");
    let seen = seen.lock().await;
    let unique: HashSet<i64> = seen.iter().copied().collect();
    assert_eq!(unique.len(), seen.len(), "duplicate seq issued");
}

struct FailingSeqStore;

#[async_trait]
impl SeqStore for FailingSeqStore {
    async fn malloc(&self, _conversation_id: &str, _size: i64) -> Result<Vec<i64>, CoreError> {
        Err(CoreError::StoreUnavailable("down".to_string()))
    }

    async fn get_max_seq(&self, _conversation_id: &str) -> Result<i64, CoreError> {
        Err(CoreError::StoreUnavailable("down".to_string()))
    }

    async fn get_min_seq(&self, _conversation_id: &str) -> Result<i64, CoreError> {
        Err(CoreError::StoreUnavailable("down".to_string()))
    }

    async fn set_min_seq(&self, _conversation_id: &str, _min_seq: i64) -> Result<(), CoreError> {
        Err(CoreError::StoreUnavailable("down".to_string()))
    }
}

#[tokio::test]
async fn store_error_propagates_and_returns_no_seqs() {
    let cfg = crate::config::PushConfig::default();
    let cache = Arc::new(crate::cache::MemCache::new());
    let allocator = crate::seq_alloc::SeqAllocator::new(cache, Arc::new(FailingSeqStore), &cfg);
    let err = allocator.malloc("c1", 2).await.expect_err("must fail");
    assert!(matches!(err, CoreError::StoreUnavailable(_)));
}
