use super::harness;
use crate::config::PushConfig;
use crate::store::SeqUserStore;

#[tokio::test]
async fn read_seq_is_monotonic() {
    let h = harness().await;
    for seq in [10, 12, 11, 3, 12] {
        h.seq_user
            .set_user_read_seq("c1", "u1", seq)
            .await
            .expect("set");
    }
    assert_eq!(
        h.seq_user.get_user_read_seq("c1", "u1").await.expect("get"),
        12
    );
}

#[tokio::test]
async fn read_seq_initializes_from_store_and_merges_incoming() {
    let h = harness().await;
    h.seq_user_store
        .set_read_seq("c1", "u1", 40)
        .await
        .expect("seed");
    // Smaller than the stored value: the store wins.
    h.seq_user
        .set_user_read_seq("c1", "u1", 7)
        .await
        .expect("set");
    assert_eq!(
        h.seq_user.get_user_read_seq("c1", "u1").await.expect("get"),
        40
    );
    // Larger than the stored value: the incoming seq wins.
    h.seq_user
        .set_user_read_seq("c2", "u1", 7)
        .await
        .expect("set");
    assert_eq!(
        h.seq_user.get_user_read_seq("c2", "u1").await.expect("get"),
        7
    );
}

#[tokio::test]
async fn read_seq_persists_on_the_write_ratio() {
    let mut cfg = PushConfig::default();
    cfg.read_seq_write_ratio = 5;
    cfg.aggregator.tick_secs = 1;
    let h = super::harness_with(cfg, super::ScriptedHookTransport::new(None)).await;
    for seq in 1..=4 {
        h.seq_user
            .set_user_read_seq("c1", "u1", seq)
            .await
            .expect("set");
    }
    // Four updates since the slot was created: counter at 4, nothing flushed
    // beyond the init state.
    assert_eq!(
        h.seq_user_store.get_read_seq("c1", "u1").await.expect("db"),
        0
    );
    h.seq_user
        .set_user_read_seq("c1", "u1", 9)
        .await
        .expect("set");
    assert_eq!(
        h.seq_user_store.get_read_seq("c1", "u1").await.expect("db"),
        9
    );
    // The cache keeps serving the freshest value regardless of flushes.
    assert_eq!(
        h.seq_user.get_user_read_seq("c1", "u1").await.expect("get"),
        9
    );
}

#[tokio::test]
async fn get_read_seq_on_empty_slot_is_zero() {
    let h = harness().await;
    assert_eq!(
        h.seq_user.get_user_read_seq("c9", "u9").await.expect("get"),
        0
    );
}

#[tokio::test]
async fn max_seq_reads_through_and_invalidates_on_write() {
    let h = harness().await;
    h.seq_user_store
        .set_max_seq("c1", "u1", 100)
        .await
        .expect("seed");
    assert_eq!(
        h.seq_user.get_user_max_seq("c1", "u1").await.expect("get"),
        100
    );
    // A direct store write behind the cache stays invisible...
    h.seq_user_store
        .set_max_seq("c1", "u1", 150)
        .await
        .expect("seed");
    assert_eq!(
        h.seq_user.get_user_max_seq("c1", "u1").await.expect("get"),
        100
    );
    // ...while a service write tags the cell deleted and the next read rebuilds.
    h.seq_user
        .set_user_max_seq("c1", "u1", 200)
        .await
        .expect("set");
    assert_eq!(
        h.seq_user.get_user_max_seq("c1", "u1").await.expect("get"),
        200
    );
}

#[tokio::test]
async fn min_seq_reads_through_and_invalidates_on_write() {
    let h = harness().await;
    assert_eq!(
        h.seq_user.get_user_min_seq("c1", "u1").await.expect("get"),
        0
    );
    h.seq_user
        .set_user_min_seq("c1", "u1", 33)
        .await
        .expect("set");
    assert_eq!(
        h.seq_user.get_user_min_seq("c1", "u1").await.expect("get"),
        33
    );
}

#[tokio::test]
async fn concurrent_read_seq_updates_keep_the_maximum() {
    let h = std::sync::Arc::new(harness().await);
    let mut tasks = Vec::new();
    for offset in 0..8i64 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            for step in 0..20i64 {
                let seq = step * 8 + offset + 1;
                h.seq_user
                    .set_user_read_seq("c1", "u1", seq)
                    .await
                    .expect("set");
            }
        }));
    }
    for task in tasks {
        task.await.expect("task");
    }
    assert_eq!(
        h.seq_user.get_user_read_seq("c1", "u1").await.expect("get"),
        160
    );
}
