use super::harness;
use crate::error::CoreError;
use crate::presence::StatusChange;
use tokio::sync::broadcast::error::TryRecvError;

#[tokio::test]
async fn duplicate_conn_is_an_application_error() {
    let h = harness().await;
    assert!(h.registry.set_online("u1", "conn-1", 1).await.expect("on"));
    let err = h
        .registry
        .set_online("u1", "conn-1", 1)
        .await
        .expect_err("duplicate");
    assert!(matches!(err, CoreError::Conflict(_)));
    assert_eq!(h.registry.user_platforms("u1").await.expect("p"), vec![1]);
}

#[tokio::test]
async fn second_conn_on_same_platform_is_not_first() {
    let h = harness().await;
    assert!(h.registry.set_online("u1", "c1", 1).await.expect("on"));
    assert!(!h.registry.set_online("u1", "c2", 1).await.expect("on"));
    assert_eq!(h.registry.user_platforms("u1").await.expect("p"), vec![1]);
}

#[tokio::test]
async fn unknown_conn_offline_is_surfaced() {
    let h = harness().await;
    let err = h
        .registry
        .set_offline("u1", "ghost")
        .await
        .expect_err("unknown");
    assert!(matches!(err, CoreError::NotFound));
}

#[tokio::test]
async fn online_offline_balance_empties_the_state() {
    let h = harness().await;
    let conns = [("c1", 1), ("c2", 1), ("c3", 2), ("c4", 3)];
    for (conn, platform) in conns {
        h.registry.set_online("u1", conn, platform).await.expect("on");
    }
    assert_eq!(
        h.registry.user_platforms("u1").await.expect("p"),
        vec![1, 2, 3]
    );
    for (conn, _) in conns {
        h.registry.set_offline("u1", conn).await.expect("off");
    }
    assert!(h.registry.user_platforms("u1").await.expect("p").is_empty());
    assert!(!h.registry.user_online("u1").await.expect("online"));
}

#[tokio::test]
async fn notifications_fire_only_on_zero_crossings() {
    let h = harness().await;
    let mut changes = h.registry.subscribe_changes();
    assert!(h.registry.set_online("u", "c1", 1).await.expect("on"));
    assert!(!h.registry.set_online("u", "c2", 1).await.expect("on"));
    assert!(!h.registry.set_offline("u", "c1").await.expect("off"));
    assert!(h.registry.set_offline("u", "c2").await.expect("off"));
    assert_eq!(
        changes.try_recv().expect("first"),
        StatusChange {
            user_id: "u".to_string(),
            platform_id: 1,
            online: true,
        }
    );
    assert_eq!(
        changes.try_recv().expect("second"),
        StatusChange {
            user_id: "u".to_string(),
            platform_id: 1,
            online: false,
        }
    );
    assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn subscription_tips_reach_subscribers() {
    let h = harness().await;
    h.registry
        .add_subscriptions("watcher", &["u1".to_string()])
        .await
        .expect("sub");
    let subs = h.registry.subscriptions_of("watcher").await.expect("of");
    assert_eq!(subs, vec!["u1".to_string()]);
    assert_eq!(
        h.registry.subscribers_of("u1").await.expect("by"),
        vec!["watcher".to_string()]
    );
    let tips = h
        .registry
        .change_tips(&StatusChange {
            user_id: "u1".to_string(),
            platform_id: 2,
            online: true,
        })
        .await
        .expect("tips");
    assert_eq!(tips.len(), 1);
    assert_eq!(tips[0].to_user_id, "watcher");
    assert_eq!(tips[0].from_user_id, "u1");
    assert!(tips[0].online);
    // Unsubscribe removes the forward edge only.
    h.registry
        .remove_subscriptions("watcher", &["u1".to_string()])
        .await
        .expect("unsub");
    assert!(h
        .registry
        .subscriptions_of("watcher")
        .await
        .expect("of")
        .is_empty());
    assert_eq!(
        h.registry.subscribers_of("u1").await.expect("by"),
        vec!["watcher".to_string()]
    );
}

#[tokio::test]
async fn group_online_rebuilds_lazily_and_paginates_without_placeholder() {
    let h = harness().await;
    h.group_api
        .insert_group("g1", &["u1", "u2", "u3", "u4"])
        .await;
    h.registry.set_online("u1", "c1", 1).await.expect("on");
    h.registry.set_online("u3", "c3", 2).await.expect("on");
    let (total, members) = h
        .registry
        .get_group_online("g1", 1, 10, false)
        .await
        .expect("page");
    assert_eq!(total, 2);
    let mut members = members;
    members.sort();
    assert_eq!(members, vec!["u1".to_string(), "u3".to_string()]);
}

#[tokio::test]
async fn group_online_tracks_transitions_after_rebuild() {
    let h = harness().await;
    h.group_api.insert_group("g1", &["u1", "u2"]).await;
    let (total, _) = h
        .registry
        .get_group_online("g1", 1, 10, false)
        .await
        .expect("page");
    assert_eq!(total, 0);
    h.registry.set_online("u2", "c1", 1).await.expect("on");
    let (total, members) = h
        .registry
        .get_group_online("g1", 1, 10, false)
        .await
        .expect("page");
    assert_eq!(total, 1);
    assert_eq!(members, vec!["u2".to_string()]);
    h.registry.set_offline("u2", "c1").await.expect("off");
    let (total, members) = h
        .registry
        .get_group_online("g1", 1, 10, false)
        .await
        .expect("page");
    assert_eq!(total, 0);
    assert!(members.is_empty());
}

#[tokio::test]
async fn group_online_ascending_window_is_one_wider_than_descending() {
    let h = harness().await;
    h.group_api.insert_group("g1", &["u1", "u2", "u3"]).await;
    for (user, conn) in [("u1", "c1"), ("u2", "c2"), ("u3", "c3")] {
        h.registry.set_online(user, conn, 1).await.expect("on");
    }
    let (total, asc) = h
        .registry
        .get_group_online("g1", 1, 2, false)
        .await
        .expect("asc");
    assert_eq!(total, 3);
    assert_eq!(asc.len(), 3);
    let (_, desc) = h
        .registry
        .get_group_online("g1", 1, 2, true)
        .await
        .expect("desc");
    assert_eq!(desc.len(), 2);
}

#[tokio::test]
async fn group_online_desc_returns_newest_first() {
    let h = harness().await;
    h.group_api.insert_group("g1", &["u1", "u2", "u3"]).await;
    h.registry.set_online("u1", "c1", 1).await.expect("on");
    h.registry.set_online("u2", "c2", 1).await.expect("on");
    let (_, members) = h
        .registry
        .get_group_online("g1", 1, 2, true)
        .await
        .expect("page");
    assert_eq!(members.len(), 2);
    for member in &members {
        assert!(member == "u1" || member == "u2");
    }
}

#[tokio::test]
async fn online_cache_serves_and_invalidates() {
    let h = harness().await;
    assert!(!h.online_cache.get_user_online("u1").await.expect("get"));
    h.registry.set_online("u1", "c1", 1).await.expect("on");
    // The cached negative may survive until the change event lands.
    h.online_cache.invalidate("u1").await;
    assert!(h.online_cache.get_user_online("u1").await.expect("get"));
}
