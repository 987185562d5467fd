use super::{
    encode_envelope, fast_config, group_msg, harness, harness_with, single_msg,
    ScriptedHookTransport,
};
use crate::bus::channel_bus;
use crate::metrics::Metrics;
use courier_api::content::content_type;
use courier_api::conversation::{group_conversation_id, single_conversation_id};
use courier_api::options::{options_with, IS_OFFLINE_PUSH, IS_SENDER_SYNC};
use courier_api::types::{
    GroupDismissedTips, GroupMemberBrief, MemberKickedTips, NotificationElem,
};
use serde_json::json;

#[tokio::test]
async fn online_success_skips_the_offline_pusher() {
    let h = harness().await;
    h.registry.set_online("u2", "conn-1", 1).await.expect("on");
    h.gateway.connect("u2", 1).await;
    let msg = single_msg("u1", "u2");
    h.handler
        .handle_payload(&encode_envelope(&single_conversation_id("u1", "u2"), &msg))
        .await;
    assert_eq!(h.gateway.push_requests().await, vec![vec!["u2".to_string()]]);
    assert!(h.offline.calls().await.is_empty());
}

#[tokio::test]
async fn gateway_failure_falls_through_to_offline() {
    let h = harness().await;
    h.registry.set_online("u2", "conn-1", 1).await.expect("on");
    h.gateway.connect("u2", 1).await;
    h.gateway.break_connection("u2", 1).await;
    let msg = single_msg("u1", "u2");
    h.handler
        .handle_payload(&encode_envelope(&single_conversation_id("u1", "u2"), &msg))
        .await;
    let calls = h.offline.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, vec!["u2".to_string()]);
    assert_eq!(calls[0].1, "[TEXT]");
}

#[tokio::test]
async fn offline_recipient_never_touches_the_gateway() {
    let h = harness().await;
    let msg = single_msg("u1", "u2");
    h.handler
        .handle_payload(&encode_envelope(&single_conversation_id("u1", "u2"), &msg))
        .await;
    assert!(h.gateway.push_requests().await.is_empty());
    let calls = h.offline.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, vec!["u2".to_string()]);
}

#[tokio::test]
async fn group_push_partitions_and_excludes_the_sender() {
    let h = harness().await;
    h.group_api.insert_group("g1", &["u1", "u2", "u3"]).await;
    h.registry.set_online("u2", "conn-2", 1).await.expect("on");
    h.gateway.connect("u2", 1).await;
    let msg = group_msg("u1", "g1");
    h.handler
        .handle_payload(&encode_envelope(&group_conversation_id("g1"), &msg))
        .await;
    // Exactly the online members reach the gateway.
    assert_eq!(h.gateway.push_requests().await, vec![vec!["u2".to_string()]]);
    let calls = h.offline.calls().await;
    assert_eq!(calls.len(), 1);
    let mut offline_ids = calls[0].0.clone();
    offline_ids.sort();
    assert_eq!(offline_ids, vec!["u3".to_string()]);
}

#[tokio::test]
async fn stale_messages_are_dropped() {
    let h = harness().await;
    h.registry.set_online("u2", "conn-1", 1).await.expect("on");
    h.gateway.connect("u2", 1).await;
    let mut msg = single_msg("u1", "u2");
    msg.send_time -= 30_000;
    h.handler
        .handle_payload(&encode_envelope(&single_conversation_id("u1", "u2"), &msg))
        .await;
    assert_eq!(Metrics::get(&h.metrics.msg_stale_dropped), 1);
    assert!(h.gateway.push_requests().await.is_empty());
    assert!(h.offline.calls().await.is_empty());
}

#[tokio::test]
async fn sender_sync_adds_the_sender_to_the_fan_out() {
    let h = harness().await;
    h.registry.set_online("u1", "conn-1", 1).await.expect("on");
    h.registry.set_online("u2", "conn-2", 1).await.expect("on");
    h.gateway.connect("u1", 1).await;
    h.gateway.connect("u2", 1).await;
    let mut msg = single_msg("u1", "u2");
    msg.options = options_with(&[(IS_SENDER_SYNC, true)]);
    h.handler
        .handle_payload(&encode_envelope(&single_conversation_id("u1", "u2"), &msg))
        .await;
    let requests = h.gateway.push_requests().await;
    assert_eq!(requests.len(), 1);
    let mut asked = requests[0].clone();
    asked.sort();
    assert_eq!(asked, vec!["u1".to_string(), "u2".to_string()]);
}

#[tokio::test]
async fn offline_push_switch_off_means_no_vendor_call() {
    let h = harness().await;
    let mut msg = single_msg("u1", "u2");
    msg.options = options_with(&[(IS_SENDER_SYNC, false), (IS_OFFLINE_PUSH, false)]);
    h.handler
        .handle_payload(&encode_envelope(&single_conversation_id("u1", "u2"), &msg))
        .await;
    assert!(h.offline.calls().await.is_empty());
}

#[tokio::test]
async fn typing_and_signaling_never_push_offline() {
    let h = harness().await;
    let mut msg = single_msg("u1", "u2");
    msg.content_type = content_type::TYPING;
    h.handler
        .handle_payload(&encode_envelope(&single_conversation_id("u1", "u2"), &msg))
        .await;
    let mut msg = single_msg("u1", "u2");
    msg.content_type = content_type::SIGNALING_NOTIFICATION;
    h.handler
        .handle_payload(&encode_envelope(&single_conversation_id("u1", "u2"), &msg))
        .await;
    assert!(h.offline.calls().await.is_empty());
}

#[tokio::test]
async fn vendor_failure_is_counted_but_not_fatal() {
    let h = harness().await;
    *h.offline.fail.lock().await = true;
    let msg = single_msg("u1", "u2");
    h.handler
        .handle_payload(&encode_envelope(&single_conversation_id("u1", "u2"), &msg))
        .await;
    assert_eq!(Metrics::get(&h.metrics.offline_push_failed), 1);
    assert_eq!(Metrics::get(&h.metrics.msg_poison_skipped), 0);
    assert_eq!(Metrics::get(&h.metrics.msg_transient_skipped), 0);
}

#[tokio::test]
async fn kicked_members_get_the_farewell_and_a_synced_max_seq() {
    let h = harness().await;
    // u3 is already gone from the member list when the notification lands.
    h.group_api.insert_group("g1", &["u1", "u2"]).await;
    let conversation_id = group_conversation_id("g1");
    h.seq.malloc(&conversation_id, 1).await.expect("seed seq");
    let max_seq = h.seq.get_max_seq(&conversation_id).await.expect("max");
    assert!(max_seq > 0);

    let tips = MemberKickedTips {
        group_id: "g1".to_string(),
        kicked_user_list: vec![GroupMemberBrief {
            user_id: "u3".to_string(),
            ..GroupMemberBrief::default()
        }],
    };
    let mut msg = group_msg("u1", "g1");
    msg.content_type = content_type::MEMBER_KICKED_NOTIFICATION;
    msg.content = NotificationElem::wrap(&tips).expect("wrap");
    h.handler
        .handle_payload(&encode_envelope(&conversation_id, &msg))
        .await;

    assert_eq!(
        h.seq_user
            .get_user_max_seq(&conversation_id, "u3")
            .await
            .expect("max"),
        max_seq
    );
    // The kicked user still receives the farewell, here as offline residue.
    let calls = h.offline.calls().await;
    assert_eq!(calls.len(), 1);
    assert!(calls[0].0.contains(&"u3".to_string()));
}

#[tokio::test]
async fn dismissal_runs_after_the_notification_fan_out() {
    let h = harness().await;
    h.group_api.insert_group("g1", &["u1", "u2"]).await;
    let tips = GroupDismissedTips {
        group_id: "g1".to_string(),
        op_user_id: "u1".to_string(),
    };
    let mut msg = group_msg("u1", "g1");
    msg.content_type = content_type::GROUP_DISMISSED_NOTIFICATION;
    msg.content = NotificationElem::wrap(&tips).expect("wrap");
    h.handler
        .handle_payload(&encode_envelope(&group_conversation_id("g1"), &msg))
        .await;
    assert_eq!(h.group_api.dismissed_groups().await, vec!["g1".to_string()]);
    // The farewell was still delivered (everyone offline here).
    assert_eq!(h.offline.calls().await.len(), 1);
}

#[tokio::test]
async fn offline_hook_replaces_recipients_and_push_info() {
    let mut cfg = fast_config();
    cfg.webhooks.before_offline_push.enable = true;
    let transport = ScriptedHookTransport::new(Some(Ok(json!({
        "userIDs": ["u9"],
        "offlinePushInfo": {"title": "hooked", "desc": "", "ex": "", "iosPushSound": "", "iosBadgeCount": false},
    }))));
    let h = harness_with(cfg, transport.clone()).await;
    let msg = single_msg("u1", "u2");
    h.handler
        .handle_payload(&encode_envelope(&single_conversation_id("u1", "u2"), &msg))
        .await;
    let calls = h.offline.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, vec!["u9".to_string()]);
    assert_eq!(calls[0].1, "hooked");
    assert_eq!(transport.seen.lock().await.len(), 1);
}

#[tokio::test]
async fn fail_closed_online_hook_aborts_the_message() {
    let mut cfg = fast_config();
    cfg.webhooks.before_online_push.enable = true;
    cfg.webhooks.before_online_push.fail_open = false;
    let transport = ScriptedHookTransport::new(Some(Err(())));
    let h = harness_with(cfg, transport).await;
    h.registry.set_online("u2", "conn-1", 1).await.expect("on");
    h.gateway.connect("u2", 1).await;
    let msg = single_msg("u1", "u2");
    h.handler
        .handle_payload(&encode_envelope(&single_conversation_id("u1", "u2"), &msg))
        .await;
    assert_eq!(Metrics::get(&h.metrics.hook_rejected), 1);
    assert!(h.gateway.push_requests().await.is_empty());
    assert!(h.offline.calls().await.is_empty());
}

#[tokio::test]
async fn fail_open_hook_keeps_the_original_recipients() {
    let mut cfg = fast_config();
    cfg.webhooks.before_offline_push.enable = true;
    let transport = ScriptedHookTransport::new(Some(Err(())));
    let h = harness_with(cfg, transport).await;
    let msg = single_msg("u1", "u2");
    h.handler
        .handle_payload(&encode_envelope(&single_conversation_id("u1", "u2"), &msg))
        .await;
    let calls = h.offline.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, vec!["u2".to_string()]);
}

#[tokio::test]
async fn run_consumes_and_commits_in_order() {
    let h = harness().await;
    let (producer, mut bus) = channel_bus(16);
    let conversation_id = single_conversation_id("u1", "u2");
    producer
        .send(
            conversation_id.clone(),
            encode_envelope(&conversation_id, &single_msg("u1", "u2")),
        )
        .await
        .expect("send");
    producer
        .send(conversation_id.clone(), b"not protobuf".to_vec())
        .await
        .expect("send");
    drop(producer);
    h.handler.run(&mut bus).await.expect("run");
    // The poison record was skipped but its offset still committed.
    assert_eq!(bus.committed(), 2);
    assert_eq!(Metrics::get(&h.metrics.msg_consumed), 2);
    assert_eq!(Metrics::get(&h.metrics.msg_poison_skipped), 1);
}
