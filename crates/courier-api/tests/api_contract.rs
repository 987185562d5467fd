use courier_api::content::{content_type, SessionType, SINGLE_CHAT};
use courier_api::conversation::conversation_id_for;
use courier_api::options::{options_with, switch_from_options, IS_SENDER_SYNC};
use courier_api::types::{MarkAsReadTips, MsgData, NotificationElem, OfflinePushInfo};
use courier_api::validation::{validate_msg, ValidationError};
use prost::Message;

fn sample_msg() -> MsgData {
    MsgData {
        send_id: "u1".to_string(),
        recv_id: "u2".to_string(),
        client_msg_id: "c-1".to_string(),
        server_msg_id: "s-1".to_string(),
        sender_platform_id: 1,
        session_type: SINGLE_CHAT,
        content_type: content_type::TEXT,
        content: b"hello".to_vec(),
        seq: 7,
        send_time: 1_700_000_000_000,
        ..MsgData::default()
    }
}

#[test]
fn envelope_round_trips_through_protobuf() {
    let msg = sample_msg();
    let encoded = msg.encode_to_vec();
    let decoded = MsgData::decode(encoded.as_slice()).expect("decode");
    assert_eq!(decoded, msg);
}

#[test]
fn offline_push_info_accepts_partial_json() {
    let info: OfflinePushInfo =
        serde_json::from_str(r#"{"title":"ping"}"#).expect("parse");
    assert_eq!(info.title, "ping");
    assert!(info.desc.is_empty());
    assert!(!info.ios_badge_count);
}

#[test]
fn notification_elem_wraps_detail_as_json_string() {
    let tips = MarkAsReadTips {
        conversation_id: "si_u1_u2".to_string(),
        mark_as_read_user_id: "u2".to_string(),
        has_read_seq: 12,
        seqs: vec![10, 12, 11],
    };
    let content = NotificationElem::wrap(&tips).expect("wrap");
    let back: MarkAsReadTips = NotificationElem::unwrap(&content).expect("unwrap");
    assert_eq!(back.has_read_seq, 12);
    assert_eq!(back.seqs, vec![10, 12, 11]);
}

#[test]
fn conversation_id_follows_session_type() {
    let mut msg = sample_msg();
    assert_eq!(conversation_id_for(&msg), "si_u1_u2");
    msg.session_type = SessionType::ReadGroup.as_i32();
    msg.group_id = "g9".to_string();
    assert_eq!(conversation_id_for(&msg), "sg_g9");
    msg.session_type = SessionType::Notification.as_i32();
    assert_eq!(conversation_id_for(&msg), "n_u1_u2");
}

#[test]
fn validation_rejects_missing_targets() {
    let mut msg = sample_msg();
    msg.recv_id = String::new();
    assert_eq!(validate_msg(&msg), Err(ValidationError::Field("recv_id")));
    let mut msg = sample_msg();
    msg.seq = 0;
    assert_eq!(validate_msg(&msg), Err(ValidationError::Field("seq")));
    assert!(validate_msg(&sample_msg()).is_ok());
}

#[test]
fn option_switches_default_on() {
    let options = options_with(&[(IS_SENDER_SYNC, false)]);
    assert!(!switch_from_options(&options, IS_SENDER_SYNC));
    assert!(switch_from_options(&options, "unknown"));
}
