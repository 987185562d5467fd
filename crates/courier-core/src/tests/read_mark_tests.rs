use super::{encode_envelope, harness, single_msg};
use courier_api::content::content_type;
use courier_api::conversation::single_conversation_id;
use courier_api::types::{MarkAsReadTips, NotificationElem};
use std::time::Duration;

fn read_receipt(conversation_id: &str, reader: &str, seqs: Vec<i64>, has_read_seq: i64) -> Vec<u8> {
    let tips = MarkAsReadTips {
        conversation_id: conversation_id.to_string(),
        mark_as_read_user_id: reader.to_string(),
        has_read_seq,
        seqs,
    };
    NotificationElem::wrap(&tips).expect("wrap")
}

#[tokio::test]
async fn read_receipt_lands_within_a_tick() {
    let h = harness().await;
    let conversation_id = single_conversation_id("u1", "u2");
    let mut msg = single_msg("u2", "u1");
    msg.content_type = content_type::HAS_READ_RECEIPT;
    msg.content = read_receipt(&conversation_id, "u2", vec![10, 12, 11], 0);
    h.handler
        .handle_payload(&encode_envelope(&conversation_id, &msg))
        .await;
    // The harness aggregator ticks every second.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(
        h.seq_user
            .get_user_read_seq(&conversation_id, "u2")
            .await
            .expect("read"),
        12
    );
}

#[tokio::test]
async fn later_receipts_raise_the_mark_between_ticks() {
    let h = harness().await;
    let conversation_id = single_conversation_id("u1", "u2");
    for has_read_seq in [5, 9, 7] {
        let mut msg = single_msg("u2", "u1");
        msg.content_type = content_type::HAS_READ_RECEIPT;
        msg.content = read_receipt(&conversation_id, "u2", Vec::new(), has_read_seq);
        h.handler
            .handle_payload(&encode_envelope(&conversation_id, &msg))
            .await;
    }
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(
        h.seq_user
            .get_user_read_seq(&conversation_id, "u2")
            .await
            .expect("read"),
        9
    );
}

#[tokio::test]
async fn non_positive_receipts_are_ignored() {
    let h = harness().await;
    let conversation_id = single_conversation_id("u1", "u2");
    let mut msg = single_msg("u2", "u1");
    msg.content_type = content_type::HAS_READ_RECEIPT;
    msg.content = read_receipt(&conversation_id, "u2", Vec::new(), 0);
    h.handler
        .handle_payload(&encode_envelope(&conversation_id, &msg))
        .await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(
        h.seq_user
            .get_user_read_seq(&conversation_id, "u2")
            .await
            .expect("read"),
        0
    );
}

#[tokio::test]
async fn aggregator_never_regresses_a_persisted_mark() {
    let h = harness().await;
    let conversation_id = single_conversation_id("u1", "u2");
    h.seq_user
        .set_user_read_seq(&conversation_id, "u2", 50)
        .await
        .expect("seed");
    let mut msg = single_msg("u2", "u1");
    msg.content_type = content_type::HAS_READ_RECEIPT;
    msg.content = read_receipt(&conversation_id, "u2", Vec::new(), 20);
    h.handler
        .handle_payload(&encode_envelope(&conversation_id, &msg))
        .await;
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(
        h.seq_user
            .get_user_read_seq(&conversation_id, "u2")
            .await
            .expect("read"),
        50
    );
}
