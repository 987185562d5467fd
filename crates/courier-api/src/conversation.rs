use crate::content::SessionType;
use crate::types::MsgData;

const SINGLE_PREFIX: &str = "si_";
const READ_GROUP_PREFIX: &str = "sg_";
const NOTIFICATION_PREFIX: &str = "n_";

pub fn single_conversation_id(a: &str, b: &str) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("{}{}_{}", SINGLE_PREFIX, low, high)
}

pub fn group_conversation_id(group_id: &str) -> String {
    format!("{}{}", READ_GROUP_PREFIX, group_id)
}

pub fn notification_conversation_id(send_id: &str, recv_id: &str) -> String {
    format!("{}{}_{}", NOTIFICATION_PREFIX, send_id, recv_id)
}

pub fn conversation_id_for(msg: &MsgData) -> String {
    match SessionType::from_i32(msg.session_type) {
        Some(SessionType::ReadGroup) => group_conversation_id(&msg.group_id),
        Some(SessionType::Notification) => {
            notification_conversation_id(&msg.send_id, &msg.recv_id)
        }
        _ => single_conversation_id(&msg.send_id, &msg.recv_id),
    }
}

pub fn is_notification(conversation_id: &str) -> bool {
    conversation_id.starts_with(NOTIFICATION_PREFIX)
}

pub fn conversation_kind(conversation_id: &str) -> Option<SessionType> {
    if conversation_id.starts_with(SINGLE_PREFIX) {
        Some(SessionType::Single)
    } else if conversation_id.starts_with(READ_GROUP_PREFIX) {
        Some(SessionType::ReadGroup)
    } else if conversation_id.starts_with(NOTIFICATION_PREFIX) {
        Some(SessionType::Notification)
    } else {
        None
    }
}
