pub const MALLOC_SEQ: &str = "MALLOC_SEQ:";
pub const MALLOC_SEQ_LOCK: &str = "MALLOC_SEQ_LOCK:";
pub const SEQ_USER_READ_SEQ: &str = "SEQ_USER_READ_SEQ:";
pub const SEQ_USER_READ_LOCK: &str = "SEQ_USER_READ_LOCK_SEQ:";
pub const SEQ_USER_MAX_SEQ: &str = "SEQ_USER_MAX_SEQ:";
pub const SEQ_USER_MIN_SEQ: &str = "SEQ_USER_MIN_SEQ:";
pub const USER_STATE_CONN: &str = "USER_STATE_CONN:";
pub const SUBSCRIPTION: &str = "SUBSCRIPTION:";
pub const SUBSCRIBED: &str = "SUBSCRIBED:";
pub const GROUP_ONLINE: &str = "GROUP_ONLINE:";
pub const GROUP_ONLINE_TAG: &str = "GROUP_ONLINE_TAG:";
pub const FCM_TOKEN: &str = "FCM_TOKEN:";

pub fn malloc_seq(conversation_id: &str) -> String {
    format!("{}{}", MALLOC_SEQ, conversation_id)
}

pub fn malloc_seq_lock(conversation_id: &str) -> String {
    format!("{}{}", MALLOC_SEQ_LOCK, conversation_id)
}

pub fn seq_user_read_seq(conversation_id: &str, user_id: &str) -> String {
    format!("{}{}:{}", SEQ_USER_READ_SEQ, conversation_id, user_id)
}

pub fn seq_user_read_lock(conversation_id: &str, user_id: &str) -> String {
    format!("{}{}:{}", SEQ_USER_READ_LOCK, conversation_id, user_id)
}

pub fn seq_user_max_seq(conversation_id: &str, user_id: &str) -> String {
    format!("{}{}:{}", SEQ_USER_MAX_SEQ, conversation_id, user_id)
}

pub fn seq_user_min_seq(conversation_id: &str, user_id: &str) -> String {
    format!("{}{}:{}", SEQ_USER_MIN_SEQ, conversation_id, user_id)
}

pub fn user_state_conn(user_id: &str) -> String {
    format!("{}{}", USER_STATE_CONN, user_id)
}

pub fn subscription(user_id: &str) -> String {
    format!("{}{}", SUBSCRIPTION, user_id)
}

pub fn subscribed(user_id: &str) -> String {
    format!("{}{}", SUBSCRIBED, user_id)
}

pub fn group_online(group_id: &str) -> String {
    format!("{}{}", GROUP_ONLINE, group_id)
}

pub fn group_online_tag(group_id: &str) -> String {
    format!("{}{}", GROUP_ONLINE_TAG, group_id)
}

pub fn fcm_token(platform_id: i32, user_id: &str) -> String {
    format!("{}{}:{}", FCM_TOKEN, platform_id, user_id)
}
