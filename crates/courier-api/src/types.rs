use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, PartialEq, prost::Message)]
pub struct PushMsgDataToMq {
    #[prost(string, tag = "1")]
    pub conversation_id: String,
    #[prost(message, optional, tag = "2")]
    pub msg_data: Option<MsgData>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct MsgData {
    #[prost(string, tag = "1")]
    pub send_id: String,
    #[prost(string, tag = "2")]
    pub recv_id: String,
    #[prost(string, tag = "3")]
    pub group_id: String,
    #[prost(string, tag = "4")]
    pub client_msg_id: String,
    #[prost(string, tag = "5")]
    pub server_msg_id: String,
    #[prost(int32, tag = "6")]
    pub sender_platform_id: i32,
    #[prost(int32, tag = "7")]
    pub session_type: i32,
    #[prost(int32, tag = "8")]
    pub content_type: i32,
    #[prost(bytes = "vec", tag = "9")]
    pub content: Vec<u8>,
    #[prost(int64, tag = "10")]
    pub seq: i64,
    #[prost(int64, tag = "11")]
    pub send_time: i64,
    #[prost(map = "string, bool", tag = "12")]
    pub options: HashMap<String, bool>,
    #[prost(string, repeated, tag = "13")]
    pub at_user_id_list: Vec<String>,
    #[prost(message, optional, tag = "14")]
    pub offline_push_info: Option<OfflinePushInfo>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OfflinePushInfo {
    #[prost(string, tag = "1")]
    #[serde(default)]
    pub title: String,
    #[prost(string, tag = "2")]
    #[serde(default)]
    pub desc: String,
    #[prost(string, tag = "3")]
    #[serde(default)]
    pub ex: String,
    #[prost(string, tag = "4")]
    #[serde(default)]
    pub ios_push_sound: String,
    #[prost(bool, tag = "5")]
    #[serde(default)]
    pub ios_badge_count: bool,
}

// Notification payloads travel inside MsgData.content as a JSON envelope whose
// detail field is itself a JSON document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationElem {
    pub detail: String,
}

impl NotificationElem {
    pub fn wrap<T: Serialize>(detail: &T) -> Result<Vec<u8>, serde_json::Error> {
        let elem = NotificationElem {
            detail: serde_json::to_string(detail)?,
        };
        serde_json::to_vec(&elem)
    }

    pub fn unwrap<T: for<'de> Deserialize<'de>>(content: &[u8]) -> Result<T, serde_json::Error> {
        let elem: NotificationElem = serde_json::from_slice(content)?;
        serde_json::from_str(&elem.detail)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAsReadTips {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub mark_as_read_user_id: String,
    #[serde(default)]
    pub has_read_seq: i64,
    #[serde(default)]
    pub seqs: Vec<i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMemberBrief {
    pub user_id: String,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub face_url: String,
    #[serde(default)]
    pub role_level: i32,
    #[serde(default)]
    pub join_time: i64,
    #[serde(default)]
    pub join_source: i32,
    #[serde(default)]
    pub inviter_user_id: String,
    #[serde(default)]
    pub mute_end_time: i64,
    #[serde(default)]
    pub operator_user_id: String,
    #[serde(default)]
    pub ex: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberQuitTips {
    pub group_id: String,
    pub quit_user: GroupMemberBrief,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberKickedTips {
    pub group_id: String,
    #[serde(default)]
    pub kicked_user_list: Vec<GroupMemberBrief>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDismissedTips {
    pub group_id: String,
    #[serde(default)]
    pub op_user_id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusChangeTips {
    pub from_user_id: String,
    pub to_user_id: String,
    pub online: bool,
    pub platform_id: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtTextElem {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub at_user_list: Vec<String>,
    #[serde(default)]
    pub is_at_self: bool,
}
