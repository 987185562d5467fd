use crate::config::HookSetting;
use crate::error::CoreError;
use async_trait::async_trait;
use courier_api::content::content_type;
use courier_api::types::{MsgData, NotificationElem, OfflinePushInfo};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub const CALLBACK_BEFORE_ONLINE_PUSH: &str = "beforeOnlinePush";
pub const CALLBACK_BEFORE_OFFLINE_PUSH: &str = "beforeOfflinePush";
pub const CALLBACK_BEFORE_SUPER_GROUP_ONLINE_PUSH: &str = "beforeSuperGroupOnlinePush";
pub const CALLBACK_BEFORE_CREATE_GROUP: &str = "beforeCreateGroup";
pub const CALLBACK_BEFORE_MEMBER_JOIN_GROUP: &str = "beforeMemberJoinGroup";
pub const CALLBACK_AFTER_CREATE_GROUP: &str = "afterCreateGroup";
pub const CALLBACK_AFTER_JOIN_GROUP: &str = "afterJoinGroup";
pub const CALLBACK_QUIT_GROUP: &str = "quitGroup";
pub const CALLBACK_DISMISS_GROUP: &str = "dismissGroup";
pub const CALLBACK_BEFORE_SET_GROUP_INFO: &str = "beforeSetGroupInfo";
pub const CALLBACK_AFTER_SET_GROUP_INFO: &str = "afterSetGroupInfo";
pub const CALLBACK_AFTER_TRANSFER_GROUP_OWNER: &str = "afterTransferGroupOwner";
pub const CALLBACK_BEFORE_SET_GROUP_MEMBER_INFO: &str = "beforeSetGroupMemberInfo";
pub const CALLBACK_AFTER_SET_GROUP_MEMBER_INFO: &str = "afterSetGroupMemberInfo";

#[async_trait]
pub trait HookTransport: Send + Sync {
    async fn post(&self, url: &str, body: Value, timeout: Duration) -> Result<Value, CoreError>;
}

pub struct HttpHookTransport {
    http: reqwest::Client,
}

impl HttpHookTransport {
    pub fn new() -> Result<HttpHookTransport, CoreError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        Ok(HttpHookTransport { http })
    }
}

#[async_trait]
impl HookTransport for HttpHookTransport {
    async fn post(&self, url: &str, body: Value, timeout: Duration) -> Result<Value, CoreError> {
        let resp = self
            .http
            .post(url)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamRpc(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::UpstreamRpc(format!("hook {}", status.as_u16())));
        }
        resp.json()
            .await
            .map_err(|e| CoreError::UpstreamRpc(e.to_string()))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BeforePushReq<'a> {
    callback_command: &'static str,
    operation_id: &'a str,
    platform_id: i32,
    #[serde(rename = "userIDs", skip_serializing_if = "Option::is_none")]
    user_ids: Option<&'a [String]>,
    #[serde(rename = "groupID")]
    group_id: &'a str,
    #[serde(rename = "clientMsgID")]
    client_msg_id: &'a str,
    #[serde(rename = "sendID")]
    send_id: &'a str,
    content_type: i32,
    session_type: i32,
    #[serde(rename = "atUserIDs")]
    at_user_ids: &'a [String],
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    offline_push_info: Option<&'a OfflinePushInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seq: Option<i64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct HookPushResponse {
    #[serde(rename = "userIDs", alias = "userIds", default)]
    pub user_ids: Option<Vec<String>>,
    #[serde(rename = "offlinePushInfo", default)]
    pub offline_push_info: Option<OfflinePushInfo>,
}

// Notification payloads are forwarded as their inner detail document, plain
// content as lossy UTF-8.
fn content_string(msg: &MsgData) -> String {
    if (1000..=5000).contains(&msg.content_type) {
        if let Ok(elem) = serde_json::from_slice::<NotificationElem>(&msg.content) {
            return elem.detail;
        }
    }
    String::from_utf8_lossy(&msg.content).to_string()
}

pub struct WebhookClient {
    url: String,
    transport: Arc<dyn HookTransport>,
}

impl WebhookClient {
    pub fn new(url: impl Into<String>, transport: Arc<dyn HookTransport>) -> WebhookClient {
        WebhookClient {
            url: url.into(),
            transport,
        }
    }

    pub async fn before_online_push(
        &self,
        setting: &HookSetting,
        operation_id: &str,
        user_ids: &[String],
        msg: &MsgData,
    ) -> Result<Option<Vec<String>>, CoreError> {
        if msg.content_type == content_type::TYPING
            || user_ids.iter().any(|u| *u == msg.send_id)
        {
            return Ok(None);
        }
        let req = self.push_req(CALLBACK_BEFORE_ONLINE_PUSH, operation_id, Some(user_ids), msg);
        let resp = self.post_hook(setting, req).await?;
        Ok(resp.and_then(|r| r.user_ids).filter(|ids| !ids.is_empty()))
    }

    pub async fn before_group_online_push(
        &self,
        setting: &HookSetting,
        operation_id: &str,
        msg: &MsgData,
    ) -> Result<Option<Vec<String>>, CoreError> {
        if msg.content_type == content_type::TYPING {
            return Ok(None);
        }
        let mut req = self.push_req(
            CALLBACK_BEFORE_SUPER_GROUP_ONLINE_PUSH,
            operation_id,
            None,
            msg,
        );
        req.seq = Some(msg.seq);
        let resp = self.post_hook(setting, req).await?;
        Ok(resp.and_then(|r| r.user_ids).filter(|ids| !ids.is_empty()))
    }

    pub async fn before_offline_push(
        &self,
        setting: &HookSetting,
        operation_id: &str,
        user_ids: &[String],
        msg: &MsgData,
    ) -> Result<(Option<Vec<String>>, Option<OfflinePushInfo>), CoreError> {
        if msg.content_type == content_type::TYPING {
            return Ok((None, None));
        }
        let mut req = self.push_req(CALLBACK_BEFORE_OFFLINE_PUSH, operation_id, Some(user_ids), msg);
        req.offline_push_info = msg.offline_push_info.as_ref();
        let Some(resp) = self.post_hook(setting, req).await? else {
            return Ok((None, None));
        };
        Ok((
            resp.user_ids.filter(|ids| !ids.is_empty()),
            resp.offline_push_info,
        ))
    }

    fn push_req<'a>(
        &self,
        command: &'static str,
        operation_id: &'a str,
        user_ids: Option<&'a [String]>,
        msg: &'a MsgData,
    ) -> BeforePushReq<'a> {
        BeforePushReq {
            callback_command: command,
            operation_id,
            platform_id: msg.sender_platform_id,
            user_ids,
            group_id: &msg.group_id,
            client_msg_id: &msg.client_msg_id,
            send_id: &msg.send_id,
            content_type: msg.content_type,
            session_type: msg.session_type,
            at_user_ids: &msg.at_user_id_list,
            content: content_string(msg),
            offline_push_info: None,
            seq: None,
        }
    }

    async fn post_hook(
        &self,
        setting: &HookSetting,
        req: BeforePushReq<'_>,
    ) -> Result<Option<HookPushResponse>, CoreError> {
        if !setting.enable || self.url.trim().is_empty() {
            return Ok(None);
        }
        let body = serde_json::to_value(&req)
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        let timeout = Duration::from_millis(setting.timeout_ms.max(1));
        match self.transport.post(&self.url, body, timeout).await {
            Ok(value) => {
                let parsed: HookPushResponse = serde_json::from_value(value)
                    .map_err(|e| CoreError::UpstreamRpc(format!("hook body: {}", e)))?;
                Ok(Some(parsed))
            }
            Err(e) if setting.fail_open => {
                warn!("webhook {} failed open: {}", req.callback_command, e);
                Ok(None)
            }
            Err(e) => Err(CoreError::HookRejected(e.to_string())),
        }
    }
}
