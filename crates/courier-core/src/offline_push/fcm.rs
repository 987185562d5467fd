use super::{FcmTokenStore, OfflinePusher, Opts};
use crate::cache::MemCache;
use crate::cachekey;
use crate::config::FcmConfig;
use crate::error::CoreError;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
// Token lookup covers every client platform a user may have registered from.
const PLATFORM_RANGE: std::ops::RangeInclusive<i32> = 1..=9;

pub struct FcmPusher {
    http: reqwest::Client,
    endpoint: String,
    server_key: String,
    tokens: Arc<dyn FcmTokenStore>,
}

impl FcmPusher {
    pub fn new(cfg: &FcmConfig, tokens: Arc<dyn FcmTokenStore>) -> Result<FcmPusher, CoreError> {
        if cfg.endpoint.trim().is_empty() {
            return Err(CoreError::ArgInvalid("fcm.endpoint"));
        }
        if cfg.server_key.trim().is_empty() {
            return Err(CoreError::ArgInvalid("fcm.server_key"));
        }
        let http = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        Ok(FcmPusher {
            http,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            server_key: cfg.server_key.clone(),
            tokens,
        })
    }
}

#[async_trait]
impl OfflinePusher for FcmPusher {
    async fn push(
        &self,
        user_ids: &[String],
        title: &str,
        content: &str,
        opts: &Opts,
    ) -> Result<(), CoreError> {
        let mut registration_ids = Vec::new();
        for user_id in user_ids {
            registration_ids.extend(self.tokens.tokens(user_id).await?);
        }
        if registration_ids.is_empty() {
            return Ok(());
        }
        let body = json!({
            "registration_ids": registration_ids,
            "notification": {
                "title": title,
                "body": content,
                "sound": opts.ios_push_sound,
            },
            "data": {
                "ex": opts.ex,
                "clientMsgID": opts.signal.client_msg_id,
            },
            "content_available": opts.ios_badge_count,
        });
        let resp = self
            .http
            .post(format!("{}/fcm/send", self.endpoint))
            .header("Authorization", format!("key={}", self.server_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamRpc(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::UpstreamRpc(format!("fcm {}", status.as_u16())));
        }
        Ok(())
    }
}

#[async_trait]
impl FcmTokenStore for MemCache {
    async fn tokens(&self, user_id: &str) -> Result<Vec<String>, CoreError> {
        let mut tokens = Vec::new();
        for platform_id in PLATFORM_RANGE {
            if let Some(token) = self.get_string(&cachekey::fcm_token(platform_id, user_id)).await
            {
                tokens.push(token);
            }
        }
        Ok(tokens)
    }
}
