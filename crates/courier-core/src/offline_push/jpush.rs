use super::{OfflinePusher, Opts};
use crate::config::JpushConfig;
use crate::error::CoreError;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

pub struct JpushPusher {
    http: reqwest::Client,
    endpoint: String,
    app_key: String,
    master_secret: String,
}

impl JpushPusher {
    pub fn new(cfg: &JpushConfig) -> Result<JpushPusher, CoreError> {
        if cfg.endpoint.trim().is_empty() {
            return Err(CoreError::ArgInvalid("jpush.endpoint"));
        }
        let http = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        Ok(JpushPusher {
            http,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            app_key: cfg.app_key.clone(),
            master_secret: cfg.master_secret.clone(),
        })
    }
}

#[async_trait]
impl OfflinePusher for JpushPusher {
    async fn push(
        &self,
        user_ids: &[String],
        title: &str,
        content: &str,
        opts: &Opts,
    ) -> Result<(), CoreError> {
        let body = json!({
            "platform": "all",
            "audience": { "alias": user_ids },
            "notification": {
                "alert": content,
                "android": { "alert": content, "title": title },
                "ios": {
                    "alert": content,
                    "sound": opts.ios_push_sound,
                    "badge": if opts.ios_badge_count { "+1" } else { "0" },
                },
            },
            "options": { "apns_production": true },
        });
        let resp = self
            .http
            .post(format!("{}/v3/push", self.endpoint))
            .basic_auth(&self.app_key, Some(&self.master_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamRpc(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::UpstreamRpc(format!("jpush {}", status.as_u16())));
        }
        Ok(())
    }
}
