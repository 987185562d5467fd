use super::{OfflinePusher, Opts};
use crate::config::GetuiConfig;
use crate::error::CoreError;
use crate::time::now_ms;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const TOKEN_TTL: Duration = Duration::from_secs(23 * 3600);

#[derive(Deserialize)]
struct AuthData {
    token: String,
}

#[derive(Deserialize)]
struct AuthResponse {
    #[serde(default)]
    code: i32,
    data: Option<AuthData>,
}

pub struct GetuiPusher {
    http: reqwest::Client,
    endpoint: String,
    app_key: String,
    master_secret: String,
    token: Mutex<Option<(String, Instant)>>,
}

impl GetuiPusher {
    pub fn new(cfg: &GetuiConfig) -> Result<GetuiPusher, CoreError> {
        if cfg.endpoint.trim().is_empty() {
            return Err(CoreError::ArgInvalid("getui.endpoint"));
        }
        let http = reqwest::Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        Ok(GetuiPusher {
            http,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            app_key: cfg.app_key.clone(),
            master_secret: cfg.master_secret.clone(),
            token: Mutex::new(None),
        })
    }

    async fn auth_token(&self) -> Result<String, CoreError> {
        {
            let token = self.token.lock().await;
            if let Some((value, at)) = token.as_ref() {
                if at.elapsed() < TOKEN_TTL {
                    return Ok(value.clone());
                }
            }
        }
        let timestamp = now_ms().to_string();
        let sign = hex_digest(&format!(
            "{}{}{}",
            self.app_key, timestamp, self.master_secret
        ));
        let resp = self
            .http
            .post(format!("{}/auth", self.endpoint))
            .json(&json!({
                "sign": sign,
                "timestamp": timestamp,
                "appkey": self.app_key,
            }))
            .send()
            .await
            .map_err(|e| CoreError::UpstreamRpc(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::UpstreamRpc(format!("getui auth {}", status.as_u16())));
        }
        let body: AuthResponse = resp
            .json()
            .await
            .map_err(|e| CoreError::UpstreamRpc(e.to_string()))?;
        let Some(data) = body.data else {
            return Err(CoreError::UpstreamRpc(format!("getui auth code {}", body.code)));
        };
        let mut token = self.token.lock().await;
        *token = Some((data.token.clone(), Instant::now()));
        Ok(data.token)
    }
}

fn hex_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[async_trait]
impl OfflinePusher for GetuiPusher {
    async fn push(
        &self,
        user_ids: &[String],
        title: &str,
        content: &str,
        opts: &Opts,
    ) -> Result<(), CoreError> {
        let token = self.auth_token().await?;
        let body = json!({
            "audience": { "alias": user_ids },
            "push_message": {
                "notification": {
                    "title": title,
                    "body": content,
                    "click_type": "startapp",
                }
            },
            "push_channel": {
                "ios": {
                    "aps": {
                        "sound": opts.ios_push_sound,
                        "alert": { "title": title, "body": content },
                    }
                }
            },
        });
        let resp = self
            .http
            .post(format!("{}/push/list/alias", self.endpoint))
            .header("token", token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::UpstreamRpc(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::UpstreamRpc(format!("getui {}", status.as_u16())));
        }
        Ok(())
    }
}
