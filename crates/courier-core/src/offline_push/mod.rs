pub mod dummy;
pub mod fcm;
pub mod getui;
pub mod jpush;
pub mod options;

use crate::config::OfflinePushConfig;
use crate::error::CoreError;
use async_trait::async_trait;
use courier_api::content::{content_type, push_content_for};
use courier_api::types::MsgData;
use std::sync::Arc;

pub use self::options::{Opts, Signal};

#[async_trait]
pub trait OfflinePusher: Send + Sync {
    async fn push(
        &self,
        user_ids: &[String],
        title: &str,
        content: &str,
        opts: &Opts,
    ) -> Result<(), CoreError>;
}

// Maps user IDs to the device tokens a vendor actually addresses.
#[async_trait]
pub trait FcmTokenStore: Send + Sync {
    async fn tokens(&self, user_id: &str) -> Result<Vec<String>, CoreError>;
}

pub fn new_offline_pusher(
    cfg: &OfflinePushConfig,
    fcm_tokens: Arc<dyn FcmTokenStore>,
) -> Result<Arc<dyn OfflinePusher>, CoreError> {
    match cfg.enable.as_str() {
        "fcm" => Ok(Arc::new(fcm::FcmPusher::new(&cfg.fcm, fcm_tokens)?)),
        "getui" => Ok(Arc::new(getui::GetuiPusher::new(&cfg.getui)?)),
        "jpush" => Ok(Arc::new(jpush::JpushPusher::new(&cfg.jpush)?)),
        "dummy" | "" => Ok(Arc::new(dummy::DummyPusher)),
        _ => Err(CoreError::ArgInvalid("offline_push.enable")),
    }
}

// Title defaults by content type; sender-supplied info wins; empty content
// mirrors the title.
pub fn build_push_infos(msg: &MsgData) -> (String, String, Opts) {
    let mut opts = Opts {
        signal: Signal {
            client_msg_id: msg.client_msg_id.clone(),
        },
        ..Opts::default()
    };
    let mut title = String::new();
    let mut content = String::new();
    if let Some(info) = msg.offline_push_info.as_ref() {
        opts.ios_badge_count = info.ios_badge_count;
        opts.ios_push_sound = info.ios_push_sound.clone();
        opts.ex = info.ex.clone();
        title = info.title.clone();
        content = info.desc.clone();
    }
    if title.is_empty() {
        title = match msg.content_type {
            content_type::SIGNALING_NOTIFICATION => {
                push_content_for(content_type::SIGNAL_MSG).to_string()
            }
            other => push_content_for(other).to_string(),
        };
    }
    if content.is_empty() {
        content = title.clone();
    }
    (title, content, opts)
}

#[cfg(test)]
mod shaping_tests {
    use super::*;
    use courier_api::types::OfflinePushInfo;

    fn msg_with(content_type: i32, info: Option<OfflinePushInfo>) -> MsgData {
        MsgData {
            client_msg_id: "c-1".to_string(),
            content_type,
            offline_push_info: info,
            ..MsgData::default()
        }
    }

    #[test]
    fn title_defaults_by_content_type() {
        let (title, content, _) = build_push_infos(&msg_with(content_type::TEXT, None));
        assert_eq!(title, "[TEXT]");
        assert_eq!(content, "[TEXT]");
        let (title, _, _) = build_push_infos(&msg_with(content_type::VOICE, None));
        assert_eq!(title, "[VOICE]");
        let (title, _, _) =
            build_push_infos(&msg_with(content_type::SIGNALING_NOTIFICATION, None));
        assert_eq!(title, "[SIGNALINVITE]");
        let (title, _, _) = build_push_infos(&msg_with(content_type::CUSTOM, None));
        assert_eq!(title, "[NEWMSG]");
    }

    #[test]
    fn supplied_info_wins_and_content_mirrors_title() {
        let info = OfflinePushInfo {
            title: "call from u1".to_string(),
            ios_push_sound: "ring".to_string(),
            ios_badge_count: true,
            ..OfflinePushInfo::default()
        };
        let (title, content, opts) =
            build_push_infos(&msg_with(content_type::TEXT, Some(info)));
        assert_eq!(title, "call from u1");
        assert_eq!(content, "call from u1");
        assert!(opts.ios_badge_count);
        assert_eq!(opts.ios_push_sound, "ring");
        assert_eq!(opts.signal.client_msg_id, "c-1");
    }
}
