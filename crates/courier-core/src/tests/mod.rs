pub mod dispatcher_tests;
pub mod group_cache_tests;
pub mod presence_tests;
pub mod read_mark_tests;
pub mod seq_tests;
pub mod seq_user_tests;

use crate::cache::MemCache;
use crate::config::PushConfig;
use crate::dispatcher::{AllowAll, PushHandler};
use crate::error::CoreError;
use crate::gateway::OnlinePusher;
use crate::group_cache::{InMemoryGroupApi, LocalGroupCache};
use crate::hooks::{HookTransport, WebhookClient};
use crate::metrics::Metrics;
use crate::offline_push::{OfflinePusher, Opts};
use crate::online_cache::OnlineCache;
use crate::presence::PresenceRegistry;
use crate::read_mark::ReadMarkAggregator;
use crate::seq_alloc::SeqAllocator;
use crate::seq_user::SeqUserService;
use crate::store::{MemSeqStore, MemSeqUserStore};
use crate::time::now_ms;
use async_trait::async_trait;
use courier_api::content::{content_type, SessionType};
use courier_api::options::{options_with, IS_SENDER_SYNC};
use courier_api::types::{MsgData, PushMsgDataToMq};
use courier_gateway::{InMemoryGateway, StaticDiscovery};
use prost::Message;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub struct RecordingPusher {
    pub calls: Mutex<Vec<(Vec<String>, String, String, Opts)>>,
    pub fail: Mutex<bool>,
}

impl RecordingPusher {
    pub fn new() -> Arc<RecordingPusher> {
        Arc::new(RecordingPusher {
            calls: Mutex::new(Vec::new()),
            fail: Mutex::new(false),
        })
    }

    pub async fn calls(&self) -> Vec<(Vec<String>, String, String, Opts)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl OfflinePusher for RecordingPusher {
    async fn push(
        &self,
        user_ids: &[String],
        title: &str,
        content: &str,
        opts: &Opts,
    ) -> Result<(), CoreError> {
        self.calls.lock().await.push((
            user_ids.to_vec(),
            title.to_string(),
            content.to_string(),
            opts.clone(),
        ));
        if *self.fail.lock().await {
            return Err(CoreError::UpstreamRpc("vendor".to_string()));
        }
        Ok(())
    }
}

// Scripted webhook transport; None means "answer with an empty object".
pub struct ScriptedHookTransport {
    pub reply: Mutex<Option<Result<Value, ()>>>,
    pub seen: Mutex<Vec<Value>>,
}

impl ScriptedHookTransport {
    pub fn new(reply: Option<Result<Value, ()>>) -> Arc<ScriptedHookTransport> {
        Arc::new(ScriptedHookTransport {
            reply: Mutex::new(reply),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl HookTransport for ScriptedHookTransport {
    async fn post(
        &self,
        _url: &str,
        body: Value,
        _timeout: Duration,
    ) -> Result<Value, CoreError> {
        self.seen.lock().await.push(body);
        match self.reply.lock().await.clone() {
            Some(Ok(value)) => Ok(value),
            Some(Err(())) => Err(CoreError::UpstreamRpc("hook".to_string())),
            None => Ok(serde_json::json!({})),
        }
    }
}

pub struct Harness {
    pub cache: Arc<MemCache>,
    pub seq_store: Arc<MemSeqStore>,
    pub seq_user_store: Arc<MemSeqUserStore>,
    pub seq: Arc<SeqAllocator>,
    pub seq_user: Arc<SeqUserService>,
    pub group_api: Arc<InMemoryGroupApi>,
    pub registry: Arc<PresenceRegistry>,
    pub online_cache: Arc<OnlineCache>,
    pub gateway: Arc<InMemoryGateway>,
    pub offline: Arc<RecordingPusher>,
    pub metrics: Arc<Metrics>,
    pub handler: PushHandler,
    pub aggregator: ReadMarkAggregator,
}

pub fn fast_config() -> PushConfig {
    let mut cfg = PushConfig::default();
    cfg.aggregator.tick_secs = 1;
    cfg
}

pub async fn harness() -> Harness {
    harness_with(fast_config(), ScriptedHookTransport::new(None)).await
}

pub async fn harness_with(
    cfg: PushConfig,
    hook_transport: Arc<ScriptedHookTransport>,
) -> Harness {
    let cache = Arc::new(MemCache::new());
    let seq_store = Arc::new(MemSeqStore::new());
    let seq_user_store = Arc::new(MemSeqUserStore::new());
    let seq = Arc::new(SeqAllocator::new(cache.clone(), seq_store.clone(), &cfg));
    let seq_user = Arc::new(SeqUserService::new(
        cache.clone(),
        seq_user_store.clone(),
        &cfg,
    ));
    let group_api = Arc::new(InMemoryGroupApi::new());
    let registry = Arc::new(PresenceRegistry::new(cache.clone(), group_api.clone()));
    let online_cache = OnlineCache::new(registry.clone(), cfg.online_cache_ttl());
    let gateway = Arc::new(InMemoryGateway::new("gw-1"));
    let discovery = Arc::new(StaticDiscovery::new(vec![gateway.clone()]));
    let offline = RecordingPusher::new();
    let metrics = Metrics::new();
    let group_cache = Arc::new(LocalGroupCache::new(
        group_api.clone(),
        Duration::from_secs(60),
    ));
    let webhook = WebhookClient::new("http://hooks.test/callback", hook_transport);
    let (handler, aggregator) = PushHandler::new(
        cfg,
        online_cache.clone(),
        OnlinePusher::new(discovery),
        offline.clone(),
        group_cache,
        seq.clone(),
        seq_user.clone(),
        Arc::new(AllowAll),
        webhook,
        metrics.clone(),
    );
    Harness {
        cache,
        seq_store,
        seq_user_store,
        seq,
        seq_user,
        group_api,
        registry,
        online_cache,
        gateway,
        offline,
        metrics,
        handler,
        aggregator,
    }
}

pub fn single_msg(send_id: &str, recv_id: &str) -> MsgData {
    MsgData {
        send_id: send_id.to_string(),
        recv_id: recv_id.to_string(),
        client_msg_id: format!("c-{}", send_id),
        server_msg_id: format!("s-{}", send_id),
        sender_platform_id: 1,
        session_type: SessionType::Single.as_i32(),
        content_type: content_type::TEXT,
        content: b"hi".to_vec(),
        seq: 1,
        send_time: now_ms(),
        options: options_with(&[(IS_SENDER_SYNC, false)]),
        ..MsgData::default()
    }
}

pub fn group_msg(send_id: &str, group_id: &str) -> MsgData {
    MsgData {
        send_id: send_id.to_string(),
        group_id: group_id.to_string(),
        client_msg_id: format!("c-{}", send_id),
        server_msg_id: format!("s-{}", send_id),
        sender_platform_id: 1,
        session_type: SessionType::ReadGroup.as_i32(),
        content_type: content_type::TEXT,
        content: b"hi".to_vec(),
        seq: 1,
        send_time: now_ms(),
        options: options_with(&[(IS_SENDER_SYNC, false)]),
        ..MsgData::default()
    }
}

pub fn encode_envelope(conversation_id: &str, msg: &MsgData) -> Vec<u8> {
    PushMsgDataToMq {
        conversation_id: conversation_id.to_string(),
        msg_data: Some(msg.clone()),
    }
    .encode_to_vec()
}
