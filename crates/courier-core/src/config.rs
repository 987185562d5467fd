use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushConfig {
    #[serde(default = "default_single_seq_step")]
    pub single_seq_step: i64,
    #[serde(default = "default_group_seq_step")]
    pub group_seq_step: i64,
    #[serde(default = "default_seq_lock_expire_secs")]
    pub seq_lock_expire_secs: u64,
    #[serde(default = "default_seq_cache_expire_secs")]
    pub seq_cache_expire_secs: u64,
    #[serde(default = "default_user_seq_expire_secs")]
    pub user_seq_expire_secs: u64,
    #[serde(default = "default_read_seq_expire_secs")]
    pub read_seq_expire_secs: u64,
    #[serde(default = "default_read_seq_write_ratio")]
    pub read_seq_write_ratio: i64,
    #[serde(default = "default_online_cache_ttl_ms")]
    pub online_cache_ttl_ms: u64,
    #[serde(default = "default_stale_msg_secs")]
    pub stale_msg_secs: i64,
    #[serde(default = "default_read_channel_depth")]
    pub read_channel_depth: usize,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub offline_push: OfflinePushConfig,
}

impl Default for PushConfig {
    fn default() -> Self {
        PushConfig {
            single_seq_step: default_single_seq_step(),
            group_seq_step: default_group_seq_step(),
            seq_lock_expire_secs: default_seq_lock_expire_secs(),
            seq_cache_expire_secs: default_seq_cache_expire_secs(),
            user_seq_expire_secs: default_user_seq_expire_secs(),
            read_seq_expire_secs: default_read_seq_expire_secs(),
            read_seq_write_ratio: default_read_seq_write_ratio(),
            online_cache_ttl_ms: default_online_cache_ttl_ms(),
            stale_msg_secs: default_stale_msg_secs(),
            read_channel_depth: default_read_channel_depth(),
            aggregator: AggregatorConfig::default(),
            webhooks: WebhooksConfig::default(),
            offline_push: OfflinePushConfig::default(),
        }
    }
}

impl PushConfig {
    pub fn seq_lock_expire(&self) -> Duration {
        Duration::from_secs(self.seq_lock_expire_secs)
    }

    pub fn seq_cache_expire(&self) -> Duration {
        Duration::from_secs(self.seq_cache_expire_secs)
    }

    pub fn user_seq_expire(&self) -> Duration {
        Duration::from_secs(self.user_seq_expire_secs)
    }

    pub fn read_seq_expire(&self) -> Duration {
        Duration::from_secs(self.read_seq_expire_secs)
    }

    pub fn online_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.online_cache_ttl_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregatorConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_evict_idle_ticks")]
    pub evict_idle_ticks: u32,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        AggregatorConfig {
            tick_secs: default_tick_secs(),
            evict_idle_ticks: default_evict_idle_ticks(),
            workers: default_workers(),
            queue_depth: default_queue_depth(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhooksConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub before_online_push: HookSetting,
    #[serde(default)]
    pub before_offline_push: HookSetting,
    #[serde(default)]
    pub before_group_online_push: HookSetting,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookSetting {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_hook_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,
}

impl Default for HookSetting {
    fn default() -> Self {
        HookSetting {
            enable: false,
            timeout_ms: default_hook_timeout_ms(),
            fail_open: default_fail_open(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OfflinePushConfig {
    // one of: dummy, fcm, getui, jpush
    #[serde(default = "default_offline_enable")]
    pub enable: String,
    #[serde(default)]
    pub fcm: FcmConfig,
    #[serde(default)]
    pub getui: GetuiConfig,
    #[serde(default)]
    pub jpush: JpushConfig,
}

impl Default for OfflinePushConfig {
    fn default() -> Self {
        OfflinePushConfig {
            enable: default_offline_enable(),
            fcm: FcmConfig::default(),
            getui: GetuiConfig::default(),
            jpush: JpushConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FcmConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub server_key: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GetuiConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub master_secret: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JpushConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub app_key: String,
    #[serde(default)]
    pub master_secret: String,
}

fn default_single_seq_step() -> i64 {
    50
}

fn default_group_seq_step() -> i64 {
    100
}

fn default_seq_lock_expire_secs() -> u64 {
    600
}

fn default_seq_cache_expire_secs() -> u64 {
    24 * 3600
}

fn default_user_seq_expire_secs() -> u64 {
    7 * 24 * 3600
}

fn default_read_seq_expire_secs() -> u64 {
    30 * 24 * 3600
}

fn default_read_seq_write_ratio() -> i64 {
    100
}

fn default_online_cache_ttl_ms() -> u64 {
    10_000
}

fn default_stale_msg_secs() -> i64 {
    10
}

fn default_read_channel_depth() -> usize {
    1024 * 8
}

fn default_tick_secs() -> u64 {
    10
}

fn default_evict_idle_ticks() -> u32 {
    6
}

fn default_workers() -> usize {
    32
}

fn default_queue_depth() -> usize {
    1024
}

fn default_hook_timeout_ms() -> u64 {
    3000
}

fn default_fail_open() -> bool {
    true
}

fn default_offline_enable() -> String {
    "dummy".to_string()
}
