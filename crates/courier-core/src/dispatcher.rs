use crate::bus::BusConsumer;
use crate::config::PushConfig;
use crate::error::CoreError;
use crate::gateway::{online_push_failed_user_ids, OnlinePusher};
use crate::group_cache::LocalGroupCache;
use crate::hooks::WebhookClient;
use crate::metrics::Metrics;
use crate::offline_push::{build_push_infos, OfflinePusher};
use crate::online_cache::OnlineCache;
use crate::read_mark::ReadMarkAggregator;
use crate::seq_alloc::SeqAllocator;
use crate::seq_user::SeqUserService;
use crate::time::now_secs;
use async_trait::async_trait;
use courier_api::content::{content_type, SessionType};
use courier_api::conversation::group_conversation_id;
use courier_api::options::{switch_from_options, IS_OFFLINE_PUSH, IS_SENDER_SYNC};
use courier_api::types::{
    GroupDismissedTips, MarkAsReadTips, MemberKickedTips, MemberQuitTips, MsgData,
    NotificationElem, PushMsgDataToMq,
};
use courier_gateway::UserPushResult;
use log::{debug, error, warn};
use prost::Message;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

// Conversation-level suppression of offline pushes, answered by the
// conversation service.
#[async_trait]
pub trait DisturbFilter: Send + Sync {
    async fn offline_push_user_ids(
        &self,
        conversation_id: &str,
        user_ids: &[String],
    ) -> Result<Vec<String>, CoreError>;
}

pub struct AllowAll;

#[async_trait]
impl DisturbFilter for AllowAll {
    async fn offline_push_user_ids(
        &self,
        _conversation_id: &str,
        user_ids: &[String],
    ) -> Result<Vec<String>, CoreError> {
        Ok(user_ids.to_vec())
    }
}

enum PostGroupAction {
    Dismiss(String),
}

pub struct PushHandler {
    cfg: PushConfig,
    online_cache: Arc<OnlineCache>,
    online_pusher: OnlinePusher,
    offline_pusher: Arc<dyn OfflinePusher>,
    group_cache: Arc<LocalGroupCache>,
    seq: Arc<SeqAllocator>,
    seq_user: Arc<SeqUserService>,
    disturb: Arc<dyn DisturbFilter>,
    webhook: WebhookClient,
    read_tx: mpsc::Sender<MarkAsReadTips>,
    metrics: Arc<Metrics>,
}

impl PushHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cfg: PushConfig,
        online_cache: Arc<OnlineCache>,
        online_pusher: OnlinePusher,
        offline_pusher: Arc<dyn OfflinePusher>,
        group_cache: Arc<LocalGroupCache>,
        seq: Arc<SeqAllocator>,
        seq_user: Arc<SeqUserService>,
        disturb: Arc<dyn DisturbFilter>,
        webhook: WebhookClient,
        metrics: Arc<Metrics>,
    ) -> (PushHandler, ReadMarkAggregator) {
        let (read_tx, read_rx) = mpsc::channel(cfg.read_channel_depth.max(1));
        let aggregator = ReadMarkAggregator::spawn(
            seq_user.clone(),
            read_rx,
            cfg.aggregator.clone(),
            metrics.clone(),
        );
        let handler = PushHandler {
            cfg,
            online_cache,
            online_pusher,
            offline_pusher,
            group_cache,
            seq,
            seq_user,
            disturb,
            webhook,
            read_tx,
            metrics,
        };
        (handler, aggregator)
    }

    // Sequential consume-and-process per partition. Offsets are committed even
    // for failed messages; liveness beats durability for a push pipeline.
    pub async fn run(&self, bus: &mut dyn BusConsumer) -> Result<(), CoreError> {
        while let Some(record) = bus.next().await? {
            self.handle_payload(&record.payload).await;
            bus.commit(&record).await?;
        }
        Ok(())
    }

    pub async fn handle_payload(&self, payload: &[u8]) {
        Metrics::incr(&self.metrics.msg_consumed);
        let envelope = match PushMsgDataToMq::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("undecodable push payload: {}", e);
                Metrics::incr(&self.metrics.msg_poison_skipped);
                return;
            }
        };
        let Some(msg) = envelope.msg_data else {
            Metrics::incr(&self.metrics.msg_poison_skipped);
            return;
        };
        let operation_id = Uuid::new_v4().to_string();
        self.handle_read_receipt(&msg).await;
        // Staleness guard: recovery from consumer lag, not a correctness rule.
        if now_secs() - msg.send_time / 1000 > self.cfg.stale_msg_secs {
            debug!(
                "op {} dropping stale msg {} sent at {}",
                operation_id, msg.client_msg_id, msg.send_time
            );
            Metrics::incr(&self.metrics.msg_stale_dropped);
            return;
        }
        let result = match SessionType::from_i32(msg.session_type) {
            Some(SessionType::ReadGroup) => {
                let group_id = msg.group_id.clone();
                self.push_to_group(&operation_id, &group_id, msg).await
            }
            Some(_) => {
                let user_ids = single_recipients(&msg);
                self.push_to_users(&operation_id, user_ids, msg).await
            }
            None => Err(CoreError::ArgInvalid("session_type")),
        };
        match result {
            Ok(()) => {}
            Err(CoreError::HookRejected(reason)) => {
                warn!("op {} aborted by hook: {}", operation_id, reason);
                Metrics::incr(&self.metrics.hook_rejected);
            }
            Err(e) if e.is_transient() => {
                warn!("op {} push failed (transient): {}", operation_id, e);
                Metrics::incr(&self.metrics.msg_transient_skipped);
            }
            Err(e) => {
                error!("op {} push failed: {}", operation_id, e);
                Metrics::incr(&self.metrics.msg_poison_skipped);
            }
        }
    }

    async fn push_to_users(
        &self,
        operation_id: &str,
        mut user_ids: Vec<String>,
        mut msg: MsgData,
    ) -> Result<(), CoreError> {
        if let Some(replaced) = self
            .webhook
            .before_online_push(
                &self.cfg.webhooks.before_online_push,
                operation_id,
                &user_ids,
                &msg,
            )
            .await?
        {
            user_ids = replaced;
        }
        let ws_results = self.get_conns_and_online_push(&msg, &user_ids).await?;
        debug!(
            "op {} single push {} -> {:?}: {:?}",
            operation_id, msg.client_msg_id, user_ids, ws_results
        );
        if !self.should_push_offline(&msg) {
            return Ok(());
        }
        for result in &ws_results {
            // The sender never gets an offline push.
            if msg.send_id == result.user_id {
                continue;
            }
            if result.online_push {
                return Ok(());
            }
        }
        let mut offline_ids = vec![msg.recv_id.clone()];
        let (replaced, info) = self
            .webhook
            .before_offline_push(
                &self.cfg.webhooks.before_offline_push,
                operation_id,
                &offline_ids,
                &msg,
            )
            .await?;
        if let Some(ids) = replaced {
            offline_ids = ids;
        }
        if let Some(info) = info {
            msg.offline_push_info = Some(info);
        }
        self.offline_push_msg(&msg, &offline_ids).await;
        Ok(())
    }

    async fn push_to_group(
        &self,
        operation_id: &str,
        group_id: &str,
        mut msg: MsgData,
    ) -> Result<(), CoreError> {
        let mut push_user_ids = self
            .webhook
            .before_group_online_push(
                &self.cfg.webhooks.before_group_online_push,
                operation_id,
                &msg,
            )
            .await?
            .unwrap_or_default();
        let post = self
            .group_messages_handler(group_id, &mut push_user_ids, &msg)
            .await?;
        let ws_results = self.get_conns_and_online_push(&msg, &push_user_ids).await?;
        debug!(
            "op {} group push {} to {}: {} recipients",
            operation_id,
            msg.client_msg_id,
            group_id,
            ws_results.len()
        );
        if self.should_push_offline(&msg) {
            let failed = online_push_failed_user_ids(&msg, &ws_results);
            let mut need_offline = self
                .disturb
                .offline_push_user_ids(&group_conversation_id(group_id), &failed)
                .await?;
            if !need_offline.is_empty() {
                let (replaced, info) = self
                    .webhook
                    .before_offline_push(
                        &self.cfg.webhooks.before_offline_push,
                        operation_id,
                        &need_offline,
                        &msg,
                    )
                    .await?;
                if let Some(ids) = replaced {
                    need_offline = ids;
                }
                if let Some(info) = info {
                    msg.offline_push_info = Some(info);
                }
                self.offline_push_msg(&msg, &need_offline).await;
            }
        }
        // Farewell notification first, group dismissal after.
        if let Some(PostGroupAction::Dismiss(group_id)) = post {
            if let Err(e) = self.group_cache.api().dismiss_group(&group_id).await {
                error!("op {} dismiss group {} failed: {}", operation_id, group_id, e);
            }
            self.group_cache.invalidate(&group_id).await;
        }
        Ok(())
    }

    async fn group_messages_handler(
        &self,
        group_id: &str,
        push_user_ids: &mut Vec<String>,
        msg: &MsgData,
    ) -> Result<Option<PostGroupAction>, CoreError> {
        if !push_user_ids.is_empty() {
            return Ok(None);
        }
        *push_user_ids = self.group_cache.member_ids(group_id).await?;
        match msg.content_type {
            content_type::MEMBER_QUIT_NOTIFICATION => {
                let Ok(tips) = NotificationElem::unwrap::<MemberQuitTips>(&msg.content) else {
                    return Ok(None);
                };
                let departed = vec![tips.quit_user.user_id.clone()];
                if let Err(e) = self.sync_departed_max_seq(group_id, &departed).await {
                    error!(
                        "member quit seq sync failed for {} in {}: {}",
                        tips.quit_user.user_id, group_id, e
                    );
                }
                push_user_ids.push(tips.quit_user.user_id);
            }
            content_type::MEMBER_KICKED_NOTIFICATION => {
                let Ok(tips) = NotificationElem::unwrap::<MemberKickedTips>(&msg.content) else {
                    return Ok(None);
                };
                let kicked: Vec<String> = tips
                    .kicked_user_list
                    .iter()
                    .map(|m| m.user_id.clone())
                    .collect();
                if let Err(e) = self.sync_departed_max_seq(group_id, &kicked).await {
                    error!(
                        "member kicked seq sync failed for {:?} in {}: {}",
                        kicked, group_id, e
                    );
                }
                push_user_ids.extend(kicked);
            }
            content_type::GROUP_DISMISSED_NOTIFICATION => {
                if NotificationElem::unwrap::<GroupDismissedTips>(&msg.content).is_ok() {
                    return Ok(Some(PostGroupAction::Dismiss(group_id.to_string())));
                }
            }
            _ => {}
        }
        Ok(None)
    }

    // Advances the departed users' max seq to the conversation max so no ghost
    // unread survives the removal.
    async fn sync_departed_max_seq(
        &self,
        group_id: &str,
        user_ids: &[String],
    ) -> Result<(), CoreError> {
        let conversation_id = group_conversation_id(group_id);
        let max_seq = self.seq.get_max_seq(&conversation_id).await?;
        for user_id in user_ids {
            self.seq_user
                .set_user_max_seq(&conversation_id, user_id, max_seq)
                .await?;
        }
        Ok(())
    }

    // Partition before fan-out: recipients that the online view already rules
    // out never touch the gateway.
    async fn get_conns_and_online_push(
        &self,
        msg: &MsgData,
        user_ids: &[String],
    ) -> Result<Vec<UserPushResult>, CoreError> {
        let mut online_ids = Vec::new();
        let mut offline_ids = Vec::new();
        for user_id in user_ids {
            if self.online_cache.get_user_online(user_id).await? {
                online_ids.push(user_id.clone());
            } else {
                offline_ids.push(user_id.clone());
            }
        }
        let mut results = if online_ids.is_empty() {
            Vec::new()
        } else {
            match self
                .online_pusher
                .get_conns_and_online_push(msg, &online_ids)
                .await
            {
                Ok(results) => results,
                Err(e) => {
                    Metrics::incr(&self.metrics.online_push_failed);
                    return Err(e);
                }
            }
        };
        for user_id in offline_ids {
            results.push(UserPushResult::offline(user_id));
        }
        Ok(results)
    }

    fn should_push_offline(&self, msg: &MsgData) -> bool {
        if !switch_from_options(&msg.options, IS_OFFLINE_PUSH) {
            return false;
        }
        !matches!(
            msg.content_type,
            content_type::SIGNALING_NOTIFICATION | content_type::TYPING
        )
    }

    async fn offline_push_msg(&self, msg: &MsgData, user_ids: &[String]) {
        let (title, content, opts) = build_push_infos(msg);
        match self
            .offline_pusher
            .push(user_ids, &title, &content, &opts)
            .await
        {
            Ok(()) => Metrics::incr(&self.metrics.offline_pushed),
            Err(e) => {
                warn!("offline push to {:?} failed: {}", user_ids, e);
                Metrics::incr(&self.metrics.offline_push_failed);
            }
        }
    }

    async fn handle_read_receipt(&self, msg: &MsgData) {
        if msg.content_type != content_type::HAS_READ_RECEIPT {
            return;
        }
        let mut tips = match NotificationElem::unwrap::<MarkAsReadTips>(&msg.content) {
            Ok(tips) => tips,
            Err(e) => {
                error!("undecodable read receipt {}: {}", msg.client_msg_id, e);
                return;
            }
        };
        for seq in tips.seqs.drain(..) {
            if tips.has_read_seq < seq {
                tips.has_read_seq = seq;
            }
        }
        if tips.has_read_seq <= 0 {
            return;
        }
        if let Err(mpsc::error::TrySendError::Full(tips)) = self.read_tx.try_send(tips) {
            warn!(
                "read channel full, dropping mark for {}:{}",
                tips.conversation_id, tips.mark_as_read_user_id
            );
            Metrics::incr(&self.metrics.read_channel_full);
        }
    }
}

fn single_recipients(msg: &MsgData) -> Vec<String> {
    let sender_sync = switch_from_options(&msg.options, IS_SENDER_SYNC);
    if !sender_sync || msg.send_id == msg.recv_id {
        vec![msg.recv_id.clone()]
    } else {
        vec![msg.recv_id.clone(), msg.send_id.clone()]
    }
}
