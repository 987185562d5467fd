use crate::error::CoreError;
use courier_api::types::MsgData;
use courier_gateway::{Discovery, UserPushResult};
use log::warn;
use std::collections::HashMap;
use std::sync::Arc;

// Fans one message out to every discovered gateway instance and merges the
// per-user outcomes. A single instance failing is tolerated; its users simply
// come back as not-delivered. Discovery failing is fatal to the operation.
pub struct OnlinePusher {
    discovery: Arc<dyn Discovery>,
}

impl OnlinePusher {
    pub fn new(discovery: Arc<dyn Discovery>) -> OnlinePusher {
        OnlinePusher { discovery }
    }

    pub async fn get_conns_and_online_push(
        &self,
        msg: &MsgData,
        user_ids: &[String],
    ) -> Result<Vec<UserPushResult>, CoreError> {
        let gateways = self
            .discovery
            .gateways()
            .await
            .map_err(|e| CoreError::UpstreamRpc(e.to_string()))?;
        let mut handles = Vec::with_capacity(gateways.len());
        for gateway in gateways {
            let msg = msg.clone();
            let users = user_ids.to_vec();
            handles.push(tokio::spawn(async move {
                let endpoint = gateway.endpoint().to_string();
                (endpoint, gateway.push_to_users(&msg, &users).await)
            }));
        }
        let mut merged: HashMap<String, UserPushResult> = HashMap::new();
        for handle in handles {
            match handle.await {
                Ok((_, Ok(results))) => {
                    for result in results {
                        match merged.get_mut(&result.user_id) {
                            Some(existing) => {
                                existing.online_push |= result.online_push;
                                existing.platform_results.extend(result.platform_results);
                            }
                            None => {
                                merged.insert(result.user_id.clone(), result);
                            }
                        }
                    }
                }
                Ok((endpoint, Err(e))) => {
                    warn!("gateway {} online push failed: {}", endpoint, e);
                }
                Err(e) => {
                    warn!("gateway push task failed: {}", e);
                }
            }
        }
        Ok(user_ids
            .iter()
            .map(|user_id| {
                merged
                    .remove(user_id)
                    .unwrap_or_else(|| UserPushResult::offline(user_id.clone()))
            })
            .collect())
    }

    pub async fn kick_user_offline(
        &self,
        user_ids: &[String],
        platform_id: i32,
    ) -> Result<(), CoreError> {
        let gateways = self
            .discovery
            .gateways()
            .await
            .map_err(|e| CoreError::UpstreamRpc(e.to_string()))?;
        for gateway in gateways {
            if let Err(e) = gateway.kick_user_offline(user_ids, platform_id).await {
                warn!("gateway {} kick failed: {}", gateway.endpoint(), e);
            }
        }
        Ok(())
    }
}

// Offline residue is computed against gateway outcomes, never against the
// pre-dispatch online view.
pub fn online_push_failed_user_ids(msg: &MsgData, results: &[UserPushResult]) -> Vec<String> {
    results
        .iter()
        .filter(|r| !r.online_push && r.user_id != msg.send_id)
        .map(|r| r.user_id.clone())
        .collect()
}
