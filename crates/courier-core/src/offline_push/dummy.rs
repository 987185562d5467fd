use super::{OfflinePusher, Opts};
use crate::error::CoreError;
use async_trait::async_trait;
use log::debug;

pub struct DummyPusher;

#[async_trait]
impl OfflinePusher for DummyPusher {
    async fn push(
        &self,
        user_ids: &[String],
        title: &str,
        _content: &str,
        _opts: &Opts,
    ) -> Result<(), CoreError> {
        debug!("dummy offline push to {:?}: {}", user_ids, title);
        Ok(())
    }
}
