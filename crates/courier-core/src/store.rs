use crate::error::CoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

// Durable per-conversation counter. The persisted value is the sole source of
// truth for "next available seq"; cached allocations may be lost.
#[async_trait]
pub trait SeqStore: Send + Sync {
    // Advances the counter by `size` and returns the freshly reserved
    // contiguous range [old + 1 ..= old + size].
    async fn malloc(&self, conversation_id: &str, size: i64) -> Result<Vec<i64>, CoreError>;

    async fn get_max_seq(&self, conversation_id: &str) -> Result<i64, CoreError>;

    async fn get_min_seq(&self, conversation_id: &str) -> Result<i64, CoreError>;

    async fn set_min_seq(&self, conversation_id: &str, min_seq: i64) -> Result<(), CoreError>;
}

#[async_trait]
pub trait SeqUserStore: Send + Sync {
    async fn get_max_seq(&self, conversation_id: &str, user_id: &str) -> Result<i64, CoreError>;

    async fn set_max_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        seq: i64,
    ) -> Result<(), CoreError>;

    async fn get_min_seq(&self, conversation_id: &str, user_id: &str) -> Result<i64, CoreError>;

    async fn set_min_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        seq: i64,
    ) -> Result<(), CoreError>;

    async fn get_read_seq(&self, conversation_id: &str, user_id: &str) -> Result<i64, CoreError>;

    async fn set_read_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        seq: i64,
    ) -> Result<(), CoreError>;
}

#[derive(Clone, Copy, Default)]
struct SeqRecord {
    max_seq: i64,
    min_seq: i64,
}

#[derive(Default)]
pub struct MemSeqStore {
    records: Mutex<HashMap<String, SeqRecord>>,
}

impl MemSeqStore {
    pub fn new() -> MemSeqStore {
        MemSeqStore::default()
    }
}

#[async_trait]
impl SeqStore for MemSeqStore {
    async fn malloc(&self, conversation_id: &str, size: i64) -> Result<Vec<i64>, CoreError> {
        if size <= 0 {
            return Err(CoreError::ArgInvalid("size"));
        }
        let mut records = self.records.lock().await;
        let record = records.entry(conversation_id.to_string()).or_default();
        let first = record.max_seq + 1;
        record.max_seq += size;
        Ok((first..=record.max_seq).collect())
    }

    async fn get_max_seq(&self, conversation_id: &str) -> Result<i64, CoreError> {
        let records = self.records.lock().await;
        Ok(records.get(conversation_id).map(|r| r.max_seq).unwrap_or(0))
    }

    async fn get_min_seq(&self, conversation_id: &str) -> Result<i64, CoreError> {
        let records = self.records.lock().await;
        Ok(records.get(conversation_id).map(|r| r.min_seq).unwrap_or(0))
    }

    async fn set_min_seq(&self, conversation_id: &str, min_seq: i64) -> Result<(), CoreError> {
        let mut records = self.records.lock().await;
        records.entry(conversation_id.to_string()).or_default().min_seq = min_seq;
        Ok(())
    }
}

#[derive(Clone, Copy, Default)]
struct SeqUserRecord {
    max_seq: i64,
    min_seq: i64,
    read_seq: i64,
}

#[derive(Default)]
pub struct MemSeqUserStore {
    records: Mutex<HashMap<(String, String), SeqUserRecord>>,
}

impl MemSeqUserStore {
    pub fn new() -> MemSeqUserStore {
        MemSeqUserStore::default()
    }

    async fn read(&self, conversation_id: &str, user_id: &str) -> SeqUserRecord {
        let records = self.records.lock().await;
        records
            .get(&(conversation_id.to_string(), user_id.to_string()))
            .copied()
            .unwrap_or_default()
    }

    async fn write<F: FnOnce(&mut SeqUserRecord)>(
        &self,
        conversation_id: &str,
        user_id: &str,
        apply: F,
    ) {
        let mut records = self.records.lock().await;
        let record = records
            .entry((conversation_id.to_string(), user_id.to_string()))
            .or_default();
        apply(record);
    }
}

#[async_trait]
impl SeqUserStore for MemSeqUserStore {
    async fn get_max_seq(&self, conversation_id: &str, user_id: &str) -> Result<i64, CoreError> {
        Ok(self.read(conversation_id, user_id).await.max_seq)
    }

    async fn set_max_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        seq: i64,
    ) -> Result<(), CoreError> {
        self.write(conversation_id, user_id, |r| r.max_seq = seq).await;
        Ok(())
    }

    async fn get_min_seq(&self, conversation_id: &str, user_id: &str) -> Result<i64, CoreError> {
        Ok(self.read(conversation_id, user_id).await.min_seq)
    }

    async fn set_min_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        seq: i64,
    ) -> Result<(), CoreError> {
        self.write(conversation_id, user_id, |r| r.min_seq = seq).await;
        Ok(())
    }

    async fn get_read_seq(&self, conversation_id: &str, user_id: &str) -> Result<i64, CoreError> {
        Ok(self.read(conversation_id, user_id).await.read_seq)
    }

    async fn set_read_seq(
        &self,
        conversation_id: &str,
        user_id: &str,
        seq: i64,
    ) -> Result<(), CoreError> {
        self.write(conversation_id, user_id, |r| r.read_seq = seq).await;
        Ok(())
    }
}
