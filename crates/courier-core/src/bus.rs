use crate::error::CoreError;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Clone, Debug)]
pub struct BusRecord {
    // Partition key, the conversation ID.
    pub key: String,
    pub payload: Vec<u8>,
    pub offset: u64,
}

// One consumer claims one partition; records are processed and committed in
// order. Offsets are committed even for failed messages so a poison payload
// cannot stall the partition.
#[async_trait]
pub trait BusConsumer: Send {
    async fn next(&mut self) -> Result<Option<BusRecord>, CoreError>;

    async fn commit(&mut self, record: &BusRecord) -> Result<(), CoreError>;
}

pub struct ChannelBus {
    rx: mpsc::Receiver<BusRecord>,
    next_offset: u64,
    committed: u64,
}

pub struct ChannelBusProducer {
    tx: mpsc::Sender<BusRecord>,
}

impl ChannelBusProducer {
    pub async fn send(&self, key: impl Into<String>, payload: Vec<u8>) -> Result<(), CoreError> {
        self.tx
            .send(BusRecord {
                key: key.into(),
                payload,
                offset: 0,
            })
            .await
            .map_err(|_| CoreError::Internal("bus closed".to_string()))
    }
}

pub fn channel_bus(depth: usize) -> (ChannelBusProducer, ChannelBus) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (
        ChannelBusProducer { tx },
        ChannelBus {
            rx,
            next_offset: 0,
            committed: 0,
        },
    )
}

impl ChannelBus {
    pub fn committed(&self) -> u64 {
        self.committed
    }
}

#[async_trait]
impl BusConsumer for ChannelBus {
    async fn next(&mut self) -> Result<Option<BusRecord>, CoreError> {
        match self.rx.recv().await {
            Some(mut record) => {
                self.next_offset += 1;
                record.offset = self.next_offset;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn commit(&mut self, record: &BusRecord) -> Result<(), CoreError> {
        self.committed = self.committed.max(record.offset);
        Ok(())
    }
}
