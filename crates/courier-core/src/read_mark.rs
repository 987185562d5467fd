use crate::config::AggregatorConfig;
use crate::error::CoreError;
use crate::metrics::Metrics;
use crate::seq_user::SeqUserService;
use courier_api::types::MarkAsReadTips;
use log::{debug, error};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Clone, Copy)]
struct MarkSeq {
    read_seq: i64,
    mark_seq: i64,
    idle_ticks: u32,
}

struct PersistJob {
    conversation_id: String,
    user_id: String,
    read_seq: i64,
}

// Single cooperative loop coalescing read-receipt tips into debounced store
// writes through a bounded worker pool. Owns its state map; the only way in is
// the tips channel.
pub struct ReadMarkAggregator {
    handle: JoinHandle<()>,
}

impl ReadMarkAggregator {
    pub fn spawn(
        seq_user: Arc<SeqUserService>,
        rx: mpsc::Receiver<MarkAsReadTips>,
        cfg: AggregatorConfig,
        metrics: Arc<Metrics>,
    ) -> ReadMarkAggregator {
        let handle = tokio::spawn(run_loop(seq_user, rx, cfg, metrics));
        ReadMarkAggregator { handle }
    }

    // Resolves once the input channel is closed and every pending mark has
    // been flushed and drained through the workers.
    pub async fn join(self) -> Result<(), CoreError> {
        self.handle
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))
    }
}

async fn run_loop(
    seq_user: Arc<SeqUserService>,
    mut rx: mpsc::Receiver<MarkAsReadTips>,
    cfg: AggregatorConfig,
    metrics: Arc<Metrics>,
) {
    let (job_tx, job_rx) = mpsc::channel::<PersistJob>(cfg.queue_depth.max(1));
    let job_rx = Arc::new(Mutex::new(job_rx));
    let mut workers = Vec::with_capacity(cfg.workers.max(1));
    for _ in 0..cfg.workers.max(1) {
        let seq_user = seq_user.clone();
        let job_rx = job_rx.clone();
        let metrics = metrics.clone();
        workers.push(tokio::spawn(async move {
            loop {
                let job = {
                    let mut rx = job_rx.lock().await;
                    rx.recv().await
                };
                let Some(job) = job else { break };
                persist(&seq_user, &metrics, job).await;
            }
        }));
    }

    let mut state: HashMap<(String, String), MarkSeq> = HashMap::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(cfg.tick_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush(&mut state, &job_tx, cfg.evict_idle_ticks).await;
            }
            tips = rx.recv() => {
                let Some(tips) = tips else { break };
                ingest(&mut state, tips);
            }
        }
    }
    // Shutdown: flush what is left, then let the workers drain.
    flush(&mut state, &job_tx, cfg.evict_idle_ticks).await;
    drop(job_tx);
    for worker in workers {
        let _ = worker.await;
    }
}

fn ingest(state: &mut HashMap<(String, String), MarkSeq>, tips: MarkAsReadTips) {
    if tips.has_read_seq <= 0 {
        return;
    }
    let key = (tips.conversation_id, tips.mark_as_read_user_id);
    match state.get_mut(&key) {
        Some(entry) => {
            if entry.read_seq < tips.has_read_seq {
                entry.read_seq = tips.has_read_seq;
            }
        }
        None => {
            state.insert(
                key,
                MarkSeq {
                    read_seq: tips.has_read_seq,
                    mark_seq: 0,
                    idle_ticks: 0,
                },
            );
        }
    }
}

async fn flush(
    state: &mut HashMap<(String, String), MarkSeq>,
    job_tx: &mpsc::Sender<PersistJob>,
    evict_idle_ticks: u32,
) {
    let mut evict = Vec::new();
    let mut jobs = Vec::new();
    for (key, entry) in state.iter_mut() {
        if entry.mark_seq >= entry.read_seq {
            entry.idle_ticks += 1;
            if entry.idle_ticks > evict_idle_ticks {
                evict.push(key.clone());
            }
            continue;
        }
        entry.idle_ticks = 0;
        entry.mark_seq = entry.read_seq;
        jobs.push(PersistJob {
            conversation_id: key.0.clone(),
            user_id: key.1.clone(),
            read_seq: entry.read_seq,
        });
    }
    for key in evict {
        state.remove(&key);
    }
    for job in jobs {
        if job_tx.send(job).await.is_err() {
            return;
        }
    }
}

async fn persist(seq_user: &SeqUserService, metrics: &Metrics, job: PersistJob) {
    let operation_id = format!("mark_read_{}", Uuid::new_v4());
    match seq_user
        .set_user_read_seq(&job.conversation_id, &job.user_id, job.read_seq)
        .await
    {
        Ok(()) => {
            Metrics::incr(&metrics.read_marks_flushed);
            debug!(
                "op {} marked conversation {} user {} read seq {}",
                operation_id, job.conversation_id, job.user_id, job.read_seq
            );
        }
        Err(e) => {
            error!(
                "op {} set read seq failed for {}:{} -> {}: {}",
                operation_id, job.conversation_id, job.user_id, job.read_seq, e
            );
        }
    }
}
