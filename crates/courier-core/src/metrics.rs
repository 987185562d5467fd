use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct Metrics {
    pub msg_consumed: AtomicU64,
    pub msg_stale_dropped: AtomicU64,
    pub msg_poison_skipped: AtomicU64,
    pub msg_transient_skipped: AtomicU64,
    pub online_push_failed: AtomicU64,
    pub offline_pushed: AtomicU64,
    pub offline_push_failed: AtomicU64,
    pub read_marks_flushed: AtomicU64,
    pub read_channel_full: AtomicU64,
    pub hook_rejected: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Metrics> {
        Arc::new(Metrics::default())
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    pub fn encode_prometheus(&self) -> String {
        let mut out = String::new();
        let mut write = |name: &str, help: &str, value: u64| {
            out.push_str(&format!("# HELP {} {}\n", name, help));
            out.push_str(&format!("# TYPE {} counter\n", name));
            out.push_str(&format!("{} {}\n", name, value));
        };
        write(
            "courier_msg_consumed_total",
            "messages consumed from the push topic",
            Self::get(&self.msg_consumed),
        );
        write(
            "courier_msg_stale_dropped_total",
            "messages dropped by the staleness guard",
            Self::get(&self.msg_stale_dropped),
        );
        write(
            "courier_msg_poison_skipped_total",
            "undecodable or fatally failed messages skipped",
            Self::get(&self.msg_poison_skipped),
        );
        write(
            "courier_msg_transient_skipped_total",
            "messages skipped on transient errors",
            Self::get(&self.msg_transient_skipped),
        );
        write(
            "courier_online_push_failed_total",
            "online fan-out calls that failed",
            Self::get(&self.online_push_failed),
        );
        write(
            "courier_offline_pushed_total",
            "offline push batches handed to the vendor",
            Self::get(&self.offline_pushed),
        );
        write(
            "courier_offline_push_failed_total",
            "offline push batches the vendor rejected",
            Self::get(&self.offline_push_failed),
        );
        write(
            "courier_read_marks_flushed_total",
            "read-seq marks persisted by the aggregator",
            Self::get(&self.read_marks_flushed),
        );
        write(
            "courier_read_channel_full_total",
            "read-receipt tips dropped because the channel was full",
            Self::get(&self.read_channel_full),
        );
        write(
            "courier_hook_rejected_total",
            "messages aborted by a fail-closed webhook",
            Self::get(&self.hook_rejected),
        );
        out
    }
}
