//! Distributed-unique id generator: `(timestamp_ms << 22) | (node_id << 12) |
//! sequence`. Used wherever the system needs a monotonically increasing,
//! cluster-unique id without a central allocator (span ids, internal
//! sequence numbers).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const NODE_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug)]
pub struct SnowflakeIdGenerator {
    node_id: u64,
    state: AtomicU64,
}

impl Default for SnowflakeIdGenerator {
    fn default() -> Self {
        Self::with_node_id(0)
    }
}

impl Clone for SnowflakeIdGenerator {
    fn clone(&self) -> Self {
        SnowflakeIdGenerator {
            node_id: self.node_id,
            state: AtomicU64::new(self.state.load(Ordering::Relaxed)),
        }
    }
}

impl SnowflakeIdGenerator {
    pub fn with_node_id(node_id: u64) -> Self {
        SnowflakeIdGenerator {
            node_id: node_id & ((1 << NODE_BITS) - 1),
            state: AtomicU64::new(0),
        }
    }

    pub fn generate(&self) -> u64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        let mut prev = self.state.load(Ordering::Relaxed);
        loop {
            let prev_ts = prev >> SEQUENCE_BITS;
            let (ts, seq) = if prev_ts >= now_ms {
                (prev_ts, (prev & MAX_SEQUENCE) + 1)
            } else {
                (now_ms, 0)
            };
            // Sequence overflow within the same millisecond: borrow the next one.
            let (ts, seq) = if seq > MAX_SEQUENCE { (ts + 1, 0) } else { (ts, seq) };
            let next = (ts << SEQUENCE_BITS) | seq;
            match self
                .state
                .compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return (ts << (SEQUENCE_BITS + NODE_BITS)) | (self.node_id << SEQUENCE_BITS) | seq,
                Err(actual) => prev = actual,
            }
        }
    }
}
