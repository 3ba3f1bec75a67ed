//! Snowflake-style unique ID generation.
//!
//! IDs are 63-bit: 41 bits of milliseconds since [`EPOCH_MILLIS`], 10 bits of
//! node ID and a 12-bit per-millisecond sequence. They sort by creation time,
//! which keeps cursor pagination (`id > after`) in insertion order.

use chrono::Utc;
use parking_lot::Mutex;

/// 2024-01-01T00:00:00Z.
pub const EPOCH_MILLIS: i64 = 1_704_067_200_000;

const NODE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_NODE: u16 = (1 << NODE_BITS) - 1;
const MAX_SEQUENCE: i64 = (1 << SEQUENCE_BITS) - 1;

/// Source of unique record identifiers.
pub trait IdGenerator: Send + Sync {
    /// Return the next identifier. Never returns the same value twice.
    fn next_id(&self) -> i64;
}

/// Time-ordered generator, unique across up to 1024 nodes.
#[derive(Debug)]
pub struct SnowflakeIdGenerator {
    node: i64,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    last_millis: i64,
    sequence: i64,
}

impl SnowflakeIdGenerator {
    /// Create a generator for `node`, masked to 10 bits.
    #[must_use]
    pub fn new(node: u16) -> Self {
        Self {
            node: i64::from(node & MAX_NODE),
            state: Mutex::new(State::default()),
        }
    }

    fn now_millis() -> i64 {
        Utc::now().timestamp_millis() - EPOCH_MILLIS
    }
}

impl Default for SnowflakeIdGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl IdGenerator for SnowflakeIdGenerator {
    fn next_id(&self) -> i64 {
        let mut state = self.state.lock();
        let mut now = Self::now_millis().max(state.last_millis);

        if now == state.last_millis {
            state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond.
                while now <= state.last_millis {
                    std::hint::spin_loop();
                    now = Self::now_millis();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = now;

        (now << (NODE_BITS + SEQUENCE_BITS)) | (self.node << SEQUENCE_BITS) | state.sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_ids_are_unique_and_increasing() {
        let generator = SnowflakeIdGenerator::new(7);
        let mut last = 0;
        for _ in 0..10_000 {
            let id = generator.next_id();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn test_node_is_encoded() {
        let generator = SnowflakeIdGenerator::new(5);
        let id = generator.next_id();
        assert_eq!((id >> SEQUENCE_BITS) & i64::from(MAX_NODE), 5);
    }

    #[test]
    fn test_concurrent_generation_has_no_duplicates() {
        let generator = Arc::new(SnowflakeIdGenerator::default());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || (0..2_000).map(|_| generator.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 8_000);
    }
}
