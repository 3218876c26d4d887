//! Snowflake-style sequence identifiers for delivery envelopes.

use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Epoch sequence identifiers count from: 2024-01-01T00:00:00Z.
const EPOCH_MS: u64 = 1_704_067_200_000;

const WORKER_BITS: u64 = 10;
const SEQUENCE_BITS: u64 = 12;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

struct ClockState {
    last_ms: u64,
    sequence: u64,
}

/// 64-bit time-ordered ID generator: 42 bits of milliseconds since the
/// epoch, 10 bits of worker ID, 12 bits of per-millisecond sequence.
pub struct SnowflakeGenerator {
    worker_id: u64,
    state: Mutex<ClockState>,
}

impl SnowflakeGenerator {
    /// Panics if `worker_id` does not fit in 10 bits.
    pub fn new(worker_id: u16) -> Self {
        assert!(
            u64::from(worker_id) < (1 << WORKER_BITS),
            "worker_id must fit in {WORKER_BITS} bits"
        );
        Self {
            worker_id: u64::from(worker_id),
            state: Mutex::new(ClockState {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn generate(&self) -> i64 {
        let mut state = self.state.lock();

        let mut now_ms = current_ms();
        // Tolerate small clock regressions by reusing the last observed
        // millisecond instead of emitting out-of-order IDs.
        if now_ms < state.last_ms {
            now_ms = state.last_ms;
        }

        if now_ms == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond; wait it out.
                while now_ms <= state.last_ms {
                    now_ms = current_ms();
                }
            }
        } else {
            state.sequence = 0;
        }

        state.last_ms = now_ms;

        let ts = now_ms.saturating_sub(EPOCH_MS);
        ((ts << (WORKER_BITS + SEQUENCE_BITS)) | (self.worker_id << SEQUENCE_BITS) | state.sequence)
            as i64
    }
}

fn current_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
