//! Key generation for INSERT statements missing their generated key column.

use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{ShardError, ShardResult};

/// Source of generated primary keys.
pub trait KeyGenerator: Send + Sync {
    fn generate_key(&self) -> Value;
}

/// 2016-11-01T00:00:00Z in milliseconds
const EPOCH_MILLIS: u64 = 1_477_929_600_000;
const SEQUENCE_BITS: u64 = 12;
const WORKER_ID_BITS: u64 = 10;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
pub const MAX_WORKER_ID: u64 = (1 << WORKER_ID_BITS) - 1;

#[derive(Debug, Default)]
struct SnowflakeState {
    last_millis: u64,
    sequence: u64,
}

/// 64-bit time-ordered keys: 41 bits of milliseconds since 2016-11-01,
/// 10 bits of worker id, 12 bits of sequence.
///
/// Keys never decrease, even if the system clock moves backwards; the
/// generator then keeps counting from the last millisecond it issued.
#[derive(Debug)]
pub struct SnowflakeKeyGenerator {
    worker_id: u64,
    state: Mutex<SnowflakeState>,
}

impl SnowflakeKeyGenerator {
    pub fn new(worker_id: u64) -> ShardResult<Self> {
        if worker_id > MAX_WORKER_ID {
            return Err(ShardError::ConfigError(format!(
                "Worker id {} exceeds {}",
                worker_id, MAX_WORKER_ID
            )));
        }
        Ok(Self {
            worker_id,
            state: Mutex::new(SnowflakeState::default()),
        })
    }

    /// Process-wide generator with worker id 0.
    pub fn shared() -> &'static SnowflakeKeyGenerator {
        static SHARED: OnceLock<SnowflakeKeyGenerator> = OnceLock::new();
        SHARED.get_or_init(|| SnowflakeKeyGenerator {
            worker_id: 0,
            state: Mutex::new(SnowflakeState::default()),
        })
    }

    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    pub fn next_id(&self) -> u64 {
        let mut state = self.state.lock();
        let clock = current_millis();
        if clock < state.last_millis {
            tracing::warn!(
                "[KEYGEN] Clock moved backwards by {}ms, reusing last timestamp",
                state.last_millis - clock
            );
        }
        let mut now = clock.max(state.last_millis);
        if now == state.last_millis {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted: borrow the next millisecond.
                now = state.last_millis + 1;
            }
        } else {
            state.sequence = 0;
        }
        state.last_millis = now;

        compose(now, self.worker_id, state.sequence)
    }
}

impl KeyGenerator for SnowflakeKeyGenerator {
    fn generate_key(&self) -> Value {
        Value::from(self.next_id())
    }
}

/// Timestamps before the epoch count as the epoch itself.
fn compose(millis: u64, worker_id: u64, sequence: u64) -> u64 {
    (millis.saturating_sub(EPOCH_MILLIS) << (SEQUENCE_BITS + WORKER_ID_BITS))
        | (worker_id << SEQUENCE_BITS)
        | sequence
}

fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
        .max(EPOCH_MILLIS)
}
