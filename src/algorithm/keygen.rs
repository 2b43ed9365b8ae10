//! Key Generators - distributed primary keys for INSERT statements
//!
//! - `SNOWFLAKE`: 41-bit millisecond timestamp since 2016-11-01, 10-bit
//!   worker id, 12-bit per-millisecond sequence.
//! - `INCREMENT`: process-local monotonic counter.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{i64_or, AlgorithmConfiguration, Props};
use crate::data::Value;
use crate::{Result, ShardError};

/// Generates one key per inserted row
pub trait KeyGenerator: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &'static str;

    fn generate_key(&self) -> Value;
}

// ============================================================================
// Snowflake
// ============================================================================

/// 2016-11-01T00:00:00Z in milliseconds
pub const SNOWFLAKE_EPOCH_MS: i64 = 1_477_958_400_000;

const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const MAX_WORKER_ID: i64 = (1 << WORKER_ID_BITS) - 1;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

#[derive(Debug)]
struct SnowflakeState {
    last_ms: i64,
    sequence: i64,
}

#[derive(Debug)]
pub struct SnowflakeKeyGenerator {
    worker_id: i64,
    state: Mutex<SnowflakeState>,
}

impl SnowflakeKeyGenerator {
    pub fn new(worker_id: i64) -> Result<Self> {
        if !(0..=MAX_WORKER_ID).contains(&worker_id) {
            return Err(ShardError::Configuration(format!(
                "worker-id must be within 0..={}, got {}",
                MAX_WORKER_ID, worker_id
            )));
        }
        Ok(Self {
            worker_id,
            state: Mutex::new(SnowflakeState { last_ms: 0, sequence: 0 }),
        })
    }

    fn create(props: &Props) -> Result<Arc<dyn KeyGenerator>> {
        Ok(Arc::new(Self::new(i64_or(props, "worker-id", 0)?)?))
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Extract the millisecond timestamp encoded in a key
    pub fn timestamp_of(key: i64) -> i64 {
        (key >> (WORKER_ID_BITS + SEQUENCE_BITS)) + SNOWFLAKE_EPOCH_MS
    }
}

impl KeyGenerator for SnowflakeKeyGenerator {
    fn type_name(&self) -> &'static str {
        "SNOWFLAKE"
    }

    fn generate_key(&self) -> Value {
        let mut state = self.state.lock();
        // A clock moving backwards reuses the last timestamp
        let mut now = Self::now_ms().max(state.last_ms);
        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                while now <= state.last_ms {
                    std::hint::spin_loop();
                    now = Self::now_ms();
                }
            }
        } else {
            state.sequence = 0;
        }
        state.last_ms = now;
        let key = ((now - SNOWFLAKE_EPOCH_MS) << (WORKER_ID_BITS + SEQUENCE_BITS))
            | (self.worker_id << SEQUENCE_BITS)
            | state.sequence;
        Value::Int64(key)
    }
}

// ============================================================================
// Increment
// ============================================================================

#[derive(Debug)]
pub struct IncrementKeyGenerator {
    next: AtomicI64,
}

impl IncrementKeyGenerator {
    pub fn new(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }

    fn create(props: &Props) -> Result<Arc<dyn KeyGenerator>> {
        Ok(Arc::new(Self::new(i64_or(props, "start", 1)?)))
    }
}

impl KeyGenerator for IncrementKeyGenerator {
    fn type_name(&self) -> &'static str {
        "INCREMENT"
    }

    fn generate_key(&self) -> Value {
        Value::Int64(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

// ============================================================================
// Registry
// ============================================================================

type KeyGeneratorFactory = fn(&Props) -> Result<Arc<dyn KeyGenerator>>;

const KEY_GENERATORS: &[(&str, KeyGeneratorFactory)] = &[
    ("SNOWFLAKE", SnowflakeKeyGenerator::create),
    ("INCREMENT", IncrementKeyGenerator::create),
];

pub fn create_key_generator(config: &AlgorithmConfiguration) -> Result<Arc<dyn KeyGenerator>> {
    let tag = config.kind.to_ascii_uppercase();
    KEY_GENERATORS
        .iter()
        .find(|(name, _)| *name == tag)
        .ok_or_else(|| ShardError::Configuration(format!("unknown key generator type '{}'", config.kind)))
        .and_then(|(_, factory)| factory(&config.props))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_snowflake_unique_and_increasing() {
        let generator = SnowflakeKeyGenerator::new(3).unwrap();
        let mut seen = HashSet::new();
        let mut last = i64::MIN;
        for _ in 0..5000 {
            let key = generator.generate_key().as_i64().unwrap();
            assert!(key > last);
            assert!(seen.insert(key));
            last = key;
        }
        assert_eq!((last >> SEQUENCE_BITS) & MAX_WORKER_ID, 3);
        assert!(SnowflakeKeyGenerator::timestamp_of(last) >= SNOWFLAKE_EPOCH_MS);
    }

    #[test]
    fn test_snowflake_worker_range() {
        assert!(SnowflakeKeyGenerator::new(1024).is_err());
        assert!(SnowflakeKeyGenerator::new(-1).is_err());
    }

    #[test]
    fn test_increment_registry() {
        let generator = create_key_generator(&AlgorithmConfiguration::new("increment").prop("start", 10)).unwrap();
        assert_eq!(generator.generate_key(), Value::Int64(10));
        assert_eq!(generator.generate_key(), Value::Int64(11));
        assert!(create_key_generator(&AlgorithmConfiguration::new("UUIDX")).is_err());
    }
}
