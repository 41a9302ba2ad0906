//! # Apply-Id Generation
//!
//! Snowflake-style 64-bit ids rendered as decimal strings: 41 bits of
//! milliseconds since 2024-01-01 UTC, 5 bits datacenter, 5 bits worker,
//! 12 bits sequence. Ids are globally unique and non-decreasing within one
//! worker. Backward clock movement is a hard error; the generator never
//! waits for the clock to catch up.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::IdGeneratorConfig;
use crate::errors::{CascadeError, CascadeResult};

const WORKER_ID_BITS: u8 = 5;
const DATACENTER_ID_BITS: u8 = 5;
const SEQUENCE_BITS: u8 = 12;

const MAX_WORKER_ID: u8 = (1 << WORKER_ID_BITS) - 1;
const MAX_DATACENTER_ID: u8 = (1 << DATACENTER_ID_BITS) - 1;
const SEQUENCE_MASK: u16 = (1 << SEQUENCE_BITS) - 1;

const WORKER_ID_SHIFT: u8 = SEQUENCE_BITS;
const DATACENTER_ID_SHIFT: u8 = SEQUENCE_BITS + WORKER_ID_BITS;
const TIMESTAMP_SHIFT: u8 = SEQUENCE_BITS + WORKER_ID_BITS + DATACENTER_ID_BITS;

/// 2024-01-01T00:00:00Z in unix milliseconds
const EPOCH_MS: i64 = 1_704_067_200_000;

#[derive(Debug)]
struct GeneratorState {
    last_timestamp_ms: i64,
    sequence: u16,
}

/// Thread-safe apply-id generator
#[derive(Debug)]
pub struct ApplyIdGenerator {
    datacenter_id: u8,
    worker_id: u8,
    state: Mutex<GeneratorState>,
}

impl ApplyIdGenerator {
    pub fn new(datacenter_id: u8, worker_id: u8) -> CascadeResult<Self> {
        if datacenter_id > MAX_DATACENTER_ID {
            return Err(CascadeError::IdGeneration {
                reason: format!("datacenter_id must be 0-{MAX_DATACENTER_ID}, got {datacenter_id}"),
            });
        }
        if worker_id > MAX_WORKER_ID {
            return Err(CascadeError::IdGeneration {
                reason: format!("worker_id must be 0-{MAX_WORKER_ID}, got {worker_id}"),
            });
        }
        Ok(Self {
            datacenter_id,
            worker_id,
            state: Mutex::new(GeneratorState {
                last_timestamp_ms: -1,
                sequence: 0,
            }),
        })
    }

    pub fn from_config(config: &IdGeneratorConfig) -> CascadeResult<Self> {
        Self::new(config.datacenter_id, config.worker_id)
    }

    /// Generate the next apply id as a decimal string.
    ///
    /// Within a single millisecond the 12-bit sequence increments; on
    /// overflow the generator spins until the next millisecond. A clock that
    /// moved backwards yields an error immediately.
    pub fn generate(&self) -> CascadeResult<String> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CascadeError::IdGeneration {
                reason: "generator state poisoned".to_string(),
            })?;

        let mut timestamp = current_timestamp_ms();

        if timestamp < state.last_timestamp_ms {
            let drift = state.last_timestamp_ms - timestamp;
            tracing::error!(
                drift_ms = drift,
                "clock moved backwards, refusing to generate apply id"
            );
            return Err(CascadeError::IdGeneration {
                reason: format!("clock moved backwards by {drift}ms"),
            });
        }

        if timestamp == state.last_timestamp_ms {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond
                timestamp = wait_next_millis(state.last_timestamp_ms);
            }
        } else {
            state.sequence = 0;
        }

        state.last_timestamp_ms = timestamp;

        let id = ((timestamp - EPOCH_MS) << TIMESTAMP_SHIFT)
            | ((self.datacenter_id as i64) << DATACENTER_ID_SHIFT)
            | ((self.worker_id as i64) << WORKER_ID_SHIFT)
            | state.sequence as i64;

        Ok(id.to_string())
    }
}

fn current_timestamp_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn wait_next_millis(last_timestamp_ms: i64) -> i64 {
    let mut timestamp = current_timestamp_ms();
    while timestamp <= last_timestamp_ms {
        timestamp = current_timestamp_ms();
    }
    timestamp
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn rejects_out_of_range_ids() {
        assert!(ApplyIdGenerator::new(32, 0).is_err());
        assert!(ApplyIdGenerator::new(0, 32).is_err());
        assert!(ApplyIdGenerator::new(31, 31).is_ok());
    }

    #[test]
    fn generates_unique_non_decreasing_ids() {
        let generator = ApplyIdGenerator::new(1, 1).unwrap();
        let mut seen = HashSet::new();
        let mut previous: u64 = 0;
        for _ in 0..5000 {
            let id = generator.generate().unwrap();
            let value: u64 = id.parse().unwrap();
            assert!(value >= previous, "ids must be non-decreasing");
            assert!(seen.insert(value), "ids must be unique");
            previous = value;
        }
    }

    #[test]
    fn encodes_datacenter_and_worker_bits() {
        let generator = ApplyIdGenerator::new(3, 7).unwrap();
        let id: i64 = generator.generate().unwrap().parse().unwrap();
        let datacenter = (id >> DATACENTER_ID_SHIFT) & MAX_DATACENTER_ID as i64;
        let worker = (id >> WORKER_ID_SHIFT) & MAX_WORKER_ID as i64;
        assert_eq!(datacenter, 3);
        assert_eq!(worker, 7);
    }

    #[test]
    fn timestamp_component_is_recent() {
        let generator = ApplyIdGenerator::new(1, 1).unwrap();
        let id: i64 = generator.generate().unwrap().parse().unwrap();
        let encoded_ms = (id >> TIMESTAMP_SHIFT) + EPOCH_MS;
        let now = current_timestamp_ms();
        assert!((now - encoded_ms).abs() < 5_000);
    }
}
