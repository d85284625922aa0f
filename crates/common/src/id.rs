//! Aggregate identifier generation.

use chrono::Utc;
use uuid::Uuid;

use crate::AggregateId;

/// Source of identifiers for new aggregates.
///
/// Called once per new order before the creation command is issued. The core
/// never checks uniqueness; that is the generator's responsibility.
pub trait IdGenerator: Send + Sync {
    /// Returns a fresh identifier.
    fn generate(&self) -> AggregateId;
}

/// Generates random UUID v4 identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn generate(&self) -> AggregateId {
        AggregateId::new(Uuid::new_v4().to_string())
    }
}

/// Generates short base-36 identifiers from the current Unix time in nanoseconds.
///
/// Two calls within the same nanosecond return the same value, so this is only
/// suitable where callers are already serialized.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampIdGenerator;

impl IdGenerator for TimestampIdGenerator {
    fn generate(&self) -> AggregateId {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        AggregateId::new(to_base36(nanos.unsigned_abs()))
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut buf = Vec::with_capacity(13);
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).unwrap_or_default()
}
