//! Shared types for the order lifecycle system.

mod id;
mod types;

pub use id::{IdGenerator, TimestampIdGenerator, UuidIdGenerator};
pub use types::AggregateId;
