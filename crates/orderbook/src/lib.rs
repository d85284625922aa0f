//! Domain layer for the order lifecycle.
//!
//! This crate provides:
//! - the [`Aggregate`] trait with pure `apply` / `decide` functions
//! - an explicit [`EventRegistry`] from stored kind names to typed events
//! - the [`Repository`] that loads by replay and appends with optimistic concurrency
//! - [`Observer`] hooks invoked after each successful append
//! - the [`Order`] aggregate, its commands, events, and [`OrderService`]

pub mod aggregate;
pub mod error;
pub mod observer;
pub mod order;
pub mod registry;
pub mod repository;

pub use aggregate::{Aggregate, DomainCommand, DomainEvent, EventRecord};
pub use error::DomainError;
pub use observer::{ChannelObserver, Observer, ObserverError};
pub use order::{
    CreateOrder, Order, OrderCommand, OrderCreatedData, OrderError, OrderEvent, OrderService,
    OrderSide, OrderState, OrderType, ProductId,
};
pub use registry::{Decoder, EventRegistry};
pub use repository::{CommandResult, DEFAULT_STORE_TIMEOUT, Repository, RepositoryConfig};
