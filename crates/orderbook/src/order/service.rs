//! Order service providing a simplified API for order operations.

use std::sync::Arc;
use std::time::Instant;

use common::{AggregateId, IdGenerator};
use event_store::{EventEnvelope, EventStore, Version};

use crate::aggregate::DomainCommand;
use crate::error::DomainError;
use crate::repository::Repository;

use super::{CreateOrder, Order, OrderCommand};

/// Service for managing orders.
///
/// Generates identifiers for new orders, turns calls into commands and runs
/// them through the repository. Every command is traced and counted in
/// `orders_commands_total` / `orders_command_duration_seconds`.
pub struct OrderService<S: EventStore> {
    repository: Repository<S, Order>,
    id_generator: Arc<dyn IdGenerator>,
}

impl<S: EventStore> OrderService<S> {
    pub fn new(repository: Repository<S, Order>, id_generator: Arc<dyn IdGenerator>) -> Self {
        Self {
            repository,
            id_generator,
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &Repository<S, Order> {
        &self.repository
    }

    /// Creates a new order under a freshly generated identifier.
    #[tracing::instrument(skip(self, cmd), fields(product_id = %cmd.product_id))]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<AggregateId, DomainError> {
        let id = self.id_generator.generate();
        self.apply(&id, OrderCommand::Create(cmd)).await?;
        tracing::info!(%id, "order created");
        Ok(id)
    }

    /// Loads the current state of an order.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: &AggregateId) -> Result<Order, DomainError> {
        self.repository.load(id).await
    }

    /// Returns the stored events of an order.
    #[tracing::instrument(skip(self))]
    pub async fn order_events(&self, id: &AggregateId) -> Result<Vec<EventEnvelope>, DomainError> {
        self.repository.events(id).await
    }

    pub async fn accept_order(&self, id: &AggregateId) -> Result<Version, DomainError> {
        self.apply(id, OrderCommand::Accept).await
    }

    pub async fn cancel_order(&self, id: &AggregateId) -> Result<Version, DomainError> {
        self.apply(id, OrderCommand::Cancel).await
    }

    pub async fn publish_order(&self, id: &AggregateId) -> Result<Version, DomainError> {
        self.apply(id, OrderCommand::Publish).await
    }

    pub async fn match_order(&self, id: &AggregateId) -> Result<Version, DomainError> {
        self.apply(id, OrderCommand::Match).await
    }

    pub async fn confirm_order(&self, id: &AggregateId) -> Result<Version, DomainError> {
        self.apply(id, OrderCommand::Confirm).await
    }

    pub async fn clear_order(&self, id: &AggregateId) -> Result<Version, DomainError> {
        self.apply(id, OrderCommand::Clear).await
    }

    pub async fn settle_order(&self, id: &AggregateId) -> Result<Version, DomainError> {
        self.apply(id, OrderCommand::Settle).await
    }

    /// Runs any order command and records its outcome.
    #[tracing::instrument(skip(self, command), fields(command = command.kind()))]
    pub async fn apply(
        &self,
        id: &AggregateId,
        command: OrderCommand,
    ) -> Result<Version, DomainError> {
        let kind = command.kind();
        let start = Instant::now();

        let result = self.repository.apply(id, command).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.label(),
        };
        metrics::counter!("orders_commands_total", "command" => kind, "outcome" => outcome)
            .increment(1);
        metrics::histogram!("orders_command_duration_seconds", "command" => kind)
            .record(start.elapsed().as_secs_f64());

        match &result {
            Ok(version) => tracing::debug!(%id, %version, "command applied"),
            Err(err) if err.is_integrity() => tracing::error!(%id, error = %err, "command failed"),
            Err(err) => tracing::debug!(%id, error = %err, "command rejected"),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use common::TimestampIdGenerator;
    use event_store::InMemoryEventStore;
    use rust_decimal::Decimal;

    use super::*;
    use crate::order::{OrderEvent, OrderSide, OrderState, OrderType};

    struct FixedIds;

    impl IdGenerator for FixedIds {
        fn generate(&self) -> AggregateId {
            AggregateId::new("fixed-1")
        }
    }

    fn service_with(ids: Arc<dyn IdGenerator>) -> OrderService<InMemoryEventStore> {
        let repository = Repository::new(InMemoryEventStore::new(), OrderEvent::registry());
        OrderService::new(repository, ids)
    }

    fn create_cmd() -> CreateOrder {
        CreateOrder::new(
            Decimal::from_str("1.34").unwrap(),
            Decimal::from_str("13.34").unwrap(),
            OrderType::Limit,
            OrderSide::Sell,
            "BTC-USD",
        )
    }

    #[tokio::test]
    async fn test_create_order_uses_generated_id() {
        let service = service_with(Arc::new(FixedIds));

        let id = service.create_order(create_cmd()).await.unwrap();
        assert_eq!(id.as_str(), "fixed-1");

        let order = service.get_order(&id).await.unwrap();
        assert_eq!(order.state(), OrderState::Created);
    }

    #[tokio::test]
    async fn test_generated_id_collision_is_rejected() {
        let service = service_with(Arc::new(FixedIds));

        service.create_order(create_cmd()).await.unwrap();
        let result = service.create_order(create_cmd()).await;

        assert!(matches!(
            result,
            Err(DomainError::AggregateAlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_methods_return_versions() {
        let service = service_with(Arc::new(TimestampIdGenerator));
        let id = service.create_order(create_cmd()).await.unwrap();

        assert_eq!(service.accept_order(&id).await.unwrap(), Version::new(2));
        assert_eq!(service.publish_order(&id).await.unwrap(), Version::new(3));
        assert_eq!(service.match_order(&id).await.unwrap(), Version::new(4));
        assert_eq!(service.confirm_order(&id).await.unwrap(), Version::new(5));
        assert_eq!(service.clear_order(&id).await.unwrap(), Version::new(6));
        assert_eq!(service.settle_order(&id).await.unwrap(), Version::new(7));

        let order = service.get_order(&id).await.unwrap();
        assert_eq!(order.state(), OrderState::Settled);
        assert_eq!(service.order_events(&id).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_cancel_order() {
        let service = service_with(Arc::new(TimestampIdGenerator));
        let id = service.create_order(create_cmd()).await.unwrap();

        assert_eq!(service.cancel_order(&id).await.unwrap(), Version::new(2));
        assert!(service.get_order(&id).await.unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let service = service_with(Arc::new(TimestampIdGenerator));
        let id = AggregateId::new("missing");

        assert!(matches!(
            service.accept_order(&id).await,
            Err(DomainError::AggregateNotFound { .. })
        ));
        assert!(matches!(
            service.get_order(&id).await,
            Err(DomainError::AggregateNotFound { .. })
        ));
        assert!(matches!(
            service.order_events(&id).await,
            Err(DomainError::AggregateNotFound { .. })
        ));
    }
}
