use std::sync::Arc;

use crate::{
    broker::{ConsumerFactory, KafkaConsumerFactory},
    config::Config,
    dispatch::{Invoker, LambdaInvoker},
    events::ServiceDefinition,
    manager::{ServiceState, SessionManager},
};

/// Hooks the host calls when the offline service starts and stops.
pub struct OfflineMsk {
    service: ServiceDefinition,
    manager: SessionManager,
}

impl OfflineMsk {
    pub fn new(
        config: &Config,
        service: ServiceDefinition,
        factory: Arc<dyn ConsumerFactory>,
        invoker: Arc<dyn Invoker>,
    ) -> Self {
        Self {
            service,
            manager: SessionManager::new(config, factory, invoker),
        }
    }

    /// Kafka consumers and the Lambda API of the local endpoint.
    pub async fn from_config(config: &Config, service: ServiceDefinition) -> Self {
        let invoker = LambdaInvoker::from_config(&config.invoker).await;
        Self::new(
            config,
            service,
            Arc::new(KafkaConsumerFactory),
            Arc::new(invoker),
        )
    }

    pub fn on_service_start(&self) -> usize {
        self.manager.start_all(&self.service)
    }

    pub async fn on_service_stop(&self) {
        self.manager.stop().await;
    }

    pub fn state(&self) -> ServiceState {
        self.manager.state()
    }
}
