use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    broker::ConsumerFactory,
    config::{Config, MalformedEventsPolicy},
    dispatch::{Dispatcher, Invoker},
    events::ServiceDefinition,
    session::{run_session, SessionContext},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServiceState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Owns one consumer session per enabled streaming binding.
pub struct SessionManager {
    context: Arc<SessionContext>,
    malformed_events: MalformedEventsPolicy,
    sessions: TaskTracker,
    state: watch::Sender<ServiceState>,
}

impl SessionManager {
    pub fn new(
        config: &Config,
        factory: Arc<dyn ConsumerFactory>,
        invoker: Arc<dyn Invoker>,
    ) -> Self {
        let context = SessionContext {
            client: config.client.clone(),
            factory,
            dispatcher: Dispatcher::new(invoker),
            ack_mode: config.ack_mode,
            shutdown: CancellationToken::new(),
        };

        Self {
            context: Arc::new(context),
            malformed_events: config.malformed_events,
            sessions: TaskTracker::new(),
            state: watch::Sender::new(ServiceState::Idle),
        }
    }

    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ServiceState> {
        self.state.subscribe()
    }

    /// Spawns a session for every streaming binding of `service` and
    /// returns how many were spawned. Sessions start independently; one
    /// failing to connect does not affect the others.
    pub fn start_all(&self, service: &ServiceDefinition) -> usize {
        if self.state() != ServiceState::Idle {
            tracing::warn!(state = ?self.state(), "Sessions already started");
            return 0;
        }

        let bindings = service.streaming_bindings(self.malformed_events);
        self.state.send_replace(ServiceState::Running);

        let started = bindings.len();
        for binding in bindings {
            let context = self.context.clone();

            self.sessions.spawn(async move {
                if let Err(e) = run_session(&binding, &context).await {
                    tracing::error!(
                        function = binding.target_name(),
                        topic = %binding.descriptor.topic,
                        group_id = binding.group_id(),
                        "Consumer session failed: {}",
                        e
                    );
                }
            });
        }

        tracing::info!(sessions = started, "Started consumer sessions");
        started
    }

    /// Stops every session after its current batch, waits for them to
    /// disconnect and for pending invocations to finish.
    pub async fn stop(&self) {
        match self.state() {
            ServiceState::Idle => {
                self.state.send_replace(ServiceState::Stopped);
                return;
            }
            ServiceState::Stopping => {
                let mut state = self.watch_state();
                let _stopped = state.wait_for(|s| *s == ServiceState::Stopped).await;
                return;
            }
            ServiceState::Stopped => return,
            ServiceState::Running => {}
        }

        self.state.send_replace(ServiceState::Stopping);
        self.context.shutdown.cancel();

        self.sessions.close();
        self.sessions.wait().await;
        self.context.dispatcher.drain().await;

        self.state.send_replace(ServiceState::Stopped);
        tracing::info!("All consumer sessions stopped");
    }
}
