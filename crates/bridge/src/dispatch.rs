use std::{fmt, sync::Arc};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_lambda::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    primitives::Blob,
    types,
};
use derive_new::new;
use tokio_util::task::TaskTracker;
use ulid::Ulid;

use crate::{config::InvokerConfig, errors::Error, records::BatchEnvelope};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum InvocationType {
    /// Queue the invocation and return without its result
    #[default]
    FireAndForget,
}

impl fmt::Display for InvocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FireAndForget => write!(f, "fire-and-forget"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, new)]
pub struct InvocationRequest {
    pub target_name: String,
    pub invocation_type: InvocationType,
    pub payload: Vec<u8>,
}

impl InvocationRequest {
    pub fn for_batch(target_name: &str, envelope: &BatchEnvelope) -> Result<Self, Error> {
        Ok(Self::new(
            target_name.to_string(),
            InvocationType::FireAndForget,
            serde_json::to_vec(envelope)?,
        ))
    }
}

/// Submits invocation requests to a compute endpoint
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, request: InvocationRequest) -> Result<(), Error>;
}

/// Invokes functions through the Lambda API of the local offline endpoint
#[derive(Clone, Debug)]
pub struct LambdaInvoker {
    client: aws_sdk_lambda::Client,
}

impl LambdaInvoker {
    pub fn new(client: aws_sdk_lambda::Client) -> Self {
        Self { client }
    }

    pub async fn from_config(config: &InvokerConfig) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint())
            .credentials_provider(Credentials::new(
                "offline",
                "offline",
                None,
                None,
                "offline-msk",
            ))
            .load()
            .await;

        Self::new(aws_sdk_lambda::Client::new(&sdk_config))
    }
}

#[async_trait]
impl Invoker for LambdaInvoker {
    async fn invoke(&self, request: InvocationRequest) -> Result<(), Error> {
        let invocation_type = match request.invocation_type {
            InvocationType::FireAndForget => types::InvocationType::Event,
        };

        let response = self
            .client
            .invoke()
            .function_name(&request.target_name)
            .invocation_type(invocation_type)
            .payload(Blob::new(request.payload))
            .send()
            .await
            .map_err(|e| Error::Invocation {
                function: request.target_name.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        tracing::debug!(
            function = %request.target_name,
            status = response.status_code(),
            "Invoke returned"
        );
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DispatchOutcome {
    Accepted,
    Failed,
}

/// Turns batch envelopes into invocations. Failures end here: they are
/// logged and reported as an outcome, never returned or retried.
#[derive(Clone)]
pub struct Dispatcher {
    invoker: Arc<dyn Invoker>,
    in_flight: TaskTracker,
}

impl Dispatcher {
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self {
            invoker,
            in_flight: TaskTracker::new(),
        }
    }

    /// Invokes `target` with `envelope` and waits until the request was accepted or failed.
    pub async fn dispatch(&self, target: &str, envelope: &BatchEnvelope) -> DispatchOutcome {
        let batch_id = Ulid::new();
        let records = envelope.record_count();

        let request = match InvocationRequest::for_batch(target, envelope) {
            Ok(request) => request,
            Err(e) => {
                tracing::error!(function = %target, %batch_id, records, "Could not build invocation: {}", e);
                return DispatchOutcome::Failed;
            }
        };
        let invocation_type = request.invocation_type;

        match self.invoker.invoke(request).await {
            Ok(()) => {
                tracing::info!(
                    function = %target,
                    %batch_id,
                    %invocation_type,
                    records,
                    "Invocation accepted"
                );
                DispatchOutcome::Accepted
            }
            Err(e) => {
                tracing::error!(
                    function = %target,
                    %batch_id,
                    %invocation_type,
                    records,
                    "Invocation failed: {}",
                    e
                );
                DispatchOutcome::Failed
            }
        }
    }

    /// Dispatches on a background task and returns immediately.
    pub fn submit(&self, target: String, envelope: BatchEnvelope) {
        let dispatcher = self.clone();
        self.in_flight.spawn(async move {
            dispatcher.dispatch(&target, &envelope).await;
        });
    }

    /// Waits for every submitted dispatch to finish.
    pub async fn drain(&self) {
        self.in_flight.close();
        self.in_flight.wait().await;
    }
}
