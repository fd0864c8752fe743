//! One-shot alert delivery.
//!
//! Every alert opens a fresh broker session, publishes once at-most-once and
//! closes the session again. A session that was opened is always closed,
//! whatever happened to the publish.

use crate::models::{AlertMessage, BrokerEndpoint};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tracing::{error, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to connect to broker: {0}")]
    Connect(String),
    #[error("Broker refused connection: {0}")]
    Refused(String),
    #[error("Broker did not respond within {0:?}")]
    Timeout(Duration),
    #[error("Failed to publish: {0}")]
    Publish(String),
    #[error("Failed to disconnect cleanly: {0}")]
    Disconnect(String),
}

/// Opens sessions against a broker.
pub trait BrokerTransport {
    type Session: BrokerSession;

    fn connect(
        &self,
        endpoint: &BrokerEndpoint,
    ) -> impl Future<Output = Result<Self::Session, TransportError>>;
}

/// A single open broker session.
pub trait BrokerSession {
    /// Fire-and-forget publish; no acknowledgment is awaited.
    fn publish(&mut self, message: &AlertMessage) -> impl Future<Output = Result<(), TransportError>>;

    /// Release the session. Consumes it so it cannot be reused.
    fn close(self) -> impl Future<Output = Result<(), TransportError>>;
}

/// What to do when the broker cannot be reached for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectFailurePolicy {
    /// Drop this alert and go back to sampling.
    #[default]
    Skip,
    /// Retry the connect step `retries` more times with a fixed interval.
    Retry { retries: u32, interval: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    Delivered,
    ConnectFailed(TransportError),
    PublishFailed(TransportError),
}

impl AlertOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, AlertOutcome::Delivered)
    }
}

pub struct AlertPublisher<T> {
    transport: T,
    policy: ConnectFailurePolicy,
}

impl<T: BrokerTransport> AlertPublisher<T> {
    pub fn new(transport: T, policy: ConnectFailurePolicy) -> Self {
        Self { transport, policy }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Connect, publish once, disconnect.
    ///
    /// Never returns an error: every failure resolves to an [`AlertOutcome`]
    /// so the caller can keep sampling.
    pub async fn send_alert(&self, endpoint: &BrokerEndpoint, message: &AlertMessage) -> AlertOutcome {
        let mut session = match self.open_session(endpoint).await {
            Ok(session) => session,
            Err(e) => {
                error!(broker = %endpoint, error = %e, "Alert dropped: broker connect failed");
                return AlertOutcome::ConnectFailed(e);
            }
        };
        info!(broker = %endpoint, client_id = %endpoint.client_id, "MQTT connected");

        let published = session.publish(message).await;

        if let Err(e) = session.close().await {
            warn!(broker = %endpoint, error = %e, "Session close reported an error");
        }

        match published {
            Ok(()) => {
                info!(topic = %message.topic, payload = %message.payload_str(), "Alert sent");
                AlertOutcome::Delivered
            }
            Err(e) => {
                error!(topic = %message.topic, error = %e, "Alert publish failed");
                AlertOutcome::PublishFailed(e)
            }
        }
    }

    async fn open_session(&self, endpoint: &BrokerEndpoint) -> Result<T::Session, TransportError> {
        match self.policy {
            ConnectFailurePolicy::Skip => self.transport.connect(endpoint).await,
            ConnectFailurePolicy::Retry { retries, interval } => {
                let strategy = FixedInterval::new(interval).take(retries as usize);
                Retry::spawn(strategy, || async {
                    let attempt = self.transport.connect(endpoint).await;
                    if let Err(e) = &attempt {
                        warn!(broker = %endpoint, error = %e, "Broker connect attempt failed");
                    }
                    attempt
                })
                .await
            }
        }
    }
}
