//! The sampling control loop.
//!
//! `STARTING` joins the network once. `SAMPLING` reads the sensor on a fixed
//! cadence and enters `ALERTING` for every reading above the threshold, so a
//! sustained excursion produces one alert per interval. No failure inside a
//! sampling iteration ends the loop; only cancellation or the configured
//! iteration bound does.

use crate::config::Config;
use crate::models::ConnectionHandle;
use crate::network::{self, JoinError, NetworkInterface};
use crate::publisher::{AlertOutcome, AlertPublisher, BrokerTransport};
use crate::sensor::SensorSource;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Starting,
    Sampling,
    Alerting,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonitorState::Starting => "STARTING",
            MonitorState::Sampling => "SAMPLING",
            MonitorState::Alerting => "ALERTING",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("Monitor stopped before sampling: {0}")]
    Join(#[from] JoinError),
}

/// Counters for one run of the loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub connection: Option<ConnectionHandle>,
    pub iterations: u64,
    pub read_failures: u64,
    pub alerts_attempted: u64,
    pub alerts_delivered: u64,
    pub connect_failures: u64,
    pub publish_failures: u64,
}

impl MonitorReport {
    fn record(&mut self, outcome: &AlertOutcome) {
        self.alerts_attempted += 1;
        match outcome {
            AlertOutcome::Delivered => self.alerts_delivered += 1,
            AlertOutcome::ConnectFailed(_) => self.connect_failures += 1,
            AlertOutcome::PublishFailed(_) => self.publish_failures += 1,
        }
    }
}

/// Strict greater-than: a reading equal to the threshold does not alert.
pub fn exceeds_threshold(value: u16, threshold: u16) -> bool {
    value > threshold
}

pub struct MonitorLoop<'a, N, S, T> {
    config: &'a Config,
    interface: N,
    sensor: S,
    publisher: AlertPublisher<T>,
    state: MonitorState,
}

impl<'a, N, S, T> MonitorLoop<'a, N, S, T>
where
    N: NetworkInterface,
    S: SensorSource,
    T: BrokerTransport,
{
    pub fn new(config: &'a Config, interface: N, sensor: S, publisher: AlertPublisher<T>) -> Self {
        Self {
            config,
            interface,
            sensor,
            publisher,
            state: MonitorState::Starting,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    fn transition(&mut self, next: MonitorState) {
        debug!(from = %self.state, to = %next, "Monitor state transition");
        self.state = next;
    }

    /// Join the network, then sample until cancelled or the iteration
    /// bound is reached.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<MonitorReport, MonitorError> {
        let config = self.config;
        let mut report = MonitorReport::default();

        self.state = MonitorState::Starting;
        let handle = network::join_network(
            &mut self.interface,
            &config.network,
            &config.join_policy(),
            cancel,
        )
        .await?;
        report.connection = Some(handle);
        self.transition(MonitorState::Sampling);

        let interval = config.sample_interval();
        loop {
            if cancel.is_cancelled() {
                break;
            }

            report.iterations += 1;
            self.sample_once(&mut report).await;

            if config.max_iterations.is_some_and(|max| report.iterations >= max) {
                info!(iterations = report.iterations, "Iteration limit reached");
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!(iterations = report.iterations, alerts = report.alerts_attempted, "Monitor loop stopped");
        Ok(report)
    }

    async fn sample_once(&mut self, report: &mut MonitorReport) {
        let value = match self.sensor.read_value() {
            Ok(value) => value,
            Err(e) => {
                report.read_failures += 1;
                warn!(error = %e, "Sensor read failed");
                return;
            }
        };
        info!(value, "Sensor value");

        if !exceeds_threshold(value, self.config.alert_threshold) {
            return;
        }

        self.transition(MonitorState::Alerting);
        let outcome = self
            .publisher
            .send_alert(&self.config.broker, &self.config.alert)
            .await;
        report.record(&outcome);
        self.transition(MonitorState::Sampling);
    }
}
