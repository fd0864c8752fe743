//! In-memory doubles for the interface, sensor and broker transport.
//!
//! Every double appends to a shared [`EventLog`] so tests can assert on
//! ordering across components.

#![allow(dead_code)]

use sensor_flux::config::Config;
use sensor_flux::models::{AlertMessage, BrokerEndpoint, IpConfig, NetworkCredentials};
use sensor_flux::network::{LinkStatus, NetworkError, NetworkInterface};
use sensor_flux::publisher::{BrokerSession, BrokerTransport, TransportError};
use sensor_flux::sensor::{SensorError, SensorSource};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<&'static str>>>);

impl EventLog {
    pub fn push(&self, event: &'static str) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| **e == event).count()
    }

    /// Events restricted to the given kinds, in order.
    pub fn only(&self, kinds: &[&str]) -> Vec<&'static str> {
        self.events()
            .into_iter()
            .filter(|e| kinds.contains(e))
            .collect()
    }
}

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::new();
    vars.insert("WIFI_SSID".into(), "field-net".into());
    vars.insert("WIFI_PASSWORD".into(), "secret".into());
    vars.insert("MQTT_HOST".into(), "broker.local".into());
    vars.insert("MQTT_CLIENT_ID".into(), "esp32-alerta".into());
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(move |key| vars.get(key).cloned()).expect("test config is valid")
}

pub struct FakeInterface {
    log: EventLog,
    not_associated_polls: u32,
    polls: u32,
}

impl FakeInterface {
    pub fn associated_after(log: &EventLog, not_associated_polls: u32) -> Self {
        Self {
            log: log.clone(),
            not_associated_polls,
            polls: 0,
        }
    }
}

impl NetworkInterface for FakeInterface {
    fn name(&self) -> &str {
        "wlan0"
    }

    fn activate(&mut self) -> Result<(), NetworkError> {
        self.log.push("activate");
        Ok(())
    }

    fn request_association(&mut self, _credentials: &NetworkCredentials) -> Result<(), NetworkError> {
        self.log.push("associate");
        Ok(())
    }

    async fn status(&mut self) -> LinkStatus {
        self.polls += 1;
        if self.polls > self.not_associated_polls {
            self.log.push("associated");
            LinkStatus::Associated(IpConfig::with_address(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))))
        } else {
            self.log.push("not-associated");
            LinkStatus::Associating
        }
    }
}

/// Replays readings; `None` is a failed read. Runs dry as a read error.
pub struct ScriptedSensor {
    log: EventLog,
    readings: VecDeque<Option<u16>>,
}

impl ScriptedSensor {
    pub fn new(log: &EventLog, readings: &[u16]) -> Self {
        Self::with_failures(log, &readings.iter().map(|v| Some(*v)).collect::<Vec<_>>())
    }

    pub fn with_failures(log: &EventLog, readings: &[Option<u16>]) -> Self {
        Self {
            log: log.clone(),
            readings: readings.iter().copied().collect(),
        }
    }
}

impl SensorSource for ScriptedSensor {
    fn read_value(&mut self) -> Result<u16, SensorError> {
        self.log.push("read");
        match self.readings.pop_front() {
            Some(Some(value)) => Ok(value),
            Some(None) => Err(SensorError::Parse("glitch".into())),
            None => Err(SensorError::Parse("script exhausted".into())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Ok,
    ConnectFails,
    PublishFails,
}

/// Broker double. Attempts are consumed one per connect; once the script is
/// empty every attempt succeeds.
#[derive(Clone)]
pub struct FakeTransport {
    log: EventLog,
    script: Arc<Mutex<VecDeque<Attempt>>>,
    open_sessions: Arc<Mutex<u32>>,
    max_open_sessions: Arc<Mutex<u32>>,
    published: Arc<Mutex<Vec<(BrokerEndpoint, AlertMessage)>>>,
}

impl FakeTransport {
    pub fn new(log: &EventLog, script: &[Attempt]) -> Self {
        Self {
            log: log.clone(),
            script: Arc::new(Mutex::new(script.iter().copied().collect())),
            open_sessions: Arc::new(Mutex::new(0)),
            max_open_sessions: Arc::new(Mutex::new(0)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn max_open_sessions(&self) -> u32 {
        *self.max_open_sessions.lock().unwrap()
    }

    pub fn open_sessions(&self) -> u32 {
        *self.open_sessions.lock().unwrap()
    }

    pub fn published(&self) -> Vec<(BrokerEndpoint, AlertMessage)> {
        self.published.lock().unwrap().clone()
    }
}

pub struct FakeSession {
    transport: FakeTransport,
    endpoint: BrokerEndpoint,
    fail_publish: bool,
}

impl BrokerTransport for FakeTransport {
    type Session = FakeSession;

    async fn connect(&self, endpoint: &BrokerEndpoint) -> Result<FakeSession, TransportError> {
        let attempt = self.script.lock().unwrap().pop_front().unwrap_or(Attempt::Ok);
        if attempt == Attempt::ConnectFails {
            self.log.push("connect-failed");
            return Err(TransportError::Connect("connection refused".into()));
        }

        self.log.push("connect");
        let mut open = self.open_sessions.lock().unwrap();
        *open += 1;
        let mut max = self.max_open_sessions.lock().unwrap();
        *max = (*max).max(*open);

        Ok(FakeSession {
            transport: self.clone(),
            endpoint: endpoint.clone(),
            fail_publish: attempt == Attempt::PublishFails,
        })
    }
}

impl BrokerSession for FakeSession {
    async fn publish(&mut self, message: &AlertMessage) -> Result<(), TransportError> {
        if self.fail_publish {
            self.transport.log.push("publish-failed");
            return Err(TransportError::Publish("broken pipe".into()));
        }
        self.transport.log.push("publish");
        self.transport
            .published
            .lock()
            .unwrap()
            .push((self.endpoint.clone(), message.clone()));
        Ok(())
    }

    async fn close(self) -> Result<(), TransportError> {
        self.transport.log.push("close");
        *self.transport.open_sessions.lock().unwrap() -= 1;
        Ok(())
    }
}
