use serde::Serialize;
use std::fmt;
use std::net::IpAddr;

/// Network name and secret used to join the wireless network.
#[derive(Clone)]
pub struct NetworkCredentials {
    pub ssid: String,
    pub password: String,
}

impl NetworkCredentials {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: password.into(),
        }
    }
}

// Keep the secret out of diagnostics.
impl fmt::Debug for NetworkCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkCredentials")
            .field("ssid", &self.ssid)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
    pub client_id: String,
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// The single "threshold exceeded" event published to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl AlertMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Local network configuration reported once the interface is associated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpConfig {
    pub address: IpAddr,
    pub netmask: Option<IpAddr>,
    pub gateway: Option<IpAddr>,
    pub dns: Option<IpAddr>,
}

impl IpConfig {
    pub fn with_address(address: IpAddr) -> Self {
        Self {
            address,
            netmask: None,
            gateway: None,
            dns: None,
        }
    }
}

/// Proof of a completed network join. Acquired once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionHandle {
    pub interface: String,
    pub ssid: String,
    pub ip: IpConfig,
    /// Status polls that reported "not associated" before the join completed.
    pub failed_polls: u32,
}
