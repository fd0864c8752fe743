//! Network join: drive an interface from disconnected to associated.
//!
//! [`join_network`] blocks the caller (cooperatively) until the interface
//! reports an assigned address. With the default [`JoinPolicy`] it never
//! gives up; the only way out short of success is the [`CancellationToken`].

use crate::models::{ConnectionHandle, IpConfig, NetworkCredentials};
use std::fs;
use std::future::Future;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// Bound on resolving the route target while the link is coming up.
const ROUTE_RESOLVE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Network interface '{0}' not found")]
    InterfaceNotFound(String),
    #[error("Network interface I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("Network join cancelled")]
    Cancelled,
    #[error("Network not associated after {attempts} polls")]
    AttemptsExhausted { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    Down,
    Associating,
    /// Associated with the access point and an address has been assigned.
    Associated(IpConfig),
}

/// Platform network interface driven by the joiner.
pub trait NetworkInterface {
    fn name(&self) -> &str;

    fn activate(&mut self) -> Result<(), NetworkError>;

    fn request_association(&mut self, credentials: &NetworkCredentials) -> Result<(), NetworkError>;

    /// Current link state. May perform I/O; the joiner can cancel it.
    fn status(&mut self) -> impl Future<Output = LinkStatus>;
}

/// How long and how often the joiner polls the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPolicy {
    pub poll_interval: Duration,
    /// `None` polls forever.
    pub max_failed_polls: Option<u32>,
}

impl JoinPolicy {
    pub fn unbounded(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            max_failed_polls: None,
        }
    }

    pub fn bounded(poll_interval: Duration, max_failed_polls: u32) -> Self {
        Self {
            poll_interval,
            max_failed_polls: Some(max_failed_polls),
        }
    }
}

impl Default for JoinPolicy {
    fn default() -> Self {
        Self::unbounded(Duration::from_secs(1))
    }
}

/// Join the network and return the resulting connection handle.
///
/// Activation and the association request are re-issued on the next poll if
/// the interface rejects them, so adapter errors never escape this call.
pub async fn join_network<N>(
    interface: &mut N,
    credentials: &NetworkCredentials,
    policy: &JoinPolicy,
    cancel: &CancellationToken,
) -> Result<ConnectionHandle, JoinError>
where
    N: NetworkInterface + ?Sized,
{
    let mut requested = false;
    let mut failed_polls: u32 = 0;

    loop {
        if !requested {
            match request(interface, credentials) {
                Ok(()) => {
                    requested = true;
                    debug!(interface = interface.name(), ssid = %credentials.ssid, "Association requested");
                }
                Err(e) => {
                    warn!(interface = interface.name(), error = %e, "Failed to start network join");
                }
            }
        }

        if requested {
            let status = tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Network join cancelled");
                    return Err(JoinError::Cancelled);
                }
                status = interface.status() => status,
            };
            if let LinkStatus::Associated(ip) = status {
                info!(
                    interface = interface.name(),
                    address = %ip.address,
                    failed_polls,
                    "WiFi OK"
                );
                return Ok(ConnectionHandle {
                    interface: interface.name().to_string(),
                    ssid: credentials.ssid.clone(),
                    ip,
                    failed_polls,
                });
            }
        }

        failed_polls += 1;
        if let Some(max) = policy.max_failed_polls {
            if failed_polls >= max {
                warn!(ssid = %credentials.ssid, failed_polls, "Giving up on network join");
                return Err(JoinError::AttemptsExhausted {
                    attempts: failed_polls,
                });
            }
        }

        info!(ssid = %credentials.ssid, attempt = failed_polls, "Connecting to WiFi...");

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Network join cancelled");
                return Err(JoinError::Cancelled);
            }
            _ = tokio::time::sleep(policy.poll_interval) => {}
        }
    }
}

fn request<N>(interface: &mut N, credentials: &NetworkCredentials) -> Result<(), NetworkError>
where
    N: NetworkInterface + ?Sized,
{
    interface.activate()?;
    interface.request_association(credentials)
}

/// Linux host interface backed by `/sys/class/net`.
///
/// Association itself is owned by the host's supplicant; this adapter only
/// observes the link and the outbound address toward `route_target`.
#[derive(Debug, Clone)]
pub struct HostInterface {
    name: String,
    sysfs_root: PathBuf,
    route_target: (String, u16),
}

impl HostInterface {
    pub fn new(name: impl Into<String>, route_host: impl Into<String>, route_port: u16) -> Self {
        Self {
            name: name.into(),
            sysfs_root: PathBuf::from("/sys/class/net"),
            route_target: (route_host.into(), route_port),
        }
    }

    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    fn operstate(&self) -> Option<String> {
        fs::read_to_string(self.sysfs_root.join(&self.name).join("operstate"))
            .ok()
            .map(|s| s.trim().to_string())
    }

    /// Local address the kernel would use to reach the route target.
    async fn outbound_address(&self) -> Option<IpAddr> {
        let (host, port) = &self.route_target;
        let targets = tokio::time::timeout(ROUTE_RESOLVE_TIMEOUT, lookup_host((host.as_str(), *port)))
            .await
            .ok()?
            .ok()?;

        for target in targets {
            let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
            let Ok(socket) = UdpSocket::bind(bind).await else {
                continue;
            };
            if socket.connect(target).await.is_err() {
                continue;
            }
            if let Ok(local) = socket.local_addr() {
                if !local.ip().is_unspecified() {
                    return Some(local.ip());
                }
            }
        }
        None
    }
}

impl NetworkInterface for HostInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn activate(&mut self) -> Result<(), NetworkError> {
        if !self.sysfs_root.join(&self.name).exists() {
            return Err(NetworkError::InterfaceNotFound(self.name.clone()));
        }
        Ok(())
    }

    fn request_association(&mut self, credentials: &NetworkCredentials) -> Result<(), NetworkError> {
        info!(
            interface = %self.name,
            ssid = %credentials.ssid,
            "Association delegated to the host supplicant"
        );
        Ok(())
    }

    async fn status(&mut self) -> LinkStatus {
        match self.operstate().as_deref() {
            Some("up") | Some("unknown") => match self.outbound_address().await {
                Some(address) => LinkStatus::Associated(IpConfig::with_address(address)),
                None => LinkStatus::Associating,
            },
            _ => LinkStatus::Down,
        }
    }
}
