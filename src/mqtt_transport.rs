use crate::models::{AlertMessage, BrokerEndpoint};
use crate::publisher::{BrokerSession, BrokerTransport, TransportError};
use log::{debug, info, warn};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::time::{timeout, Duration};

/// Opens short-lived rumqttc sessions, one per alert.
#[derive(Debug, Clone)]
pub struct MqttTransport {
    username: String,
    password: String,
    keep_alive: Duration,
    io_timeout: Duration,
}

impl MqttTransport {
    pub fn new(keep_alive: Duration, io_timeout: Duration) -> Self {
        Self {
            username: String::new(),
            password: String::new(),
            keep_alive,
            io_timeout,
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    fn options(&self, endpoint: &BrokerEndpoint) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(&endpoint.client_id, &endpoint.host, endpoint.port);
        mqtt_options.set_keep_alive(self.keep_alive);
        mqtt_options.set_clean_session(true);

        if !self.username.is_empty() && !self.password.is_empty() {
            mqtt_options.set_credentials(&self.username, &self.password);
        }
        mqtt_options
    }
}

impl BrokerTransport for MqttTransport {
    type Session = MqttSession;

    async fn connect(&self, endpoint: &BrokerEndpoint) -> Result<MqttSession, TransportError> {
        debug!("Configuring MQTT broker at {}...", endpoint);

        // Small request queue: a session carries one PUBLISH and one DISCONNECT.
        let (client, mut eventloop) = AsyncClient::new(self.options(endpoint), 4);

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack),
                    Ok(event) => debug!("Event before CONNACK: {:?}", event),
                    Err(e) => return Err(e),
                }
            }
        };

        match timeout(self.io_timeout, handshake).await {
            Err(_) => Err(TransportError::Timeout(self.io_timeout)),
            Ok(Err(rumqttc::ConnectionError::ConnectionRefused(code))) => {
                Err(TransportError::Refused(format!("{:?}", code)))
            }
            Ok(Err(e)) => Err(TransportError::Connect(e.to_string())),
            Ok(Ok(ack)) if ack.code != ConnectReturnCode::Success => {
                Err(TransportError::Refused(format!("{:?}", ack.code)))
            }
            Ok(Ok(_)) => {
                info!("Connected to MQTT broker {}.", endpoint);
                Ok(MqttSession {
                    client,
                    eventloop,
                    io_timeout: self.io_timeout,
                    broken: false,
                })
            }
        }
    }
}

/// An open broker connection. Dropping it closes the socket.
pub struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    io_timeout: Duration,
    /// Set once a flush fails. Polling rumqttc after that reconnects and
    /// replays queued requests, so the event loop must not be driven again.
    broken: bool,
}

impl MqttSession {
    /// Drive the event loop until `done` matches an outgoing packet.
    async fn flush_until<F>(&mut self, done: F) -> Result<(), FlushError>
    where
        F: Fn(&Outgoing) -> bool,
    {
        let eventloop = &mut self.eventloop;
        let drive = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(outgoing)) if done(&outgoing) => return Ok(()),
                    Ok(event) => debug!("Session event: {:?}", event),
                    Err(e) => return Err(FlushError::Connection(e.to_string())),
                }
            }
        };

        let result = timeout(self.io_timeout, drive)
            .await
            .unwrap_or(Err(FlushError::Timeout(self.io_timeout)));
        if result.is_err() {
            self.broken = true;
        }
        result
    }
}

enum FlushError {
    Connection(String),
    Timeout(Duration),
}

impl FlushError {
    fn into_transport(self, wrap: fn(String) -> TransportError) -> TransportError {
        match self {
            FlushError::Connection(msg) => wrap(msg),
            FlushError::Timeout(after) => TransportError::Timeout(after),
        }
    }
}

impl BrokerSession for MqttSession {
    async fn publish(&mut self, message: &AlertMessage) -> Result<(), TransportError> {
        self.client
            .publish(message.topic.clone(), QoS::AtMostOnce, false, message.payload.clone())
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))?;

        self.flush_until(|outgoing| matches!(outgoing, Outgoing::Publish(_)))
            .await
            .map_err(|e| e.into_transport(TransportError::Publish))?;

        debug!("Message published to '{}'.", message.topic);
        Ok(())
    }

    async fn close(mut self) -> Result<(), TransportError> {
        if self.broken {
            debug!("MQTT connection already lost; dropping session without DISCONNECT.");
            return Ok(());
        }

        if let Err(e) = self.client.disconnect().await {
            warn!("Failed to queue MQTT disconnect: {:?}", e);
            return Err(TransportError::Disconnect(e.to_string()));
        }

        self.flush_until(|outgoing| matches!(outgoing, Outgoing::Disconnect))
            .await
            .map_err(|e| e.into_transport(TransportError::Disconnect))?;

        debug!("MQTT session closed.");
        Ok(())
    }
}
