use sensor_flux::config::Config;
use sensor_flux::monitor::{MonitorError, MonitorLoop};
use sensor_flux::mqtt_transport::MqttTransport;
use sensor_flux::network::{HostInterface, JoinError};
use sensor_flux::publisher::AlertPublisher;
use sensor_flux::sensor::SysfsAdcSensor;
use sensor_flux::service_utils::{handle_shutdown, log_report, start_logging};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    start_logging();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Error loading configuration: {:?}", e);
            std::process::exit(1);
        }
    };

    info!(
        ssid = %config.network.ssid,
        broker = %config.broker,
        topic = %config.alert.topic,
        threshold = config.alert_threshold,
        "Starting sensor monitor"
    );

    let interface = HostInterface::new(
        config.wifi_interface.clone(),
        config.broker.host.clone(),
        config.broker.port,
    );
    let sensor = SysfsAdcSensor::new(config.sensor_path.clone(), config.sensor_max);
    let transport = MqttTransport::new(config.mqtt_keep_alive(), config.mqtt_connect_timeout())
        .with_credentials(&config.mqtt_username, &config.mqtt_password);
    let publisher = AlertPublisher::new(transport, config.connect_failure_policy());

    let cancel = CancellationToken::new();
    handle_shutdown(cancel.clone());

    let mut monitor = MonitorLoop::new(&config, interface, sensor, publisher);
    match monitor.run(&cancel).await {
        Ok(report) => log_report(&report),
        Err(MonitorError::Join(JoinError::Cancelled)) => {
            info!("Shutdown requested before the network join completed.");
        }
        Err(MonitorError::Join(e)) => {
            error!("Monitor stopped before sampling: {}", e);
            std::process::exit(1);
        }
    }

    info!("Sensor monitor shut down.");
}
