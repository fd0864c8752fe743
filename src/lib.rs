//! Threshold alert monitor.
//!
//! Joins a network once, samples an analog sensor on a fixed cadence and
//! publishes a one-shot MQTT alert for every reading above the threshold.

pub mod config;
pub mod models;
pub mod monitor;
pub mod mqtt_transport;
pub mod network;
pub mod publisher;
pub mod sensor;
pub mod service_utils;
