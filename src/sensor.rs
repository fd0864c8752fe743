//! Sensor source contract and the Linux IIO adapter.
//!
//! The monitor only needs "read the current analog level as an integer".
//! Pin setup and attenuation belong to the kernel driver behind the raw file.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("Failed to read sensor at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Sensor returned non-numeric data: {0:?}")]
    Parse(String),
    #[error("Sensor value {value} is outside the range 0..={max}")]
    OutOfRange { value: u32, max: u16 },
}

/// Synchronous read of the current analog level.
pub trait SensorSource {
    fn read_value(&mut self) -> Result<u16, SensorError>;
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn read_value(&mut self) -> Result<u16, SensorError> {
        (**self).read_value()
    }
}

/// Reads a raw ADC sample from an IIO sysfs attribute such as
/// `/sys/bus/iio/devices/iio:device0/in_voltage0_raw`.
#[derive(Debug, Clone)]
pub struct SysfsAdcSensor {
    path: PathBuf,
    max: u16,
}

impl SysfsAdcSensor {
    pub fn new(path: impl Into<PathBuf>, max: u16) -> Self {
        Self {
            path: path.into(),
            max,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SensorSource for SysfsAdcSensor {
    fn read_value(&mut self) -> Result<u16, SensorError> {
        let raw = fs::read_to_string(&self.path).map_err(|source| SensorError::Io {
            path: self.path.clone(),
            source,
        })?;
        parse_raw(&raw, self.max)
    }
}

fn parse_raw(raw: &str, max: u16) -> Result<u16, SensorError> {
    let trimmed = raw.trim();
    let value = trimmed
        .parse::<u32>()
        .map_err(|_| SensorError::Parse(trimmed.to_string()))?;
    if value > u32::from(max) {
        return Err(SensorError::OutOfRange { value, max });
    }
    Ok(value as u16)
}
