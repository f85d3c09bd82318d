use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{
    CONNECT_DEADLINE, CONNECT_DELAY, DEFAULT_DEVICE_NAME, IS_CONNECTED_DEADLINE, POLL_DELAY,
    SCAN_DEADLINE_MARGIN, SCAN_WINDOW, SENSOR_DATA_CHARACTERISTIC, SENSOR_SERVICE,
};
use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Peripherals whose advertised local name contains this string are used.
    pub device_name: String,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub listen_address: IpAddr,
    pub port: u16,
    pub backoff_ms: u64,
    pub poll_interval_ms: u64,
    pub scan_window_ms: u64,
    pub connect_timeout_ms: u64,
    pub liveness_deadline_ms: u64,
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen_address, self.port)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn scan_window(&self) -> Duration {
        Duration::from_millis(self.scan_window_ms)
    }

    /// Upper bound for one whole scan, including adapter setup.
    pub fn scan_timeout(&self) -> Duration {
        self.scan_window() + Duration::from_millis(SCAN_DEADLINE_MARGIN)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn liveness_deadline(&self) -> Duration {
        Duration::from_millis(self.liveness_deadline_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "deviceName",
                reason: "must not be empty".to_string(),
            });
        }

        let intervals = [
            ("backoffMs", self.backoff_ms),
            ("pollIntervalMs", self.poll_interval_ms),
            ("scanWindowMs", self.scan_window_ms),
            ("connectTimeoutMs", self.connect_timeout_ms),
            ("livenessDeadlineMs", self.liveness_deadline_ms),
        ];

        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Invalid { field, reason: "must be greater than 0".to_string() });
            }
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            service_uuid: SENSOR_SERVICE,
            characteristic_uuid: SENSOR_DATA_CHARACTERISTIC,
            listen_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            backoff_ms: CONNECT_DELAY,
            poll_interval_ms: POLL_DELAY,
            scan_window_ms: SCAN_WINDOW,
            connect_timeout_ms: CONNECT_DEADLINE,
            liveness_deadline_ms: IS_CONNECTED_DEADLINE,
        }
    }
}
