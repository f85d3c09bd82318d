use std::any::Any;
use std::io;
use std::net::SocketAddr;
use std::str::Utf8Error;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },

    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start async runtime: {source}")]
    Runtime { source: io::Error },

    #[error("Failed to listen on {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("HTTP server failed: {source}")]
    Serve { source: io::Error },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("Characteristic {characteristic} of service {service} is not available")]
    MissingCharacteristic { service: Uuid, characteristic: Uuid },

    #[error("{operation} did not complete within {deadline:?}")]
    Timeout { operation: &'static str, deadline: Duration },
}

/// Failures of one step of the connection state machine. Every variant is
/// recoverable; the supervisor logs it and starts scanning again.
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("No peripheral advertising \"{device_name}\" was found")]
    NotFound { device_name: String },

    #[error("Scanning for peripherals failed: {source}")]
    Discovery { source: DeviceError },

    #[error("Connecting to {device} failed: {source}")]
    Connection { device: String, source: DeviceError },

    #[error("Link to {device} lost: {reason}")]
    LinkLost { device: String, reason: String },
}

impl LinkError {
    /// Whether the supervisor waits for the backoff interval before scanning again.
    /// A lost link is rescanned right away, everything else backs off.
    pub fn backs_off(&self) -> bool {
        !matches!(self, LinkError::LinkLost { .. })
    }
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Notification is not valid utf-8: {source}")]
    Utf8 { #[from] source: Utf8Error },

    #[error("Notification is not a valid sensor payload: {source}")]
    Json { #[from] source: serde_json::Error },
}

pub fn readable_task_panic_error(error: &Box<dyn Any + Send + 'static>) -> String {
    let mut stringified = String::from("???");

    if let Some(s) = error.downcast_ref::<&str>() {
        stringified = s.to_string();
    }
    else if let Some(s) = error.downcast_ref::<String>() {
        stringified = s.clone();
    }

    format!("panic from task: [{}]", stringified)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_link_is_rescanned_without_backoff() {
        let lost = LinkError::LinkLost { device: "dev".into(), reason: "gone".into() };
        let missing = LinkError::NotFound { device_name: "dev".into() };

        assert!(!lost.backs_off());
        assert!(missing.backs_off());
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(readable_task_panic_error(&payload), "panic from task: [boom]");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(readable_task_panic_error(&payload), "panic from task: [bang]");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(readable_task_panic_error(&payload), "panic from task: [???]");
    }
}
