use std::net::IpAddr;
use std::path::PathBuf;
use clap::Parser;
use log::LevelFilter;
use uuid::Uuid;

use crate::config::types::Config;

fn parse_level(value: &str) -> Result<LevelFilter, String> {
    value.parse().map_err(|_| format!("unknown log level \"{}\"", value))
}

#[derive(Parser, Debug, Clone)]
#[command(author, version)]
#[command(about = "Bridges the Mini 4WD torque rig's BLE telemetry to a live web dashboard.", long_about = None)]
pub struct Args {
    /// Path to the JSON config file. Defaults to <executable>.json if it exists, otherwise the
    /// per-user config directory.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Use the first peripheral whose advertised name contains this string.
    #[arg(long)]
    pub device_name: Option<String>,

    #[arg(long)]
    pub service_uuid: Option<Uuid>,

    #[arg(long)]
    pub characteristic_uuid: Option<Uuid>,

    #[arg(long)]
    pub listen_address: Option<IpAddr>,

    #[arg(long, short)]
    pub port: Option<u16>,

    /// Milliseconds to wait before scanning again after a failed attempt.
    #[arg(long)]
    pub backoff_ms: Option<u64>,

    /// Milliseconds between liveness checks of a subscribed peripheral.
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Write the effective configuration (file + flags) back to the config file.
    #[arg(long)]
    pub save_config: bool,

    /// off, error, warn, info, debug or trace
    #[arg(long, default_value = "info", value_parser = parse_level)]
    pub log_level: LevelFilter,
}

impl Args {
    /// Overrides the fields of `config` that were given on the command line.
    pub fn apply(&self, config: &mut Config) {
        if let Some(device_name) = &self.device_name {
            config.device_name = device_name.clone();
        }
        if let Some(uuid) = self.service_uuid {
            config.service_uuid = uuid;
        }
        if let Some(uuid) = self.characteristic_uuid {
            config.characteristic_uuid = uuid;
        }
        if let Some(address) = self.listen_address {
            config.listen_address = address;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(backoff_ms) = self.backoff_ms {
            config.backoff_ms = backoff_ms;
        }
        if let Some(poll_interval_ms) = self.poll_interval_ms {
            config.poll_interval_ms = poll_interval_ms;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let args = Args::try_parse_from([
            "mini4wd-torque-bridge",
            "--device-name", "Rig_B",
            "-p", "8080",
            "--backoff-ms", "250",
            "--log-level", "debug",
        ]).unwrap();
        let mut config = Config::default();

        args.apply(&mut config);

        assert_eq!(config.device_name, "Rig_B");
        assert_eq!(config.port, 8080);
        assert_eq!(config.backoff_ms, 250);
        assert_eq!(config.poll_interval_ms, Config::default().poll_interval_ms);
        assert_eq!(args.log_level, LevelFilter::Debug);
        assert!(!args.save_config);
    }

    #[test]
    fn no_flags_leave_config_untouched() {
        let args = Args::try_parse_from(["mini4wd-torque-bridge"]).unwrap();
        let mut config = Config { port: 1234, ..Config::default() };

        args.apply(&mut config);

        assert_eq!(config, Config { port: 1234, ..Config::default() });
        assert_eq!(args.log_level, LevelFilter::Info);
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(Args::try_parse_from(["mini4wd-torque-bridge", "--log-level", "loud"]).is_err());
        assert!(Args::try_parse_from(["mini4wd-torque-bridge", "--service-uuid", "nope"]).is_err());
    }
}
