use serde::{Deserialize, Serialize};

/// chrono format of [`Reading::timestamp`]: local time with millisecond precision.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// The latest sample from the rig. Readings are replaced wholesale, never patched field by field.
///
/// Field names on the wire keep the units of the dashboard (`torque_mNm`, `power_W`, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reading {
    pub force_grams: f64,
    #[serde(rename = "torque_mNm")]
    pub torque_mnm: f64,
    #[serde(rename = "voltage_V")]
    pub voltage_v: f64,
    #[serde(rename = "current_mA")]
    pub current_ma: f64,
    #[serde(rename = "power_W")]
    pub power_w: f64,
    /// `None` until the first notification has been decoded.
    pub timestamp: Option<String>,
    pub connected: bool,
}
