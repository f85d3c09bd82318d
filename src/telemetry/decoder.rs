//! Decoding of the compact JSON notifications sent by the rig, e.g.
//! `{"f":152.3,"t":30.1,"v":7.4,"i":620,"p":4.588}`.

use std::str;
use chrono::{DateTime, Local};
use serde::Deserialize;

use crate::error::DecodeError;
use crate::telemetry::reading::{Reading, TIMESTAMP_FORMAT};

#[derive(Debug, Deserialize)]
struct Payload {
    f: Option<f64>,
    t: Option<f64>,
    v: Option<f64>,
    i: Option<f64>,
    p: Option<f64>,
}

/// Parses a raw notification into a connected [`Reading`] stamped with the current local time.
/// Missing (or `null`) keys default to 0.
pub fn decode(raw: &[u8]) -> Result<Reading, DecodeError> {
    decode_at(raw, Local::now())
}

pub fn decode_at(raw: &[u8], received: DateTime<Local>) -> Result<Reading, DecodeError> {
    let text = str::from_utf8(raw)?;
    let payload: Payload = serde_json::from_str(text)?;

    Ok(Reading {
        force_grams: payload.f.unwrap_or(0.0),
        torque_mnm: payload.t.unwrap_or(0.0),
        voltage_v: payload.v.unwrap_or(0.0),
        current_ma: payload.i.unwrap_or(0.0),
        power_w: payload.p.unwrap_or(0.0),
        timestamp: Some(received.format(TIMESTAMP_FORMAT).to_string()),
        connected: true,
    })
}
