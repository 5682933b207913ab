//! Normalized track message produced by a decoder

use crate::now_ms;

/// A single decoded track message
///
/// One `Message` is produced per protocol frame. A frame that matches none of
/// the decoder's known shapes still yields a `Message` with `valid == false`;
/// that is a negative decode result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// True if the decoder found a valid track message
    pub valid: bool,
    /// IMEI number of the device which sent the message; set only when valid
    pub imei: Option<String>,
    /// Message kind (`logon`, `heartbeat`, or a track subtype)
    pub cmd: Option<String>,
    /// When this message was decoded, in milliseconds since Unix epoch
    pub received_at: i64,
    /// Device clock of the track event, in milliseconds since Unix epoch;
    /// absent when the device sent no usable time
    pub device_time: Option<i64>,
    /// GPS readings reported with the message
    pub gps: GpsData,
    /// Sensor readings reported with the message
    pub sensors: SensorData,
}

/// GPS data block of a track message
///
/// `None` means the device did not report the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsData {
    /// True if the device found enough satellites for a precise fix
    pub fix: bool,
    /// Decimal degrees, longitude first
    pub position: Option<(f64, f64)>,
    /// Speed in knots
    pub speed: Option<f64>,
    /// Heading in degrees
    pub heading: Option<f64>,
    /// Altitude in meters
    pub altitude: Option<f64>,
}

/// Sensor data block of a track message
///
/// `None` means the sensor is not installed or did not report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorData {
    pub ignition: Option<bool>,
    pub door: Option<bool>,
    /// Fuel sensor 1, percent
    pub fuel1: Option<f64>,
    /// Fuel sensor 2, percent
    pub fuel2: Option<f64>,
    /// Temperature in degrees Celsius
    pub temperature: Option<f64>,
}

impl Message {
    /// Create a valid message of the given kind
    pub fn valid(imei: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            valid: true,
            imei: Some(imei.into()),
            cmd: Some(cmd.into()),
            received_at: now_ms(),
            device_time: None,
            gps: GpsData::default(),
            sensors: SensorData::default(),
        }
    }

    /// Create the negative decode result for an unrecognized frame
    pub fn invalid() -> Self {
        Self {
            valid: false,
            imei: None,
            cmd: None,
            received_at: now_ms(),
            device_time: None,
            gps: GpsData::default(),
            sensors: SensorData::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_message() {
        let msg = Message::valid("123456789012345", "logon");
        assert!(msg.valid);
        assert_eq!(msg.imei.as_deref(), Some("123456789012345"));
        assert_eq!(msg.cmd.as_deref(), Some("logon"));
        assert!(msg.received_at > 0);
        assert!(msg.device_time.is_none());
    }

    #[test]
    fn test_invalid_message_has_no_identity() {
        let msg = Message::invalid();
        assert!(!msg.valid);
        assert!(msg.imei.is_none());
        assert!(msg.cmd.is_none());
        assert!(!msg.gps.fix);
        assert!(msg.gps.position.is_none());
        assert!(msg.sensors.ignition.is_none());
    }
}
