//! Decoder for the Coban TK-102 tracker family
//!
//! The TK-102 speaks an ASCII protocol with three frame shapes:
//!
//! ```text
//! ##,imei:123456789012345,A;                    logon
//! 123456789012345;                              heartbeat
//! imei:123456789012345,tracker,...;             track report
//! ```
//!
//! Logon and heartbeat frames are acknowledged on the wire; track frames
//! carry the GPS and sensor payload. The framer strips the `;` delimiter
//! before frames reach the decoder, so the terminator is optional in every
//! shape.

use std::sync::LazyLock;

use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, NaiveTime, Timelike, Utc};
use regex::Regex;

use crate::decoder::{Decoded, Decoder};
use crate::message::Message;

/// Acknowledgment written back after a logon frame
const LOGON_ACK: &str = "LOAD;";
/// Acknowledgment written back after a heartbeat frame
const HEARTBEAT_ACK: &str = "ON;";

static LOGON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##,imei:(\d{15,16}),A;?$").unwrap());
static HEARTBEAT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{15,16});?$").unwrap());
static TRACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^imei:(\d{15,16}),([\w ]+),(\d*),(\d*),([lf]),([\d.]*)(?:,([av]?),([\w.]*),([ns]?),([\w.]*),([ew]?),([\d.]*),([\d.]*)(?:,([\d.]*),([01]*),([01]*),([\d.%]*),([\d.%]*),([\d.]*))?)?;?$",
    )
    .unwrap()
});

/// Coban TK-102 protocol decoder, one per identified session
#[derive(Debug, Default)]
pub struct CobanTk102 {
    imei: Option<String>,
}

impl CobanTk102 {
    /// Frame signature the registry dispatches on
    pub const SIGNATURE: &'static [u8; 2] = b"##";

    pub fn new() -> Self {
        Self::default()
    }

    /// IMEI of the bound device, once identified
    pub fn imei(&self) -> Option<&str> {
        self.imei.as_deref()
    }
}

impl Decoder for CobanTk102 {
    fn identify(&mut self, first_frame: &str) -> Option<String> {
        let message = parse_frame(first_frame);
        self.imei = message.imei;
        self.imei.clone()
    }

    fn decode(&mut self, frame: &str) -> Decoded {
        let message = parse_frame(frame);

        let replies = match message.cmd.as_deref() {
            Some("logon") => {
                let imei = message.imei.as_deref().unwrap_or_default();
                vec![
                    Bytes::from_static(LOGON_ACK.as_bytes()),
                    Bytes::from(format!("**,imei:{imei},C,10s;")),
                ]
            }
            Some("heartbeat") => vec![Bytes::from_static(HEARTBEAT_ACK.as_bytes())],
            _ => Vec::new(),
        };

        Decoded { message, replies }
    }
}

/// Classify one frame and parse it into a [`Message`]
///
/// The three shapes are checked in order; a frame matching none of them
/// yields the invalid message.
fn parse_frame(frame: &str) -> Message {
    if let Some(caps) = LOGON.captures(frame) {
        return Message::valid(&caps[1], "logon");
    }

    if let Some(caps) = HEARTBEAT.captures(frame) {
        return Message::valid(&caps[1], "heartbeat");
    }

    if let Some(caps) = TRACK.captures(frame) {
        let mut message = Message::valid(&caps[1], &caps[2]);

        let device_time = normalize_device_time(&caps[6]);
        message.device_time = (device_time != 0).then_some(device_time);

        let token = |index: usize| caps.get(index).map_or("", |m| m.as_str());

        // GPS block is only present in full-fix records
        if token(5).eq_ignore_ascii_case("f") {
            message.gps.fix = token(7).eq_ignore_ascii_case("a");
            let longitude = decimal_degrees(token(10), token(11));
            let latitude = decimal_degrees(token(8), token(9));
            if let (Some(longitude), Some(latitude)) = (longitude, latitude) {
                message.gps.position = Some((longitude, latitude));
            }
            message.gps.speed = parse_float(token(12));
            message.gps.heading = parse_float(token(13));
            message.gps.altitude = parse_float(token(14));
        }

        message.sensors.ignition = parse_flag(token(15));
        message.sensors.door = parse_flag(token(16));
        message.sensors.fuel1 = parse_float(token(17));
        message.sensors.fuel2 = parse_float(token(18));
        message.sensors.temperature = parse_float(token(19));

        return message;
    }

    Message::invalid()
}

/// Parse an optional numeric token, tolerating a trailing percent sign
fn parse_float(token: &str) -> Option<f64> {
    let token = token.trim_end_matches('%');
    if token.is_empty() {
        return None;
    }
    token.parse().ok()
}

/// Parse an optional `0`/`1` sensor bit
fn parse_flag(token: &str) -> Option<bool> {
    if token.is_empty() {
        return None;
    }
    token.parse::<i64>().ok().map(|bit| bit != 0)
}

/// Convert a degree-minutes coordinate token to decimal degrees
///
/// The token ends in minutes (`mm` plus any decimal fraction); the leading
/// digits are whole degrees. The hemisphere vector gives the sign. Returns
/// `None` for a malformed token or vector rather than failing the decode.
pub fn decimal_degrees(degree_minutes: &str, vector: &str) -> Option<f64> {
    let sign = match vector.to_ascii_uppercase().as_str() {
        "N" | "E" => 1.0,
        "S" | "W" => -1.0,
        _ => return None,
    };

    // Minutes are the two digits before the decimal point plus the
    // fraction; without a fraction, the final two digits.
    let split = match degree_minutes.find('.') {
        Some(dot) => dot.checked_sub(2)?,
        None => degree_minutes.len().checked_sub(2)?,
    };
    let (degrees, minutes) = degree_minutes.split_at(split);

    let degrees: f64 = if degrees.is_empty() {
        0.0
    } else {
        degrees.parse::<u32>().ok()? as f64
    };
    let minutes: f64 = minutes.parse().ok()?;

    let decimal = sign * (degrees + minutes / 60.0);
    let decimal = (decimal * 1_000_000.0).round() / 1_000_000.0;
    decimal.is_finite().then_some(decimal)
}

/// Normalize a device time-of-day token against the current UTC clock
///
/// Returns milliseconds since Unix epoch, or `0` when the token carries no
/// usable time.
pub fn normalize_device_time(token: &str) -> i64 {
    normalize_device_time_at(token, Utc::now())
}

/// Clock-injected form of [`normalize_device_time`]
///
/// The token encodes `HHMMSS.mmm` in the device's (UTC) clock but carries no
/// date. The date is taken from `now`, stepped forward or back one day when
/// the report straddles midnight: a token hour of 0 against a late `now`
/// hour means the event happened just after midnight (advance), a `now` hour
/// of 0 against a late token hour means it happened just before (step back).
pub fn normalize_device_time_at(token: &str, now: DateTime<Utc>) -> i64 {
    fn convert(token: &str, now: DateTime<Utc>) -> Option<i64> {
        // A token with a zero or non-numeric integer part carries no time
        let integral: i64 = token.split('.').next()?.parse().ok()?;
        if integral == 0 {
            return None;
        }

        let hour: u32 = token.get(0..2)?.parse().ok()?;
        let minute: u32 = token.get(2..4)?.parse().ok()?;
        let second: u32 = token.get(4..6)?.parse().ok()?;
        let millis: u32 = token.get(7..10).and_then(|m| m.parse().ok()).unwrap_or(0);

        let mut date = now.date_naive();
        if hour != now.hour() {
            if hour == 0 {
                date = date.succ_opt()?;
            }
            if now.hour() == 0 {
                date = date.pred_opt()?;
            }
        }

        let time = NaiveTime::from_hms_milli_opt(hour, minute, second, millis)?;
        Some(NaiveDateTime::new(date, time).and_utc().timestamp_millis())
    }

    convert(token, now).unwrap_or(0)
}
