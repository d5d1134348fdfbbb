//! Typed decoding of the text lines a DW1000 module prints over UART, and
//! encoding of the commands we send back to it.
//!
//! The firmware streams lines such as `t:A f:1A2B d:0.523 p:-79.42` while
//! ranging, and answers `get,antDelay` with `antDelay: 32900`. A query looks
//! for one [`Field`] prefix anywhere in a line and takes the token after it,
//! up to the next space.

use nom::{
    bytes::complete::{tag, take_till, take_until},
    combinator::rest,
    sequence::{pair, preceded},
    IResult,
};

use std::fmt;

/// Largest value the 16-bit antenna delay register can hold.
pub const ANT_DELAY_MAX: u16 = u16::MAX;

/// The values a module reports, identified by their line prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// `d:`, the measured range in meters
    Range,
    /// `t:`, the kind of device on the other end of the cable
    DeviceType,
    /// `f:`, the address of the peer the range was measured against
    PeerAddress,
    /// `p:`, the receive power in dBm
    RxPower,
    /// `antDelay: `, the antenna delay register readback
    AntDelay,
}

impl Field {
    /// The substring that marks this field in a line.
    pub fn prefix(&self) -> &'static str {
        match self {
            Field::Range => "d:",
            Field::DeviceType => "t:",
            Field::PeerAddress => "f:",
            Field::RxPower => "p:",
            Field::AntDelay => "antDelay: ",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Range => "range",
            Field::DeviceType => "device type",
            Field::PeerAddress => "peer address",
            Field::RxPower => "RX power",
            Field::AntDelay => "antenna delay",
        };
        write!(f, "{}", name)
    }
}

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceField {
    /// Range in centimeters (the wire carries meters)
    Range(f64),
    /// Role letter or word, e.g. `A` or `tag`
    DeviceType(String),
    /// Peer address as printed, e.g. `1A2B`
    PeerAddress(String),
    /// Receive power in dBm
    RxPower(f64),
    /// Antenna delay register value
    AntDelay(u16),
}

/// A line carried the prefix we wanted but the value behind it did not
/// convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// The field being decoded
    pub field: Field,
    /// The text found after its prefix
    pub token: String,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not convert {} value {:?}", self.field, self.token)
    }
}

impl std::error::Error for DecodeError {}

type Parsed<'a, O> = IResult<&'a str, O>;

fn skip_to<'a>(prefix: &'static str) -> impl FnMut(&'a str) -> Parsed<'a, (&'a str, &'a str)> {
    pair(take_until(prefix), tag(prefix))
}

/// The token following `prefix`, up to the next space or line ending.
fn token_after<'a>(prefix: &'static str) -> impl FnMut(&'a str) -> Parsed<'a, &'a str> {
    let end_of_token = |c: char| c == ' ' || c == '\r' || c == '\n';
    preceded(skip_to(prefix), take_till(end_of_token))
}

/// Everything following `prefix` to the end of the line.
fn remainder_after<'a>(prefix: &'static str) -> impl FnMut(&'a str) -> Parsed<'a, &'a str> {
    preceded(skip_to(prefix), rest)
}

/// Look for `field` in `line`.
///
/// Returns `None` when the prefix does not occur in the line, so the caller
/// should keep reading. Numeric tokens that fail to convert come back as
/// `Some(Err(_))`.
pub fn decode_field(line: &str, field: Field) -> Option<Result<DeviceField, DecodeError>> {
    let prefix = field.prefix();

    let raw = match field {
        Field::AntDelay => remainder_after(prefix)(line).ok()?.1.trim(),
        _ => token_after(prefix)(line).ok()?.1,
    };

    let bad = || DecodeError {
        field,
        token: raw.to_owned(),
    };

    let value = match field {
        Field::Range => raw
            .parse::<f64>()
            .map(|meters| DeviceField::Range(meters * 100.0))
            .map_err(|_| bad()),
        Field::RxPower => raw.parse::<f64>().map(DeviceField::RxPower).map_err(|_| bad()),
        Field::DeviceType => Ok(DeviceField::DeviceType(raw.to_owned())),
        Field::PeerAddress => Ok(DeviceField::PeerAddress(raw.to_owned())),
        Field::AntDelay => raw.parse::<u16>().map(DeviceField::AntDelay).map_err(|_| bad()),
    };

    Some(value)
}

/// A command understood by the module firmware. Every command is of the form
/// `{get|set},<field>[,<value>]` and ends with a carriage return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `get,antDelay`, answered with an `antDelay: ` line
    GetAntDelay,
    /// `set,antDelay,<value>`, not answered
    SetAntDelay(u16),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::GetAntDelay => write!(f, "get,antDelay\r"),
            Command::SetAntDelay(value) => write!(f, "set,antDelay,{}\r", value),
        }
    }
}
