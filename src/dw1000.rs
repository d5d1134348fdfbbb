//! Query and configure a single DW1000 module over its line protocol.

use crate::config::Device;
use crate::hardware_message_decoder::{
    decode_field, Command, DecodeError, DeviceField, Field, ANT_DELAY_MAX,
};
use crate::link::{LineLink, LineReader, LinkError};

use log::{debug, warn};
use std::{
    fmt,
    time::{Duration, Instant},
};

/// How long to wait for a value before giving up.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait after writing a command before reading the response.
pub const READBACK_DELAY: Duration = Duration::from_millis(500);

/// How long to listen to an unknown port for its device type.
pub const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a module could not be queried or configured.
#[derive(Debug)]
pub enum DeviceError {
    /// The transport underneath failed.
    LinkError(LinkError),
    /// The antenna delay readback was not an integer register value.
    BadReadback(DecodeError),
    /// Requested antenna delay does not fit the 16-bit register.
    DelayOutOfRange(i64),
    /// The register did not hold the value we just wrote.
    DelayNotChanged {
        /// What was written
        expected: u16,
        /// What was read back, if anything
        actual: Option<u16>,
    },
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::LinkError(error) => write!(f, "link error: {}", error),
            DeviceError::BadReadback(error) => write!(f, "bad readback: {}", error),
            DeviceError::DelayOutOfRange(value) => write!(
                f,
                "antenna delay {} is outside 0..={}",
                value, ANT_DELAY_MAX
            ),
            DeviceError::DelayNotChanged { expected, actual } => write!(
                f,
                "antenna delay not changed, wanted {} but read back {:?}",
                expected, actual
            ),
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<LinkError> for DeviceError {
    fn from(value: LinkError) -> Self {
        Self::LinkError(value)
    }
}

/// Timing knobs for talking to a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceTiming {
    /// Longest wait for a line carrying the wanted field
    pub read_timeout: Duration,
    /// Pause between writing a command and reading its answer
    pub readback_delay: Duration,
}

impl Default for DeviceTiming {
    fn default() -> Self {
        Self {
            read_timeout: READ_TIMEOUT,
            readback_delay: READBACK_DELAY,
        }
    }
}

/// One DW1000 module, either the anchor or the tag.
///
/// Every query returns `Ok(None)` when the module stays quiet for longer than
/// the read timeout. Errors are reserved for a broken link or a module that
/// answers with garbage.
pub struct Dw1000<L: LineLink> {
    name: String,
    reader: LineReader<L>,
    timing: DeviceTiming,
}

impl<L: LineLink> Dw1000<L> {
    /// A module called `name` in logs and errors, with default timing.
    pub fn new(name: &str, link: L) -> Self {
        Self::with_timing(name, link, DeviceTiming::default())
    }

    /// Like [`Self::new`] with explicit timing.
    pub fn with_timing(name: &str, link: L, timing: DeviceTiming) -> Self {
        Self {
            name: name.to_owned(),
            reader: LineReader::new(link),
            timing,
        }
    }

    /// Name used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The transport underneath.
    pub fn link(&self) -> &L {
        self.reader.link()
    }

    /// The transport underneath, mutably.
    pub fn link_mut(&mut self) -> &mut L {
        self.reader.link_mut()
    }

    /// Latest range in centimeters.
    pub fn get_range_cm(&mut self) -> Result<Option<f64>, DeviceError> {
        match self.query(Field::Range)? {
            Some(DeviceField::Range(cm)) => {
                debug!("{}: range is {} cm", self.name, cm);
                Ok(Some(cm))
            }
            _ => Ok(None),
        }
    }

    /// Latest receive power in dBm.
    pub fn get_rx_power_dbm(&mut self) -> Result<Option<f64>, DeviceError> {
        match self.query(Field::RxPower)? {
            Some(DeviceField::RxPower(dbm)) => {
                debug!("{}: RX power is {} dBm", self.name, dbm);
                Ok(Some(dbm))
            }
            _ => Ok(None),
        }
    }

    /// The role the firmware reports on its `t:` field, verbatim.
    pub fn get_device_type(&mut self) -> Result<Option<String>, DeviceError> {
        match self.query(Field::DeviceType)? {
            Some(DeviceField::DeviceType(t)) => {
                debug!("{}: device type is {}", self.name, t);
                Ok(Some(t))
            }
            _ => Ok(None),
        }
    }

    /// The address of the module on the other end, from the `f:` field.
    pub fn get_peer_address(&mut self) -> Result<Option<String>, DeviceError> {
        match self.query(Field::PeerAddress)? {
            Some(DeviceField::PeerAddress(addr)) => {
                debug!("{}: peer address is {}", self.name, addr);
                Ok(Some(addr))
            }
            _ => Ok(None),
        }
    }

    /// Whether this is an anchor or a tag. `None` when the module is quiet
    /// or reports a role we do not know.
    pub fn identify(&mut self) -> Result<Option<Device>, DeviceError> {
        let device = self.get_device_type()?.and_then(|t| parse_device_type(&t));
        if device.is_none() {
            debug!("{}: could not tell anchor from tag", self.name);
        }
        Ok(device)
    }

    /// Ask the module for its antenna delay register.
    pub fn get_antenna_delay(&mut self) -> Result<Option<u16>, DeviceError> {
        self.send(Command::GetAntDelay)?;
        spin_sleep::sleep(self.timing.readback_delay);

        match self.await_field(Field::AntDelay)? {
            Some(DeviceField::AntDelay(value)) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    /// Write the antenna delay register and confirm it with a readback.
    pub fn set_antenna_delay(&mut self, value: i64) -> Result<(), DeviceError> {
        let value = u16::try_from(value).map_err(|_| DeviceError::DelayOutOfRange(value))?;

        debug!("{}: setting antenna delay to {}", self.name, value);
        self.send(Command::SetAntDelay(value))?;

        let actual = self.get_antenna_delay()?;
        if actual != Some(value) {
            return Err(DeviceError::DelayNotChanged {
                expected: value,
                actual,
            });
        }

        debug!("{}: antenna delay changed to {}", self.name, value);
        Ok(())
    }

    /// [`Self::set_antenna_delay`], tried a second time if the first attempt
    /// fails. The modules occasionally drop the first `set` after a reset.
    pub fn set_antenna_delay_retry(&mut self, value: i64) -> Result<(), DeviceError> {
        match self.set_antenna_delay(value) {
            Err(DeviceError::DelayOutOfRange(v)) => Err(DeviceError::DelayOutOfRange(v)),
            Err(e) => {
                warn!("{}: {}, trying again", self.name, e);
                self.set_antenna_delay(value)
            }
            Ok(()) => Ok(()),
        }
    }

    /// Write a command, after clearing out whatever was waiting on the line.
    pub fn send(&mut self, command: Command) -> Result<(), DeviceError> {
        debug!("{}: sending command {:?}", self.name, command.to_string());
        self.reader.resync()?;
        self.reader.write(command.to_string().as_bytes())?;
        Ok(())
    }

    /// Wait for the next fresh line carrying `field`.
    fn query(&mut self, field: Field) -> Result<Option<DeviceField>, DeviceError> {
        self.reader.resync()?;
        self.await_field(field)
    }

    fn await_field(&mut self, field: Field) -> Result<Option<DeviceField>, DeviceError> {
        let deadline = Instant::now() + self.timing.read_timeout;

        while let Some(line) = self.reader.read_line(deadline)? {
            match decode_field(&line, field) {
                None => continue,
                Some(Ok(value)) => return Ok(Some(value)),
                Some(Err(e)) if field == Field::AntDelay => {
                    return Err(DeviceError::BadReadback(e));
                }
                Some(Err(e)) => debug!("{}: skipping line, {}", self.name, e),
            }
        }

        debug!("{}: timeout expired waiting for {}", self.name, field);
        Ok(None)
    }
}

fn parse_device_type(t: &str) -> Option<Device> {
    match t.trim().to_ascii_lowercase().as_str() {
        "a" | "anchor" => Some(Device::Anchor),
        "t" | "tag" => Some(Device::Tag),
        _ => None,
    }
}

/// Pick the anchor and tag ports out of identified ports, if exactly one of
/// each was found. Returns `(anchor, tag)`.
pub fn assign_ports<P: Clone>(found: &[(P, Option<Device>)]) -> Option<(P, P)> {
    let with_role = |role: Device| -> Vec<&P> {
        found
            .iter()
            .filter(|(_, device)| *device == Some(role))
            .map(|(port, _)| port)
            .collect()
    };

    match (with_role(Device::Anchor).as_slice(), with_role(Device::Tag).as_slice()) {
        ([anchor], [tag]) => Some((P::clone(anchor), P::clone(tag))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy_dw1000::SimulatedBench;
    use crate::link::tests::ScriptedLink;

    fn quick() -> DeviceTiming {
        DeviceTiming {
            read_timeout: Duration::from_millis(50),
            readback_delay: Duration::ZERO,
        }
    }

    fn device(lines: &[&str]) -> Dw1000<ScriptedLink> {
        Dw1000::with_timing("anchor", ScriptedLink::with_lines(lines), quick())
    }

    #[test]
    fn range_skips_unrelated_and_malformed_lines() {
        let mut dev = device(&["booting\r\n", "d:oops\r\n", "t:A d:0.25 p:-80.5\r\n"]);
        assert_eq!(dev.get_range_cm().unwrap(), Some(25.0));
    }

    #[test]
    fn stream_fields_are_parsed() {
        let line = "t:A f:BEEF d:0.25 p:-80.5\r\n";
        let mut dev = device(&[line, line, line]);
        assert_eq!(dev.get_rx_power_dbm().unwrap(), Some(-80.5));
        assert_eq!(dev.get_device_type().unwrap().as_deref(), Some("A"));
        assert_eq!(dev.get_peer_address().unwrap().as_deref(), Some("BEEF"));
    }

    #[test]
    fn silence_times_out_cleanly() {
        let mut dev = device(&["p:-80\r\n"]);
        assert_eq!(dev.get_range_cm().unwrap(), None);
        assert_eq!(dev.get_antenna_delay().unwrap(), None);
    }

    #[test]
    fn set_antenna_delay_checks_readback() {
        let mut dev = device(&["antDelay: 16384\r\n"]);
        dev.set_antenna_delay(16384).unwrap();
        assert_eq!(
            String::from_utf8(dev.link().written.clone()).unwrap(),
            "set,antDelay,16384\rget,antDelay\r"
        );
    }

    #[test]
    fn mismatched_readback_is_an_error() {
        let mut dev = device(&["antDelay: 1\r\n"]);
        assert!(matches!(
            dev.set_antenna_delay(2),
            Err(DeviceError::DelayNotChanged {
                expected: 2,
                actual: Some(1)
            })
        ));
    }

    #[test]
    fn garbage_readback_is_an_error() {
        let mut dev = device(&["antDelay: lots\r\n"]);
        assert!(matches!(
            dev.get_antenna_delay(),
            Err(DeviceError::BadReadback(_))
        ));
    }

    #[test]
    fn out_of_range_delay_never_touches_the_link() {
        let mut dev = device(&[]);
        assert!(matches!(
            dev.set_antenna_delay_retry(70000),
            Err(DeviceError::DelayOutOfRange(70000))
        ));
        assert!(matches!(
            dev.set_antenna_delay(-1),
            Err(DeviceError::DelayOutOfRange(-1))
        ));
        assert!(dev.link().written.is_empty());
    }

    #[test]
    fn modules_say_what_they_are() {
        let bench = SimulatedBench::builder().build();
        let mut anchor = Dw1000::with_timing("port0", bench.anchor(), quick());
        let mut tag = Dw1000::with_timing("port1", bench.tag(), quick());
        assert_eq!(anchor.identify().unwrap(), Some(Device::Anchor));
        assert_eq!(tag.identify().unwrap(), Some(Device::Tag));

        let mut spelled_out = device(&["t:tag f:0001 d:0.5\r\n"]);
        assert_eq!(spelled_out.identify().unwrap(), Some(Device::Tag));
        let mut unknown = device(&["t:X d:0.5\r\n"]);
        assert_eq!(unknown.identify().unwrap(), None);

        bench.set_silent(true);
        assert_eq!(anchor.identify().unwrap(), None);
    }

    #[test]
    fn ports_are_assigned_only_when_unambiguous() {
        let found = [
            ("/dev/ttyS0", None),
            ("/dev/ttyUSB1", Some(Device::Tag)),
            ("/dev/ttyUSB0", Some(Device::Anchor)),
        ];
        assert_eq!(assign_ports(&found), Some(("/dev/ttyUSB0", "/dev/ttyUSB1")));

        let two_anchors = [
            ("/dev/ttyUSB0", Some(Device::Anchor)),
            ("/dev/ttyUSB1", Some(Device::Anchor)),
            ("/dev/ttyUSB2", Some(Device::Tag)),
        ];
        assert_eq!(assign_ports(&two_anchors), None);
        assert_eq!(assign_ports(&found[..2]), None);
    }

    #[test]
    fn retry_gives_a_second_chance() {
        let mut dev = device(&["antDelay: 0\r\n", "antDelay: 7\r\n"]);
        dev.set_antenna_delay_retry(7).unwrap();
    }
}
