//! A pretend anchor and tag on a pretend bench, for running the tool without
//! hardware attached.
//!
//! Each simulated module answers `get`/`set,antDelay` commands and otherwise
//! streams range lines like the real firmware does. The range it reports is
//! the bench distance, plus whatever its antenna delay register fails to
//! compensate for, plus some noise.

use crate::calibration::{ANT_DELAY_LSB, SPEED_OF_LIGHT_CM};
use crate::link::{LineLink, LinkError};

use log::debug;
use rand::prelude::*;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

#[derive(Debug, Clone)]
struct BenchState {
    distance_cm: f64,
    noise_cm: f64,
    silent: bool,
}

/// Shared physical setup that both simulated modules see.
#[derive(Debug, Clone)]
pub struct SimulatedBench {
    state: Arc<Mutex<BenchState>>,
    anchor_intrinsic_delay: u16,
    tag_intrinsic_delay: u16,
}

/// Settings for a [`SimulatedBench`], see [`SimulatedBench::builder`].
pub struct SimulatedBenchBuilder {
    distance_cm: f64,
    noise_cm: f64,
    anchor_intrinsic_delay: u16,
    tag_intrinsic_delay: u16,
}

impl SimulatedBenchBuilder {
    /// Where the tag starts out, in centimeters.
    pub fn distance(mut self, distance_cm: f64) -> Self {
        self.distance_cm = distance_cm;
        self
    }

    /// Spread of the uniform noise added to every range, in centimeters.
    pub fn noise(mut self, noise_cm: f64) -> Self {
        self.noise_cm = noise_cm;
        self
    }

    /// The antenna delay, in register ticks, that exactly compensates the
    /// anchor's signal path.
    pub fn anchor_intrinsic_delay(mut self, ticks: u16) -> Self {
        self.anchor_intrinsic_delay = ticks;
        self
    }

    /// Same as [`Self::anchor_intrinsic_delay`] for the tag.
    pub fn tag_intrinsic_delay(mut self, ticks: u16) -> Self {
        self.tag_intrinsic_delay = ticks;
        self
    }

    /// Set the bench up.
    pub fn build(self) -> SimulatedBench {
        SimulatedBench {
            state: Arc::new(Mutex::new(BenchState {
                distance_cm: self.distance_cm,
                noise_cm: self.noise_cm,
                silent: false,
            })),
            anchor_intrinsic_delay: self.anchor_intrinsic_delay,
            tag_intrinsic_delay: self.tag_intrinsic_delay,
        }
    }
}

impl SimulatedBench {
    /// Tag at 5 cm, 0.5 cm of noise, both modules needing a delay of 16436.
    pub fn builder() -> SimulatedBenchBuilder {
        SimulatedBenchBuilder {
            distance_cm: 5.0,
            noise_cm: 0.5,
            anchor_intrinsic_delay: 16_436,
            tag_intrinsic_delay: 16_436,
        }
    }

    /// Move the tag.
    pub fn set_distance(&self, distance_cm: f64) {
        debug!("Simulated tag moved to {} cm", distance_cm);
        self.state.lock().unwrap().distance_cm = distance_cm;
    }

    /// Make both modules stop talking, like a pulled cable.
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().unwrap().silent = silent;
    }

    /// A fresh link to the anchor, with its delay register cleared.
    pub fn anchor(&self) -> SimulatedLink {
        SimulatedLink::new(self.state.clone(), "A", "0001", self.anchor_intrinsic_delay)
    }

    /// A fresh link to the tag, with its delay register cleared.
    pub fn tag(&self) -> SimulatedLink {
        SimulatedLink::new(self.state.clone(), "T", "0002", self.tag_intrinsic_delay)
    }
}

/// One simulated module on the end of a pretend serial cable.
pub struct SimulatedLink {
    bench: Arc<Mutex<BenchState>>,
    device_type: &'static str,
    peer_addr: &'static str,
    intrinsic_delay: u16,
    ant_delay: u16,
    cmd_buf: Vec<u8>,
    responses: VecDeque<u8>,
}

impl SimulatedLink {
    fn new(
        bench: Arc<Mutex<BenchState>>,
        device_type: &'static str,
        peer_addr: &'static str,
        intrinsic_delay: u16,
    ) -> Self {
        Self {
            bench,
            device_type,
            peer_addr,
            intrinsic_delay,
            ant_delay: 0,
            cmd_buf: Vec::new(),
            responses: VecDeque::new(),
        }
    }

    /// What the antenna delay register currently holds.
    pub fn ant_delay(&self) -> u16 {
        self.ant_delay
    }

    fn handle_command(&mut self, cmd: &str) {
        let parts: Vec<&str> = cmd.trim().split(',').collect();
        match parts.as_slice() {
            ["get", "antDelay"] => {
                let reply = format!("antDelay: {}\r\n", self.ant_delay);
                self.responses.extend(reply.bytes());
            }
            ["set", "antDelay", value] => {
                if let Ok(value) = value.parse() {
                    self.ant_delay = value;
                }
            }
            _ => debug!("Simulated module ignoring {:?}", cmd),
        }
    }

    fn range_line(&self, state: &BenchState) -> String {
        let cm_per_tick = ANT_DELAY_LSB * SPEED_OF_LIGHT_CM;
        let uncompensated = self.intrinsic_delay as f64 - self.ant_delay as f64;
        let noise = if state.noise_cm > 0.0 {
            thread_rng().gen_range(-state.noise_cm..state.noise_cm)
        } else {
            0.0
        };
        let range_m = (state.distance_cm + uncompensated * cm_per_tick + noise) / 100.0;
        let power = -79.0 - state.distance_cm / 100.0;

        format!(
            "t:{} f:{} d:{:.5} p:{:.2}\r\n",
            self.device_type, self.peer_addr, range_m, power
        )
    }
}

impl LineLink for SimulatedLink {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<(), LinkError> {
        for &c in buf {
            if c == b'\r' || c == b'\n' {
                let cmd = String::from_utf8_lossy(&self.cmd_buf).into_owned();
                self.cmd_buf.clear();
                if !cmd.is_empty() {
                    self.handle_command(&cmd);
                }
            } else {
                self.cmd_buf.push(c);
            }
        }
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let state = self.bench.lock().unwrap().clone();
        if state.silent {
            thread::sleep(Duration::from_millis(1));
            return Ok(0);
        }

        if self.responses.is_empty() {
            let line = self.range_line(&state);
            self.responses.extend(line.bytes());
        }

        let n = buf.len().min(self.responses.len());
        for (slot, byte) in buf.iter_mut().zip(self.responses.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn discard_input(&mut self) -> Result<(), LinkError> {
        self.responses.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LineReader;
    use std::time::Instant;

    fn read_line(link: SimulatedLink) -> (String, LineReader<SimulatedLink>) {
        let mut reader = LineReader::new(link);
        let line = reader
            .read_line(Instant::now() + Duration::from_millis(100))
            .unwrap()
            .unwrap();
        (line, reader)
    }

    #[test]
    fn streams_range_lines() {
        let bench = SimulatedBench::builder()
            .distance(120.0)
            .noise(0.0)
            .anchor_intrinsic_delay(0)
            .build();
        let (line, _) = read_line(bench.anchor());
        assert_eq!(line, "t:A f:0001 d:1.20000 p:-80.20\r\n");
    }

    #[test]
    fn answers_antenna_delay_commands() {
        let bench = SimulatedBench::builder().build();
        let mut link = bench.tag();
        link.write_bytes(b"set,antDelay,321\r").unwrap();
        link.write_bytes(b"get,antDelay\r").unwrap();
        assert_eq!(link.ant_delay(), 321);

        let (line, _) = read_line(link);
        assert_eq!(line, "antDelay: 321\r\n");
    }

    #[test]
    fn compensated_delay_reports_true_distance() {
        let bench = SimulatedBench::builder()
            .distance(42.0)
            .noise(0.0)
            .anchor_intrinsic_delay(1000)
            .build();
        let mut link = bench.anchor();
        link.write_bytes(b"set,antDelay,1000\r").unwrap();
        let (line, _) = read_line(link);
        assert!(line.contains("d:0.42000"));
    }
}
