//! Ranging sessions between an anchor and a tag: sample collection, distance
//! sweeps and the antenna delay search.

use crate::analysis::{format_remaining, linear_curve_fit, scale_linear_value, LinearFit};
use crate::config::TestInfo;
use crate::distance_map::{mean, DistanceKey, DistanceMap};
use crate::dw1000::{DeviceError, Dw1000};
use crate::link::LineLink;
use crate::sample_buffer::SampleBuffer;

use log::{debug, info, warn};
use std::{fmt, time::Instant};

/// Speed of light in a vacuum, in cm/s.
pub const SPEED_OF_LIGHT_CM: f64 = 299_792_458.0 * 100.0;

/// One LSB of the antenna delay register, about 15.65 ps.
pub const ANT_DELAY_LSB: f64 = 1.0 / (499.2e6 * 128.0);

/// The search stops once the average lands this close to the true distance.
pub const ANT_DELAY_TOLERANCE_CM: f64 = 1.0;

/// Antenna delay step sizes, coarse to fine.
pub const ADJUST_STEPS: [u16; 3] = [10, 5, 1];

/// Why a session could not finish.
#[derive(Debug)]
pub enum CalError {
    /// Talking to one of the modules failed.
    DeviceError(DeviceError),
    /// A module went quiet for longer than the read timeout.
    NoReading(String),
    /// The operator backed out at a prompt.
    Aborted,
    /// The delay search used up its measurement budget without converging.
    SearchExhausted {
        /// Averaged measurements taken
        measurements: usize,
        /// Delay of the last measurement
        last_delay: u16,
        /// Average of the last measurement, in cm
        last_average: f64,
    },
    /// The sweep produced no samples at the distance the estimate needs.
    MissingDistance(DistanceKey),
    /// A correction line needs samples at two distances or more.
    NoFit(String),
}

impl fmt::Display for CalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalError::DeviceError(error) => write!(f, "device error: {}", error),
            CalError::NoReading(device) => write!(
                f,
                "no reading from the {}, please check the connection and try again",
                device
            ),
            CalError::Aborted => write!(f, "aborted by operator"),
            CalError::SearchExhausted {
                measurements,
                last_delay,
                last_average,
            } => write!(
                f,
                "antenna delay search gave up after {} measurements at delay {} ({:.2} cm)",
                measurements, last_delay, last_average
            ),
            CalError::MissingDistance(key) => write!(f, "no samples at {}", key),
            CalError::NoFit(device) => {
                write!(f, "need at least two distances to fit the {}", device)
            }
        }
    }
}

impl std::error::Error for CalError {}

impl From<DeviceError> for CalError {
    fn from(value: DeviceError) -> Self {
        Self::DeviceError(value)
    }
}

/// Aggregate antenna delay, in seconds, implied by measuring `avg_range_cm`
/// across a true separation of `sep_cm`. The delay is counted on both the
/// transmit and receive path, so it is not halved.
pub fn avg_ant_delay(avg_range_cm: f64, sep_cm: f64) -> f64 {
    (avg_range_cm - sep_cm) / SPEED_OF_LIGHT_CM
}

/// Seconds to antenna delay register ticks, clamped to the register width.
pub fn convert_ant_delay(seconds: f64) -> u16 {
    (seconds / ANT_DELAY_LSB).round().clamp(0.0, u16::MAX as f64) as u16
}

/// Starting point for the search from one batch of ranges taken with both
/// delays at zero. Returns the `(anchor, tag)` delays; the tag is kept at
/// zero so the whole aggregate delay lives on the anchor.
pub fn initial_ant_delay(avg_range_cm: f64, sep_cm: f64) -> (u16, u16) {
    let anchor = convert_ant_delay(avg_ant_delay(avg_range_cm, sep_cm));
    (anchor, 0)
}

/// Something that can apply an antenna delay and report the average range
/// measured with it.
pub trait DelayProbe {
    /// Average range, in cm, with the anchor set to `delay`.
    fn measure(&mut self, delay: u16) -> Result<f64, CalError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Add,
    Sub,
}

impl Direction {
    /// A long reading needs more delay, a short one less.
    fn toward(avg: f64, target: f64) -> Self {
        if avg > target {
            Direction::Add
        } else {
            Direction::Sub
        }
    }
}

/// Step search for the antenna delay that makes the averaged range match a
/// known distance.
///
/// The delay moves by the current step for as long as the error keeps its
/// sign. When the sign flips, the next smaller step is taken instead; the
/// smallest step is kept once reached.
#[derive(Debug, Clone)]
pub struct DelaySearch {
    /// True separation the averaged range should match
    pub target_cm: f64,
    /// Accepted distance either side of the target
    pub tolerance_cm: f64,
    /// Step sizes, coarse to fine
    pub steps: Vec<u16>,
    /// Averaged measurements allowed before giving up
    pub max_measurements: usize,
}

impl DelaySearch {
    /// A search with the default tolerance and steps.
    pub fn new(target_cm: f64, max_measurements: usize) -> Self {
        Self {
            target_cm,
            tolerance_cm: ANT_DELAY_TOLERANCE_CM,
            steps: ADJUST_STEPS.to_vec(),
            max_measurements,
        }
    }

    fn converged(&self, avg: f64) -> bool {
        avg <= self.target_cm + self.tolerance_cm && avg >= self.target_cm - self.tolerance_cm
    }

    /// Search from `initial`, returning the first delay whose average is in
    /// tolerance.
    pub fn run<P: DelayProbe>(&self, probe: &mut P, initial: u16) -> Result<u16, CalError> {
        let mut delay = initial;
        let mut step_idx = 0;
        let mut avg = probe.measure(delay)?;
        let mut measurements = 1;
        let mut last = Direction::toward(avg, self.target_cm);

        info!("distAvg: {:.2} cm at delay {}", avg, delay);

        while !self.converged(avg) {
            let wanted = Direction::toward(avg, self.target_cm);

            if wanted != last {
                if step_idx + 1 < self.steps.len() {
                    step_idx += 1;
                    debug!("Changing adjust step to {}", self.steps[step_idx]);
                }
                last = wanted;
                continue;
            }

            if measurements >= self.max_measurements {
                return Err(CalError::SearchExhausted {
                    measurements,
                    last_delay: delay,
                    last_average: avg,
                });
            }

            let step = self.steps[step_idx];
            delay = match wanted {
                Direction::Add => delay.saturating_add(step),
                Direction::Sub => delay.saturating_sub(step),
            };
            debug!("{:?} {} to get {}", wanted, step, delay);

            avg = probe.measure(delay)?;
            measurements += 1;
            info!("distAvg: {:.2} cm at delay {}", avg, delay);
        }

        Ok(delay)
    }
}

/// How far along a collection run is, reported after every sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Distance being sampled
    pub distance_cm: u32,
    /// Samples held so far at this distance
    pub collected: usize,
    /// Samples wanted at this distance
    pub target: usize,
    /// Percent of the current distance
    pub loop_percent: u32,
    /// Percent of the whole sweep
    pub test_percent: u32,
    /// `HH:MM:SS.mmm` left at this distance
    pub remaining: String,
}

/// What a sweep collected, keyed by distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepData {
    /// Ranges the anchor reported, in cm
    pub anchor: DistanceMap,
    /// Ranges the tag reported, in cm
    pub tag: DistanceMap,
    /// Measurement loop durations, in ms
    pub loop_time: DistanceMap,
}

/// The result of an antenna delay calibration run.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Estimate taken from ranging with both delays cleared
    pub initial_anchor_delay: u16,
    /// Where the search settled
    pub anchor_delay: u16,
    /// Always zero; the anchor carries the whole delay
    pub tag_delay: u16,
    /// The zero delay samples the estimate came from
    pub data: SweepData,
}

/// Correction lines for live ranging, fitted after a calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamCorrection {
    /// The calibration both modules were set to before the sweep
    pub calibration: Calibration,
    /// Samples the lines were fitted to
    pub data: SweepData,
    /// Anchor ranges against actual distance
    pub anchor_fit: LinearFit,
    /// Tag ranges against actual distance
    pub tag_fit: LinearFit,
}

impl StreamCorrection {
    /// Map a raw anchor and tag range onto the actual distance.
    pub fn correct(&self, anchor_cm: f64, tag_cm: f64) -> (f64, f64) {
        (
            scale_linear_value(anchor_cm, self.anchor_fit.m, self.anchor_fit.b),
            scale_linear_value(tag_cm, self.tag_fit.m, self.tag_fit.b),
        )
    }
}

/// An anchor and a tag ranging against each other, plus the buffers their
/// samples land in.
pub struct RangingSession<L: LineLink> {
    /// The module whose antenna delay is calibrated
    pub anchor: Dw1000<L>,
    /// The module that is moved
    pub tag: Dw1000<L>,
    info: TestInfo,
    anchor_ranges: SampleBuffer,
    tag_ranges: SampleBuffer,
    loop_times: SampleBuffer,
    remaining: String,
}

impl<L: LineLink> RangingSession<L> {
    /// Pair up `anchor` and `tag` for a run described by `info`.
    pub fn new(anchor: Dw1000<L>, tag: Dw1000<L>, info: TestInfo) -> Self {
        // big enough for both the sweep and the calibration batches
        let capacity = info.num_samples.max(info.num_cal_samples);
        Self {
            anchor,
            tag,
            info,
            anchor_ranges: SampleBuffer::new(capacity),
            tag_ranges: SampleBuffer::new(capacity),
            loop_times: SampleBuffer::new(capacity),
            remaining: "N/A".to_owned(),
        }
    }

    /// Settings of this run, including any delays found so far.
    pub fn info(&self) -> &TestInfo {
        &self.info
    }

    /// Recent anchor ranges, in cm.
    pub fn anchor_ranges(&self) -> &SampleBuffer {
        &self.anchor_ranges
    }

    /// Recent tag ranges, in cm.
    pub fn tag_ranges(&self) -> &SampleBuffer {
        &self.tag_ranges
    }

    /// Recent measurement loop durations, in ms.
    pub fn loop_times(&self) -> &SampleBuffer {
        &self.loop_times
    }

    /// Empty all three sample buffers.
    pub fn clear_buffers(&mut self) {
        self.anchor_ranges.clear();
        self.tag_ranges.clear();
        self.loop_times.clear();
    }

    /// Take one range from each module and time how long that took.
    pub fn dist_meas_loop(&mut self) -> Result<(), CalError> {
        let start = Instant::now();

        let anchor_range = self.anchor.get_range_cm()?;
        let tag_range = self.tag.get_range_cm()?;

        let (anchor_range, tag_range) = match (anchor_range, tag_range) {
            (Some(a), Some(t)) => (a, t),
            (None, _) => return Err(CalError::NoReading(self.anchor.name().to_owned())),
            (_, None) => return Err(CalError::NoReading(self.tag.name().to_owned())),
        };

        self.anchor_ranges.push(anchor_range);
        self.tag_ranges.push(tag_range);

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.loop_times.push(elapsed_ms);

        let avg_loop_time = self.loop_times.average().unwrap_or(elapsed_ms);
        let left = self.info.num_samples.saturating_sub(self.anchor_ranges.len());
        self.remaining = format_remaining(left as f64 * avg_loop_time);

        Ok(())
    }

    /// Sample until the buffers hold `n` pairs.
    pub fn collect<F>(
        &mut self,
        n: usize,
        distance_cm: u32,
        mut on_sample: F,
    ) -> Result<(), CalError>
    where
        F: FnMut(&Progress),
    {
        let per_distance = self.info.num_samples.max(1);
        let total = (self.info.num_steps() as usize + 1) * per_distance;
        let step = self.info.step_dist.max(1) as usize;
        let cumulative =
            distance_cm.saturating_sub(self.info.start_dist) as usize * per_distance / step;

        while self.anchor_ranges.len() < n.min(self.anchor_ranges.capacity()) {
            self.dist_meas_loop()?;

            let collected = self.anchor_ranges.len();
            on_sample(&Progress {
                distance_cm,
                collected,
                target: n,
                loop_percent: (collected * 100 / n.max(1)) as u32,
                test_percent: ((collected + cumulative) * 100 / total.max(1)).min(100) as u32,
                remaining: self.remaining.clone(),
            });
        }

        Ok(())
    }

    /// Apply antenna delays to both modules, one retry each.
    pub fn apply_delays(&mut self, anchor_delay: u16, tag_delay: u16) -> Result<(), CalError> {
        self.tag.set_antenna_delay_retry(tag_delay as i64)?;
        self.anchor.set_antenna_delay_retry(anchor_delay as i64)?;
        Ok(())
    }

    /// Visit every configured distance, ask the operator to move the tag there
    /// with `prompt`, and collect `num_samples` at each.
    pub fn sweep<P, F>(&mut self, mut prompt: P, mut on_sample: F) -> Result<SweepData, CalError>
    where
        P: FnMut(u32) -> Result<(), CalError>,
        F: FnMut(&Progress),
    {
        let mut data = SweepData::default();
        let distances: Vec<u32> = self.info.distances().collect();

        for distance in distances {
            prompt(distance)?;
            info!("Collecting data at {} cm", distance);

            self.clear_buffers();
            let n = self.info.num_samples;
            if let Err(e) = self.collect(n, distance, &mut on_sample) {
                self.clear_buffers();
                return Err(e);
            }

            let key = DistanceKey(distance);
            data.anchor.insert(key, self.anchor_ranges.to_vec());
            data.tag.insert(key, self.tag_ranges.to_vec());
            data.loop_time.insert(key, self.loop_times.to_vec());
            self.clear_buffers();

            info!("Data collection at {} cm complete", distance);
        }

        Ok(data)
    }

    /// Iteratively adjust the anchor antenna delay, starting from
    /// `initial_anchor_delay`, until the anchor's average range matches the
    /// start distance. The tag is held at zero delay.
    pub fn ant_delay_cal_loop(&mut self, initial_anchor_delay: u16) -> Result<u16, CalError> {
        let search = DelaySearch::new(
            self.info.start_dist as f64,
            self.info.max_search_measurements,
        );

        self.tag.set_antenna_delay_retry(0)?;

        let res = search.run(self, initial_anchor_delay);
        self.clear_buffers();
        res
    }

    /// The full antenna delay calibration: range at the start distance with
    /// both delays cleared, estimate the delay from that, then search.
    pub fn calibrate<P, F>(&mut self, prompt: P, on_sample: F) -> Result<Calibration, CalError>
    where
        P: FnMut(u32) -> Result<(), CalError>,
        F: FnMut(&Progress),
    {
        let start = self.info.start_dist;
        let original = self.info.clone();
        self.info.stop_dist = start;
        self.info.step_dist = 1;

        self.apply_delays(0, 0)?;
        let data = self.sweep(prompt, on_sample);
        self.info.stop_dist = original.stop_dist;
        self.info.step_dist = original.step_dist;
        let data = data?;

        let key = DistanceKey(start);
        let avg = data
            .anchor
            .get(&key)
            .and_then(|s| mean(s))
            .ok_or(CalError::MissingDistance(key))?;

        let (initial_anchor_delay, tag_delay) = initial_ant_delay(avg, start as f64);
        info!(
            "Estimated anchor antenna delay {} from {:.2} cm at {} cm",
            initial_anchor_delay, avg, start
        );

        let anchor_delay = self.ant_delay_cal_loop(initial_anchor_delay)?;

        self.info.anchor_ant_delay_dec = anchor_delay;
        self.info.tag_ant_delay_dec = tag_delay;
        info!(
            "Calibration complete. Anchor antenna delay: {}, tag antenna delay: {}",
            anchor_delay, tag_delay
        );

        Ok(Calibration {
            initial_anchor_delay,
            anchor_delay,
            tag_delay,
            data,
        })
    }

    /// Calibrate, set both modules to the delays found, then sweep and fit a
    /// correction line per module.
    pub fn calibrate_for_stream<P, F>(
        &mut self,
        mut prompt: P,
        mut on_sample: F,
    ) -> Result<StreamCorrection, CalError>
    where
        P: FnMut(u32) -> Result<(), CalError>,
        F: FnMut(&Progress),
    {
        let calibration = self.calibrate(&mut prompt, &mut on_sample)?;
        self.apply_delays(calibration.anchor_delay, calibration.tag_delay)?;

        let data = self.sweep(&mut prompt, &mut on_sample)?;
        let anchor_fit = linear_curve_fit(&data.anchor)
            .ok_or_else(|| CalError::NoFit(self.anchor.name().to_owned()))?;
        let tag_fit = linear_curve_fit(&data.tag)
            .ok_or_else(|| CalError::NoFit(self.tag.name().to_owned()))?;
        info!(
            "Anchor fit y={:.2}x{:+.2}, tag fit y={:.2}x{:+.2}",
            anchor_fit.m, anchor_fit.b, tag_fit.m, tag_fit.b
        );

        Ok(StreamCorrection {
            calibration,
            data,
            anchor_fit,
            tag_fit,
        })
    }
}

impl<L: LineLink> DelayProbe for RangingSession<L> {
    fn measure(&mut self, delay: u16) -> Result<f64, CalError> {
        self.anchor.set_antenna_delay_retry(delay as i64)?;

        self.clear_buffers();
        let n = self.info.num_cal_samples;
        let distance = self.info.start_dist;
        let res = self.collect(n, distance, |_| {});
        let avg = self.anchor_ranges.average();
        self.clear_buffers();
        res?;

        avg.ok_or_else(|| {
            warn!("Lost device connection, please try again.");
            CalError::NoReading(self.anchor.name().to_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy_dw1000::{SimulatedBench, SimulatedLink};
    use crate::dw1000::DeviceTiming;
    use std::time::Duration;

    const CM_PER_TICK: f64 = ANT_DELAY_LSB * SPEED_OF_LIGHT_CM;

    /// A noiseless module whose range falls off linearly with the delay.
    struct LinearProbe {
        target: f64,
        true_delay: f64,
        calls: usize,
    }

    impl DelayProbe for LinearProbe {
        fn measure(&mut self, delay: u16) -> Result<f64, CalError> {
            self.calls += 1;
            Ok(self.target + (self.true_delay - delay as f64) * CM_PER_TICK)
        }
    }

    #[test]
    fn search_converges_from_below() {
        let mut probe = LinearProbe {
            target: 50.0,
            true_delay: 16_450.0,
            calls: 0,
        };
        let delay = DelaySearch::new(50.0, 1000).run(&mut probe, 16_000).unwrap();
        let avg = probe.measure(delay).unwrap();
        assert!((avg - 50.0).abs() <= ANT_DELAY_TOLERANCE_CM);
    }

    #[test]
    fn search_converges_from_above() {
        let mut probe = LinearProbe {
            target: 200.0,
            true_delay: 100.0,
            calls: 0,
        };
        let delay = DelaySearch::new(200.0, 1000).run(&mut probe, 333).unwrap();
        assert!((delay as f64 - 100.0).abs() * CM_PER_TICK <= ANT_DELAY_TOLERANCE_CM);
    }

    #[test]
    fn already_calibrated_measures_once() {
        let mut probe = LinearProbe {
            target: 10.0,
            true_delay: 500.0,
            calls: 0,
        };
        assert_eq!(DelaySearch::new(10.0, 10).run(&mut probe, 500).unwrap(), 500);
        assert_eq!(probe.calls, 1);
    }

    #[test]
    fn search_is_bounded() {
        struct Stuck;
        impl DelayProbe for Stuck {
            fn measure(&mut self, _delay: u16) -> Result<f64, CalError> {
                Ok(1000.0)
            }
        }
        let res = DelaySearch::new(10.0, 5).run(&mut Stuck, 0);
        assert!(matches!(
            res,
            Err(CalError::SearchExhausted {
                measurements: 5,
                last_delay: 40,
                ..
            })
        ));
    }

    #[test]
    fn estimate_from_zero_delay_ranges() {
        let (anchor, tag) = initial_ant_delay(50.0 + 400.0 * CM_PER_TICK, 50.0);
        assert_eq!(anchor, 400);
        assert_eq!(tag, 0);
        assert_eq!(convert_ant_delay(-1.0), 0);
    }

    fn session(bench: &SimulatedBench, info: TestInfo) -> RangingSession<SimulatedLink> {
        let timing = DeviceTiming {
            read_timeout: Duration::from_millis(200),
            readback_delay: Duration::ZERO,
        };
        RangingSession::new(
            Dw1000::with_timing("anchor", bench.anchor(), timing),
            Dw1000::with_timing("tag", bench.tag(), timing),
            info,
        )
    }

    #[test]
    fn sweep_fills_every_distance() {
        let bench = SimulatedBench::builder().noise(0.0).build();
        let info = TestInfo {
            num_samples: 4,
            start_dist: 10,
            stop_dist: 30,
            step_dist: 10,
            ..Default::default()
        };
        let mut s = session(&bench, info);
        s.apply_delays(0, 0).unwrap();

        let mut last = None;
        let data = s
            .sweep(
                |d| {
                    bench.set_distance(d as f64);
                    Ok(())
                },
                |p| last = Some(p.clone()),
            )
            .unwrap();

        assert_eq!(data.anchor.len(), 3);
        assert_eq!(data.tag[&DistanceKey(20)].len(), 4);
        assert_eq!(data.loop_time[&DistanceKey(30)].len(), 4);
        let last = last.unwrap();
        assert_eq!(last.test_percent, 100);
        assert_eq!(last.loop_percent, 100);
    }

    #[test]
    fn aborted_prompt_stops_the_sweep() {
        let bench = SimulatedBench::builder().build();
        let mut s = session(&bench, TestInfo::default());
        let res = s.sweep(|_| Err(CalError::Aborted), |_| {});
        assert!(matches!(res, Err(CalError::Aborted)));
    }

    #[test]
    fn calibration_finds_the_simulated_delay() {
        let bench = SimulatedBench::builder()
            .noise(0.0)
            .anchor_intrinsic_delay(16_500)
            .build();
        let info = TestInfo {
            num_samples: 3,
            num_cal_samples: 3,
            start_dist: 50,
            stop_dist: 100,
            step_dist: 5,
            ..Default::default()
        };
        let mut s = session(&bench, info);
        let cal = s
            .calibrate(
                |d| {
                    bench.set_distance(d as f64);
                    Ok(())
                },
                |_| {},
            )
            .unwrap();

        assert_eq!(cal.tag_delay, 0);
        let off_cm = (cal.anchor_delay as f64 - 16_500.0).abs() * CM_PER_TICK;
        assert!(off_cm <= ANT_DELAY_TOLERANCE_CM);
        assert_eq!(s.info().anchor_ant_delay_dec, cal.anchor_delay);
        assert_eq!(s.info().stop_dist, 100);
        assert!(s.anchor_ranges().is_empty());
    }

    #[test]
    fn stream_correction_starts_from_a_calibration() {
        let bench = SimulatedBench::builder()
            .noise(0.0)
            .anchor_intrinsic_delay(16_500)
            .build();
        let info = TestInfo {
            num_samples: 3,
            num_cal_samples: 3,
            start_dist: 20,
            stop_dist: 60,
            step_dist: 20,
            anchor_ant_delay_dec: 0,
            ..Default::default()
        };
        let mut s = session(&bench, info);
        let mut visited = Vec::new();
        let correction = s
            .calibrate_for_stream(
                |d| {
                    visited.push(d);
                    bench.set_distance(d as f64);
                    Ok(())
                },
                |_| {},
            )
            .unwrap();

        // one stop for the calibration, then the whole sweep
        assert_eq!(visited, vec![20, 20, 40, 60]);
        let delay = correction.calibration.anchor_delay;
        assert_eq!(s.anchor.link().ant_delay(), delay);
        assert_eq!(s.tag.link().ant_delay(), 0);
        assert_eq!(correction.data.anchor.len(), 3);

        // the calibrated anchor already reads close to the truth
        assert!((correction.anchor_fit.m - 1.0).abs() < 1e-3);
        assert!(correction.anchor_fit.b.abs() <= ANT_DELAY_TOLERANCE_CM + 0.01);

        let (anchor, tag) = correction.correct(
            40.0 + correction.anchor_fit.b,
            40.0 * correction.tag_fit.m + correction.tag_fit.b,
        );
        assert!((anchor - 40.0).abs() < 0.1);
        assert!((tag - 40.0).abs() < 1e-6);
    }

    #[test]
    fn stream_correction_needs_two_distances() {
        let bench = SimulatedBench::builder().noise(0.0).build();
        let info = TestInfo {
            num_samples: 2,
            num_cal_samples: 2,
            start_dist: 30,
            stop_dist: 30,
            ..Default::default()
        };
        let mut s = session(&bench, info);
        let res = s.calibrate_for_stream(
            |d| {
                bench.set_distance(d as f64);
                Ok(())
            },
            |_| {},
        );
        assert!(matches!(res, Err(CalError::NoFit(name)) if name == "anchor"));
    }

    #[test]
    fn silent_device_is_reported() {
        let bench = SimulatedBench::builder().build();
        bench.set_silent(true);
        let mut s = session(&bench, TestInfo::default());
        assert!(matches!(s.dist_meas_loop(), Err(CalError::NoReading(_))));
    }
}
