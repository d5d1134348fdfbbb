//! Test and plot settings, loadable from a RON file.
//!
//! A settings file looks like:
//!
//! ```text
//! (
//!     test: (testType: distMeas, numSamples: 100, startDist: 5, stopDist: 100, stepDist: 5),
//!     plot: (scaleData: true),
//! )
//! ```
//!
//! Any field left out takes its default.

use serde::{Deserialize, Serialize};
use std::{fmt, fs, io, path::Path};

/// What a run is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestType {
    /// Find the anchor antenna delay at a single known distance
    #[serde(rename = "antDelayCal")]
    AntDelayCal,
    /// Sweep a range of distances and record what the modules measure
    #[serde(rename = "distMeas")]
    DistMeas,
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestType::AntDelayCal => write!(f, "antDelayCal"),
            TestType::DistMeas => write!(f, "distMeas"),
        }
    }
}

/// The two roles a module can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Stays put; its antenna delay is calibrated
    Anchor,
    /// Moved between the test distances
    Tag,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Anchor => write!(f, "anchor"),
            Device::Tag => write!(f, "tag"),
        }
    }
}

/// Everything that describes one test run. Distances are in centimeters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestInfo {
    /// Calibration or distance sweep
    pub test_type: TestType,
    /// Samples per distance, also the size of the sample buffers
    pub num_samples: usize,
    /// Samples averaged for each step of the antenna delay search
    pub num_cal_samples: usize,
    /// First distance, and the calibration distance
    pub start_dist: u32,
    /// Last distance, included
    pub stop_dist: u32,
    /// Distance between stops
    pub step_dist: u32,
    /// Which module a saved result belongs to
    pub device: Option<Device>,
    /// Serial port of the anchor, empty to detect or pick one
    pub anchor_port: String,
    /// Serial port of the tag, empty to detect or pick one
    pub tag_port: String,
    /// Baud rate of the anchor port
    pub anchor_baud: u32,
    /// Baud rate of the tag port
    pub tag_baud: u32,
    /// Anchor antenna delay register value
    pub anchor_ant_delay_dec: u16,
    /// Tag antenna delay register value
    pub tag_ant_delay_dec: u16,
    /// Upper bound on averaged measurements during the antenna delay search
    pub max_search_measurements: usize,
    /// Log at debug level unless `RUST_LOG` is set
    pub enable_debug: bool,
}

impl Default for TestInfo {
    fn default() -> Self {
        Self {
            test_type: TestType::AntDelayCal,
            num_samples: 100,
            num_cal_samples: 100,
            start_dist: 5,
            stop_dist: 100,
            step_dist: 5,
            device: None,
            anchor_port: String::new(),
            tag_port: String::new(),
            anchor_baud: 115200,
            tag_baud: 115200,
            anchor_ant_delay_dec: 32900,
            tag_ant_delay_dec: 0,
            max_search_measurements: 100,
            enable_debug: false,
        }
    }
}

impl TestInfo {
    /// Number of steps between the start and stop distance.
    pub fn num_steps(&self) -> u32 {
        (self.stop_dist.saturating_sub(self.start_dist)) / self.step_dist.max(1)
    }

    /// Every distance the sweep visits, start and stop included.
    pub fn distances(&self) -> impl Iterator<Item = u32> {
        (self.start_dist..=self.stop_dist).step_by(self.step_dist.max(1) as usize)
    }

    /// Log filter to use when `RUST_LOG` is not set.
    pub fn log_filter(&self) -> &'static str {
        if self.enable_debug {
            "debug"
        } else {
            "info"
        }
    }

    /// Reject settings a run cannot be made with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_dist > self.stop_dist {
            return Err(ConfigError::Invalid(format!(
                "start distance {} cm is past stop distance {} cm",
                self.start_dist, self.stop_dist
            )));
        }
        if self.step_dist < 1 {
            return Err(ConfigError::Invalid(
                "step distance must be at least 1 cm".to_owned(),
            ));
        }
        if self.num_samples < 1 || self.num_cal_samples < 1 {
            return Err(ConfigError::Invalid(
                "sample counts must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}

/// What the report and chart should contain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlotInfo {
    /// Fit a normal distribution at every distance
    pub make_gauss_plot: bool,
    /// Bin the samples at every distance
    pub make_hist_plot: bool,
    /// Fit `y = mx + b` through the averages
    pub make_ref_plot: bool,
    /// Map the samples back onto `y = x` using the fit
    pub scale_data: bool,
    /// Only report distances inside the truncation window
    pub truncate_data: bool,
    /// Lower edge of the truncation window, in cm
    pub min_trunc_dist: u32,
    /// Upper edge of the truncation window, in cm
    pub max_trunc_dist: u32,
    /// Histogram bin width before any rescaling, in cm
    pub hist_bin_width: f64,
}

impl Default for PlotInfo {
    fn default() -> Self {
        Self {
            make_gauss_plot: true,
            make_hist_plot: true,
            make_ref_plot: true,
            scale_data: false,
            truncate_data: false,
            min_trunc_dist: 5,
            max_trunc_dist: 5,
            hist_bin_width: 1.0,
        }
    }
}

/// The settings file: test settings and report settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalConfig {
    /// How to run the test
    pub test: TestInfo,
    /// What to report
    pub plot: PlotInfo,
}

/// Why settings could not be used.
#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read
    IoError(io::Error),
    /// The file is not valid RON for these settings
    RonSpannedError(ron::de::SpannedError),
    /// The settings contradict each other
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(error) => write!(f, "io error: {}", error),
            ConfigError::RonSpannedError(error) => write!(f, "ron spanning error: {}", error),
            ConfigError::Invalid(msg) => write!(f, "invalid settings: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl CalConfig {
    /// Read and validate a settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::IoError)?;
        Self::from_ron(&text)
    }

    /// Parse and validate settings text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: CalConfig = ron::from_str(text).map_err(ConfigError::RonSpannedError)?;
        config.test.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = CalConfig::from_ron("(test: (testType: distMeas, stepDist: 10))").unwrap();
        assert_eq!(cfg.test.test_type, TestType::DistMeas);
        assert_eq!(cfg.test.step_dist, 10);
        assert_eq!(cfg.test.num_samples, 100);
        assert_eq!(cfg.plot, PlotInfo::default());
    }

    #[test]
    fn backwards_distances_are_rejected() {
        let res = CalConfig::from_ron("(test: (startDist: 50, stopDist: 10))");
        assert!(matches!(res, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_step_is_rejected() {
        let info = TestInfo {
            step_dist: 0,
            ..Default::default()
        };
        assert!(info.validate().is_err());
    }

    #[test]
    fn steps_and_distances() {
        let info = TestInfo {
            start_dist: 5,
            stop_dist: 15,
            step_dist: 5,
            ..Default::default()
        };
        assert_eq!(info.num_steps(), 2);
        assert_eq!(info.distances().collect::<Vec<_>>(), vec![5, 10, 15]);
    }

    #[test]
    fn load_reads_a_file() {
        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(b"(test: (anchorPort: \"/dev/ttyUSB0\", anchorBaud: 9600))")
            .unwrap();
        let cfg = CalConfig::load(temp.path()).unwrap();
        assert_eq!(cfg.test.anchor_port, "/dev/ttyUSB0");
        assert_eq!(cfg.test.anchor_baud, 9600);
    }
}
