// Commandline argument parser using clap for UwbCal

use crate::config::{PlotInfo, TestInfo, TestType};

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Calibrate DW1000 antenna delays and measure distances
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct CalArgs {
    #[command(subcommand, long_about)]
    /// Which task to perform
    pub command: CommandTask,

    /// RON settings file; flags given here override it
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Serial port of the anchor, picked from a list if left out
    #[arg(long = "anchor-port", global = true)]
    pub anchor_port: Option<String>,

    /// Serial port of the tag, picked from a list if left out
    #[arg(long = "tag-port", global = true)]
    pub tag_port: Option<String>,

    /// Baud rate for both ports
    #[arg(short = 'b', long = "baud", global = true)]
    pub baud: Option<u32>,

    /// Talk to a simulated anchor and tag instead of serial ports
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Log at debug level unless RUST_LOG says otherwise, same as setting
    /// `enableDebug` in the config
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Directory that result files are written to
    #[arg(short = 'o', long = "out-dir", global = true, default_value = ".")]
    pub out_dir: PathBuf,
}

impl CalArgs {
    /// Copy the connection flags into `info`.
    pub fn apply(&self, info: &mut TestInfo) {
        if let Some(port) = &self.anchor_port {
            info.anchor_port = port.clone();
        }
        if let Some(port) = &self.tag_port {
            info.tag_port = port.clone();
        }
        if let Some(baud) = self.baud {
            info.anchor_baud = baud;
            info.tag_baud = baud;
        }
        info.enable_debug |= self.debug;
    }
}

/// What `uwbcal` should do.
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// List the serial ports that are available and what is attached
    #[command(about)]
    Ports,

    /// Find the anchor antenna delay at a known distance
    #[command(about)]
    Cal(CalCommand),

    /// Record measured distances over a range of actual distances
    #[command(about)]
    Dist(DistCommand),

    /// Calibrate, fit a correction from a sweep, then show corrected
    /// distances live
    #[command(about)]
    Stream(DistCommand),

    /// Print the report for saved result files
    #[command(about)]
    Plot(PlotCommand),
}

/// Options for `cal`.
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct CalCommand {
    /// Separation between anchor and tag, in cm
    #[arg(short = 'D', long = "distance")]
    pub distance: Option<u32>,

    /// Samples averaged per search step
    #[arg(short = 'n', long = "cal-samples")]
    pub cal_samples: Option<usize>,

    /// Give up after this many averaged measurements
    #[arg(short = 'm', long = "max-measurements")]
    pub max_measurements: Option<usize>,
}

impl CalCommand {
    /// Turn `info` into a calibration at the given distance.
    pub fn apply(&self, info: &mut TestInfo) {
        info.test_type = TestType::AntDelayCal;
        if let Some(d) = self.distance {
            info.start_dist = d;
            info.stop_dist = d;
        }
        if let Some(n) = self.cal_samples {
            info.num_cal_samples = n;
            info.num_samples = n;
        }
        if let Some(m) = self.max_measurements {
            info.max_search_measurements = m;
        }
    }
}

/// Options for `dist` and `stream`.
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct DistCommand {
    /// First distance, in cm
    #[arg(long = "start")]
    pub start: Option<u32>,

    /// Last distance, in cm
    #[arg(long = "stop")]
    pub stop: Option<u32>,

    /// Distance between stops, in cm
    #[arg(long = "step")]
    pub step: Option<u32>,

    /// Samples per distance
    #[arg(short = 'n', long = "samples")]
    pub samples: Option<usize>,

    /// Anchor antenna delay to apply before measuring
    #[arg(long = "anchor-delay")]
    pub anchor_delay: Option<u16>,

    /// Tag antenna delay to apply before measuring
    #[arg(long = "tag-delay")]
    pub tag_delay: Option<u16>,
}

impl DistCommand {
    /// Turn `info` into a distance sweep over the given range.
    pub fn apply(&self, info: &mut TestInfo) {
        info.test_type = TestType::DistMeas;
        if let Some(v) = self.start {
            info.start_dist = v;
        }
        if let Some(v) = self.stop {
            info.stop_dist = v;
        }
        if let Some(v) = self.step {
            info.step_dist = v;
        }
        if let Some(v) = self.samples {
            info.num_samples = v;
        }
        if let Some(v) = self.anchor_delay {
            info.anchor_ant_delay_dec = v;
        }
        if let Some(v) = self.tag_delay {
            info.tag_ant_delay_dec = v;
        }
    }
}

/// Options for `plot`.
#[derive(Debug, Args, Clone)]
#[command(version, about)]
pub struct PlotCommand {
    /// Result files to report on
    #[arg(required = true)]
    #[clap(num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// Map the samples onto y = x using the curve fit
    #[arg(short = 's', long = "scale")]
    pub scale: bool,

    /// Keep only distances in [MIN, MAX], in cm, rounded inwards to the step
    #[arg(short = 't', long = "truncate", num_args = 2, value_names = ["MIN", "MAX"])]
    pub truncate: Option<Vec<u32>>,

    /// Histogram bin width, in cm
    #[arg(short = 'w', long = "bin-width")]
    pub bin_width: Option<f64>,
}

impl PlotCommand {
    /// Copy the report options into `plot`.
    pub fn apply(&self, plot: &mut PlotInfo) {
        plot.scale_data |= self.scale;
        if let Some(t) = &self.truncate {
            plot.truncate_data = true;
            plot.min_trunc_dist = t[0];
            plot.max_trunc_dist = t[1];
        }
        if let Some(w) = self.bin_width {
            plot.hist_bin_width = w;
        }
    }
}
