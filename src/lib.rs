//! UwbCal calibrates the antenna delay of DW1000 ultra-wideband ranging
//! modules and characterises how well a calibrated anchor and tag measure
//! distance.
//!
//! An anchor and a tag are wired to the host over serial ports. Their
//! firmware streams one line per ranging exchange (`t:`, `f:`, `d:`, `p:`
//! fields) and accepts `get,antDelay` and `set,antDelay,N` commands. On top
//! of that this crate provides:
//!
//! - an antenna delay search that steps the anchor's delay register until the
//!   averaged range matches a known separation ([calibration]);
//! - distance sweeps that record samples at every stop between a start and a
//!   stop distance, saved as three-row CSV files ([result_file]);
//! - a report with a linear fit, per-distance Gaussian statistics and
//!   histograms ([analysis]);
//! - a simulated anchor and tag for running everything without hardware
//!   ([dummy_dw1000]).

#![warn(missing_docs)]

pub mod analysis;
/// Command line arguments for the `uwbcal` binary.
pub mod args;
pub mod calibration;
pub mod config;
pub mod distance_map;
pub mod dummy_dw1000;
pub mod dw1000;
/// Terminal screens for picking ports and watching live readings.
pub mod gui;
pub mod hardware_message_decoder;
pub mod link;
pub mod result_file;
pub mod sample_buffer;
