//! Antenna delay calibration and distance measurement for a DW1000 anchor and
//! tag.
//!
//! Example:
//!
//! ```text
//! uwbcal cal --anchor-port /dev/ttyUSB0 --tag-port /dev/ttyUSB1 -D 100
//! uwbcal dist --start 5 --stop 100 --step 5 --anchor-delay 16436 -o results/
//! uwbcal plot results/DW1000_anchor_distMeas_data_Output_(2024-03-01_10-20-30).csv --scale
//! uwbcal --simulate stream --start 20 --stop 200 --step 20 -n 20
//! ```

use clap::Parser;
use uwbcal::{
    analysis::DistanceReport,
    args::{CalArgs, CommandTask},
    calibration::{CalError, Progress, RangingSession, StreamCorrection, SweepData},
    config::{CalConfig, Device, PlotInfo, TestInfo},
    dummy_dw1000::SimulatedBench,
    dw1000::{assign_ports, DeviceTiming, Dw1000, IDENTIFY_TIMEOUT},
    gui::{device_selector, fold_until_stop},
    link::{LineLink, SerialLink},
    result_file::ResultFile,
};

use log::{debug, error, info, warn};
use std::{
    error::Error,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

fn main() -> ExitCode {
    let args = CalArgs::parse();

    // the config can turn on debug logging, so it is read before the logger
    // exists and its errors are reported after
    let config = match &args.config {
        Some(path) => CalConfig::load(path),
        None => Ok(CalConfig::default()),
    };
    let mut debug_info = TestInfo::default();
    if let Ok(config) = &config {
        debug_info.enable_debug = config.test.enable_debug;
    }
    args.apply(&mut debug_info);

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(debug_info.log_filter()),
    )
    .init();

    let res = config
        .map_err(|e| Box::new(e) as Box<dyn Error>)
        .and_then(|config| run(args, config));
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: CalArgs, mut config: CalConfig) -> Result<(), Box<dyn Error>> {
    args.apply(&mut config.test);

    match &args.command {
        CommandTask::Ports => {
            println!("Available devices:");
            for (port, device) in identify_ports(config.test.anchor_baud)? {
                let role = device.map(|d| d.to_string());
                println!(
                    "\t{}\t{}",
                    port.to_string_lossy(),
                    role.as_deref().unwrap_or("unknown")
                );
            }
            return Ok(());
        }
        CommandTask::Plot(cmd) => {
            cmd.apply(&mut config.plot);
            for file in &cmd.files {
                let result = ResultFile::from_path(file)?;
                print_report(&result, &config.plot, &args.out_dir)?;
            }
            return Ok(());
        }
        CommandTask::Cal(cmd) => cmd.apply(&mut config.test),
        CommandTask::Dist(cmd) | CommandTask::Stream(cmd) => cmd.apply(&mut config.test),
    }
    config.test.validate()?;
    debug!("Running with {:#?}", config.test);

    if args.simulate {
        let bench = SimulatedBench::builder()
            .distance(config.test.start_dist as f64)
            .build();
        // no real firmware to wait for
        let timing = DeviceTiming {
            readback_delay: Duration::from_millis(5),
            ..Default::default()
        };
        let session = RangingSession::new(
            Dw1000::with_timing("anchor", bench.anchor(), timing),
            Dw1000::with_timing("tag", bench.tag(), timing),
            config.test.clone(),
        );
        run_task(session, &args, &config.plot, Some(bench))
    } else {
        let test = &mut config.test;
        if test.anchor_port.is_empty() || test.tag_port.is_empty() {
            let found = identify_ports(test.anchor_baud)?;
            match assign_ports(&found) {
                Some((anchor, tag)) => {
                    info!("Found anchor on {} and tag on {}", anchor.display(), tag.display());
                    if test.anchor_port.is_empty() {
                        test.anchor_port = anchor.to_string_lossy().into_owned();
                    }
                    if test.tag_port.is_empty() {
                        test.tag_port = tag.to_string_lossy().into_owned();
                    }
                }
                None => warn!("Could not tell anchor from tag on every port, pick them by hand"),
            }
        }
        if test.anchor_port.is_empty() {
            test.anchor_port = pick_port("Anchor Port")?;
        }
        if test.tag_port.is_empty() {
            test.tag_port = pick_port("Tag Port")?;
        }
        info!(
            "Opening anchor on {} and tag on {}",
            test.anchor_port, test.tag_port
        );
        let session = RangingSession::new(
            Dw1000::new("anchor", SerialLink::open(&test.anchor_port, test.anchor_baud)?),
            Dw1000::new("tag", SerialLink::open(&test.tag_port, test.tag_baud)?),
            test.clone(),
        );
        run_task(session, &args, &config.plot, None)
    }
}

/// Open every serial port and ask whatever is attached whether it is an
/// anchor or a tag. Ports that fail to open are listed without a role.
fn identify_ports(baud_rate: u32) -> Result<Vec<(PathBuf, Option<Device>)>, Box<dyn Error>> {
    let timing = DeviceTiming {
        read_timeout: IDENTIFY_TIMEOUT,
        ..Default::default()
    };
    let mut found = Vec::new();
    for port in SerialLink::available_ports()? {
        let name = port.to_string_lossy().into_owned();
        let device = match SerialLink::open(&name, baud_rate) {
            Ok(link) => Dw1000::with_timing(&name, link, timing)
                .identify()
                .unwrap_or_else(|e| {
                    debug!("{}: {}", name, e);
                    None
                }),
            Err(e) => {
                debug!("Could not open {}: {}", name, e);
                None
            }
        };
        found.push((port, device));
    }
    Ok(found)
}

fn pick_port(title: &str) -> Result<String, Box<dyn Error>> {
    let port = device_selector(title, SerialLink::available_ports()?)?
        .ok_or_else(|| format!("no port selected for {}", title.to_lowercase()))?;
    Ok(port.to_string_lossy().into_owned())
}

fn run_task<L: LineLink + Send + 'static>(
    mut session: RangingSession<L>,
    args: &CalArgs,
    plot: &PlotInfo,
    bench: Option<SimulatedBench>,
) -> Result<(), Box<dyn Error>> {
    match args.command {
        CommandTask::Cal(_) => {
            let cal = session.calibrate(operator_prompt(bench), show_progress)?;
            eprintln!();
            println!(
                "Initial anchor antenna delay estimate: {}",
                cal.initial_anchor_delay
            );
            println!("Anchor antenna delay: {}", cal.anchor_delay);
            println!("Tag antenna delay: {}", cal.tag_delay);
            save_results(&cal.data, session.info(), &args.out_dir)?;
        }
        CommandTask::Dist(_) => {
            let info = session.info().clone();
            session.apply_delays(info.anchor_ant_delay_dec, info.tag_ant_delay_dec)?;
            let data = session.sweep(operator_prompt(bench), show_progress)?;
            eprintln!();
            for result in save_results(&data, &info, &args.out_dir)? {
                print_report(&result, plot, &args.out_dir)?;
            }
        }
        CommandTask::Stream(_) => {
            let correction = session.calibrate_for_stream(operator_prompt(bench), show_progress)?;
            eprintln!();
            println!(
                "Anchor antenna delay: {}, tag antenna delay: {}",
                correction.calibration.anchor_delay, correction.calibration.tag_delay
            );
            save_results(&correction.data, session.info(), &args.out_dir)?;
            stream(session, correction)?;
        }
        CommandTask::Ports | CommandTask::Plot(_) => {}
    }

    Ok(())
}

/// Show corrected distances from both modules until a key is pressed.
fn stream<L: LineLink + Send + 'static>(
    session: RangingSession<L>,
    correction: StreamCorrection,
) -> Result<(), Box<dyn Error>> {
    let session = fold_until_stop(
        "Streaming Corrected Distances",
        session,
        move |mut session: RangingSession<L>| {
            session.dist_meas_loop()?;
            let (anchor, tag) = correction.correct(
                session.anchor_ranges().last().unwrap_or_default(),
                session.tag_ranges().last().unwrap_or_default(),
            );
            let status = format!("Anchor: {:8.2} cm   Tag: {:8.2} cm", anchor, tag);
            Ok::<_, CalError>((session, status))
        },
    )?;
    debug!(
        "Streamed with an average loop time of {:.1} ms",
        session.loop_times().average().unwrap_or_default()
    );
    Ok(())
}

/// Ask the operator to move the tag, or move the simulated tag ourselves.
fn operator_prompt(bench: Option<SimulatedBench>) -> impl FnMut(u32) -> Result<(), CalError> {
    move |distance| match &bench {
        Some(bench) => {
            bench.set_distance(distance as f64);
            Ok(())
        }
        None => {
            print!(
                "Move the tag to {} cm from the anchor and press Enter (q to quit): ",
                distance
            );
            io::stdout().flush().map_err(|_| CalError::Aborted)?;
            let mut line = String::new();
            match io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => Err(CalError::Aborted),
                Ok(_) if line.trim().eq_ignore_ascii_case("q") => Err(CalError::Aborted),
                Ok(_) => Ok(()),
            }
        }
    }
}

fn show_progress(p: &Progress) {
    eprint!(
        "\r{:>5} cm: {:>4}/{:<4} {:>3}% of distance, {:>3}% of test, {} left ",
        p.distance_cm, p.collected, p.target, p.loop_percent, p.test_percent, p.remaining
    );
}

/// One result file per device, anchor first.
fn save_results(
    data: &SweepData,
    info: &TestInfo,
    out_dir: &Path,
) -> Result<Vec<ResultFile>, Box<dyn Error>> {
    let mut saved = Vec::new();
    for (device, dist) in [(Device::Anchor, &data.anchor), (Device::Tag, &data.tag)] {
        let result = ResultFile::new(
            dist.clone(),
            data.loop_time.clone(),
            TestInfo {
                device: Some(device),
                ..info.clone()
            },
        );
        let path: PathBuf = result.save_in(out_dir)?;
        info!("Saved {} data to {}", device, path.display());
        saved.push(result);
    }
    Ok(saved)
}

/// Print the report for one result file and save a copy in `out_dir`.
fn print_report(result: &ResultFile, plot: &PlotInfo, out_dir: &Path) -> io::Result<()> {
    let report = DistanceReport::build(&result.dist, &result.test_info, plot);
    println!("{}", report);
    let path = report.save_in(out_dir)?;
    info!("Saved report to {}", path.display());
    Ok(())
}
