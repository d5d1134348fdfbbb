mod gui;

use clap::Parser;
use std::{path::PathBuf, process::ExitCode};

use gui::engage_gui;
use log::error;
use uwbcal::{analysis::DistanceReport, config::PlotInfo, result_file::ResultFile};

/// Chart calculated against actual distance for a saved result file
#[derive(Debug, Parser)]
#[clap(version, about)]
struct MonitorArgs {
    /// Result file written by `uwbcal dist` or `uwbcal cal`
    file: PathBuf,

    /// Map the samples onto y = x using the curve fit
    #[arg(short = 's', long = "scale")]
    scale: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = MonitorArgs::parse();

    let result = match ResultFile::from_path(&args.file) {
        Ok(result) => result,
        Err(e) => {
            error!("Could not read {}: {}", args.file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let plot = PlotInfo {
        scale_data: args.scale,
        ..Default::default()
    };
    let report = DistanceReport::build(&result.dist, &result.test_info, &plot);

    if let Err(e) = engage_gui(&report) {
        error!("{}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
