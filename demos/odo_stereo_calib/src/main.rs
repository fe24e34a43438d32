use argh::FromArgs;
use std::path::PathBuf;

use sclam_calib::{CalibError, CalibrationConfig, Pipeline};

#[derive(FromArgs)]
/// Calibrate the planar offset between wheel odometry and a stereo camera
struct Args {
    /// path to the YAML parameter file
    #[argh(positional, default = "PathBuf::from(\"params.yaml\")")]
    params: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    log::info!("reading parameters from {}", args.params.display());
    let config = CalibrationConfig::load(&args.params).map_err(|e| {
        log::error!("invalid parameter file {}: {e}", args.params.display());
        e
    })?;

    if config.general.use_viso {
        log::warn!("use_viso is set but this build ships no stereo VO engine");
    }

    let report = Pipeline::run(&config, None).map_err(|e| {
        match &e {
            e if e.is_input_error() => log::error!("input error: {e}"),
            CalibError::OptimizerDivergence(_) | CalibError::DegenerateMotionSet(_) => {
                log::error!("calibration failed: {e}")
            }
            _ => log::error!("{e}"),
        }
        e
    })?;

    println!(
        "Read {} odometry readings and {} stereo poses, {} motion pairs",
        report.num_odometry, report.num_vo, report.pairing.pairs
    );

    let [x, y, theta] = report.iterative.offset.to_vector();
    println!("Calibrated stereo offset (x, y, theta): {x} {y} {theta}");
    println!(
        "Optimizer: {:?} after {} iterations, cost {:e}",
        report.iterative.termination_reason, report.iterative.iterations, report.iterative.final_cost
    );

    match report.closed_form {
        Some(Ok(closed_form)) => {
            let [x, y, theta] = closed_form.to_vector();
            println!("Closed form stereo offset (x, y, theta): {x} {y} {theta}");
        }
        Some(Err(e)) => {
            log::error!("closed form calibration failed: {e}");
            return Err(e.into());
        }
        None => {}
    }

    if let Some(agreement) = report.agreement {
        println!(
            "Method gap: translation {:.6}, heading {:.6}",
            agreement.translation_gap, agreement.heading_gap
        );
    }

    Ok(())
}
