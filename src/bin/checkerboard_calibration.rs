use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use checkerboard_calibration::board::CheckerboardConfig;
use checkerboard_calibration::detect::ChessboardCornerDetector;
use checkerboard_calibration::pipeline::{run, RunConfig};
use clap::Parser;

#[derive(Parser)]
#[command(version, about, author)]
struct CbCalCli {
    /// path to image folder
    path: PathBuf,

    /// inner corners per board row
    #[arg(long, default_value_t = 9)]
    cols: usize,

    /// inner corners per board column
    #[arg(long, default_value_t = 7)]
    rows: usize,

    /// side length of one square
    #[arg(long, default_value_t = 1.0)]
    square_size: f32,

    /// parent directory for run outputs
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// do not write undistorted copies of the batch
    #[arg(long)]
    skip_undistort: bool,

    /// disable sub-pixel corner refinement
    #[arg(long)]
    no_refine: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = CbCalCli::parse();
    let config = RunConfig {
        image_dir: cli.path,
        results_root: cli.results_dir,
        board: CheckerboardConfig {
            cols: cli.cols,
            rows: cli.rows,
            square_size: cli.square_size,
        },
        undistort: !cli.skip_undistort,
        refine: !cli.no_refine,
    };
    let detector = ChessboardCornerDetector::new();

    let now = Instant::now();
    match run(&config, &detector) {
        Ok(summary) => {
            println!(
                "calibrated {} of {} images in {:.2} sec",
                summary.views_used,
                summary.images_total,
                now.elapsed().as_secs_f64()
            );
            println!(
                "mean reprojection error: {:.4} px (rms {:.4} px)",
                summary.mean_reprojection_error, summary.rms
            );
            println!("results in {}", summary.run_dir.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("calibration failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
