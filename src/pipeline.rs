use std::fs;
use std::path::{Path, PathBuf};

use image::GenericImageView;
use indicatif::ProgressIterator;
use log::{debug, info, warn};

use crate::board::{Checkerboard, CheckerboardConfig};
use crate::calibrate;
use crate::correspondences::CorrespondenceAccumulator;
use crate::detect::CornerDetector;
use crate::io;
use crate::undistort;
use crate::{Error, Result};

/// Everything one calibration run needs as input.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory holding the batch of calibration images.
    pub image_dir: PathBuf,
    /// Parent directory for per-run output directories.
    pub results_root: PathBuf,
    pub board: CheckerboardConfig,
    /// Write undistorted copies of the batch into the run directory.
    pub undistort: bool,
    /// Sub-pixel corner refinement after detection.
    pub refine: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from("."),
            results_root: PathBuf::from("results"),
            board: CheckerboardConfig::default(),
            undistort: true,
            refine: true,
        }
    }
}

/// What a finished run reports back.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub images_total: usize,
    pub views_used: usize,
    pub mean_reprojection_error: f64,
    pub rms: f64,
}

/// Regular files in `dir`, sorted by path for a stable processing order.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|source| Error::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn open_image(path: &Path) -> Result<image::DynamicImage> {
    let bytes = fs::read(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;
    image::load_from_memory(&bytes).map_err(|source| Error::Image {
        path: path.to_path_buf(),
        source,
    })
}

/// Runs the whole calibration pipeline over one batch of images.
///
/// Accumulates correspondences across every image, solves exactly once,
/// persists the coefficients and report into a fresh run directory and
/// optionally writes undistorted copies of the full batch. Images where
/// the board is not found are skipped during accumulation but still
/// undistorted afterwards; the solved model applies to the camera, not to
/// any particular view.
pub fn run(config: &RunConfig, detector: &dyn CornerDetector) -> Result<RunSummary> {
    let paths = list_images(&config.image_dir)?;
    info!(
        "{} files in {}",
        paths.len(),
        config.image_dir.display()
    );

    let board = Checkerboard::from_config(&config.board);
    let mut accumulator =
        CorrespondenceAccumulator::new(&board, detector).with_refinement(config.refine);
    let mut image_size: Option<(u32, u32)> = None;

    for path in paths.iter().progress_count(paths.len() as u64) {
        let img = open_image(path)?;
        if image_size.is_none() {
            image_size = Some(img.dimensions());
        }
        let gray = img.to_luma8();
        if accumulator.process(&gray) {
            debug!("board found in {}", path.display());
        } else {
            info!("board not found in {}, skipping", path.display());
        }
    }

    let Some(image_size) = image_size else {
        return Err(Error::EmptyCorrespondences);
    };
    let views_used = accumulator.len();
    if views_used == 0 {
        return Err(Error::EmptyCorrespondences);
    }
    info!("{} of {} images contributed views", views_used, paths.len());

    let set = accumulator.finish();
    let result = calibrate::calibrate(&set, image_size)?;
    let mean_error = calibrate::mean_reprojection_error(&set, &result);
    info!(
        "calibrated: fx {:.2} fy {:.2} cx {:.2} cy {:.2}, mean reprojection error {:.4} px",
        result.intrinsics.fx(),
        result.intrinsics.fy(),
        result.intrinsics.cx(),
        result.intrinsics.cy(),
        mean_error
    );

    let batch_name = config
        .image_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "batch".to_string());
    let run_dir = io::create_run_dir(&config.results_root, &batch_name)?;
    io::save_coefficients(&run_dir, &result.intrinsics)?;
    io::write_report(&run_dir, paths.len(), views_used, mean_error, result.rms)?;

    if config.undistort {
        info!("writing undistorted images to {}", run_dir.display());
        for path in paths.iter().progress_count(paths.len() as u64) {
            let img = open_image(path)?;
            let new_mtx =
                undistort::optimal_camera_matrix(&result.intrinsics, img.dimensions(), 0.0);
            let corrected = undistort::undistort_image(&img, &result.intrinsics, &new_mtx);
            let Some(name) = path.file_name() else {
                warn!("no file name for {}, skipping output", path.display());
                continue;
            };
            let out_path = run_dir.join(name);
            corrected.save(&out_path).map_err(|source| Error::Image {
                path: out_path.clone(),
                source,
            })?;
        }
    }

    Ok(RunSummary {
        run_dir,
        images_total: paths.len(),
        views_used,
        mean_reprojection_error: mean_error,
        rms: result.rms,
    })
}
