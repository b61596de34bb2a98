use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::info;
use nalgebra as na;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::camera::{Intrinsics, DIST_COEF_LEN};
use crate::{Error, Result};

pub const COEFFICIENTS_FILE: &str = "coefficients.json";
pub const REPORT_FILE: &str = "report.txt";

/// On-disk form of the calibration output.
///
/// `mtx` is the row-major 3x3 camera matrix, `dist` the five coefficients
/// `[k1, k2, p1, p2, k3]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coefficients {
    pub mtx: [[f64; 3]; 3],
    pub dist: Vec<f64>,
}

impl From<&Intrinsics> for Coefficients {
    fn from(intr: &Intrinsics) -> Coefficients {
        let m = &intr.mtx;
        Coefficients {
            mtx: [
                [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
                [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
                [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
            ],
            dist: intr.dist.to_vec(),
        }
    }
}

impl Coefficients {
    pub fn to_intrinsics(&self) -> Result<Intrinsics> {
        if self.dist.len() != DIST_COEF_LEN {
            return Err(Error::Inconsistent(format!(
                "expected {} distortion coefficients, found {}",
                DIST_COEF_LEN,
                self.dist.len()
            )));
        }
        let m = &self.mtx;
        let mtx = na::Matrix3::new(
            m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2],
        );
        let mut dist = [0.0; DIST_COEF_LEN];
        dist.copy_from_slice(&self.dist);
        Ok(Intrinsics::new(mtx, dist))
    }
}

pub fn save_coefficients(run_dir: &Path, intr: &Intrinsics) -> Result<()> {
    let path = run_dir.join(COEFFICIENTS_FILE);
    let json = serde_json::to_string_pretty(&Coefficients::from(intr))?;
    fs::write(&path, json).map_err(|source| Error::Io { path: path.clone(), source })?;
    info!("saved coefficients to {}", path.display());
    Ok(())
}

pub fn load_coefficients(run_dir: &Path) -> Result<Coefficients> {
    let path = run_dir.join(COEFFICIENTS_FILE);
    let contents =
        fs::read_to_string(&path).map_err(|source| Error::Io { path: path.clone(), source })?;
    Ok(serde_json::from_str(&contents)?)
}

fn timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    format!(
        "{:04}{:02}{:02}-{:02}{:02}{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

/// Creates `<results_root>/<batch_name>-<timestamp>/` for this run.
pub fn create_run_dir(results_root: &Path, batch_name: &str) -> Result<PathBuf> {
    create_run_dir_named(results_root, &format!("{}-{}", batch_name, timestamp()))
}

pub fn create_run_dir_named(results_root: &Path, run_id: &str) -> Result<PathBuf> {
    fs::create_dir_all(results_root).map_err(|source| Error::Io {
        path: results_root.to_path_buf(),
        source,
    })?;
    let run_dir = results_root.join(run_id);
    match fs::create_dir(&run_dir) {
        Ok(()) => Ok(run_dir),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(Error::RunDirExists { path: run_dir })
        }
        Err(source) => Err(Error::Io { path: run_dir, source }),
    }
}

/// Human-readable summary dropped next to the coefficients.
pub fn write_report(
    run_dir: &Path,
    images_total: usize,
    views_used: usize,
    mean_error: f64,
    rms: f64,
) -> Result<()> {
    let path = run_dir.join(REPORT_FILE);
    let mut file =
        fs::File::create(&path).map_err(|source| Error::Io { path: path.clone(), source })?;
    let body = format!(
        "images: {}\nviews used: {}\nmean reprojection error: {:.6} px\nrms reprojection error: {:.6} px\n",
        images_total, views_used, mean_error, rms
    );
    file.write_all(body.as_bytes())
        .map_err(|source| Error::Io { path, source })?;
    Ok(())
}
