use std::path::PathBuf;

/// Fatal conditions that abort a calibration run.
///
/// A single image failing checkerboard detection is not an error; it is an
/// expected outcome and the image is simply skipped.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no image in the batch produced a successful checkerboard detection")]
    EmptyCorrespondences,

    #[error("correspondence set is inconsistent: {0}")]
    Inconsistent(String),

    #[error("failed to decode image {path}: {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("run directory {path} already exists")]
    RunDirExists { path: PathBuf },

    #[error("coefficients record is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("calibration solver failed: {0}")]
    Solver(String),
}
