//! Batch camera calibration from checkerboard photographs.
//!
//! The pipeline accumulates 2D/3D corner correspondences over a folder of
//! images, runs one joint calibration solve, persists the resulting
//! coefficients and writes lens-corrected copies of the inputs.

pub mod board;
pub mod calibrate;
pub mod camera;
pub mod correspondences;
pub mod detect;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod refine;
pub mod undistort;

pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;
