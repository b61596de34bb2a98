use serde::{Deserialize, Serialize};

/// Inner-corner grid dimensions and square size of the calibration target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerboardConfig {
    /// Inner corners along one board row.
    pub cols: usize,
    /// Inner corners along one board column.
    pub rows: usize,
    /// Physical side length of one square, in the caller's unit of choice.
    pub square_size: f32,
}

impl Default for CheckerboardConfig {
    fn default() -> Self {
        Self {
            cols: 9,
            rows: 7,
            square_size: 1.0,
        }
    }
}

/// A checkerboard with its precomputed object-space corner template.
///
/// The template lives in the board's own flat reference frame: `z = 0`,
/// corners on a `square_size` grid, ordered row-major with x varying
/// fastest. Detected image points use the same raster order, which is what
/// makes index-wise pairing correct.
pub struct Checkerboard {
    pub cols: usize,
    pub rows: usize,
    object_points: Vec<glam::Vec3>,
}

impl Checkerboard {
    pub fn from_config(config: &CheckerboardConfig) -> Checkerboard {
        Self::new(config.cols, config.rows, config.square_size)
    }

    pub fn new(cols: usize, rows: usize, square_size: f32) -> Checkerboard {
        let mut object_points = Vec::with_capacity(cols * rows);
        for r in 0..rows {
            for c in 0..cols {
                object_points.push(glam::Vec3 {
                    x: c as f32 * square_size,
                    y: r as f32 * square_size,
                    z: 0.0,
                });
            }
        }
        Checkerboard {
            cols,
            rows,
            object_points,
        }
    }

    pub fn corner_count(&self) -> usize {
        self.cols * self.rows
    }

    pub fn object_points(&self) -> &[glam::Vec3] {
        &self.object_points
    }
}

pub fn create_default_9x7_board() -> Checkerboard {
    Checkerboard::new(9, 7, 1.0)
}
