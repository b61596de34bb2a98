use calib_targets_chessboard::{Detector, DetectorParams};
use calib_targets_core::{AxisEstimate, Corner as TargetCorner};
use chess_corners::{find_chess_corners_image, ChessConfig, CornerDescriptor, ThresholdMode};
use glam::Vec2;
use image::GrayImage;
use log::debug;
use nalgebra034::Point2;

use crate::board::Checkerboard;

/// The corner-detection seam of the pipeline.
///
/// `Some(points)` means the full inner-corner grid was found. The returned
/// points follow the board's raster order (row-major, x fastest) and their
/// count equals `board.corner_count()`, so they pair index-wise with the
/// board's object-space template. Anything short of a complete grid is a
/// detection failure, not an error.
pub trait CornerDetector {
    fn detect(&self, gray: &GrayImage, board: &Checkerboard) -> Option<Vec<Vec2>>;
}

/// Production detector: ChESS corner response plus grid-graph recovery.
pub struct ChessboardCornerDetector {
    chess_cfg: ChessConfig,
}

impl ChessboardCornerDetector {
    pub fn new() -> ChessboardCornerDetector {
        let mut chess_cfg = ChessConfig::single_scale();
        chess_cfg.threshold_mode = ThresholdMode::Relative;
        chess_cfg.threshold_value = 0.2;
        chess_cfg.nms_radius = 2;
        ChessboardCornerDetector { chess_cfg }
    }
}

impl Default for ChessboardCornerDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn adapt_corner(c: &CornerDescriptor) -> TargetCorner {
    TargetCorner {
        position: Point2::new(c.x, c.y),
        orientation_cluster: None,
        axes: c.axes.map(|a| AxisEstimate {
            angle: a.angle,
            sigma: a.sigma,
        }),
        contrast: c.contrast,
        fit_rms: c.fit_rms,
        strength: c.response,
    }
}

impl CornerDetector for ChessboardCornerDetector {
    fn detect(&self, gray: &GrayImage, board: &Checkerboard) -> Option<Vec<Vec2>> {
        let raw = find_chess_corners_image(gray, &self.chess_cfg).ok()?;
        if raw.len() < board.corner_count() {
            debug!(
                "{} raw corners, board needs {}",
                raw.len(),
                board.corner_count()
            );
            return None;
        }
        let corners: Vec<TargetCorner> = raw.iter().map(adapt_corner).collect();

        let detector = Detector::new(DetectorParams::default());
        let result = detector.detect(&corners)?;

        let labeled: Vec<(i32, i32, Vec2)> = result
            .target
            .corners
            .iter()
            .filter_map(|c| {
                c.grid
                    .as_ref()
                    .map(|g| (g.i, g.j, Vec2::new(c.position.x, c.position.y)))
            })
            .collect();
        order_labeled_grid(&labeled, board)
    }
}

/// Normalizes grid-labeled corners into the board's raster order.
///
/// Grid coordinates are shifted to start at zero and transposed when the
/// detected axes are swapped relative to the board dimensions. Returns
/// `None` unless every board cell is covered exactly once. A 180-degree
/// labeling ambiguity remains; for a planar target any consistent
/// relabeling is a proper rotation of the template, so calibration is
/// unaffected.
pub fn order_labeled_grid(
    labeled: &[(i32, i32, Vec2)],
    board: &Checkerboard,
) -> Option<Vec<Vec2>> {
    if labeled.len() != board.corner_count() {
        return None;
    }
    let min_i = labeled.iter().map(|(i, _, _)| *i).min()?;
    let min_j = labeled.iter().map(|(_, j, _)| *j).min()?;
    let max_i = labeled.iter().map(|(i, _, _)| *i).max()?;
    let max_j = labeled.iter().map(|(_, j, _)| *j).max()?;
    let w = (max_i - min_i + 1) as usize;
    let h = (max_j - min_j + 1) as usize;

    let transpose = if (w, h) == (board.cols, board.rows) {
        false
    } else if (w, h) == (board.rows, board.cols) {
        true
    } else {
        debug!("grid {}x{} does not match board {}x{}", w, h, board.cols, board.rows);
        return None;
    };

    let mut cells: Vec<Option<Vec2>> = vec![None; board.corner_count()];
    for &(i, j, p) in labeled {
        let (col, row) = if transpose {
            ((j - min_j) as usize, (i - min_i) as usize)
        } else {
            ((i - min_i) as usize, (j - min_j) as usize)
        };
        let idx = row * board.cols + col;
        if cells[idx].is_some() {
            // duplicate label, grid is unreliable
            return None;
        }
        cells[idx] = Some(p);
    }
    cells.into_iter().collect()
}
