use glam::{Vec2, Vec3};
use image::GrayImage;
use log::debug;

use crate::board::Checkerboard;
use crate::detect::CornerDetector;
use crate::refine::{self, SubPixCriteria};
use crate::{Error, Result};

/// Paired image-space and object-space corner sets, one entry per view.
///
/// Views stay aligned by construction: `push_view` is the only way in and
/// it rejects anything that would break the pairing.
#[derive(Debug, Clone, Default)]
pub struct CorrespondenceSet {
    img_points: Vec<Vec<Vec2>>,
    obj_points: Vec<Vec<Vec3>>,
}

impl CorrespondenceSet {
    pub fn new() -> CorrespondenceSet {
        CorrespondenceSet::default()
    }

    pub fn len(&self) -> usize {
        self.img_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.img_points.is_empty()
    }

    pub fn push_view(&mut self, img: Vec<Vec2>, obj: Vec<Vec3>) -> Result<()> {
        if img.is_empty() {
            return Err(Error::Inconsistent("empty view".to_string()));
        }
        if img.len() != obj.len() {
            return Err(Error::Inconsistent(format!(
                "{} image points vs {} object points",
                img.len(),
                obj.len()
            )));
        }
        self.img_points.push(img);
        self.obj_points.push(obj);
        Ok(())
    }

    pub fn img_points(&self) -> &[Vec<Vec2>] {
        &self.img_points
    }

    pub fn obj_points(&self) -> &[Vec<Vec3>] {
        &self.obj_points
    }

    /// Iterates paired (image, object) point slices per view.
    pub fn views(&self) -> impl Iterator<Item = (&[Vec2], &[Vec3])> {
        self.img_points
            .iter()
            .map(|v| v.as_slice())
            .zip(self.obj_points.iter().map(|v| v.as_slice()))
    }
}

/// Accumulates correspondences across a batch of images.
///
/// Owns the per-run state so nothing leaks between runs; one accumulator
/// per run, consumed by `finish`.
pub struct CorrespondenceAccumulator<'a> {
    board: &'a Checkerboard,
    detector: &'a dyn CornerDetector,
    refine: bool,
    win_radius: u32,
    criteria: SubPixCriteria,
    set: CorrespondenceSet,
}

impl<'a> CorrespondenceAccumulator<'a> {
    pub fn new(board: &'a Checkerboard, detector: &'a dyn CornerDetector) -> Self {
        Self {
            board,
            detector,
            refine: true,
            win_radius: refine::DEFAULT_WIN_RADIUS,
            criteria: SubPixCriteria::default(),
            set: CorrespondenceSet::new(),
        }
    }

    pub fn with_refinement(mut self, refine: bool) -> Self {
        self.refine = refine;
        self
    }

    /// Processes one grayscale image. Returns whether the view was kept.
    pub fn process(&mut self, gray: &GrayImage) -> bool {
        let Some(corners) = self.detector.detect(gray, self.board) else {
            debug!("checkerboard not found, skipping image");
            return false;
        };
        if corners.len() != self.board.corner_count() {
            debug!(
                "detector returned {} corners, expected {}, skipping image",
                corners.len(),
                self.board.corner_count()
            );
            return false;
        }
        let corners = if self.refine {
            refine::refine_corners(gray, &corners, self.win_radius, self.criteria)
        } else {
            corners
        };
        self.set
            .push_view(corners, self.board.object_points().to_vec())
            .is_ok()
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn finish(self) -> CorrespondenceSet {
        self.set
    }
}
