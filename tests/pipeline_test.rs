use std::path::Path;

use checkerboard_calibration::board::{Checkerboard, CheckerboardConfig};
use checkerboard_calibration::calibrate::project_points;
use checkerboard_calibration::camera::{Intrinsics, RvecTvec};
use checkerboard_calibration::detect::CornerDetector;
use checkerboard_calibration::io::{load_coefficients, COEFFICIENTS_FILE, REPORT_FILE};
use checkerboard_calibration::pipeline::{list_images, run, RunConfig};
use checkerboard_calibration::Error;
use glam::Vec2;
use image::GrayImage;
use nalgebra as na;

const IMG_W: u32 = 64;
const IMG_H: u32 = 48;

fn board_config() -> CheckerboardConfig {
    CheckerboardConfig {
        cols: 4,
        rows: 3,
        square_size: 1.0,
    }
}

fn ground_truth() -> Intrinsics {
    Intrinsics::from_pinhole(50.0, 52.0, 32.0, 24.0)
}

fn scripted_views() -> Vec<Option<Vec<Vec2>>> {
    let truth = ground_truth();
    let board = Checkerboard::from_config(&board_config());
    let rotations = [
        (0.3, 0.0, 0.0),
        (-0.3, 0.05, 0.0),
        (0.0, 0.3, 0.05),
        (0.05, -0.3, 0.0),
        (0.2, 0.2, -0.1),
        (0.15, -0.25, 0.1),
        (-0.2, -0.2, 0.0),
        (0.25, 0.1, -0.05),
    ];
    let mut views: Vec<Option<Vec<Vec2>>> = rotations
        .iter()
        .map(|&(rx, ry, rz)| {
            let pose = RvecTvec::new(
                na::Vector3::new(rx, ry, rz),
                na::Vector3::new(-1.5, -1.0, 8.0),
            );
            Some(project_points(&truth, &pose, board.object_points()))
        })
        .collect();
    // images 3 and 7 fail detection
    views.insert(3, None);
    views.insert(7, None);
    views
}

/// Looks up a scripted detection result by the brightness of pixel (0, 0).
struct ScriptedDetector {
    views: Vec<Option<Vec<Vec2>>>,
}

impl CornerDetector for ScriptedDetector {
    fn detect(&self, gray: &GrayImage, _board: &Checkerboard) -> Option<Vec<Vec2>> {
        let key = gray.get_pixel(0, 0)[0] as usize / 20;
        self.views[key].clone()
    }
}

fn write_batch(dir: &Path, count: usize) {
    for idx in 0..count {
        let img = GrayImage::from_pixel(IMG_W, IMG_H, image::Luma([(idx * 20 + 10) as u8]));
        img.save(dir.join(format!("img{:02}.png", idx))).unwrap();
    }
}

#[test]
fn end_to_end_run_produces_results() {
    let image_dir = tempfile::tempdir().unwrap();
    let results_root = tempfile::tempdir().unwrap();
    write_batch(image_dir.path(), 10);

    let config = RunConfig {
        image_dir: image_dir.path().to_path_buf(),
        results_root: results_root.path().to_path_buf(),
        board: board_config(),
        undistort: true,
        refine: false,
    };
    let detector = ScriptedDetector {
        views: scripted_views(),
    };
    let summary = run(&config, &detector).unwrap();

    assert_eq!(summary.images_total, 10);
    assert_eq!(summary.views_used, 8);
    assert!(summary.mean_reprojection_error < 0.5);
    assert!(summary.run_dir.starts_with(results_root.path()));

    let coeffs = load_coefficients(&summary.run_dir).unwrap();
    assert!((coeffs.mtx[0][0] - 50.0).abs() < 2.0);
    assert!((coeffs.mtx[1][1] - 52.0).abs() < 2.0);

    // coefficients, report and one corrected copy per input image
    let entries = std::fs::read_dir(&summary.run_dir).unwrap().count();
    assert_eq!(entries, 12);
    assert!(summary.run_dir.join(COEFFICIENTS_FILE).is_file());
    assert!(summary.run_dir.join(REPORT_FILE).is_file());
    assert!(summary.run_dir.join("img03.png").is_file());

    // corrected copies keep the source dimensions
    let corrected = image::open(summary.run_dir.join("img00.png")).unwrap();
    assert_eq!(corrected.width(), IMG_W);
    assert_eq!(corrected.height(), IMG_H);
}

#[test]
fn skipping_undistortion_writes_only_records() {
    let image_dir = tempfile::tempdir().unwrap();
    let results_root = tempfile::tempdir().unwrap();
    write_batch(image_dir.path(), 10);

    let config = RunConfig {
        image_dir: image_dir.path().to_path_buf(),
        results_root: results_root.path().to_path_buf(),
        board: board_config(),
        undistort: false,
        refine: false,
    };
    let detector = ScriptedDetector {
        views: scripted_views(),
    };
    let summary = run(&config, &detector).unwrap();
    let entries = std::fs::read_dir(&summary.run_dir).unwrap().count();
    assert_eq!(entries, 2);
}

#[test]
fn all_failed_detections_abort_without_output() {
    let image_dir = tempfile::tempdir().unwrap();
    let results_root = tempfile::tempdir().unwrap();
    write_batch(image_dir.path(), 3);

    let config = RunConfig {
        image_dir: image_dir.path().to_path_buf(),
        results_root: results_root.path().to_path_buf(),
        board: board_config(),
        undistort: true,
        refine: false,
    };
    let detector = ScriptedDetector {
        views: vec![None; 10],
    };
    match run(&config, &detector) {
        Err(Error::EmptyCorrespondences) => {}
        other => panic!("expected EmptyCorrespondences, got {:?}", other.map(|_| ())),
    }
    // no run directory is left behind
    assert_eq!(std::fs::read_dir(results_root.path()).unwrap().count(), 0);
}

#[test]
fn empty_directory_is_an_error() {
    let image_dir = tempfile::tempdir().unwrap();
    let results_root = tempfile::tempdir().unwrap();
    let config = RunConfig {
        image_dir: image_dir.path().to_path_buf(),
        results_root: results_root.path().to_path_buf(),
        board: board_config(),
        undistort: false,
        refine: false,
    };
    let detector = ScriptedDetector { views: Vec::new() };
    assert!(matches!(
        run(&config, &detector),
        Err(Error::EmptyCorrespondences)
    ));
}

#[test]
fn listing_is_sorted_and_files_only() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::fs::write(dir.path().join("b.png"), b"x").unwrap();
    std::fs::write(dir.path().join("a.png"), b"x").unwrap();
    std::fs::write(dir.path().join("c.png"), b"x").unwrap();
    let listed = list_images(dir.path()).unwrap();
    let names: Vec<_> = listed
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.png", "b.png", "c.png"]);
}
