use checkerboard_calibration::board::Checkerboard;
use checkerboard_calibration::calibrate::{
    calibrate, homography_dlt, mean_reprojection_error, project_points,
};
use checkerboard_calibration::camera::{Intrinsics, RvecTvec};
use checkerboard_calibration::correspondences::CorrespondenceSet;
use checkerboard_calibration::Error;
use nalgebra as na;

fn synthetic_poses() -> Vec<RvecTvec> {
    [
        (0.3, 0.0, 0.0),
        (-0.3, 0.05, 0.0),
        (0.0, 0.3, 0.05),
        (0.05, -0.3, 0.0),
        (0.2, 0.2, -0.1),
        (0.15, -0.25, 0.1),
    ]
    .iter()
    .map(|&(rx, ry, rz)| {
        RvecTvec::new(
            na::Vector3::new(rx, ry, rz),
            na::Vector3::new(-4.0, -3.0, 12.0),
        )
    })
    .collect()
}

fn synthetic_set(intr: &Intrinsics, poses: &[RvecTvec]) -> CorrespondenceSet {
    let board = Checkerboard::new(9, 7, 1.0);
    let mut set = CorrespondenceSet::new();
    for pose in poses {
        let img = project_points(intr, pose, board.object_points());
        set.push_view(img, board.object_points().to_vec()).unwrap();
    }
    set
}

#[test]
fn recovers_ground_truth_without_distortion() {
    let truth = Intrinsics::from_pinhole(800.0, 820.0, 320.0, 240.0);
    let set = synthetic_set(&truth, &synthetic_poses());
    let result = calibrate(&set, (640, 480)).unwrap();

    assert!(result.rms < 0.1, "rms {} too large", result.rms);
    assert!((result.intrinsics.fx() - 800.0).abs() < 2.0);
    assert!((result.intrinsics.fy() - 820.0).abs() < 2.0);
    assert!((result.intrinsics.cx() - 320.0).abs() < 2.0);
    assert!((result.intrinsics.cy() - 240.0).abs() < 2.0);
    assert_eq!(result.poses.len(), set.len());
}

#[test]
fn recovers_mild_distortion() {
    let mut truth = Intrinsics::from_pinhole(800.0, 820.0, 320.0, 240.0);
    truth.dist = [-0.02, 0.005, 0.001, -0.0005, 0.0];
    let set = synthetic_set(&truth, &synthetic_poses());
    let result = calibrate(&set, (640, 480)).unwrap();

    assert!(result.rms < 0.5, "rms {} too large", result.rms);
    assert!((result.intrinsics.fx() - 800.0).abs() < 5.0);
    assert!((result.intrinsics.fy() - 820.0).abs() < 5.0);

    let mean = mean_reprojection_error(&set, &result);
    assert!(mean < 0.5, "mean reprojection error {} too large", mean);
}

#[test]
fn empty_set_is_an_error() {
    let set = CorrespondenceSet::new();
    match calibrate(&set, (640, 480)) {
        Err(Error::EmptyCorrespondences) => {}
        other => panic!("expected EmptyCorrespondences, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn homography_maps_points_exactly() {
    // known projective map: scale + translate
    let obj: Vec<glam::Vec3> = vec![
        glam::Vec3::new(0.0, 0.0, 0.0),
        glam::Vec3::new(1.0, 0.0, 0.0),
        glam::Vec3::new(2.0, 0.0, 0.0),
        glam::Vec3::new(0.0, 1.0, 0.0),
        glam::Vec3::new(1.0, 1.0, 0.0),
        glam::Vec3::new(2.0, 2.0, 0.0),
    ];
    let img: Vec<glam::Vec2> = obj
        .iter()
        .map(|p| glam::Vec2::new(30.0 * p.x + 100.0, 30.0 * p.y + 60.0))
        .collect();
    let h = homography_dlt(&obj, &img).unwrap();
    for (o, i) in obj.iter().zip(img.iter()) {
        let v = h * na::Vector3::new(o.x as f64, o.y as f64, 1.0);
        assert!((v[0] / v[2] - i.x as f64).abs() < 1e-6);
        assert!((v[1] / v[2] - i.y as f64).abs() < 1e-6);
    }
}

#[test]
fn homography_needs_four_points() {
    let obj = vec![glam::Vec3::ZERO; 3];
    let img = vec![glam::Vec2::ZERO; 3];
    assert!(homography_dlt(&obj, &img).is_none());
}

#[test]
fn mean_error_is_zero_for_perfect_fit() {
    let truth = Intrinsics::from_pinhole(800.0, 800.0, 320.0, 240.0);
    let poses = synthetic_poses();
    let set = synthetic_set(&truth, &poses);
    let perfect = checkerboard_calibration::calibrate::CalibrationResult {
        intrinsics: truth,
        poses,
        rms: 0.0,
    };
    let mean = mean_reprojection_error(&set, &perfect);
    assert!(mean < 1e-6);
}
