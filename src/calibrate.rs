use std::collections::HashMap;

use glam::{Vec2, Vec3};
use log::debug;
use nalgebra as na;
use tiny_solver::factors::Factor;
use tiny_solver::{GaussNewtonOptimizer, Optimizer, Problem};

use crate::camera::{self, Intrinsics, RvecTvec};
use crate::correspondences::CorrespondenceSet;
use crate::{Error, Result};

/// Output of the joint calibration solve.
#[derive(Debug, Clone)]
pub struct CalibrationResult {
    pub intrinsics: Intrinsics,
    /// One board pose per accumulated view, in view order.
    pub poses: Vec<RvecTvec>,
    /// Root-mean-square reprojection error over all corners, in pixels.
    pub rms: f64,
}

struct ReprojectionFactor {
    p3d: na::Point3<f64>,
    p2d: na::Vector2<f64>,
}

impl ReprojectionFactor {
    fn new(p3d: &Vec3, p2d: &Vec2) -> ReprojectionFactor {
        let p3d = na::Point3::new(p3d.x as f64, p3d.y as f64, p3d.z as f64);
        let p2d = na::Vector2::new(p2d.x as f64, p2d.y as f64);
        ReprojectionFactor { p3d, p2d }
    }
}

impl<T: na::RealField> Factor<T> for ReprojectionFactor {
    fn residual_func(&self, params: &[na::DVector<T>]) -> na::DVector<T> {
        // params: [intrinsics, rvec, tvec]
        let rvec = na::Vector3::new(
            params[1][0].clone(),
            params[1][1].clone(),
            params[1][2].clone(),
        );
        let tvec = na::Vector3::new(
            params[2][0].clone(),
            params[2][1].clone(),
            params[2][2].clone(),
        );
        let transform = na::Isometry3::new(tvec, rvec);
        let p3d_t = transform * self.p3d.cast::<T>();
        let p3d_t = na::Vector3::new(p3d_t.x.clone(), p3d_t.y.clone(), p3d_t.z.clone());
        let p2d_p = camera::project_one(&params[0], &p3d_t);
        na::dvector![
            p2d_p[0].clone() - T::from_f64(self.p2d[0]).unwrap(),
            p2d_p[1].clone() - T::from_f64(self.p2d[1]).unwrap()
        ]
    }
}

/// Row of `v_t` belonging to the smallest singular value.
///
/// nalgebra does not sort singular values, so pick by value.
fn smallest_singular_vector(a: &na::DMatrix<f64>) -> Option<na::DVector<f64>> {
    let svd = a.clone().svd(false, true);
    let v_t = svd.v_t?;
    let mut best = 0;
    for (i, s) in svd.singular_values.iter().enumerate() {
        if *s < svd.singular_values[best] {
            best = i;
        }
    }
    Some(v_t.row(best).transpose())
}

/// Direct linear transform homography from board plane to image plane.
///
/// Points are Hartley-normalized on both sides before building the 2n x 9
/// system; this keeps the SVD well conditioned at pixel scales.
pub fn homography_dlt(obj: &[Vec3], img: &[Vec2]) -> Option<na::Matrix3<f64>> {
    if obj.len() != img.len() || obj.len() < 4 {
        return None;
    }
    let n = obj.len();

    let normalize = |pts: &[(f64, f64)]| -> (na::Matrix3<f64>, Vec<(f64, f64)>) {
        let cx = pts.iter().map(|p| p.0).sum::<f64>() / n as f64;
        let cy = pts.iter().map(|p| p.1).sum::<f64>() / n as f64;
        let mean_dist = pts
            .iter()
            .map(|p| ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt())
            .sum::<f64>()
            / n as f64;
        let s = if mean_dist > 1e-12 {
            std::f64::consts::SQRT_2 / mean_dist
        } else {
            1.0
        };
        let t = na::Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
        let mapped = pts.iter().map(|p| (s * (p.0 - cx), s * (p.1 - cy))).collect();
        (t, mapped)
    };

    let obj_xy: Vec<(f64, f64)> = obj.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    let img_xy: Vec<(f64, f64)> = img.iter().map(|p| (p.x as f64, p.y as f64)).collect();
    let (t_obj, obj_n) = normalize(&obj_xy);
    let (t_img, img_n) = normalize(&img_xy);

    let mut a = na::DMatrix::<f64>::zeros(2 * n, 9);
    for (k, (&(x, y), &(u, v))) in obj_n.iter().zip(img_n.iter()).enumerate() {
        a.row_mut(2 * k).copy_from_slice(&[
            -x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u,
        ]);
        a.row_mut(2 * k + 1).copy_from_slice(&[
            0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v,
        ]);
    }

    let h = smallest_singular_vector(&a)?;
    let h_norm = na::Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    let h = t_img.try_inverse()? * h_norm * t_obj;
    if h[(2, 2)].abs() < 1e-12 {
        return None;
    }
    Some(h / h[(2, 2)])
}

fn v_row(h: &na::Matrix3<f64>, i: usize, j: usize) -> na::RowDVector<f64> {
    let hi = h.column(i);
    let hj = h.column(j);
    na::RowDVector::from_vec(vec![
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Closed-form intrinsic estimate from plane homographies.
///
/// Zhang's method with zero skew enforced. Falls back to a focal guess
/// from the image diagonal when the absolute conic estimate degenerates,
/// which happens with near-fronto-parallel view sets.
pub fn init_intrinsics(hs: &[na::Matrix3<f64>], image_size: (u32, u32)) -> Intrinsics {
    let (w, h) = image_size;
    let fallback = || {
        let f = 1.2 * w.max(h) as f64;
        Intrinsics::from_pinhole(f, f, w as f64 / 2.0, h as f64 / 2.0)
    };

    let mut a = na::DMatrix::<f64>::zeros(2 * hs.len() + 1, 6);
    for (k, hom) in hs.iter().enumerate() {
        a.row_mut(2 * k).copy_from(&v_row(hom, 0, 1));
        a.row_mut(2 * k + 1)
            .copy_from(&(v_row(hom, 0, 0) - v_row(hom, 1, 1)));
    }
    // zero skew constraint: b12 = 0
    a.row_mut(2 * hs.len())
        .copy_from_slice(&[0.0, 1.0, 0.0, 0.0, 0.0, 0.0]);

    let Some(mut b) = smallest_singular_vector(&a) else {
        return fallback();
    };
    if b[0] < 0.0 {
        b = -b;
    }

    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);
    let denom = b11 * b22 - b12 * b12;
    if denom.abs() < 1e-15 || b11.abs() < 1e-15 {
        debug!("degenerate conic estimate, falling back to diagonal focal guess");
        return fallback();
    }
    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    let fx2 = lambda / b11;
    let fy2 = lambda * b11 / denom;
    if fx2 <= 0.0 || fy2 <= 0.0 {
        debug!("non-positive focal estimate, falling back to diagonal focal guess");
        return fallback();
    }
    let fx = fx2.sqrt();
    let fy = fy2.sqrt();
    let u0 = -b13 * fx * fx / lambda;

    let max_dim = w.max(h) as f64;
    if !fx.is_finite()
        || !fy.is_finite()
        || !u0.is_finite()
        || !v0.is_finite()
        || fx < 0.1 * max_dim
        || fx > 20.0 * max_dim
        || fy < 0.1 * max_dim
        || fy > 20.0 * max_dim
    {
        debug!("implausible intrinsic estimate, falling back to diagonal focal guess");
        return fallback();
    }
    Intrinsics::from_pinhole(fx, fy, u0, v0)
}

/// Board pose from its homography, given the camera matrix.
pub fn init_extrinsics(k: &na::Matrix3<f64>, h: &na::Matrix3<f64>) -> RvecTvec {
    let k_inv = k.try_inverse().unwrap_or_else(na::Matrix3::identity);
    let h1 = k_inv * h.column(0);
    let h2 = k_inv * h.column(1);
    let h3 = k_inv * h.column(2);
    let lambda = (1.0 / h1.norm() + 1.0 / h2.norm()) / 2.0;

    let mut r1 = h1 * lambda;
    let mut r2 = h2 * lambda;
    let mut t = h3 * lambda;
    // the board must sit in front of the camera
    if t[2] < 0.0 {
        r1 = -r1;
        r2 = -r2;
        t = -t;
    }
    let r3 = r1.cross(&r2);
    let q = na::Matrix3::from_columns(&[r1, r2, r3]);

    // nearest proper rotation
    let svd = q.svd(true, true);
    let rot = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => {
            let mut r = u * v_t;
            if r.determinant() < 0.0 {
                let mut u_fixed = u;
                u_fixed.column_mut(2).neg_mut();
                r = u_fixed * v_t;
            }
            r
        }
        _ => na::Matrix3::identity(),
    };
    let rvec = na::Rotation3::from_matrix_unchecked(rot).scaled_axis();
    RvecTvec::new(rvec, t)
}

/// Runs the full calibration: linear initialization followed by one joint
/// nonlinear refinement over intrinsics and all board poses.
pub fn calibrate(set: &CorrespondenceSet, image_size: (u32, u32)) -> Result<CalibrationResult> {
    if set.is_empty() {
        return Err(Error::EmptyCorrespondences);
    }

    let mut homographies = Vec::with_capacity(set.len());
    for (i, (img, obj)) in set.views().enumerate() {
        if img.len() != obj.len() || img.is_empty() {
            return Err(Error::Inconsistent(format!(
                "view {}: {} image points vs {} object points",
                i,
                img.len(),
                obj.len()
            )));
        }
        let h = homography_dlt(obj, img)
            .ok_or_else(|| Error::Solver(format!("homography failed for view {}", i)))?;
        homographies.push(h);
    }

    let init = init_intrinsics(&homographies, image_size);
    debug!(
        "initial intrinsics: fx {:.1} fy {:.1} cx {:.1} cy {:.1}",
        init.fx(),
        init.fy(),
        init.cx(),
        init.cy()
    );

    let mut problem = Problem::new();
    let mut initial_values = HashMap::<String, na::DVector<f64>>::new();
    initial_values.insert("params".to_string(), init.to_params());

    for (i, ((img, obj), h)) in set.views().zip(homographies.iter()).enumerate() {
        let pose = init_extrinsics(&init.mtx, h);
        let rvec_name = format!("rvec{}", i);
        let tvec_name = format!("tvec{}", i);
        initial_values.insert(rvec_name.clone(), na::dvector![
            pose.rvec[0],
            pose.rvec[1],
            pose.rvec[2]
        ]);
        initial_values.insert(tvec_name.clone(), na::dvector![
            pose.tvec[0],
            pose.tvec[1],
            pose.tvec[2]
        ]);
        for (p2d, p3d) in img.iter().zip(obj.iter()) {
            problem.add_residual_block(
                2,
                &["params", &rvec_name, &tvec_name],
                Box::new(ReprojectionFactor::new(p3d, p2d)),
                None,
            );
        }
    }

    let optimizer = GaussNewtonOptimizer {};
    let result = optimizer
        .optimize(&problem, &initial_values, None)
        .ok_or_else(|| Error::Solver("optimization failed".to_string()))?;

    let params = result
        .get("params")
        .ok_or_else(|| Error::Solver("missing intrinsic block in solution".to_string()))?;
    let intrinsics = Intrinsics::from_params(params);

    let mut poses = Vec::with_capacity(set.len());
    for i in 0..set.len() {
        let rvec = result
            .get(&format!("rvec{}", i))
            .ok_or_else(|| Error::Solver(format!("missing rvec block for view {}", i)))?;
        let tvec = result
            .get(&format!("tvec{}", i))
            .ok_or_else(|| Error::Solver(format!("missing tvec block for view {}", i)))?;
        poses.push(RvecTvec::new(
            na::Vector3::new(rvec[0], rvec[1], rvec[2]),
            na::Vector3::new(tvec[0], tvec[1], tvec[2]),
        ));
    }

    let mut sq_sum = 0.0f64;
    let mut count = 0usize;
    for ((img, obj), pose) in set.views().zip(poses.iter()) {
        let projected = project_points(&intrinsics, pose, obj);
        for (p, q) in projected.iter().zip(img.iter()) {
            let dx = p.x as f64 - q.x as f64;
            let dy = p.y as f64 - q.y as f64;
            sq_sum += dx * dx + dy * dy;
            count += 1;
        }
    }
    let rms = if count > 0 {
        (sq_sum / count as f64).sqrt()
    } else {
        0.0
    };

    Ok(CalibrationResult {
        intrinsics,
        poses,
        rms,
    })
}

/// Projects board-frame points into the image through a view pose.
pub fn project_points(intr: &Intrinsics, pose: &RvecTvec, p3ds: &[Vec3]) -> Vec<Vec2> {
    let params = intr.to_params();
    let transform = pose.to_isometry3();
    p3ds.iter()
        .map(|p| {
            let pt = transform * na::Point3::new(p.x as f64, p.y as f64, p.z as f64);
            let v = na::Vector3::new(pt.x, pt.y, pt.z);
            let uv = camera::project_one(&params, &v);
            Vec2::new(uv[0] as f32, uv[1] as f32)
        })
        .collect()
}

/// Mean per-view reprojection error, matching the classic cv2 recipe:
/// per view the L2 norm of the residual stack divided by corner count,
/// then averaged over views.
pub fn mean_reprojection_error(set: &CorrespondenceSet, result: &CalibrationResult) -> f64 {
    if set.is_empty() {
        return 0.0;
    }
    let mut total = 0.0f64;
    for ((img, obj), pose) in set.views().zip(result.poses.iter()) {
        let projected = project_points(&result.intrinsics, pose, obj);
        let sq: f64 = projected
            .iter()
            .zip(img.iter())
            .map(|(p, q)| {
                let dx = p.x as f64 - q.x as f64;
                let dy = p.y as f64 - q.y as f64;
                dx * dx + dy * dy
            })
            .sum();
        total += sq.sqrt() / img.len() as f64;
    }
    total / set.len() as f64
}
