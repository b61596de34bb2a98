use nalgebra as na;

/// Length of the distortion coefficient vector: `[k1, k2, p1, p2, k3]`.
pub const DIST_COEF_LEN: usize = 5;

/// Length of the packed intrinsic parameter vector used by the solver:
/// `[fx, fy, cx, cy, k1, k2, p1, p2, k3]`.
pub const INTRINSIC_PARAM_LEN: usize = 9;

/// Pinhole camera matrix plus radial-tangential distortion coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    /// 3x3 matrix mapping camera-frame coordinates to pixel coordinates.
    pub mtx: na::Matrix3<f64>,
    /// Distortion coefficients `[k1, k2, p1, p2, k3]`.
    pub dist: [f64; DIST_COEF_LEN],
}

impl Intrinsics {
    pub fn new(mtx: na::Matrix3<f64>, dist: [f64; DIST_COEF_LEN]) -> Intrinsics {
        Intrinsics { mtx, dist }
    }

    pub fn from_pinhole(fx: f64, fy: f64, cx: f64, cy: f64) -> Intrinsics {
        let mtx = na::Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0);
        Intrinsics {
            mtx,
            dist: [0.0; DIST_COEF_LEN],
        }
    }

    pub fn fx(&self) -> f64 {
        self.mtx[(0, 0)]
    }
    pub fn fy(&self) -> f64 {
        self.mtx[(1, 1)]
    }
    pub fn cx(&self) -> f64 {
        self.mtx[(0, 2)]
    }
    pub fn cy(&self) -> f64 {
        self.mtx[(1, 2)]
    }

    /// Packs the intrinsics into the solver's parameter vector layout.
    pub fn to_params(&self) -> na::DVector<f64> {
        let mut params = na::DVector::zeros(INTRINSIC_PARAM_LEN);
        params[0] = self.fx();
        params[1] = self.fy();
        params[2] = self.cx();
        params[3] = self.cy();
        for (i, k) in self.dist.iter().enumerate() {
            params[4 + i] = *k;
        }
        params
    }

    pub fn from_params(params: &na::DVector<f64>) -> Intrinsics {
        let mut intr = Intrinsics::from_pinhole(params[0], params[1], params[2], params[3]);
        for i in 0..DIST_COEF_LEN {
            intr.dist[i] = params[4 + i];
        }
        intr
    }
}

/// Axis-angle rotation plus translation, one per calibration view.
#[derive(Debug, Clone)]
pub struct RvecTvec {
    pub rvec: na::Vector3<f64>,
    pub tvec: na::Vector3<f64>,
}

impl RvecTvec {
    pub fn new(rvec: na::Vector3<f64>, tvec: na::Vector3<f64>) -> RvecTvec {
        RvecTvec { rvec, tvec }
    }

    pub fn to_isometry3(&self) -> na::Isometry3<f64> {
        na::Isometry3::new(self.tvec, self.rvec)
    }
}

/// Applies the distortion model to normalized coordinates and maps the
/// result to pixel coordinates.
///
/// Generic over the scalar so the same math serves the f64 path and the
/// dual-number autodiff path of the solver.
pub fn distort_normalized<T: na::RealField>(params: &na::DVector<T>, x: T, y: T) -> (T, T) {
    let two = T::one() + T::one();
    let fx = params[0].clone();
    let fy = params[1].clone();
    let cx = params[2].clone();
    let cy = params[3].clone();
    let k1 = params[4].clone();
    let k2 = params[5].clone();
    let p1 = params[6].clone();
    let p2 = params[7].clone();
    let k3 = params[8].clone();

    let x2 = x.clone() * x.clone();
    let y2 = y.clone() * y.clone();
    let xy = x.clone() * y.clone();
    let r2 = x2.clone() + y2.clone();
    let r4 = r2.clone() * r2.clone();
    let r6 = r4.clone() * r2.clone();
    let radial = T::one() + k1 * r2.clone() + k2 * r4 + k3 * r6;
    let xd = x * radial.clone()
        + two.clone() * p1.clone() * xy.clone()
        + p2.clone() * (r2.clone() + two.clone() * x2);
    let yd = y * radial + p1 * (r2 + two.clone() * y2) + two * p2 * xy;

    (fx * xd + cx, fy * yd + cy)
}

/// Projects a camera-frame point through the pinhole + distortion model.
pub fn project_one<T: na::RealField>(
    params: &na::DVector<T>,
    p3d: &na::Vector3<T>,
) -> na::Vector2<T> {
    let x = p3d[0].clone() / p3d[2].clone();
    let y = p3d[1].clone() / p3d[2].clone();
    let (u, v) = distort_normalized(params, x, y);
    na::Vector2::new(u, v)
}

/// Maps a normalized image-plane point through the distortion model to
/// pixel coordinates.
pub fn distort_pixel(intr: &Intrinsics, xn: f64, yn: f64) -> (f64, f64) {
    let [k1, k2, p1, p2, k3] = intr.dist;
    let r2 = xn * xn + yn * yn;
    let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
    let xd = xn * radial + 2.0 * p1 * xn * yn + p2 * (r2 + 2.0 * xn * xn);
    let yd = yn * radial + p1 * (r2 + 2.0 * yn * yn) + 2.0 * p2 * xn * yn;
    (intr.fx() * xd + intr.cx(), intr.fy() * yd + intr.cy())
}

/// Inverts the distortion model for one pixel, returning normalized
/// coordinates of the ideal (distortion-free) ray.
///
/// Fixed-point iteration; a handful of rounds is enough for the mild
/// distortion this model targets.
pub fn undistort_point(intr: &Intrinsics, u: f64, v: f64) -> (f64, f64) {
    let [k1, k2, p1, p2, k3] = intr.dist;
    let x0 = (u - intr.cx()) / intr.fx();
    let y0 = (v - intr.cy()) / intr.fy();
    let mut x = x0;
    let mut y = y0;
    for _ in 0..5 {
        let r2 = x * x + y * y;
        let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
        let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        x = (x0 - dx) / radial;
        y = (y0 - dy) / radial;
    }
    (x, y)
}
