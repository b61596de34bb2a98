use image::DynamicImage;
use nalgebra as na;
use rayon::prelude::*;

use crate::camera::{self, Intrinsics};

/// Camera matrix for the undistorted image at the given free-scaling
/// parameter.
///
/// `alpha = 0.0` zooms in so every output pixel maps to a valid source
/// pixel (black borders cropped away); `alpha = 1.0` keeps every source
/// pixel visible. Computed from the axis-aligned inner and outer
/// rectangles of the undistorted image border, the cv2 recipe. With zero
/// distortion both rectangles equal the image extent and the original
/// matrix comes back unchanged.
pub fn optimal_camera_matrix(
    intr: &Intrinsics,
    image_size: (u32, u32),
    alpha: f64,
) -> na::Matrix3<f64> {
    let (w, h) = (image_size.0 as f64, image_size.1 as f64);
    const N: usize = 9;

    let mut pts = Vec::with_capacity(4 * N);
    for k in 0..N {
        let t = k as f64 / (N - 1) as f64;
        pts.push((t * w, 0.0));
        pts.push((t * w, h));
        pts.push((0.0, t * h));
        pts.push((w, t * h));
    }
    // border samples mapped to the normalized image plane
    let undistorted: Vec<(f64, f64)> = pts
        .iter()
        .map(|&(u, v)| camera::undistort_point(intr, u, v))
        .collect();

    // outer rectangle: bounding box of all border samples
    let mut ox0 = f64::INFINITY;
    let mut oy0 = f64::INFINITY;
    let mut ox1 = f64::NEG_INFINITY;
    let mut oy1 = f64::NEG_INFINITY;
    for &(x, y) in &undistorted {
        ox0 = ox0.min(x);
        oy0 = oy0.min(y);
        ox1 = ox1.max(x);
        oy1 = oy1.max(y);
    }

    // inner rectangle: largest axis-aligned box inside the warped border
    let mut ix0 = f64::NEG_INFINITY;
    let mut iy0 = f64::NEG_INFINITY;
    let mut ix1 = f64::INFINITY;
    let mut iy1 = f64::INFINITY;
    for chunk in undistorted.chunks(4) {
        let (top, bottom, left, right) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        iy0 = iy0.max(top.1);
        iy1 = iy1.min(bottom.1);
        ix0 = ix0.max(left.0);
        ix1 = ix1.min(right.0);
    }

    let rect_scale = |x0: f64, y0: f64, x1: f64, y1: f64| -> Option<(f64, f64, f64, f64)> {
        if x1 - x0 < 1e-9 || y1 - y0 < 1e-9 {
            return None;
        }
        let fx = w / (x1 - x0);
        let fy = h / (y1 - y0);
        Some((fx, fy, -fx * x0, -fy * y0))
    };

    let inner = rect_scale(ix0, iy0, ix1, iy1);
    let outer = rect_scale(ox0, oy0, ox1, oy1);
    let (Some((fin_x, fin_y, cin_x, cin_y)), Some((fout_x, fout_y, cout_x, cout_y))) =
        (inner, outer)
    else {
        return intr.mtx;
    };

    let fx = fin_x * (1.0 - alpha) + fout_x * alpha;
    let fy = fin_y * (1.0 - alpha) + fout_y * alpha;
    let cx = cin_x * (1.0 - alpha) + cout_x * alpha;
    let cy = cin_y * (1.0 - alpha) + cout_y * alpha;
    na::Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0)
}

/// Builds the per-pixel source-lookup maps for undistortion.
///
/// Each output pixel is unprojected through `new_mtx`, then pushed through
/// the distortion model of `intr` to find where in the source image it
/// lives. The maps use the same linear indexing that `remap` reads.
pub fn init_undistort_map(
    intr: &Intrinsics,
    new_mtx: &na::Matrix3<f64>,
    new_h_w: (u32, u32),
) -> (na::DMatrix<f32>, na::DMatrix<f32>) {
    let fx = new_mtx[(0, 0)];
    let fy = new_mtx[(1, 1)];
    let cx = new_mtx[(0, 2)];
    let cy = new_mtx[(1, 2)];
    let (xvec, yvec): (Vec<f32>, Vec<f32>) = (0..new_h_w.0)
        .into_par_iter()
        .flat_map(|y| {
            (0..new_h_w.1)
                .into_par_iter()
                .map(|x| {
                    let xn = (x as f64 - cx) / fx;
                    let yn = (y as f64 - cy) / fy;
                    let (u, v) = camera::distort_pixel(intr, xn, yn);
                    (u as f32, v as f32)
                })
                .collect::<Vec<(f32, f32)>>()
        })
        .unzip();
    let xmap = na::DMatrix::from_vec(new_h_w.0 as usize, new_h_w.1 as usize, xvec);
    let ymap = na::DMatrix::from_vec(new_h_w.0 as usize, new_h_w.1 as usize, yvec);
    (xmap, ymap)
}

/// Nearest-neighbor remap of gray8 or rgb8 images. Out-of-source lookups
/// come back black.
pub fn remap(src: &DynamicImage, map_x: &na::DMatrix<f32>, map_y: &na::DMatrix<f32>) -> DynamicImage {
    let (r, c) = map_x.shape();
    match src {
        DynamicImage::ImageLuma8(img) => {
            let out = image::GrayImage::from_par_fn(c as u32, r as u32, |x, y| {
                let idx = y as usize * c + x as usize;
                let (x_cor, y_cor) = unsafe { (map_x.get_unchecked(idx), map_y.get_unchecked(idx)) };
                if x_cor.is_nan() || y_cor.is_nan() || *x_cor < 0.0 || *y_cor < 0.0 {
                    return image::Luma([0]);
                }
                let x_cor = x_cor.round() as u32;
                let y_cor = y_cor.round() as u32;
                if x_cor >= img.width() || y_cor >= img.height() {
                    image::Luma([0])
                } else {
                    img.get_pixel(x_cor, y_cor).to_owned()
                }
            });
            DynamicImage::ImageLuma8(out)
        }
        DynamicImage::ImageRgb8(img) => {
            let out = image::RgbImage::from_par_fn(c as u32, r as u32, |x, y| {
                let idx = y as usize * c + x as usize;
                let (x_cor, y_cor) = unsafe { (map_x.get_unchecked(idx), map_y.get_unchecked(idx)) };
                if x_cor.is_nan() || y_cor.is_nan() || *x_cor < 0.0 || *y_cor < 0.0 {
                    return image::Rgb([0, 0, 0]);
                }
                let x_cor = x_cor.round() as u32;
                let y_cor = y_cor.round() as u32;
                if x_cor >= img.width() || y_cor >= img.height() {
                    image::Rgb([0, 0, 0])
                } else {
                    img.get_pixel(x_cor, y_cor).to_owned()
                }
            });
            DynamicImage::ImageRgb8(out)
        }
        other => {
            let rgb = DynamicImage::ImageRgb8(other.to_rgb8());
            remap(&rgb, map_x, map_y)
        }
    }
}

/// Corrects one image onto a same-sized canvas using `new_mtx` as the
/// projection of the output.
pub fn undistort_image(
    img: &DynamicImage,
    intr: &Intrinsics,
    new_mtx: &na::Matrix3<f64>,
) -> DynamicImage {
    use image::GenericImageView;
    let (w, h) = img.dimensions();
    let (map_x, map_y) = init_undistort_map(intr, new_mtx, (h, w));
    remap(img, &map_x, &map_y)
}
