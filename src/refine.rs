use glam::Vec2;
use image::GrayImage;

/// Termination criteria for the sub-pixel iteration.
#[derive(Debug, Clone, Copy)]
pub struct SubPixCriteria {
    /// Iteration cap.
    pub max_iters: usize,
    /// Minimum positional change below which the iteration stops.
    pub eps: f32,
}

impl Default for SubPixCriteria {
    fn default() -> Self {
        Self {
            max_iters: 30,
            eps: 1e-3,
        }
    }
}

/// Half-width of the default search window (an 11x11 neighborhood).
pub const DEFAULT_WIN_RADIUS: u32 = 5;

/// Refines detected corner positions to sub-pixel accuracy.
///
/// Classic gradient-orthogonality iteration: inside the search window every
/// image gradient must be orthogonal to the vector from the true corner to
/// the gradient's location, which yields a 2x2 linear system per step.
/// Corners whose window leaves the image or carries no gradient are
/// returned unchanged.
pub fn refine_corners(
    gray: &GrayImage,
    points: &[Vec2],
    win_radius: u32,
    criteria: SubPixCriteria,
) -> Vec<Vec2> {
    points
        .iter()
        .map(|p| refine_corner(gray, *p, win_radius, criteria))
        .collect()
}

fn refine_corner(gray: &GrayImage, start: Vec2, win_radius: u32, criteria: SubPixCriteria) -> Vec2 {
    let (width, height) = gray.dimensions();
    let r = win_radius as i64;
    let px = |x: i64, y: i64| -> f64 { gray.get_pixel(x as u32, y as u32)[0] as f64 };

    let mut p = start;
    for _ in 0..criteria.max_iters {
        let cx = p.x.round() as i64;
        let cy = p.y.round() as i64;
        // central differences need one extra pixel beyond the window
        if cx < r + 1 || cy < r + 1 || cx + r + 1 >= width as i64 || cy + r + 1 >= height as i64 {
            return p;
        }

        let (mut axx, mut axy, mut ayy) = (0.0f64, 0.0f64, 0.0f64);
        let (mut bx, mut by) = (0.0f64, 0.0f64);
        for dy in -r..=r {
            for dx in -r..=r {
                let x = cx + dx;
                let y = cy + dy;
                let ix = (px(x + 1, y) - px(x - 1, y)) * 0.5;
                let iy = (px(x, y + 1) - px(x, y - 1)) * 0.5;
                axx += ix * ix;
                axy += ix * iy;
                ayy += iy * iy;
                bx += ix * ix * x as f64 + ix * iy * y as f64;
                by += ix * iy * x as f64 + iy * iy * y as f64;
            }
        }

        let det = axx * ayy - axy * axy;
        if det.abs() < 1e-9 {
            return p;
        }
        let next = Vec2::new(
            ((ayy * bx - axy * by) / det) as f32,
            ((axx * by - axy * bx) / det) as f32,
        );
        // a solution that escapes the window is not this corner
        if (next - start).length() > win_radius as f32 {
            return p;
        }
        let delta = (next - p).length();
        p = next;
        if delta < criteria.eps {
            break;
        }
    }
    p
}
