use checkerboard_calibration::board::Checkerboard;
use checkerboard_calibration::detect::order_labeled_grid;
use glam::Vec2;

fn grid_points(cols: i32, rows: i32) -> Vec<(i32, i32, Vec2)> {
    let mut pts = Vec::new();
    for j in 0..rows {
        for i in 0..cols {
            pts.push((i, j, Vec2::new(i as f32 * 10.0, j as f32 * 10.0)));
        }
    }
    pts
}

#[test]
fn scrambled_grid_comes_back_in_raster_order() {
    let board = Checkerboard::new(3, 2, 1.0);
    let mut labeled = grid_points(3, 2);
    labeled.reverse();
    labeled.swap(0, 3);
    let ordered = order_labeled_grid(&labeled, &board).unwrap();
    assert_eq!(ordered.len(), 6);
    for (k, p) in ordered.iter().enumerate() {
        let i = k % 3;
        let j = k / 3;
        assert_eq!(*p, Vec2::new(i as f32 * 10.0, j as f32 * 10.0));
    }
}

#[test]
fn offset_labels_are_normalized() {
    let board = Checkerboard::new(3, 2, 1.0);
    let labeled: Vec<_> = grid_points(3, 2)
        .into_iter()
        .map(|(i, j, p)| (i - 4, j + 7, p))
        .collect();
    let ordered = order_labeled_grid(&labeled, &board).unwrap();
    assert_eq!(ordered[0], Vec2::new(0.0, 0.0));
    assert_eq!(ordered[5], Vec2::new(20.0, 10.0));
}

#[test]
fn transposed_grid_is_accepted() {
    let board = Checkerboard::new(3, 2, 1.0);
    // labels use 2 columns and 3 rows, the board's axes swapped
    let labeled: Vec<_> = grid_points(3, 2)
        .into_iter()
        .map(|(i, j, p)| (j, i, p))
        .collect();
    let ordered = order_labeled_grid(&labeled, &board).unwrap();
    assert_eq!(ordered.len(), 6);
    // same points, raster order restored against the board dimensions
    assert_eq!(ordered[0], Vec2::new(0.0, 0.0));
    assert_eq!(ordered[2], Vec2::new(20.0, 0.0));
    assert_eq!(ordered[3], Vec2::new(0.0, 10.0));
}

#[test]
fn incomplete_grid_is_rejected() {
    let board = Checkerboard::new(3, 2, 1.0);
    let mut labeled = grid_points(3, 2);
    labeled.pop();
    assert!(order_labeled_grid(&labeled, &board).is_none());
}

#[test]
fn duplicate_labels_are_rejected() {
    let board = Checkerboard::new(3, 2, 1.0);
    let mut labeled = grid_points(3, 2);
    labeled[5] = labeled[0];
    assert!(order_labeled_grid(&labeled, &board).is_none());
}

#[test]
fn wrong_grid_shape_is_rejected() {
    let board = Checkerboard::new(4, 2, 1.0);
    // 2x4 is just the transposed layout and still fits
    assert!(order_labeled_grid(&grid_points(2, 4), &board).is_some());
    // 8x1 has the right count but the wrong shape
    assert!(order_labeled_grid(&grid_points(8, 1), &board).is_none());
}
