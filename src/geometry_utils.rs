use map_range::MapRange;

use crate::Point2D;

pub fn distance_points(a: &Point2D, b: &Point2D) -> f32 {
    let (x1, y1) = *a;
    let (x2, y2) = *b;

    f32::sqrt(f32::powi(x1 - x2, 2) + f32::powi(y1 - y2, 2))
}

/// Map a point from the pixel space of one resolution into another
pub fn rescale_point(p: Point2D, from: (u32, u32), to: (u32, u32)) -> Point2D {
    if from == to || from.0 == 0 || from.1 == 0 {
        return p;
    }
    let (x, y) = p;
    (
        x.map_range(0. ..from.0 as f32, 0. ..to.0 as f32),
        y.map_range(0. ..from.1 as f32, 0. ..to.1 as f32),
    )
}

/// Convert a pixel-space point into the normalised range [0;1] on both axes
pub fn normalise_point(p: Point2D, size: (u32, u32)) -> Point2D {
    let (x, y) = p;
    (
        x.map_range(0. ..size.0 as f32, 0. ..1.),
        y.map_range(0. ..size.1 as f32, 0. ..1.),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_points() {
        assert_eq!(distance_points(&(0., 0.), &(3., 4.)), 5.);
        assert_eq!(distance_points(&(10., 10.), &(10., 10.)), 0.);
        assert_eq!(distance_points(&(-1., 0.), &(1., 0.)), 2.);
    }

    #[test]
    fn test_rescale_point() {
        assert_eq!(rescale_point((320., 180.), (640, 360), (1280, 720)), (640., 360.));
        assert_eq!(rescale_point((5., 7.), (640, 360), (640, 360)), (5., 7.));
        // Degenerate source size leaves the point alone
        assert_eq!(rescale_point((5., 7.), (0, 0), (640, 360)), (5., 7.));
    }

    #[test]
    fn test_normalise_point() {
        assert_eq!(normalise_point((320., 90.), (640, 360)), (0.5, 0.25));
    }
}
