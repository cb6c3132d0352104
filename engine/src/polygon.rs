use crate::geometry::ImageSize;
use crate::Point;

pub fn clamp_to_image(polygon: &[Point], image: ImageSize) -> Vec<Point> {
    polygon
        .iter()
        .map(|p| {
            Point::new(
                p.x.max(0.0).min(image.width),
                p.y.max(0.0).min(image.height),
            )
        })
        .collect()
}

fn perp_distance(p: Point, start: Point, end: Point) -> f64 {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-12 {
        return p.distance_sq(start).sqrt();
    }
    ((dx * (start.y - p.y)) - ((start.x - p.x) * dy)).abs() / len_sq.sqrt()
}

/// Ramer-Douglas-Peucker on an open chain; endpoints are always kept.
pub fn simplify_chain(points: &[Point], epsilon: f64) -> Vec<Point> {
    let (Some(&first), Some(&last)) = (points.first(), points.last()) else {
        return Vec::new();
    };
    if points.len() <= 2 {
        return points.to_vec();
    }

    let mut max_dist = 0.0;
    let mut max_idx = 0;
    for (i, p) in points.iter().enumerate().take(points.len() - 1).skip(1) {
        let dist = perp_distance(*p, first, last);
        if dist > max_dist {
            max_dist = dist;
            max_idx = i;
        }
    }

    if max_dist > epsilon {
        let mut left = simplify_chain(&points[..=max_idx], epsilon);
        let right = simplify_chain(&points[max_idx..], epsilon);
        left.pop();
        left.extend(right);
        left
    } else {
        vec![first, last]
    }
}

/// Simplify a closed polygon. The ring is split at the vertex farthest from
/// the first one and both halves are simplified separately. Inputs that would
/// collapse below a triangle come back unchanged.
pub fn simplify_polygon(polygon: &[Point], epsilon: f64) -> Vec<Point> {
    if polygon.len() <= 3 || !(epsilon > 0.0) {
        return polygon.to_vec();
    }
    let first = polygon[0];
    let far = polygon
        .iter()
        .enumerate()
        .skip(1)
        .max_by(|(_, a), (_, b)| a.distance_sq(first).total_cmp(&b.distance_sq(first)))
        .map_or(1, |(i, _)| i);

    let mut ring_back: Vec<Point> = polygon[far..].to_vec();
    ring_back.push(first);

    let mut simplified = simplify_chain(&polygon[..=far], epsilon);
    simplified.pop();
    simplified.extend(simplify_chain(&ring_back, epsilon));
    simplified.pop();

    if simplified.len() < 3 {
        polygon.to_vec()
    } else {
        simplified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(raw: &[(f64, f64)]) -> Vec<Point> {
        raw.iter().map(|&(x, y)| Point::new(x, y)).collect()
    }

    #[test]
    fn chain_straight_line_keeps_endpoints() {
        let result = simplify_chain(&pts(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]), 0.05);
        assert_eq!(result, pts(&[(0.0, 0.0), (3.0, 3.0)]));
    }

    #[test]
    fn square_with_noise_collapses_to_corners() {
        let polygon = pts(&[
            (0.0, 0.0),
            (5.0, 0.4),
            (10.0, 0.0),
            (10.3, 5.0),
            (10.0, 10.0),
            (5.0, 9.8),
            (0.0, 10.0),
            (-0.2, 5.0),
        ]);
        let result = simplify_polygon(&polygon, 2.0);
        assert_eq!(
            result,
            pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)])
        );
    }

    #[test]
    fn tiny_or_disabled_inputs_pass_through() {
        let triangle = pts(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
        assert_eq!(simplify_polygon(&triangle, 5.0), triangle);
        let square = pts(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        assert_eq!(simplify_polygon(&square, 0.0), square);
        assert!(simplify_polygon(&[], 2.0).is_empty());
    }

    #[test]
    fn over_simplified_polygon_is_kept() {
        let sliver = pts(&[(0.0, 0.0), (5.0, 0.1), (10.0, 0.0), (5.0, -0.1)]);
        assert_eq!(simplify_polygon(&sliver, 2.0), sliver);
    }

    #[test]
    fn clamp_pulls_points_inside() {
        let image = ImageSize::new(100.0, 50.0);
        let clamped = clamp_to_image(&pts(&[(-5.0, 10.0), (120.0, 60.0), (30.0, 20.0)]), image);
        assert_eq!(clamped, pts(&[(0.0, 10.0), (100.0, 50.0), (30.0, 20.0)]));
    }
}
