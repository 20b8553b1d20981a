//! Boundary/region aggregation: collapse groups of same-class detections
//! into a single representative polygon.
//!
//! Each contributing entity's raw contour reduces to its mean center. With
//! more than four centers the convex hull of the centers becomes the
//! aggregate polygon; with four or fewer the center list is used as-is.
//! Empty input yields an empty polygon — boundary dropout is an expected
//! transient, not an error.

use crate::detection::MatchedEntity;

/// Mean of a point set. Empty input yields None.
pub fn centroid(points: &[[f64; 2]]) -> Option<[f64; 2]> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let sx: f64 = points.iter().map(|p| p[0]).sum();
    let sy: f64 = points.iter().map(|p| p[1]).sum();
    Some([sx / n, sy / n])
}

/// Collapse matched boundary/region entities into one polygon of their
/// centers (hull of centers when more than four contribute).
pub fn aggregate_centers(matched: &[&MatchedEntity<'_>]) -> Vec<[f64; 2]> {
    let centers: Vec<[f64; 2]> = matched
        .iter()
        .filter_map(|m| centroid(&m.points))
        .collect();

    if centers.len() > 4 {
        convex_hull(&centers)
    } else {
        centers
    }
}

/// Convex hull via Andrew's monotone chain, counter-clockwise, without the
/// duplicate closing vertex.
pub fn convex_hull(points: &[[f64; 2]]) -> Vec<[f64; 2]> {
    if points.len() <= 2 {
        return points.to_vec();
    }

    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
    pts.dedup();

    let cross = |o: &[f64; 2], a: &[f64; 2], b: &[f64; 2]| -> f64 {
        (a[0] - o[0]) * (b[1] - o[1]) - (a[1] - o[1]) * (b[0] - o[0])
    };

    let mut hull: Vec<[f64; 2]> = Vec::with_capacity(pts.len() * 2);

    // Lower hull
    for p in &pts {
        while hull.len() >= 2 && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(*p);
    }

    // Upper hull
    let lower_len = hull.len() + 1;
    for p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(&hull[hull.len() - 2], &hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(*p);
    }

    // Last point repeats the first.
    hull.pop();
    hull
}

/// Point-in-convex-polygon test (boundary counts as inside).
#[cfg(test)]
fn hull_contains(hull: &[[f64; 2]], p: &[f64; 2]) -> bool {
    let n = hull.len();
    if n < 3 {
        return false;
    }
    for i in 0..n {
        let a = hull[i];
        let b = hull[(i + 1) % n];
        let cross = (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0]);
        if cross < -1e-9 {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntityCatalog;
    use crate::detection::{match_detections, RawDetection};

    #[test]
    fn empty_input_yields_empty_polygon() {
        assert!(aggregate_centers(&[]).is_empty());
    }

    #[test]
    fn four_or_fewer_centers_pass_through() {
        let cat = EntityCatalog::from_json_str(
            r#"{"boundary": [{"id": "c", "color": "pink", "shape": "circle", "count": 4}]}"#,
        )
        .unwrap();
        let dets: Vec<RawDetection> = [[0.0, 0.0], [100.0, 0.0], [100.0, 80.0], [0.0, 80.0]]
            .iter()
            .map(|&[x, y]| RawDetection::ShapeColor {
                shape: "circle".into(),
                color: "pink".into(),
                // Contour around (x, y); center is its mean.
                points: vec![[x - 1.0, y - 1.0], [x + 1.0, y - 1.0], [x, y + 2.0]],
            })
            .collect();
        let matched = match_detections(&cat, &dets);
        let refs: Vec<&_> = matched.iter().collect();
        let polygon = aggregate_centers(&refs);
        // Exactly the four contour centers, no hull pass.
        assert_eq!(polygon.len(), 4);
        for center in [[0.0, 0.0], [100.0, 0.0], [100.0, 80.0], [0.0, 80.0]] {
            assert!(polygon
                .iter()
                .any(|p| (p[0] - center[0]).abs() < 1e-9 && (p[1] - center[1]).abs() < 1e-9));
        }
    }

    #[test]
    fn five_centers_give_hull_containing_all() {
        let pentagon = [
            [0.0, 0.0],
            [200.0, 0.0],
            [260.0, 150.0],
            [100.0, 260.0],
            [-60.0, 150.0],
        ];
        let hull = convex_hull(&pentagon);
        assert_eq!(hull.len(), 5);
        for p in &pentagon {
            assert!(hull_contains(&hull, p));
        }
    }

    #[test]
    fn interior_points_are_dropped_from_hull() {
        let pts = [
            [0.0, 0.0],
            [100.0, 0.0],
            [100.0, 100.0],
            [0.0, 100.0],
            [50.0, 50.0],
            [20.0, 30.0],
        ];
        let hull = convex_hull(&pts);
        assert_eq!(hull.len(), 4);
        assert!(!hull.contains(&[50.0, 50.0]));
        // No duplicate closing vertex.
        assert_ne!(hull.first(), hull.last());
    }
}
