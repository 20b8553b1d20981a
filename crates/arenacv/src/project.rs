//! Projection of matched entities into canonical arena space and 6-DOF pose
//! extraction for mobile entities.

use nalgebra::Matrix3;
use serde::Serialize;

use crate::catalog::{Entity, EntityType};
use crate::detection::MatchedEntity;
use crate::homography::project;
use crate::region::centroid;

/// 6-degree-of-freedom pose in canonical arena units.
///
/// The overhead view fixes z, roll, and pitch to zero; yaw is only nonzero
/// for fiducial-tracked entities, whose quad carries orientation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Pose {
    pub fn to_array(self) -> [f64; 6] {
        [self.x, self.y, self.z, self.roll, self.pitch, self.yaw]
    }
}

/// Canonical-space geometry of one projected entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// Player/Object: collapsed pose.
    Pose(Pose),
    /// Boundary/Region: transformed vertex sequence, kept as-is.
    Polygon(Vec<[f64; 2]>),
}

/// An entity with its canonical-space geometry for the current frame.
#[derive(Debug, Clone)]
pub struct ProjectedEntity<'a> {
    pub entity: &'a Entity,
    pub geometry: Geometry,
}

/// Apply the homography to every point, dropping points whose homogeneous
/// component vanished.
pub fn transform_points(h: &Matrix3<f64>, points: &[[f64; 2]]) -> Vec<[f64; 2]> {
    points
        .iter()
        .map(|p| project(h, p[0], p[1]))
        .filter(|p| p[0].is_finite() && p[1].is_finite())
        .collect()
}

/// Collapse a transformed point set to a pose.
///
/// A fiducial quad yields center = midpoint of the first diagonal and yaw =
/// the diagonal's angle; anything else yields the centroid with yaw 0.
/// Returns None for an empty point set (absence, not a zero pose).
pub fn pose_from_points(points: &[[f64; 2]], fiducial: bool) -> Option<Pose> {
    if fiducial && points.len() >= 4 {
        let (p0, p2) = (points[0], points[2]);
        Some(Pose {
            x: (p0[0] + p2[0]) / 2.0,
            y: (p0[1] + p2[1]) / 2.0,
            yaw: (p2[1] - p0[1]).atan2(p2[0] - p0[0]),
            ..Pose::default()
        })
    } else {
        let c = centroid(points)?;
        Some(Pose {
            x: c[0],
            y: c[1],
            ..Pose::default()
        })
    }
}

/// Project all matched Player/Object/Region entities through the transform.
///
/// Boundary entities are excluded here: their contours are aggregated into a
/// single polygon before rectification and projected as one by the pipeline.
/// Entities whose point set comes up empty after projection are absent from
/// the output.
pub fn project_entities<'a>(
    h: &Matrix3<f64>,
    matched: &[MatchedEntity<'a>],
) -> Vec<ProjectedEntity<'a>> {
    let mut projected = Vec::new();

    for m in matched {
        let points = transform_points(h, &m.points);
        if points.is_empty() {
            continue;
        }
        let geometry = match m.entity.entity_type {
            EntityType::Player | EntityType::Object => {
                match pose_from_points(&points, m.entity.is_fiducial()) {
                    Some(pose) => Geometry::Pose(pose),
                    None => continue,
                }
            }
            EntityType::Region => Geometry::Polygon(points),
            EntityType::Boundary => continue,
        };
        projected.push(ProjectedEntity {
            entity: m.entity,
            geometry,
        });
    }

    projected
}
