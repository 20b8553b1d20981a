//! Per-frame raw detections and detection-to-entity assignment.
//!
//! Detections arrive anonymous and unordered from the upstream detector; the
//! matcher binds them to catalog entities by shared class key. Assignment is
//! all-or-nothing per class: a class with fewer detections than expecting
//! entities matches nothing this frame, so a partially visible group never
//! produces a half-assigned state.

use std::collections::HashMap;

use log::debug;

use crate::catalog::{Entity, EntityCatalog};

/// A transient per-frame detection in camera pixel space.
#[derive(Debug, Clone, PartialEq)]
pub enum RawDetection {
    /// Colored-shape contour: approximated polygon vertices.
    ShapeColor {
        shape: String,
        color: String,
        points: Vec<[f64; 2]>,
    },
    /// Fiducial marker: four ordered quad corners.
    Marker { id: u32, corners: [[f64; 2]; 4] },
}

impl RawDetection {
    /// Malformed data (NaN/∞ coordinates, empty point set) counts as
    /// "no detection" for this item rather than an error.
    fn is_well_formed(&self) -> bool {
        match self {
            Self::ShapeColor { points, .. } => {
                !points.is_empty() && points.iter().all(point_is_finite)
            }
            Self::Marker { corners, .. } => corners.iter().all(point_is_finite),
        }
    }
}

fn point_is_finite(p: &[f64; 2]) -> bool {
    p[0].is_finite() && p[1].is_finite()
}

/// A catalog entity bound to one detection's geometry, valid for one frame.
#[derive(Debug, Clone)]
pub struct MatchedEntity<'a> {
    pub entity: &'a Entity,
    /// Detection point set in camera pixel space.
    pub points: Vec<[f64; 2]>,
}

/// Assign the frame's detections to catalog entities.
///
/// Vision detections pair against (shape, color) groups, fiducial detections
/// against marker-ID groups, independently. Within a class, entities are
/// taken in catalog order and detections in arrival order, so assignment is
/// deterministic for identical input.
pub fn match_detections<'a>(
    catalog: &'a EntityCatalog,
    detections: &[RawDetection],
) -> Vec<MatchedEntity<'a>> {
    let mut vision_pool: HashMap<(&str, &str), Vec<&Vec<[f64; 2]>>> = HashMap::new();
    let mut fiducial_pool: HashMap<u32, Vec<&[[f64; 2]; 4]>> = HashMap::new();

    for det in detections {
        if !det.is_well_formed() {
            debug!("dropping malformed detection: {:?}", det);
            continue;
        }
        match det {
            RawDetection::ShapeColor {
                shape,
                color,
                points,
            } => vision_pool
                .entry((shape.as_str(), color.as_str()))
                .or_default()
                .push(points),
            RawDetection::Marker { id, corners } => {
                fiducial_pool.entry(*id).or_default().push(corners)
            }
        }
    }

    let mut matched = Vec::new();

    for ((shape, color), indices) in catalog.vision_group_indices() {
        let available = vision_pool
            .get(&(shape.as_str(), color.as_str()))
            .map_or(0, |v| v.len());
        if available < indices.len() {
            debug!(
                "skipping class ({}, {}): {} detections for {} entities",
                shape,
                color,
                available,
                indices.len()
            );
            continue;
        }
        let pool = &vision_pool[&(shape.as_str(), color.as_str())];
        for (&idx, points) in indices.iter().zip(pool.iter()) {
            matched.push(MatchedEntity {
                entity: catalog.entity(idx),
                points: (*points).clone(),
            });
        }
    }

    for (marker_id, indices) in catalog.fiducial_group_indices() {
        let available = fiducial_pool.get(marker_id).map_or(0, |v| v.len());
        if available < indices.len() {
            debug!(
                "skipping marker {}: {} detections for {} entities",
                marker_id,
                available,
                indices.len()
            );
            continue;
        }
        let pool = &fiducial_pool[marker_id];
        for (&idx, corners) in indices.iter().zip(pool.iter()) {
            matched.push(MatchedEntity {
                entity: catalog.entity(idx),
                points: corners.to_vec(),
            });
        }
    }

    matched
}
