//! Per-frame perception pipeline: matching → aggregation → rectification →
//! projection → encoding, ending in an atomically published snapshot.
//!
//! The pipeline runs synchronously on one worker, once per captured frame.
//! Transport and inference collaborators only ever see [`SnapshotCell`],
//! whose reader side hands out the last fully completed frame; a frame that
//! fails mid-pipeline is abandoned wholesale and the previous snapshot stays
//! current.

use std::sync::{Arc, RwLock};

use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::catalog::{EntityCatalog, EntityType, Mobility};
use crate::detection::{match_detections, MatchedEntity, RawDetection};
use crate::observe::{EncoderConfig, ObservationEncoder, ObservationFrame, Ray};
use crate::project::{project_entities, transform_points, Geometry};
use crate::rectify::{DropoutPolicy, RectifyError, Rectifier, DEFAULT_CORNER_HISTORY_LEN};
use crate::region::aggregate_centers;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Canonical arena width in arena units.
    pub width: f64,
    /// Canonical arena height in arena units.
    pub height: f64,
    pub corner_history_len: usize,
    pub dropout_policy: DropoutPolicy,
    pub encoder: EncoderConfig,
    /// Tag selecting the encoder's subject entity.
    pub subject_tag: String,
    /// Tag selecting the encoder's point target.
    pub target_tag: String,
    /// Tag selecting the goal region polygon.
    pub goal_tag: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            width: 700.0,
            height: 470.0,
            corner_history_len: DEFAULT_CORNER_HISTORY_LEN,
            dropout_policy: DropoutPolicy::default(),
            encoder: EncoderConfig::default(),
            subject_tag: "bot".into(),
            target_tag: "target".into(),
            goal_tag: "goal".into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    /// Transform estimation failed and no previous transform exists to fall
    /// back on; the frame is abandoned.
    #[error("no usable transform for this frame")]
    TransformUnavailable(#[from] RectifyError),
}

/// Extra per-entity payload routed by consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary_points: Option<Vec<[f64; 2]>>,
}

/// One entity's entry in the per-frame snapshot, shaped for downstream
/// routing by `tag` or `object_type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityReport {
    pub id: String,
    pub object_type: EntityType,
    /// 6-DOF pose for mobile entities; all zeros for boundary/region rows.
    pub pose: [f64; 6],
    pub tag: Option<String>,
    pub mobility: Mobility,
    pub options: ReportOptions,
}

/// The encoder's output for one frame, with the ray geometry for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Observation {
    pub frame: ObservationFrame,
    pub rays: Vec<Ray>,
}

/// Everything one completed frame produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SceneSnapshot {
    pub reports: Vec<EntityReport>,
    /// Present only when subject, target, and goal were all resolvable.
    pub observation: Option<Observation>,
}

/// Shared handle to the latest completed snapshot.
///
/// The write lock is held only for the pointer swap, so readers never
/// observe a half-updated frame.
#[derive(Debug, Clone)]
pub struct SnapshotCell {
    inner: Arc<RwLock<Arc<SceneSnapshot>>>,
}

impl SnapshotCell {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(SceneSnapshot::default()))),
        }
    }

    fn publish(&self, snapshot: Arc<SceneSnapshot>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = snapshot;
    }

    /// The most recently completed frame (an empty snapshot before the first).
    pub fn latest(&self) -> Arc<SceneSnapshot> {
        Arc::clone(&self.inner.read().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Owns the catalog and all temporal state; drives the five stages per frame.
pub struct PerceptionPipeline {
    catalog: EntityCatalog,
    config: PipelineConfig,
    rectifier: Rectifier,
    encoder: ObservationEncoder,
    cell: SnapshotCell,
}

impl PerceptionPipeline {
    pub fn new(catalog: EntityCatalog, config: PipelineConfig) -> Self {
        let rectifier = Rectifier::new(
            config.width,
            config.height,
            config.corner_history_len,
            config.dropout_policy,
        );
        let encoder = ObservationEncoder::new(config.encoder.clone());
        Self {
            catalog,
            config,
            rectifier,
            encoder,
            cell: SnapshotCell::new(),
        }
    }

    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    /// Handle for concurrent readers of the published snapshot.
    pub fn snapshot_cell(&self) -> SnapshotCell {
        self.cell.clone()
    }

    /// Run the full pipeline on one frame's raw detections.
    ///
    /// Per-frame recoverable conditions (insufficient detections, boundary
    /// dropout, degenerate quad with a previous transform available) degrade
    /// gracefully; the only hard failure is having no transform at all.
    pub fn process_frame(
        &mut self,
        detections: &[RawDetection],
    ) -> Result<Arc<SceneSnapshot>, FrameError> {
        let matched = match_detections(&self.catalog, detections);

        let boundary_matched: Vec<&MatchedEntity<'_>> = matched
            .iter()
            .filter(|m| m.entity.entity_type == EntityType::Boundary)
            .collect();
        let boundary_px = aggregate_centers(&boundary_matched);

        let transform = match self.rectifier.update(&boundary_px) {
            Ok(h) => h,
            Err(e) => match self.rectifier.current() {
                Some(h) => *h,
                None => return Err(e.into()),
            },
        };

        let projected = project_entities(&transform, &matched);
        let boundary_polygon = transform_points(&transform, &boundary_px);

        let mut reports = Vec::with_capacity(projected.len() + 1);
        for p in &projected {
            let (pose, options) = match &p.geometry {
                Geometry::Pose(pose) => (pose.to_array(), ReportOptions::default()),
                Geometry::Polygon(polygon) => (
                    [0.0; 6],
                    ReportOptions {
                        boundary_points: Some(polygon.clone()),
                    },
                ),
            };
            reports.push(EntityReport {
                id: p.entity.id.clone(),
                object_type: p.entity.entity_type,
                pose,
                tag: p.entity.tag.clone(),
                mobility: p.entity.mobility,
                options,
            });
        }
        // The aggregated arena boundary is a single synthetic row.
        reports.push(EntityReport {
            id: "boundary".into(),
            object_type: EntityType::Boundary,
            pose: [0.0; 6],
            tag: Some("boundary_polygon".into()),
            mobility: Mobility::Static,
            options: ReportOptions {
                boundary_points: Some(boundary_polygon),
            },
        });

        let observation = Self::encode_observation(
            &mut self.encoder,
            &self.rectifier,
            &self.config,
            &projected,
        );

        let snapshot = Arc::new(SceneSnapshot {
            reports,
            observation,
        });
        self.cell.publish(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    fn encode_observation(
        encoder: &mut ObservationEncoder,
        rectifier: &Rectifier,
        config: &PipelineConfig,
        projected: &[crate::project::ProjectedEntity<'_>],
    ) -> Option<Observation> {
        let mut subject = None;
        let mut target = None;
        let mut goal: Option<&[[f64; 2]]> = None;

        for p in projected {
            let tag = p.entity.tag.as_deref();
            match (&p.geometry, tag) {
                (Geometry::Pose(pose), Some(t)) if t == config.subject_tag => {
                    subject = Some(([pose.x, pose.y], pose.yaw));
                }
                (Geometry::Pose(pose), Some(t)) if t == config.target_tag => {
                    target = Some([pose.x, pose.y]);
                }
                (Geometry::Polygon(polygon), Some(t)) if t == config.goal_tag => {
                    goal = Some(polygon);
                }
                _ => {}
            }
        }

        let (Some((origin, heading)), Some(target), Some(goal)) = (subject, target, goal) else {
            debug!("observation skipped: subject/target/goal not all present");
            return None;
        };

        let wall = rectifier.canonical_quad();
        let (frame, rays) = encoder.encode(origin, heading, target, goal, &wall);
        Some(Observation { frame, rays })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{HitClass, RaySpread};
    use approx::assert_relative_eq;

    fn catalog() -> EntityCatalog {
        EntityCatalog::from_json_str(
            r#"{
                "boundary": [{"id": "corner", "color": "pink", "shape": "circle", "count": 4}],
                "player": [{"id": "p3", "marker_id": 3, "tags": "bot", "mobility": "dynamic"}],
                "object": [{"id": "ball", "color": "orange", "shape": "circle", "tags": "target", "mobility": "dynamic"}],
                "region": [{"id": "green_goal", "color": "green", "shape": "rectangle", "tags": "goal"}]
            }"#,
        )
        .unwrap()
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            encoder: EncoderConfig {
                spread: RaySpread {
                    start_deg: 45.0,
                    end_deg: -45.0,
                },
                ..EncoderConfig::default()
            },
            ..PipelineConfig::default()
        }
    }

    fn corner_contour(x: f64, y: f64) -> RawDetection {
        RawDetection::ShapeColor {
            shape: "circle".into(),
            color: "pink".into(),
            points: vec![[x - 1.0, y - 1.0], [x + 1.0, y - 1.0], [x, y + 2.0]],
        }
    }

    /// Corners on the canonical bounds, so the estimated transform is identity.
    fn full_frame_detections() -> Vec<RawDetection> {
        let mut dets = vec![
            corner_contour(0.0, 0.0),
            corner_contour(700.0, 0.0),
            corner_contour(700.0, 470.0),
            corner_contour(0.0, 470.0),
        ];
        // Diamond marker quad: center (40, 20), first diagonal along +x → yaw 0.
        dets.push(RawDetection::Marker {
            id: 3,
            corners: [[35.0, 20.0], [40.0, 15.0], [45.0, 20.0], [40.0, 25.0]],
        });
        dets.push(RawDetection::ShapeColor {
            shape: "circle".into(),
            color: "orange".into(),
            points: vec![[44.0, 19.0], [46.0, 19.0], [45.0, 22.0]],
        });
        dets.push(RawDetection::ShapeColor {
            shape: "rectangle".into(),
            color: "green".into(),
            points: vec![[650.0, 200.0], [700.0, 200.0], [700.0, 270.0], [650.0, 270.0]],
        });
        dets
    }

    #[test]
    fn end_to_end_frame_produces_reports_and_observation() {
        let mut pipeline = PerceptionPipeline::new(catalog(), config());
        let snapshot = pipeline.process_frame(&full_frame_detections()).unwrap();

        let bot = snapshot
            .reports
            .iter()
            .find(|r| r.tag.as_deref() == Some("bot"))
            .unwrap();
        assert_relative_eq!(bot.pose[0], 40.0, epsilon = 1e-6);
        assert_relative_eq!(bot.pose[1], 20.0, epsilon = 1e-6);
        assert_relative_eq!(bot.pose[5], 0.0, epsilon = 1e-6);
        assert_eq!(bot.mobility, Mobility::Dynamic);

        let boundary = snapshot
            .reports
            .iter()
            .find(|r| r.id == "boundary")
            .unwrap();
        assert_eq!(boundary.pose, [0.0; 6]);
        let points = boundary.options.boundary_points.as_ref().unwrap();
        assert_eq!(points.len(), 4);
        assert_relative_eq!(points[1][0], 700.0, epsilon = 1e-6);

        let goal = snapshot
            .reports
            .iter()
            .find(|r| r.id == "green_goal")
            .unwrap();
        assert_eq!(goal.object_type, EntityType::Region);
        assert_eq!(goal.pose, [0.0; 6]);
        assert!(goal.options.boundary_points.is_some());

        // Subject at (40,20) heading 0, ball at (45,20): center ray stores a
        // ball hit at 5 / 250.
        let obs = snapshot.observation.as_ref().unwrap();
        let row = obs.frame.rows()[0];
        assert_eq!(row[HitClass::Ball as usize], 1.0);
        assert_relative_eq!(row[3], 0.02, epsilon = 1e-6);
        assert_eq!(row[4], 0.0);
    }

    #[test]
    fn observation_skipped_when_target_absent() {
        let mut pipeline = PerceptionPipeline::new(catalog(), config());
        let dets: Vec<RawDetection> = full_frame_detections()
            .into_iter()
            .filter(|d| !matches!(d, RawDetection::ShapeColor { color, .. } if color == "orange"))
            .collect();
        let snapshot = pipeline.process_frame(&dets).unwrap();
        assert!(snapshot.observation.is_none());
        assert!(!snapshot.reports.is_empty());
    }

    #[test]
    fn published_snapshot_matches_returned_one() {
        let mut pipeline = PerceptionPipeline::new(catalog(), config());
        let cell = pipeline.snapshot_cell();
        assert!(cell.latest().reports.is_empty());

        let snapshot = pipeline.process_frame(&full_frame_detections()).unwrap();
        assert!(Arc::ptr_eq(&snapshot, &cell.latest()));
    }

    #[test]
    fn boundary_dropout_falls_back_to_canonical_quad() {
        let mut pipeline = PerceptionPipeline::new(catalog(), config());
        // No boundary detections at all: fallback quad gives an identity
        // transform, pipeline still completes.
        let dets: Vec<RawDetection> = full_frame_detections()
            .into_iter()
            .filter(|d| !matches!(d, RawDetection::ShapeColor { color, .. } if color == "pink"))
            .collect();
        let snapshot = pipeline.process_frame(&dets).unwrap();
        let bot = snapshot
            .reports
            .iter()
            .find(|r| r.tag.as_deref() == Some("bot"))
            .unwrap();
        assert_relative_eq!(bot.pose[0], 40.0, epsilon = 1e-6);
    }

    #[test]
    fn degenerate_first_frame_abandons_frame() {
        let mut pipeline = PerceptionPipeline::new(catalog(), config());
        // Collinear boundary centers make the very first estimate fail with
        // no previous transform to fall back on.
        let dets = vec![
            corner_contour(0.0, 0.0),
            corner_contour(100.0, 0.0),
            corner_contour(200.0, 0.0),
            corner_contour(300.0, 0.0),
        ];
        assert!(pipeline.process_frame(&dets).is_err());
        // Nothing was published.
        assert!(pipeline.snapshot_cell().latest().reports.is_empty());
    }
}
