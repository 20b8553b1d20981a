//! arenacv — overhead-camera arena perception for frame-rate agents.
//!
//! Reconciles noisy, unordered per-frame detections with a fixed catalog of
//! expected entities, rectifies the scene into a stable top-down frame, and
//! encodes it as a fixed-size ray-cast observation. The pipeline stages are:
//!
//! 1. **Catalog** – static registry of expected entities (identity, class
//!    keys, routing tags), built once from JSON configuration.
//! 2. **Detection** – binds anonymous shape/color contours and fiducial quads
//!    to catalog entities, all-or-nothing per class.
//! 3. **Region** – collapses boundary/region detections to a representative
//!    polygon (convex hull of centers beyond four contributors).
//! 4. **Rectify** – estimates the pixel → canonical-arena homography from
//!    boundary corners smoothed over a bounded history.
//! 5. **Project** – transforms matched geometry into arena units and derives
//!    6-DOF poses for mobile entities.
//! 6. **Observe** – casts a ray fan from the subject's pose and encodes
//!    nearest hits into a fixed-size buffer with a short temporal history.
//!
//! Image acquisition, feature detection, transport, and inference are
//! external collaborators; [`PerceptionPipeline`] consumes their raw
//! detections and publishes an immutable [`SceneSnapshot`] per frame through
//! a [`SnapshotCell`].
//!
//! # Example
//!
//! ```no_run
//! use arenacv::{EntityCatalog, PerceptionPipeline, PipelineConfig, RawDetection};
//!
//! let catalog = EntityCatalog::from_json_str(r#"{
//!     "boundary": [{"id": "corner", "color": "pink", "shape": "circle", "count": 4}],
//!     "player":   [{"id": "p3", "marker_id": 3, "tags": "bot", "mobility": "dynamic"}]
//! }"#)?;
//! let mut pipeline = PerceptionPipeline::new(catalog, PipelineConfig::default());
//!
//! let detections: Vec<RawDetection> = vec![/* from the camera collaborator */];
//! let snapshot = pipeline.process_frame(&detections)?;
//! println!("{} entities this frame", snapshot.reports.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod catalog;
pub mod detection;
pub mod homography;
pub mod observe;
pub mod pipeline;
pub mod project;
pub mod rectify;
pub mod region;

pub use catalog::{
    CatalogError, CatalogSpec, Entity, EntityCatalog, EntityDescriptor, EntityType, Mobility,
};
pub use detection::{MatchedEntity, RawDetection};
pub use homography::HomographyError;
pub use observe::{EncoderConfig, HitClass, ObservationEncoder, ObservationFrame, Ray, RaySpread};
pub use pipeline::{
    EntityReport, FrameError, Observation, PerceptionPipeline, PipelineConfig, SceneSnapshot,
    SnapshotCell,
};
pub use project::{Geometry, Pose, ProjectedEntity};
pub use rectify::{DropoutPolicy, Rectifier, RectifierState, RectifyError};
