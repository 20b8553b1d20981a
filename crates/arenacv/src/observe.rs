//! Ray-cast observation encoding: the rectified scene as a fixed-size,
//! agent-consumable buffer.
//!
//! A fan of rays is cast from the subject's pose; per ray the nearest hit
//! among {ball, goal, wall} is encoded as a one-hot class, a normalized
//! distance, and a miss flag. Hit tests may run in any order — a stored hit
//! is only overwritten by a strictly closer one, so nearest-hit-wins holds
//! regardless of test order. A short ring history of frames provides
//! temporal context.

use std::collections::VecDeque;

use serde::Serialize;

/// Per-ray encoding: columns 0–2 one-hot over {ball, goal, wall}, column 3
/// normalized hit distance in [0, 1] (1.0 = no hit), column 4 miss flag.
pub const OBS_COLS: usize = 5;

const COL_DISTANCE: usize = 3;
const COL_MISS: usize = 4;

/// Hit class, doubling as the one-hot column index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitClass {
    Ball = 0,
    Goal = 1,
    Wall = 2,
}

/// Angular fan relative to the subject's heading, in degrees.
///
/// The spread is a tuned policy, not a constant: the deployed rig swept from
/// 45° ahead-left to 135° behind (`45 → −135`, the default here), while an
/// earlier revision used a symmetric `45 → −45` fan. Rays are emitted in
/// alternating center-out order, so ray 0 is always the most heading-aligned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaySpread {
    pub start_deg: f64,
    pub end_deg: f64,
}

impl Default for RaySpread {
    fn default() -> Self {
        Self {
            start_deg: 45.0,
            end_deg: -135.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderConfig {
    pub num_rays: usize,
    /// Maximum ray length in canonical arena units; hits normalize by it.
    pub ray_length: f64,
    /// Perpendicular-distance threshold for point-target hits.
    pub hit_threshold: f64,
    pub spread: RaySpread,
    /// Frames of temporal context retained in the ring history.
    pub history_depth: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            num_rays: 7,
            ray_length: 250.0,
            hit_threshold: 50.0,
            spread: RaySpread::default(),
            history_depth: 3,
        }
    }
}

/// One cast ray as a segment in canonical arena space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ray {
    pub origin: [f64; 2],
    pub end: [f64; 2],
}

/// Fixed-size observation buffer: `num_rays` rows × [`OBS_COLS`] columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationFrame {
    rows: Vec<[f32; OBS_COLS]>,
}

impl ObservationFrame {
    /// All-miss frame: `[0, 0, 0, 1, 1]` per ray.
    pub fn blank(num_rays: usize) -> Self {
        Self {
            rows: vec![[0.0, 0.0, 0.0, 1.0, 1.0]; num_rays],
        }
    }

    pub fn rows(&self) -> &[[f32; OBS_COLS]] {
        &self.rows
    }

    pub fn num_rays(&self) -> usize {
        self.rows.len()
    }

    /// Record a candidate hit; kept only if strictly closer than the stored one.
    fn update(&mut self, ray_index: usize, class: HitClass, fraction: f64) {
        let row = &mut self.rows[ray_index];
        let fraction = fraction as f32;
        if fraction < row[COL_DISTANCE] {
            row[0] = 0.0;
            row[1] = 0.0;
            row[2] = 0.0;
            row[class as usize] = 1.0;
            row[COL_DISTANCE] = fraction;
            row[COL_MISS] = 0.0;
        }
    }
}

/// Casts the ray fan and encodes nearest hits, keeping a bounded frame history.
#[derive(Debug)]
pub struct ObservationEncoder {
    config: EncoderConfig,
    history: VecDeque<ObservationFrame>,
}

impl ObservationEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        let depth = config.history_depth.max(1);
        Self {
            config,
            history: VecDeque::with_capacity(depth),
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Retained frames, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &ObservationFrame> {
        self.history.iter()
    }

    /// Encode one frame and push it onto the ring history.
    ///
    /// `heading` is the subject's yaw in radians; `goal` and `wall` are
    /// closed polygons in canonical arena space.
    pub fn encode(
        &mut self,
        origin: [f64; 2],
        heading: f64,
        target: [f64; 2],
        goal: &[[f64; 2]],
        wall: &[[f64; 2]],
    ) -> (ObservationFrame, Vec<Ray>) {
        let rays = self.generate_rays(origin, heading);
        let mut frame = ObservationFrame::blank(self.config.num_rays);

        self.apply_target_hits(&mut frame, &rays, target);
        self.apply_polygon_hits(&mut frame, &rays, goal, HitClass::Goal);
        self.apply_polygon_hits(&mut frame, &rays, wall, HitClass::Wall);

        if self.history.len() >= self.config.history_depth.max(1) {
            self.history.pop_front();
        }
        self.history.push_back(frame.clone());

        (frame, rays)
    }

    /// Generate the ray fan in alternating center-out order
    /// (0, −1, +1, −2, +2, …) around the spread's middle angle.
    pub fn generate_rays(&self, origin: [f64; 2], heading: f64) -> Vec<Ray> {
        let n = self.config.num_rays;
        let deltas = linspace(self.config.spread.start_deg, self.config.spread.end_deg, n);

        let mid = n / 2;
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by_key(|&i| ((i as i64 - mid as i64).abs(), i));

        order
            .into_iter()
            .map(|i| {
                let angle = heading + deltas[i].to_radians();
                Ray {
                    origin,
                    end: [
                        origin[0] + self.config.ray_length * angle.cos(),
                        origin[1] + self.config.ray_length * angle.sin(),
                    ],
                }
            })
            .collect()
    }

    /// Point-target test: a ray hits when its perpendicular distance to the
    /// target is within the threshold; the stored distance runs from origin
    /// to the ray's closest point to the target.
    fn apply_target_hits(&self, frame: &mut ObservationFrame, rays: &[Ray], target: [f64; 2]) {
        for (i, ray) in rays.iter().enumerate() {
            let (closest, _t) = closest_point_on_segment(ray.origin, ray.end, target);
            let dist = hypot2(target, closest);
            if dist <= self.config.hit_threshold {
                let hit_distance = hypot2(ray.origin, closest);
                frame.update(i, HitClass::Ball, hit_distance / self.config.ray_length);
            }
        }
    }

    /// Exact ray–polygon-boundary intersection; the nearest crossing wins.
    fn apply_polygon_hits(
        &self,
        frame: &mut ObservationFrame,
        rays: &[Ray],
        polygon: &[[f64; 2]],
        class: HitClass,
    ) {
        if polygon.len() < 2 {
            return;
        }
        for (i, ray) in rays.iter().enumerate() {
            let mut nearest_t: Option<f64> = None;
            for e in 0..polygon.len() {
                let q1 = polygon[e];
                let q2 = polygon[(e + 1) % polygon.len()];
                if let Some(t) = segment_intersection_t(ray.origin, ray.end, q1, q2) {
                    nearest_t = Some(nearest_t.map_or(t, |best: f64| best.min(t)));
                }
            }
            if let Some(t) = nearest_t {
                let hit_distance = t * hypot2(ray.origin, ray.end);
                frame.update(i, class, hit_distance / self.config.ray_length);
            }
        }
    }
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

fn hypot2(a: [f64; 2], b: [f64; 2]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

/// Closest point on segment `ab` to `p`, with its parameter along the segment.
fn closest_point_on_segment(a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> ([f64; 2], f64) {
    let vx = b[0] - a[0];
    let vy = b[1] - a[1];
    let len2 = vx * vx + vy * vy;
    if len2 < 1e-18 {
        return (a, 0.0);
    }
    let t = (((p[0] - a[0]) * vx + (p[1] - a[1]) * vy) / len2).clamp(0.0, 1.0);
    ([a[0] + t * vx, a[1] + t * vy], t)
}

/// Parameter t ∈ [0, 1] along `ab` where it crosses segment `q1q2`, if it does.
///
/// Collinear overlap resolves to the nearest overlapping edge endpoint.
fn segment_intersection_t(
    a: [f64; 2],
    b: [f64; 2],
    q1: [f64; 2],
    q2: [f64; 2],
) -> Option<f64> {
    let rx = b[0] - a[0];
    let ry = b[1] - a[1];
    let sx = q2[0] - q1[0];
    let sy = q2[1] - q1[1];
    let denom = rx * sy - ry * sx;
    let qa_x = q1[0] - a[0];
    let qa_y = q1[1] - a[1];

    if denom.abs() > 1e-12 {
        let t = (qa_x * sy - qa_y * sx) / denom;
        let u = (qa_x * ry - qa_y * rx) / denom;
        if (0.0..=1.0).contains(&t) && (0.0..=1.0).contains(&u) {
            return Some(t);
        }
        return None;
    }

    // Parallel. Overlapping only if the edge start is on the ray's line.
    if (qa_x * ry - qa_y * rx).abs() > 1e-9 {
        return None;
    }
    let len2 = rx * rx + ry * ry;
    if len2 < 1e-18 {
        return None;
    }
    let mut best: Option<f64> = None;
    for q in [q1, q2] {
        let t = ((q[0] - a[0]) * rx + (q[1] - a[1]) * ry) / len2;
        if (0.0..=1.0).contains(&t) {
            best = Some(best.map_or(t, |b: f64| b.min(t)));
        }
    }
    best
}
