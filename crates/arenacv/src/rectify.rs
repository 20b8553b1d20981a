//! Temporally smoothed rectification from camera pixels to canonical arena space.
//!
//! ## Why average corners, not transforms?
//!
//! Homographies do not average component-wise in any meaningful way; corner
//! coordinates do. Each frame's ordered boundary quad enters a fixed-length
//! history and the transform is estimated from the mean quad, which damps
//! per-frame detection jitter without ever interpolating between projective
//! matrices.
//!
//! During boundary-detection dropout the frame substitutes a fallback quad.
//! Which quad depends on [`DropoutPolicy`]: the historical behavior appends
//! the canonical frame bounds, so a sustained dropout decays the smoothed
//! corners toward canonical bounds over one history window; the alternative
//! freezes the last successfully detected quad.

use std::collections::VecDeque;

use log::{debug, warn};
use nalgebra::Matrix3;
use thiserror::Error;

use crate::homography::{estimate_homography, HomographyError};

/// Number of frames of boundary corners averaged before estimation.
pub const DEFAULT_CORNER_HISTORY_LEN: usize = 20;

#[derive(Debug, Error)]
pub enum RectifyError {
    #[error("transform estimation failed")]
    Estimate(#[from] HomographyError),
}

/// What to feed the smoothing history when fewer than 4 boundary points are
/// available this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DropoutPolicy {
    /// Append the canonical frame bounds; sustained dropout decays the mean
    /// quad toward canonical bounds (historical behavior).
    #[default]
    DecayToCanonical,
    /// Repeat the last successfully detected quad (canonical bounds until
    /// one exists).
    FreezeLastKnown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RectifierState {
    Uninitialized,
    Tracking,
}

/// Order four (or more) boundary points into top-left, top-right,
/// bottom-right, bottom-left.
///
/// Top-left minimizes x+y, bottom-right maximizes x+y, top-right minimizes
/// y−x, bottom-left maximizes y−x. The result is invariant to input order.
/// Returns None when fewer than four points are supplied.
pub fn order_corners(points: &[[f64; 2]]) -> Option<[[f64; 2]; 4]> {
    if points.len() < 4 {
        return None;
    }

    let extreme = |key: fn(&[f64; 2]) -> f64, max: bool| -> [f64; 2] {
        let mut best = points[0];
        let mut best_key = key(&points[0]);
        for p in &points[1..] {
            let k = key(p);
            if (max && k > best_key) || (!max && k < best_key) {
                best = *p;
                best_key = k;
            }
        }
        best
    };

    let top_left = extreme(|p| p[0] + p[1], false);
    let bottom_right = extreme(|p| p[0] + p[1], true);
    let top_right = extreme(|p| p[1] - p[0], false);
    let bottom_left = extreme(|p| p[1] - p[0], true);

    Some([top_left, top_right, bottom_right, bottom_left])
}

/// Estimates and temporally smooths the pixel → canonical-arena transform.
#[derive(Debug)]
pub struct Rectifier {
    width: f64,
    height: f64,
    policy: DropoutPolicy,
    history: VecDeque<[[f64; 2]; 4]>,
    capacity: usize,
    last_detected: Option<[[f64; 2]; 4]>,
    state: RectifierState,
    transform: Option<Matrix3<f64>>,
}

impl Rectifier {
    pub fn new(width: f64, height: f64, history_len: usize, policy: DropoutPolicy) -> Self {
        Self {
            width,
            height,
            policy,
            history: VecDeque::with_capacity(history_len.max(1)),
            capacity: history_len.max(1),
            last_detected: None,
            state: RectifierState::Uninitialized,
            transform: None,
        }
    }

    pub fn state(&self) -> RectifierState {
        self.state
    }

    /// Last successfully estimated transform, if any.
    pub fn current(&self) -> Option<&Matrix3<f64>> {
        self.transform.as_ref()
    }

    /// Canonical rectangle corners (0,0)–(W,0)–(W,H)–(0,H).
    pub fn canonical_quad(&self) -> [[f64; 2]; 4] {
        [
            [0.0, 0.0],
            [self.width, 0.0],
            [self.width, self.height],
            [0.0, self.height],
        ]
    }

    /// Ingest this frame's boundary polygon and re-estimate the smoothed
    /// transform.
    ///
    /// On a degenerate mean quad the error is returned and the previous
    /// transform (if any) stays current; the caller falls back to it for this
    /// frame's projection.
    pub fn update(&mut self, boundary: &[[f64; 2]]) -> Result<Matrix3<f64>, RectifyError> {
        let quad = match order_corners(boundary) {
            Some(quad) => {
                self.last_detected = Some(quad);
                quad
            }
            None => {
                debug!(
                    "boundary dropout ({} points); applying {:?}",
                    boundary.len(),
                    self.policy
                );
                match self.policy {
                    DropoutPolicy::DecayToCanonical => self.canonical_quad(),
                    DropoutPolicy::FreezeLastKnown => {
                        self.last_detected.unwrap_or_else(|| self.canonical_quad())
                    }
                }
            }
        };

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(quad);

        let mean = self.mean_quad();
        match estimate_homography(&mean, &self.canonical_quad()) {
            Ok(h) => {
                self.transform = Some(h);
                self.state = RectifierState::Tracking;
                Ok(h)
            }
            Err(e) => {
                warn!("degenerate boundary quad, keeping previous transform: {e}");
                Err(RectifyError::Estimate(e))
            }
        }
    }

    fn mean_quad(&self) -> [[f64; 2]; 4] {
        let n = self.history.len() as f64;
        let mut mean = [[0.0; 2]; 4];
        for quad in &self.history {
            for (m, p) in mean.iter_mut().zip(quad) {
                m[0] += p[0] / n;
                m[1] += p[1] / n;
            }
        }
        mean
    }
}
