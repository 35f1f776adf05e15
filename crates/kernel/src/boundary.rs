//! Domain boundary clamping and the user-driven disk mover.

use serde::{Deserialize, Serialize};

/// Margin kept between a clamped particle and the max boundary.
///
/// The spatial hash must never classify a particle into the cell one past
/// the last bin, so positions are clamped to `max - CLAMP_EPSILON` rather
/// than `max` itself.
pub const CLAMP_EPSILON: f32 = 1.0e-3;

/// Global axis-aligned simulation bounds, read-only after init.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum x.
    pub min_x: f32,
    /// Minimum y.
    pub min_y: f32,
    /// Maximum x.
    pub max_x: f32,
    /// Maximum y.
    pub max_y: f32,
}

impl Aabb {
    /// Clamp a point into `[min, max - CLAMP_EPSILON]` on both axes.
    pub fn clamp(&self, x: &mut f32, y: &mut f32) {
        if *x < self.min_x {
            *x = self.min_x;
        } else if *x > self.max_x {
            *x = self.max_x - CLAMP_EPSILON;
        }
        if *y < self.min_y {
            *y = self.min_y;
        } else if *y > self.max_y {
            *y = self.max_y - CLAMP_EPSILON;
        }
    }
}

/// Solid disk obstacle driven by the user.
///
/// A non-positive radius disables the mover entirely.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mover {
    /// Disk center x.
    pub center_x: f32,
    /// Disk center y.
    pub center_y: f32,
    /// Disk radius.
    pub radius: f32,
}

impl Mover {
    /// Push a penetrating point out of the disk along the inward normal.
    ///
    /// A point exactly at the center has no normal; it is ejected along +x,
    /// which keeps the resolution deterministic.
    pub fn resolve(&self, x: &mut f32, y: &mut f32) {
        if self.radius <= 0.0 {
            return;
        }
        let dx = *x - self.center_x;
        let dy = *y - self.center_y;
        let d2 = dx * dx + dy * dy;
        if d2 > self.radius * self.radius {
            return;
        }
        if d2 > 0.0 {
            let d = d2.sqrt();
            let norm_x = -dx / d;
            let norm_y = -dy / d;
            // With no collision impulse the penetration is handled here.
            let pen_dist = self.radius - d;
            *x -= pen_dist * norm_x;
            *y -= pen_dist * norm_y;
        } else {
            *x = self.center_x + self.radius;
        }
    }
}

/// Apply mover push-out, then clamp into the domain bounds.
pub fn resolve_collisions(boundary: &Aabb, mover: &Mover, x: &mut f32, y: &mut f32) {
    mover.resolve(x, y);
    boundary.clamp(x, y);
}
