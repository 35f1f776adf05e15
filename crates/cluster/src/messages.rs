//! Message payloads exchanged between the coordinator and the workers.
//!
//! Field order in these structs is the on-wire field order; a byte-level
//! transport serializes them in declaration order.

use kernel::{Aabb, ParticleStore};
use serde::{Deserialize, Serialize};

/// Per-frame parameter snapshot scattered from the coordinator.
///
/// All fields are identical across workers except `node_start_x`,
/// `node_end_x`, and `active`, which carry the partition layout. Workers
/// treat the snapshot as read-only for the duration of a substep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tunables {
    /// Gravitational acceleration, positive pointing down.
    pub g: f32,
    /// SPH smoothing radius; also the neighbor-grid cell size.
    pub smoothing_radius: f32,
    /// Anti-clustering strength.
    pub k: f32,
    /// Anti-clustering reference distance.
    pub dq: f32,
    /// Fluid rest density.
    pub rest_density: f32,
    /// XSPH viscosity coefficient.
    pub viscosity_c: f32,
    /// Substep duration in seconds.
    pub time_step: f32,
    /// Mover disk center x.
    pub mover_center_x: f32,
    /// Mover disk center y.
    pub mover_center_y: f32,
    /// Mover disk radius.
    pub mover_radius: f32,
    /// Left edge of this worker's slab.
    pub node_start_x: f32,
    /// Right edge of this worker's slab.
    pub node_end_x: f32,
    /// Solver substeps per displayed frame.
    pub steps_per_frame: u32,
    /// Whether this worker is in the active partition set.
    pub active: bool,
    /// Cooperative shutdown flag.
    pub kill_sim: bool,
}

/// Fixed-layout particle record used by OOB migration and halo exchange.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticlePayload {
    /// Committed x position.
    pub x: f32,
    /// Committed y position.
    pub y: f32,
    /// Predicted x position.
    pub x_star: f32,
    /// Predicted y position.
    pub y_star: f32,
    /// X velocity.
    pub vx: f32,
    /// Y velocity.
    pub vy: f32,
}

impl ParticlePayload {
    /// Snapshot particle `i` of a store.
    pub fn from_store(store: &ParticleStore, i: usize) -> Self {
        Self {
            x: store.x[i],
            y: store.y[i],
            x_star: store.x_star[i],
            y_star: store.y_star[i],
            vx: store.vx[i],
            vy: store.vy[i],
        }
    }
}

/// Pack owned particle positions into pixel-space signed 16-bit pairs.
///
/// Each coordinate maps through `2 p / extent - 1` scaled to the full i16
/// range, so the coordinator can blit frames without knowing the domain.
pub fn pack_frame_coords(store: &ParticleStore, boundary: &Aabb) -> Vec<i16> {
    let mut coords = Vec::with_capacity(2 * store.owned_len());
    for i in 0..store.owned_len() {
        coords.push(pack_coord(store.x[i], boundary.max_x));
        coords.push(pack_coord(store.y[i], boundary.max_y));
    }
    coords
}

#[inline]
fn pack_coord(p: f32, extent: f32) -> i16 {
    ((2.0 * p / extent - 1.0) * i16::MAX as f32) as i16
}

/// Map a packed pixel coordinate back into simulation space.
pub fn unpack_coord(v: i16, extent: f32) -> f32 {
    (v as f32 / i16::MAX as f32 + 1.0) * extent * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coord_round_trip_stays_on_quantization_grid() {
        let extent = 10.0f32;
        let quantum = extent / i16::MAX as f32;
        for &p in &[0.0, 1.0e-3, 2.5, 5.0, 9.0, extent - 1.0e-3] {
            let packed = pack_coord(p, extent);
            let unpacked = unpack_coord(packed, extent);
            assert!(
                (unpacked - p).abs() <= quantum,
                "round trip of {p} drifted to {unpacked} (quantum {quantum})"
            );
        }
    }

    #[test]
    fn domain_edges_use_full_pixel_range() {
        let extent = 4.0f32;
        assert_eq!(pack_coord(0.0, extent), -i16::MAX);
        assert_eq!(pack_coord(extent, extent), i16::MAX);
    }

    #[test]
    fn frame_packs_owned_particles_only() {
        let boundary = Aabb { min_x: 0.0, min_y: 0.0, max_x: 8.0, max_y: 8.0 };
        let mut store = ParticleStore::with_capacity(8);
        store.seed(4.0, 2.0, 0.0, 0.0);
        store.push_halo(6.0, 6.0, 6.0, 6.0, 0.0, 0.0);

        let coords = pack_frame_coords(&store, &boundary);
        assert_eq!(coords.len(), 2);
        assert!((unpack_coord(coords[0], 8.0) - 4.0).abs() < 1.0e-3);
        assert!((unpack_coord(coords[1], 8.0) - 2.0).abs() < 1.0e-3);
    }
}
