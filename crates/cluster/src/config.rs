//! Configuration parsing and validation for cluster runs.

use kernel::Aabb;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::params::TunableParameters;
use crate::partition::MIN_SLAB_RADII;

/// Complete configuration of a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Human-readable run name.
    pub name: String,
    /// Number of worker ranks (the coordinator is rank 0 on top of these).
    pub workers: usize,
    /// Simulation domain bounds.
    pub domain: DomainBounds,
    /// Initial particle seeding.
    pub seed: SeedMode,
    /// Gravitational acceleration, positive pointing down.
    #[serde(default = "default_gravity")]
    pub gravity: f32,
    /// SPH smoothing radius.
    #[serde(default = "default_smoothing_radius")]
    pub smoothing_radius: f32,
    /// Fluid rest density.
    #[serde(default = "default_rest_density")]
    pub rest_density: f32,
    /// Per-particle mass.
    #[serde(default = "default_particle_mass")]
    pub particle_mass: f32,
    /// Anti-clustering strength.
    #[serde(default = "default_k")]
    pub k: f32,
    /// Anti-clustering reference distance as a fraction of the smoothing
    /// radius.
    #[serde(default = "default_dq_fraction")]
    pub dq_fraction: f32,
    /// XSPH viscosity coefficient.
    #[serde(default = "default_viscosity")]
    pub viscosity_c: f32,
    /// Substep duration in seconds.
    #[serde(default = "default_time_step")]
    pub time_step: f32,
    /// Solver substeps per displayed frame.
    #[serde(default = "default_steps_per_frame")]
    pub steps_per_frame: u32,
    /// Particle-store headroom as a multiple of the initial slab count.
    #[serde(default = "default_capacity_factor")]
    pub capacity_factor: f32,
}

/// Domain bounding box.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DomainBounds {
    /// Minimum corner [x, y].
    pub min: [f32; 2],
    /// Maximum corner [x, y].
    pub max: [f32; 2],
}

impl DomainBounds {
    /// View as the kernel's boundary type.
    pub fn aabb(&self) -> Aabb {
        Aabb { min_x: self.min[0], min_y: self.min[1], max_x: self.max[0], max_y: self.max[1] }
    }
}

/// Initial particle placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SeedMode {
    /// Uniform grid fill of `region` at the given spacing. Every worker
    /// seeds the intersection of the region with its own slab.
    Grid {
        /// Inter-particle distance.
        spacing: f32,
        /// Region to fill with fluid.
        region: DomainBounds,
    },
    /// Explicit per-particle seeds, for deterministic scenarios.
    Explicit(Vec<Seed>),
}

/// A single explicitly seeded particle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Seed {
    /// Initial x position.
    pub x: f32,
    /// Initial y position.
    pub y: f32,
    /// Initial x velocity.
    #[serde(default)]
    pub vx: f32,
    /// Initial y velocity.
    #[serde(default)]
    pub vy: f32,
}

fn default_gravity() -> f32 {
    9.0
}

fn default_smoothing_radius() -> f32 {
    0.2
}

fn default_rest_density() -> f32 {
    1.0
}

fn default_particle_mass() -> f32 {
    1.0
}

fn default_k() -> f32 {
    0.1
}

fn default_dq_fraction() -> f32 {
    0.3
}

fn default_viscosity() -> f32 {
    0.1
}

fn default_time_step() -> f32 {
    1.0 / 60.0
}

fn default_steps_per_frame() -> u32 {
    4
}

fn default_capacity_factor() -> f32 {
    2.0
}

impl ClusterConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: &str) -> Result<Self, String> {
        let contents =
            fs::read_to_string(path).map_err(|e| format!("failed to read config file {path}: {e}"))?;

        let config: ClusterConfig =
            serde_json::from_str(&contents).map_err(|e| format!("failed to parse config JSON: {e}"))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers < 1 {
            return Err("at least one worker rank is required".to_string());
        }

        if self.domain.min[0] >= self.domain.max[0] {
            return Err("domain min.x must be less than max.x".to_string());
        }
        if self.domain.min[1] >= self.domain.max[1] {
            return Err("domain min.y must be less than max.y".to_string());
        }
        if self.domain.min[0] != 0.0 || self.domain.min[1] != 0.0 {
            return Err("domain minimum must be the axis origin".to_string());
        }

        if self.smoothing_radius <= 0.0 {
            return Err("smoothing radius must be positive".to_string());
        }

        // Every slab of the initial even split must fit its halo bands and
        // stay splittable.
        let slab_width = (self.domain.max[0] - self.domain.min[0]) / self.workers as f32;
        if slab_width < MIN_SLAB_RADII * self.smoothing_radius {
            return Err(format!(
                "slab width {slab_width} is below {MIN_SLAB_RADII} smoothing radii; \
                 use fewer workers or a smaller smoothing radius"
            ));
        }

        if self.particle_mass <= 0.0 {
            return Err("particle mass must be positive".to_string());
        }
        if self.time_step <= 0.0 {
            return Err("time step must be positive".to_string());
        }
        if self.steps_per_frame == 0 {
            return Err("steps_per_frame must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.dq_fraction) {
            return Err("dq_fraction must lie in [0, 1]".to_string());
        }
        if self.capacity_factor < 1.0 {
            return Err("capacity_factor must be at least 1".to_string());
        }

        if let SeedMode::Grid { spacing, .. } = &self.seed {
            if *spacing <= 0.0 {
                return Err("seed spacing must be positive".to_string());
            }
        }

        Ok(())
    }

    /// Authoritative coordinator-side parameter state derived from this
    /// configuration.
    pub fn tunable_parameters(&self) -> TunableParameters {
        TunableParameters::new(
            self.gravity,
            self.smoothing_radius,
            self.rest_density,
            self.k,
            self.dq_fraction * self.smoothing_radius,
            self.viscosity_c,
            self.time_step,
            self.steps_per_frame,
        )
    }

    /// Positions and velocities seeded into worker `w`'s slab `[start, end)`.
    pub fn seeds_for_slab(&self, start: f32, end: f32) -> Vec<Seed> {
        match &self.seed {
            SeedMode::Grid { spacing, region } => {
                let mut seeds = Vec::new();
                let nx = ((region.max[0] - region.min[0]) / spacing).ceil() as usize;
                let ny = ((region.max[1] - region.min[1]) / spacing).ceil() as usize;
                for i in 0..nx {
                    for j in 0..ny {
                        let x = region.min[0] + (i as f32 + 0.5) * spacing;
                        let y = region.min[1] + (j as f32 + 0.5) * spacing;
                        if x >= start && x < end && x < region.max[0] && y < region.max[1] {
                            seeds.push(Seed { x, y, vx: 0.0, vy: 0.0 });
                        }
                    }
                }
                seeds
            }
            SeedMode::Explicit(seeds) => {
                seeds.iter().copied().filter(|s| s.x >= start && s.x < end).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ClusterConfig {
        ClusterConfig {
            name: "test".to_string(),
            workers: 2,
            domain: DomainBounds { min: [0.0, 0.0], max: [10.0, 10.0] },
            seed: SeedMode::Grid {
                spacing: 0.1,
                region: DomainBounds { min: [0.0, 0.0], max: [10.0, 5.0] },
            },
            gravity: default_gravity(),
            smoothing_radius: default_smoothing_radius(),
            rest_density: default_rest_density(),
            particle_mass: default_particle_mass(),
            k: default_k(),
            dq_fraction: default_dq_fraction(),
            viscosity_c: default_viscosity(),
            time_step: default_time_step(),
            steps_per_frame: default_steps_per_frame(),
            capacity_factor: default_capacity_factor(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut config = base_config();
        config.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_domain_is_rejected() {
        let mut config = base_config();
        config.domain.max[0] = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn narrow_slabs_are_rejected() {
        let mut config = base_config();
        // 40 workers over 10 units: slab width 0.25 < 2.5 * h = 0.5.
        config.workers = 40;
        let err = config.validate().unwrap_err();
        assert!(err.contains("smoothing radii"), "unexpected error: {err}");
    }

    #[test]
    fn grid_seeds_split_between_slabs() {
        let config = base_config();
        let left = config.seeds_for_slab(0.0, 5.0);
        let right = config.seeds_for_slab(5.0, 10.0);
        assert!(!left.is_empty() && !right.is_empty());
        assert!(left.iter().all(|s| s.x < 5.0));
        assert!(right.iter().all(|s| s.x >= 5.0));

        let all = config.seeds_for_slab(0.0, 10.0);
        assert_eq!(all.len(), left.len() + right.len());
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = base_config();
        let json = serde_json::to_string(&config).unwrap();
        let back: ClusterConfig = serde_json::from_str(&json).unwrap();
        assert!(back.validate().is_ok());
        assert_eq!(back.workers, config.workers);
    }
}
