//! Distributed 2-D Position-Based Fluids Engine
//!
//! This crate provides the coordinator/worker machinery around the
//! [`kernel`] crate's PBF numerics:
//! - [`comm`] -- rank-to-rank message transport with an in-process backend.
//! - [`messages`] -- wire payloads: tunables, particle records, coord frames.
//! - [`config`] -- JSON run configuration with validation.
//! - [`params`] -- coordinator-side tunable model and interactive controls.
//! - [`partition`] -- 1-D slab layout with dynamic add/remove.
//! - [`worker`] -- the per-rank substep machine and exchange protocols.
//! - [`coordinator`] -- the per-frame scatter/gather loop.
//!
//! [`run_cluster`] wires all of it together with one thread per rank; the
//! same worker and coordinator types run unchanged over any other
//! [`Communicator`](comm::Communicator) backend.

#![warn(missing_docs)]

pub mod comm;
pub mod config;
pub mod coordinator;
pub mod messages;
pub mod params;
pub mod partition;
pub mod worker;

pub use comm::{channel_mesh, Communicator};
pub use config::{ClusterConfig, DomainBounds, Seed, SeedMode};
pub use coordinator::{
    CollectingSink, ControlEvent, ControlSource, Coordinator, FrameSink, NullControls,
    ScriptedControls, WorkerFrame,
};
pub use messages::{unpack_coord, Tunables};
pub use params::{IdentityProjection, TunableParameters};
pub use partition::PartitionLayout;
pub use worker::Worker;

use std::thread;

/// Floor on per-worker store capacity so initially empty slabs can still
/// absorb migrating particles.
const MIN_WORKER_CAPACITY: usize = 64;

/// Run a complete simulation in-process: one thread per worker rank, the
/// coordinator on the calling thread.
///
/// Presents at most `frames` frames into `sink`, then scatters the kill
/// flag and joins every worker. Returns the number of frames presented.
pub fn run_cluster(
    config: &ClusterConfig,
    controls: &mut dyn ControlSource,
    sink: &mut dyn FrameSink,
    frames: u64,
) -> Result<u64, Box<dyn std::error::Error>> {
    config.validate()?;

    let world = config.workers + 1;
    let mut endpoints = channel_mesh(world);
    let layout = PartitionLayout::new(config.workers, config.domain.max[0]);
    let params = config.tunable_parameters();
    let boundary = config.domain.aabb();

    tracing::info!(
        "starting cluster '{}': {} workers over [0, {}), {} substeps per frame",
        config.name,
        config.workers,
        config.domain.max[0],
        config.steps_per_frame
    );

    let coordinator_endpoint = endpoints.remove(0);

    // Size every store for the worst expected count: a slab that starts
    // empty can still end up holding its share of the whole fluid.
    let total_seeds = config.seeds_for_slab(0.0, config.domain.max[0]).len();
    let average_seeds = (total_seeds + config.workers - 1) / config.workers;

    let mut handles = Vec::with_capacity(config.workers);
    for (w, endpoint) in endpoints.into_iter().enumerate() {
        let (start, end) = layout.slab(w);
        let seeds = config.seeds_for_slab(start, end);
        let headroom = seeds.len().max(average_seeds) as f32;
        let capacity =
            ((config.capacity_factor * headroom).ceil() as usize).max(MIN_WORKER_CAPACITY);
        let initial = params.snapshot_for(start, end, layout.is_active(w), false);
        let mass = config.particle_mass;

        let handle = thread::Builder::new()
            .name(format!("worker-{}", w + 1))
            .spawn(move || {
                let mut worker = Worker::new(endpoint, boundary, initial, mass, capacity, &seeds);
                if let Err(e) = worker.run() {
                    tracing::error!("worker {} failed: {}", w + 1, e);
                }
            })?;
        handles.push(handle);
    }

    let mut coordinator = Coordinator::new(
        coordinator_endpoint,
        params,
        layout,
        Box::new(IdentityProjection),
    );
    let presented = coordinator.run(controls, sink, frames)?;

    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    Ok(presented)
}
