//! Worker-side simulation: slab ownership, the substep machine, and the
//! migration and halo protocols.
//!
//! A worker owns the particles inside its slab `[node_start_x, node_end_x)`
//! plus a halo band of neighbor-owned mirrors. Each substep it predicts
//! positions, migrates out-of-bounds particles to the rank-adjacent workers,
//! refreshes the halo, rebuilds neighbor lists, runs the fixed Jacobi
//! density projection (publishing halo multipliers and positions between
//! iterations so interface updates stay symmetric), finalizes velocities,
//! and commits. On the terminal substep of every frame it receives the next
//! parameter scatter and streams packed pixel coordinates back to the
//! coordinator.

use kernel::{
    neighbor::{NeighborGrid, NeighborLists},
    sph, Aabb, Mover, ParticleStore,
};

use crate::comm::{CommError, Communicator, Message, SendHandle, Tag, COORDINATOR_RANK};
use crate::config::Seed;
use crate::messages::{pack_frame_coords, ParticlePayload, Tunables};

/// Exchange direction along the 1-D decomposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left = 0,
    Right = 1,
}

const SIDES: [Side; 2] = [Side::Left, Side::Right];

/// One simulation rank: slab state plus the communication endpoint.
pub struct Worker<C: Communicator> {
    comm: C,
    params: Tunables,
    boundary: Aabb,
    mass: f32,
    store: ParticleStore,
    lists: NeighborLists,
    /// Owned indices leaving through each side, rebuilt every substep.
    oob_out: [Vec<usize>; 2],
    /// Owned indices mirrored to each neighbor, in send order; the
    /// intra-iteration publishes reuse this pairing.
    halo_sent: [Vec<usize>; 2],
    /// Arena range `(start, len)` of the mirrors received from each side.
    halo_recv: [(usize, usize); 2],
}

impl<C: Communicator> Worker<C> {
    /// Create a worker with its initial parameter snapshot and seeds.
    pub fn new(
        comm: C,
        boundary: Aabb,
        params: Tunables,
        mass: f32,
        capacity: usize,
        seeds: &[Seed],
    ) -> Self {
        let mut store = ParticleStore::with_capacity(capacity);
        for seed in seeds {
            store.seed(seed.x, seed.y, seed.vx, seed.vy);
        }
        tracing::info!(
            "worker {} owns [{:.3}, {:.3}) with {} particles (capacity {})",
            comm.rank(),
            params.node_start_x,
            params.node_end_x,
            store.owned_len(),
            capacity
        );
        Self {
            comm,
            params,
            boundary,
            mass,
            store,
            lists: NeighborLists::new(),
            oob_out: [Vec::new(), Vec::new()],
            halo_sent: [Vec::new(), Vec::new()],
            halo_recv: [(0, 0), (0, 0)],
        }
    }

    /// Rank of the neighbor on `side`, if that rank exists. Rank 0 is the
    /// coordinator, so the leftmost worker has no left neighbor.
    fn peer(&self, side: Side) -> Option<usize> {
        let rank = self.comm.rank();
        match side {
            Side::Left if rank > 1 => Some(rank - 1),
            Side::Right if rank + 1 < self.comm.world_size() => Some(rank + 1),
            _ => None,
        }
    }

    fn mover(&self) -> Mover {
        Mover {
            center_x: self.params.mover_center_x,
            center_y: self.params.mover_center_y,
            radius: self.params.mover_radius,
        }
    }

    /// Run substeps until the coordinator scatters `kill_sim`.
    ///
    /// Returns once the in-flight substep has been completed and the final
    /// frame streamed out.
    pub fn run(&mut self) -> Result<(), CommError> {
        let mut sub_step: u32 = 0;
        let mut coords_in_flight: Option<SendHandle> = None;
        let mut kill = false;

        loop {
            let mover = self.mover();
            sph::apply_gravity(&mut self.store, self.params.g, self.params.time_step);
            sph::predict_positions(&mut self.store, self.params.time_step, &self.boundary, &mover);

            // The coordinate buffer from the previous frame must be clear
            // before this frame can overwrite it.
            if sub_step == 0 {
                if let Some(handle) = coords_in_flight.take() {
                    handle.wait();
                }
            }

            let terminal = sub_step + 1 == self.params.steps_per_frame;
            if terminal {
                let was_active = self.params.active;
                self.params = self.recv_tunables()?;
                if self.params.active != was_active {
                    tracing::info!(
                        "worker {} {} the active set",
                        self.comm.rank(),
                        if self.params.active { "joined" } else { "left" }
                    );
                }
                if self.params.kill_sim {
                    kill = true;
                }
            }

            self.store.clear_halo();
            self.migrate_out_of_bounds()?;
            self.exchange_halo()?;
            self.build_neighbor_lists();

            let mover = self.mover();
            let h = self.params.smoothing_radius;
            for _ in 0..sph::SOLVE_ITERATIONS {
                sph::compute_densities(&mut self.store, &self.lists, h, self.mass);
                sph::compute_lambdas(&mut self.store, &self.lists, h, self.params.rest_density);
                self.publish_halo_lambdas()?;
                sph::compute_position_corrections(
                    &mut self.store,
                    &self.lists,
                    h,
                    self.params.rest_density,
                    self.params.k,
                    self.params.dq,
                );
                sph::apply_position_corrections(&mut self.store, &self.boundary, &mover);
                self.publish_halo_positions()?;
            }

            sph::update_velocities(&mut self.store, self.params.time_step);
            sph::xsph_viscosity(&mut self.store, &self.lists, h, self.params.viscosity_c);
            sph::commit_positions(&mut self.store);

            if terminal {
                let coords = pack_frame_coords(&self.store, &self.boundary);
                coords_in_flight =
                    Some(self.comm.isend(COORDINATOR_RANK, Message::FrameCoords(coords))?);
                if kill {
                    break;
                }
                sub_step = 0;
            } else {
                sub_step += 1;
            }
        }

        if let Some(handle) = coords_in_flight.take() {
            handle.wait();
        }
        tracing::info!(
            "worker {} shut down with {} particles",
            self.comm.rank(),
            self.store.owned_len()
        );
        Ok(())
    }

    fn recv_tunables(&self) -> Result<Tunables, CommError> {
        match self.comm.recv(COORDINATOR_RANK, Tag::Tunables)? {
            Message::Tunables(t) => Ok(t),
            _ => unreachable!("tag-checked receive returned mismatched payload"),
        }
    }

    fn recv_count(&self, peer: usize, tag: Tag) -> Result<usize, CommError> {
        match self.comm.recv(peer, tag)? {
            Message::OobCount(n) | Message::HaloCount(n) => Ok(n as usize),
            _ => unreachable!("tag-checked receive returned mismatched payload"),
        }
    }

    fn recv_particles(&self, peer: usize, tag: Tag) -> Result<Vec<ParticlePayload>, CommError> {
        match self.comm.recv(peer, tag)? {
            Message::OobParticles(p) | Message::HaloParticles(p) => Ok(p),
            _ => unreachable!("tag-checked receive returned mismatched payload"),
        }
    }

    /// Detect owned particles whose predicted position left the slab and
    /// trade them with the rank-adjacent neighbors: counts first, payloads
    /// second, then compact the owned region and append the arrivals.
    fn migrate_out_of_bounds(&mut self) -> Result<(), CommError> {
        let start_x = self.params.node_start_x;
        let end_x = self.params.node_end_x;

        self.oob_out[0].clear();
        self.oob_out[1].clear();
        for i in 0..self.store.owned_len() {
            let x = self.store.x_star[i];
            if x < start_x {
                self.oob_out[Side::Left as usize].push(i);
            } else if x >= end_x {
                self.oob_out[Side::Right as usize].push(i);
            }
        }

        for side in SIDES {
            let departing = &self.oob_out[side as usize];
            if let Some(peer) = self.peer(side) {
                self.comm.send(peer, Message::OobCount(departing.len() as u32))?;
            } else {
                // With the slab pinned to the domain edge the clamp keeps
                // every particle inside, so nothing can leave this way.
                debug_assert!(departing.is_empty());
            }
        }
        for side in SIDES {
            let departing = &self.oob_out[side as usize];
            if let Some(peer) = self.peer(side) {
                if !departing.is_empty() {
                    let payload: Vec<ParticlePayload> = departing
                        .iter()
                        .map(|&i| ParticlePayload::from_store(&self.store, i))
                        .collect();
                    self.comm.send(peer, Message::OobParticles(payload))?;
                }
            }
        }

        let mut incoming: Vec<ParticlePayload> = Vec::new();
        for side in SIDES {
            if let Some(peer) = self.peer(side) {
                let count = self.recv_count(peer, Tag::OobCount)?;
                if count > 0 {
                    let payload = self.recv_particles(peer, Tag::OobParticles)?;
                    debug_assert_eq!(payload.len(), count);
                    incoming.extend(payload);
                }
            }
        }

        // Compact from the highest index down so pending removals stay valid
        // while tail entries are swapped in.
        let mut departing: Vec<usize> = self.oob_out[0].iter().chain(self.oob_out[1].iter()).copied().collect();
        departing.sort_unstable_by(|a, b| b.cmp(a));
        let departed = departing.len();
        for i in departing {
            self.store.swap_remove_owned(i);
        }

        for p in &incoming {
            self.store.push_owned(p.x, p.y, p.x_star, p.y_star, p.vx, p.vy);
        }

        if departed > 0 || !incoming.is_empty() {
            tracing::debug!(
                "worker {} migrated out {} / in {} (now {})",
                self.comm.rank(),
                departed,
                incoming.len(),
                self.store.owned_len()
            );
        }
        Ok(())
    }

    /// Mirror owned particles within `h` of each shared boundary to the
    /// corresponding neighbor and append the neighbor's mirrors to the halo
    /// region, recording the pairing for the intra-iteration publishes.
    fn exchange_halo(&mut self) -> Result<(), CommError> {
        let h = self.params.smoothing_radius;
        let start_x = self.params.node_start_x;
        let end_x = self.params.node_end_x;

        for side in SIDES {
            let has_peer = self.peer(side).is_some();
            let sent = &mut self.halo_sent[side as usize];
            sent.clear();
            if !has_peer {
                continue;
            }
            for i in 0..self.store.owned_len() {
                let inside_band = match side {
                    Side::Left => self.store.x[i] < start_x + h,
                    Side::Right => self.store.x[i] > end_x - h,
                };
                if inside_band {
                    sent.push(i);
                }
            }
        }

        for side in SIDES {
            if let Some(peer) = self.peer(side) {
                let sent = &self.halo_sent[side as usize];
                self.comm.send(peer, Message::HaloCount(sent.len() as u32))?;
            }
        }
        for side in SIDES {
            if let Some(peer) = self.peer(side) {
                let sent = &self.halo_sent[side as usize];
                if !sent.is_empty() {
                    let payload: Vec<ParticlePayload> = sent
                        .iter()
                        .map(|&i| ParticlePayload::from_store(&self.store, i))
                        .collect();
                    self.comm.send(peer, Message::HaloParticles(payload))?;
                }
            }
        }

        for side in SIDES {
            if let Some(peer) = self.peer(side) {
                let count = self.recv_count(peer, Tag::HaloCount)?;
                let range_start = self.store.total_len();
                if count > 0 {
                    let payload = self.recv_particles(peer, Tag::HaloParticles)?;
                    debug_assert_eq!(payload.len(), count);
                    for p in &payload {
                        self.store.push_halo(p.x, p.y, p.x_star, p.y_star, p.vx, p.vy);
                    }
                }
                self.halo_recv[side as usize] = (range_start, count);
            } else {
                self.halo_recv[side as usize] = (self.store.total_len(), 0);
            }
        }
        Ok(())
    }

    /// Refresh halo constraint multipliers mid-iteration. Without this the
    /// mirrors diverge from their owners and the Jacobi update loses
    /// symmetry at slab interfaces.
    fn publish_halo_lambdas(&mut self) -> Result<(), CommError> {
        for side in SIDES {
            if let Some(peer) = self.peer(side) {
                let sent = &self.halo_sent[side as usize];
                if !sent.is_empty() {
                    let lambdas: Vec<f32> = sent.iter().map(|&i| self.store.lambda[i]).collect();
                    self.comm.send(peer, Message::HaloLambdas(lambdas))?;
                }
            }
        }
        for side in SIDES {
            let (range_start, count) = self.halo_recv[side as usize];
            if count == 0 {
                continue;
            }
            let peer = match self.peer(side) {
                Some(p) => p,
                None => continue,
            };
            match self.comm.recv(peer, Tag::HaloLambdas)? {
                Message::HaloLambdas(lambdas) => {
                    debug_assert_eq!(lambdas.len(), count);
                    for (offset, lambda) in lambdas.into_iter().enumerate() {
                        self.store.lambda[range_start + offset] = lambda;
                    }
                }
                _ => unreachable!("tag-checked receive returned mismatched payload"),
            }
        }
        Ok(())
    }

    /// Refresh halo predicted positions mid-iteration, paired like the
    /// lambda publish.
    fn publish_halo_positions(&mut self) -> Result<(), CommError> {
        for side in SIDES {
            if let Some(peer) = self.peer(side) {
                let sent = &self.halo_sent[side as usize];
                if !sent.is_empty() {
                    let positions: Vec<[f32; 2]> = sent
                        .iter()
                        .map(|&i| [self.store.x_star[i], self.store.y_star[i]])
                        .collect();
                    self.comm.send(peer, Message::HaloPositions(positions))?;
                }
            }
        }
        for side in SIDES {
            let (range_start, count) = self.halo_recv[side as usize];
            if count == 0 {
                continue;
            }
            let peer = match self.peer(side) {
                Some(p) => p,
                None => continue,
            };
            match self.comm.recv(peer, Tag::HaloPositions)? {
                Message::HaloPositions(positions) => {
                    debug_assert_eq!(positions.len(), count);
                    for (offset, [x_star, y_star]) in positions.into_iter().enumerate() {
                        self.store.x_star[range_start + offset] = x_star;
                        self.store.y_star[range_start + offset] = y_star;
                    }
                }
                _ => unreachable!("tag-checked receive returned mismatched payload"),
            }
        }
        Ok(())
    }

    /// Hash predicted positions over the slab plus halo band and rebuild the
    /// capped neighbor lists for the owned region.
    fn build_neighbor_lists(&mut self) {
        let h = self.params.smoothing_radius;
        if self.store.total_len() == 0 || h <= 0.0 {
            self.lists.reset(self.store.owned_len());
            return;
        }
        let grid_min = [self.params.node_start_x - h, self.boundary.min_y];
        let grid_max = [self.params.node_end_x + h, self.boundary.max_y];
        let mut grid = NeighborGrid::new(h, grid_min, grid_max);
        grid.update(&self.store.x_star, &self.store.y_star);
        self.lists
            .rebuild(&grid, &self.store.x_star, &self.store.y_star, self.store.owned_len(), h);
    }
}
