//! Coordinator: authoritative parameters, partition control, and the
//! per-frame scatter/gather loop.
//!
//! The coordinator is rank 0. Each displayed frame it applies pending
//! control events, scatters a per-worker [`Tunables`] snapshot (only
//! `node_start_x`, `node_end_x`, and `active` differ between workers),
//! gathers the packed coordinate frame from every worker, and hands the
//! result to the display sink. Scattering before gathering overlaps the
//! workers' early substeps with presentation of the previous frame.

use crate::comm::{CommError, Communicator, Message, Tag};
use crate::messages::Tunables;
use crate::params::{DisplayProjection, TunableParameters};
use crate::partition::PartitionLayout;

/// A parameter or partition mutation emitted by the controls source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlEvent {
    /// Move the parameter selector forward.
    SelectNext,
    /// Move the parameter selector backward.
    SelectPrev,
    /// Step the selected parameter up.
    Increase,
    /// Step the selected parameter down.
    Decrease,
    /// Grow the mover disk.
    GrowMover,
    /// Shrink the mover disk.
    ShrinkMover,
    /// Reset the mover disk radius.
    ResetMover,
    /// Recenter the mover from display coordinates.
    MoveMover {
        /// Display-space x.
        x: f32,
        /// Display-space y.
        y: f32,
        /// Display-space z.
        z: f32,
    },
    /// Reactivate a parked worker by splitting the rightmost slab.
    AddPartition,
    /// Retire the rightmost active worker.
    RemovePartition,
    /// Request a graceful shutdown.
    Kill,
}

/// Source of control events, drained once per frame.
pub trait ControlSource {
    /// Events to apply before the next scatter.
    fn drain(&mut self) -> Vec<ControlEvent>;
}

/// Control source that never emits anything (headless runs).
pub struct NullControls;

impl ControlSource for NullControls {
    fn drain(&mut self) -> Vec<ControlEvent> {
        Vec::new()
    }
}

/// Replays a pre-recorded script: entry `i` fires before frame `i`.
pub struct ScriptedControls {
    frames: std::collections::VecDeque<Vec<ControlEvent>>,
}

impl ScriptedControls {
    /// Build a script from per-frame event batches.
    pub fn new(frames: Vec<Vec<ControlEvent>>) -> Self {
        Self { frames: frames.into() }
    }
}

impl ControlSource for ScriptedControls {
    fn drain(&mut self) -> Vec<ControlEvent> {
        self.frames.pop_front().unwrap_or_default()
    }
}

/// One worker's contribution to a displayed frame.
#[derive(Debug, Clone)]
pub struct WorkerFrame {
    /// Zero-based worker index (rank minus one).
    pub worker: usize,
    /// Interleaved pixel-space (x, y) pairs.
    pub coords: Vec<i16>,
}

impl WorkerFrame {
    /// Number of particles in this frame slice.
    pub fn particle_count(&self) -> usize {
        self.coords.len() / 2
    }
}

/// Receives completed frames; the display side of the engine.
pub trait FrameSink {
    /// Present one gathered frame, one entry per worker.
    fn present(&mut self, frames: Vec<WorkerFrame>);
}

/// Sink that retains every frame; used by tests and headless tools.
#[derive(Default)]
pub struct CollectingSink {
    /// All presented frames in order.
    pub frames: Vec<Vec<WorkerFrame>>,
}

impl FrameSink for CollectingSink {
    fn present(&mut self, frames: Vec<WorkerFrame>) {
        self.frames.push(frames);
    }
}

/// Rank 0: owns tunables and the partition layout, drives the frame loop.
pub struct Coordinator<C: Communicator> {
    comm: C,
    params: TunableParameters,
    layout: PartitionLayout,
    projection: Box<dyn DisplayProjection>,
    kill_requested: bool,
}

impl<C: Communicator> Coordinator<C> {
    /// Create a coordinator over an endpoint whose world holds
    /// `layout.num_workers() + 1` ranks.
    pub fn new(
        comm: C,
        params: TunableParameters,
        layout: PartitionLayout,
        projection: Box<dyn DisplayProjection>,
    ) -> Self {
        assert_eq!(
            comm.world_size(),
            layout.num_workers() + 1,
            "world size must be one coordinator plus one rank per slab"
        );
        Self { comm, params, layout, projection, kill_requested: false }
    }

    /// Authoritative parameter state.
    pub fn params(&self) -> &TunableParameters {
        &self.params
    }

    /// Current partition layout.
    pub fn layout(&self) -> &PartitionLayout {
        &self.layout
    }

    /// Drive the frame loop, presenting at most `frames` frames.
    ///
    /// The final frame carries the `kill_sim` flag, so every worker finishes
    /// its in-flight substep, streams its last coordinates, and exits.
    /// Returns the number of frames presented.
    pub fn run(
        &mut self,
        controls: &mut dyn ControlSource,
        sink: &mut dyn FrameSink,
        frames: u64,
    ) -> Result<u64, CommError> {
        let mut presented: u64 = 0;
        loop {
            for event in controls.drain() {
                self.apply_event(event);
            }
            if presented + 1 >= frames {
                self.kill_requested = true;
            }
            let kill = self.kill_requested;

            self.scatter_tunables(kill)?;
            let frame = self.gather_frames()?;
            sink.present(frame);
            presented += 1;

            if kill {
                break;
            }
        }
        tracing::info!("coordinator shut down after {} frames", presented);
        Ok(presented)
    }

    fn apply_event(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::SelectNext => self.params.select_next(),
            ControlEvent::SelectPrev => self.params.select_prev(),
            ControlEvent::Increase => self.params.increase_selected(),
            ControlEvent::Decrease => self.params.decrease_selected(),
            ControlEvent::GrowMover => self.params.increase_mover_radius(),
            ControlEvent::ShrinkMover => self.params.decrease_mover_radius(),
            ControlEvent::ResetMover => self.params.reset_mover_radius(),
            ControlEvent::MoveMover { x, y, z } => {
                self.params.set_center_from_display(self.projection.as_ref(), x, y, z);
            }
            ControlEvent::AddPartition => {
                if !self.layout.add_partition(self.params.smoothing_radius) {
                    tracing::warn!("add_partition refused: no parked worker or slab too narrow");
                }
            }
            ControlEvent::RemovePartition => {
                if !self.layout.remove_partition() {
                    tracing::warn!("remove_partition refused: only one active worker");
                }
            }
            ControlEvent::Kill => self.kill_requested = true,
        }
    }

    /// Scatter per-worker parameter snapshots for the upcoming frame.
    fn scatter_tunables(&self, kill: bool) -> Result<(), CommError> {
        for w in 0..self.layout.num_workers() {
            let (start, end) = self.layout.slab(w);
            let snapshot =
                self.params.snapshot_for(start, end, self.layout.is_active(w), kill);
            self.comm.send(w + 1, Message::Tunables(snapshot))?;
        }
        Ok(())
    }

    /// Gather the coordinate frame from every worker, in rank order.
    fn gather_frames(&mut self) -> Result<Vec<WorkerFrame>, CommError> {
        let mut frame = Vec::with_capacity(self.layout.num_workers());
        for w in 0..self.layout.num_workers() {
            match self.comm.recv(w + 1, Tag::FrameCoords)? {
                Message::FrameCoords(coords) => frame.push(WorkerFrame { worker: w, coords }),
                _ => unreachable!("tag-checked receive returned mismatched payload"),
            }
        }
        Ok(frame)
    }
}

/// Build a worker's scattered snapshot from the authoritative state.
impl TunableParameters {
    /// Snapshot this state for one worker's slab and activity flag.
    pub fn snapshot_for(
        &self,
        node_start_x: f32,
        node_end_x: f32,
        active: bool,
        kill_sim: bool,
    ) -> Tunables {
        Tunables {
            g: self.g,
            smoothing_radius: self.smoothing_radius,
            k: self.k,
            dq: self.dq,
            rest_density: self.rest_density,
            viscosity_c: self.viscosity_c,
            time_step: self.time_step,
            mover_center_x: self.mover_center_x,
            mover_center_y: self.mover_center_y,
            mover_radius: self.mover_radius,
            node_start_x,
            node_end_x,
            steps_per_frame: self.steps_per_frame,
            active,
            kill_sim,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_controls_fire_per_frame() {
        let mut controls = ScriptedControls::new(vec![
            vec![ControlEvent::Increase],
            vec![],
            vec![ControlEvent::Kill, ControlEvent::Decrease],
        ]);
        assert_eq!(controls.drain(), vec![ControlEvent::Increase]);
        assert_eq!(controls.drain(), vec![]);
        assert_eq!(controls.drain(), vec![ControlEvent::Kill, ControlEvent::Decrease]);
        assert_eq!(controls.drain(), vec![]);
    }

    #[test]
    fn snapshot_carries_slab_and_flags() {
        let params = TunableParameters::new(9.0, 0.2, 1.0, 0.1, 0.06, 0.1, 1.0 / 60.0, 4);
        let t = params.snapshot_for(2.5, 5.0, true, false);
        assert_eq!(t.node_start_x, 2.5);
        assert_eq!(t.node_end_x, 5.0);
        assert!(t.active);
        assert!(!t.kill_sim);
        assert_eq!(t.steps_per_frame, 4);
        assert_eq!(t.g, 9.0);
    }
}
