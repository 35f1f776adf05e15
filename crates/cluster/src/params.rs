//! Coordinator-side tunable parameter model and interactive controls.
//!
//! The coordinator owns the authoritative copy of every simulation-wide
//! parameter; workers only ever see scattered [`Tunables`](crate::messages::Tunables)
//! snapshots. Interactive controls drive a cyclic selector over the
//! adjustable fields; each field carries a `(min, max, step)` row so the
//! stepping logic is a single table-driven operation.

/// Fields reachable through the cyclic parameter selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedParam {
    /// Gravitational acceleration.
    Gravity,
    /// Smoothing radius.
    Smoothing,
    /// Rest density.
    Density,
    /// Anti-clustering strength.
    K,
    /// Anti-clustering reference distance.
    Dq,
    /// XSPH viscosity coefficient.
    Viscosity,
}

impl SelectedParam {
    const ORDER: [SelectedParam; 6] = [
        SelectedParam::Gravity,
        SelectedParam::Smoothing,
        SelectedParam::Density,
        SelectedParam::K,
        SelectedParam::Dq,
        SelectedParam::Viscosity,
    ];

    fn position(self) -> usize {
        Self::ORDER.iter().position(|&p| p == self).unwrap_or(0)
    }

    /// Next field in cyclic order.
    pub fn next(self) -> Self {
        Self::ORDER[(self.position() + 1) % Self::ORDER.len()]
    }

    /// Previous field in cyclic order.
    pub fn prev(self) -> Self {
        let n = Self::ORDER.len();
        Self::ORDER[(self.position() + n - 1) % n]
    }

    /// `(min, max, step)` for this field. The `dq` row scales with the
    /// current smoothing radius.
    fn bounds(self, smoothing_radius: f32) -> (f32, f32, f32) {
        match self {
            SelectedParam::Gravity => (-9.0, 9.0, 1.0),
            SelectedParam::Smoothing => (0.0, 5.0, 0.1),
            SelectedParam::Density => (-5.0, 5.0, 0.01),
            SelectedParam::K => (-5.0, 5.0, 0.05),
            SelectedParam::Dq => (0.0, smoothing_radius, 0.05 * smoothing_radius),
            SelectedParam::Viscosity => (-100.0, 100.0, 0.05),
        }
    }
}

/// Mover radius lower bound.
pub const MOVER_RADIUS_MIN: f32 = 1.0;
/// Mover radius upper bound.
pub const MOVER_RADIUS_MAX: f32 = 4.0;
/// Mover radius adjustment step.
pub const MOVER_RADIUS_STEP: f32 = 0.2;
/// Mover radius after a reset.
pub const MOVER_RADIUS_DEFAULT: f32 = 2.0;

/// Maps display-space coordinates to simulation coordinates.
///
/// The renderer supplies the projection; the core never sees display state
/// beyond this seam.
pub trait DisplayProjection {
    /// Convert a display-space point to simulation (x, y).
    fn display_to_sim(&self, x: f32, y: f32, z: f32) -> (f32, f32);
}

/// Projection that forwards display coordinates unchanged (headless runs).
pub struct IdentityProjection;

impl DisplayProjection for IdentityProjection {
    fn display_to_sim(&self, x: f32, y: f32, _z: f32) -> (f32, f32) {
        (x, y)
    }
}

/// Authoritative simulation-wide parameter state, coordinator only.
#[derive(Debug, Clone)]
pub struct TunableParameters {
    /// Gravitational acceleration, positive pointing down.
    pub g: f32,
    /// SPH smoothing radius.
    pub smoothing_radius: f32,
    /// Fluid rest density.
    pub rest_density: f32,
    /// Anti-clustering strength.
    pub k: f32,
    /// Anti-clustering reference distance.
    pub dq: f32,
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
    /// Solver substeps per displayed frame.
    pub steps_per_frame: u32,

    selected: SelectedParam,
}

impl TunableParameters {
    /// Build the parameter state with the selector on gravity.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        g: f32,
        smoothing_radius: f32,
        rest_density: f32,
        k: f32,
        dq: f32,
        viscosity_c: f32,
        time_step: f32,
        steps_per_frame: u32,
    ) -> Self {
        Self {
            g,
            smoothing_radius,
            rest_density,
            k,
            dq,
            viscosity_c,
            time_step,
            mover_center_x: 0.0,
            mover_center_y: 0.0,
            mover_radius: 0.0,
            steps_per_frame,
            selected: SelectedParam::Gravity,
        }
    }

    /// Currently selected field.
    pub fn selected(&self) -> SelectedParam {
        self.selected
    }

    /// Move the selector to the next field.
    pub fn select_next(&mut self) {
        self.selected = self.selected.next();
    }

    /// Move the selector to the previous field.
    pub fn select_prev(&mut self) {
        self.selected = self.selected.prev();
    }

    fn field_mut(&mut self, param: SelectedParam) -> &mut f32 {
        match param {
            SelectedParam::Gravity => &mut self.g,
            SelectedParam::Smoothing => &mut self.smoothing_radius,
            SelectedParam::Density => &mut self.rest_density,
            SelectedParam::K => &mut self.k,
            SelectedParam::Dq => &mut self.dq,
            SelectedParam::Viscosity => &mut self.viscosity_c,
        }
    }

    fn step_selected(&mut self, direction: f32) {
        let param = self.selected;
        let (min, max, step) = param.bounds(self.smoothing_radius);
        // Incrementing gravity pulls it toward the strong-downward end.
        let signed = if param == SelectedParam::Gravity { -direction * step } else { direction * step };
        let field = self.field_mut(param);
        *field = (*field + signed).clamp(min, max);
    }

    /// Step the selected field up by its table step.
    pub fn increase_selected(&mut self) {
        self.step_selected(1.0);
    }

    /// Step the selected field down by its table step.
    pub fn decrease_selected(&mut self) {
        self.step_selected(-1.0);
    }

    /// Grow the mover disk by one step, up to its maximum.
    pub fn increase_mover_radius(&mut self) {
        self.mover_radius = (self.mover_radius + MOVER_RADIUS_STEP).min(MOVER_RADIUS_MAX);
    }

    /// Shrink the mover disk by one step, down to its minimum. A disabled
    /// mover (radius below the minimum) is left untouched.
    pub fn decrease_mover_radius(&mut self) {
        if self.mover_radius > MOVER_RADIUS_MIN {
            self.mover_radius = (self.mover_radius - MOVER_RADIUS_STEP).max(MOVER_RADIUS_MIN);
        }
    }

    /// Reset the mover disk to its default radius.
    pub fn reset_mover_radius(&mut self) {
        self.mover_radius = MOVER_RADIUS_DEFAULT;
    }

    /// Place the mover center from display coordinates via the supplied
    /// projection.
    pub fn set_center_from_display(
        &mut self,
        projection: &dyn DisplayProjection,
        ogl_x: f32,
        ogl_y: f32,
        ogl_z: f32,
    ) {
        let (sim_x, sim_y) = projection.display_to_sim(ogl_x, ogl_y, ogl_z);
        self.mover_center_x = sim_x;
        self.mover_center_y = sim_y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TunableParameters {
        TunableParameters::new(9.0, 0.2, 1.0, 0.1, 0.06, 0.1, 1.0 / 60.0, 4)
    }

    #[test]
    fn selector_cycles_in_both_directions() {
        let mut p = params();
        assert_eq!(p.selected(), SelectedParam::Gravity);
        for _ in 0..SelectedParam::ORDER.len() {
            p.select_next();
        }
        assert_eq!(p.selected(), SelectedParam::Gravity);
        p.select_prev();
        assert_eq!(p.selected(), SelectedParam::Viscosity);
    }

    #[test]
    fn increasing_gravity_pulls_toward_negative_bound() {
        let mut p = params();
        for _ in 0..30 {
            p.increase_selected();
        }
        assert_eq!(p.g, -9.0);
        for _ in 0..30 {
            p.decrease_selected();
        }
        assert_eq!(p.g, 9.0);
    }

    #[test]
    fn density_steps_respect_bounds() {
        let mut p = params();
        p.select_next();
        p.select_next();
        assert_eq!(p.selected(), SelectedParam::Density);
        for _ in 0..2000 {
            p.increase_selected();
        }
        assert!((p.rest_density - 5.0).abs() < 1.0e-4);
    }

    #[test]
    fn dq_bounds_scale_with_smoothing_radius() {
        let mut p = params();
        p.selected = SelectedParam::Dq;
        for _ in 0..100 {
            p.increase_selected();
        }
        assert!((p.dq - p.smoothing_radius).abs() < 1.0e-5, "dq should cap at h, got {}", p.dq);
        for _ in 0..100 {
            p.decrease_selected();
        }
        assert!(p.dq.abs() < 1.0e-5);
    }

    #[test]
    fn mover_radius_steps_and_reset() {
        let mut p = params();
        p.reset_mover_radius();
        assert_eq!(p.mover_radius, MOVER_RADIUS_DEFAULT);
        for _ in 0..20 {
            p.increase_mover_radius();
        }
        assert_eq!(p.mover_radius, MOVER_RADIUS_MAX);
        for _ in 0..30 {
            p.decrease_mover_radius();
        }
        assert!((p.mover_radius - MOVER_RADIUS_MIN).abs() < 1.0e-5);
    }

    #[test]
    fn mover_center_maps_through_projection() {
        struct Shift;
        impl DisplayProjection for Shift {
            fn display_to_sim(&self, x: f32, y: f32, _z: f32) -> (f32, f32) {
                (x + 1.0, y * 2.0)
            }
        }
        let mut p = params();
        p.set_center_from_display(&Shift, 2.0, 3.0, 0.0);
        assert_eq!(p.mover_center_x, 3.0);
        assert_eq!(p.mover_center_y, 6.0);
    }
}
