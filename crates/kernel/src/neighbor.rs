//! Uniform-grid spatial hash and capped per-particle neighbor lists.
//!
//! Uses sorted-index + cell-offset arrays rather than `HashMap` so the data
//! layout stays flat and cache-friendly. The grid is derived from predicted
//! positions each substep; it is not a persistent structure.

/// Maximum neighbors recorded per particle; excess candidates are dropped.
pub const MAX_NEIGHBORS: usize = 64;

/// Uniform-grid spatial hash for O(1) neighbor cell lookup.
///
/// The grid covers the slab plus its halo band. Cell size must equal the
/// smoothing radius `h` so that for any particle the 9 (3x3) adjacent cells
/// contain all potential neighbors within distance `h`.
pub struct NeighborGrid {
    cell_size: f32,
    grid_min: [f32; 2],
    grid_dims: [u32; 2],
    /// Cell index for each particle (parallel to particle arrays).
    cell_indices: Vec<u32>,
    /// Particle indices sorted by cell index.
    sorted_indices: Vec<u32>,
    /// Start offset in `sorted_indices` for each cell.
    cell_offsets: Vec<u32>,
    /// Number of particles in each cell.
    cell_counts: Vec<u32>,
}

impl NeighborGrid {
    /// Create a new grid covering `[grid_min, grid_max]` with `cell_size = h`.
    pub fn new(cell_size: f32, grid_min: [f32; 2], grid_max: [f32; 2]) -> Self {
        assert!(cell_size > 0.0, "cell_size must be positive");
        let dims = [
            ((grid_max[0] - grid_min[0]) / cell_size).ceil().max(1.0) as u32,
            ((grid_max[1] - grid_min[1]) / cell_size).ceil().max(1.0) as u32,
        ];
        let total_cells = (dims[0] as usize) * (dims[1] as usize);
        Self {
            cell_size,
            grid_min,
            grid_dims: dims,
            cell_indices: Vec::new(),
            sorted_indices: Vec::new(),
            cell_offsets: vec![0; total_cells],
            cell_counts: vec![0; total_cells],
        }
    }

    fn total_cells(&self) -> usize {
        (self.grid_dims[0] as usize) * (self.grid_dims[1] as usize)
    }

    /// Map a position to a cell (cx, cy), clamped to grid bounds.
    #[inline]
    fn pos_to_cell(&self, px: f32, py: f32) -> (u32, u32) {
        let cx = ((px - self.grid_min[0]) / self.cell_size)
            .floor()
            .max(0.0)
            .min((self.grid_dims[0] - 1) as f32) as u32;
        let cy = ((py - self.grid_min[1]) / self.cell_size)
            .floor()
            .max(0.0)
            .min((self.grid_dims[1] - 1) as f32) as u32;
        (cx, cy)
    }

    /// Flat cell index from (cx, cy).
    #[inline]
    fn cell_hash(&self, cx: u32, cy: u32) -> u32 {
        cx + cy * self.grid_dims[0]
    }

    /// Rebuild the grid from the given positions.
    ///
    /// The two slices must have the same length (one entry per particle).
    pub fn update(&mut self, x: &[f32], y: &[f32]) {
        let n = x.len();
        debug_assert_eq!(n, y.len());

        let total_cells = self.total_cells();

        // 1. Compute cell index for each particle.
        self.cell_indices.resize(n, 0);
        for i in 0..n {
            let (cx, cy) = self.pos_to_cell(x[i], y[i]);
            self.cell_indices[i] = self.cell_hash(cx, cy);
        }

        // 2. Count particles per cell.
        self.cell_counts.clear();
        self.cell_counts.resize(total_cells, 0);
        for &ci in &self.cell_indices {
            self.cell_counts[ci as usize] += 1;
        }

        // 3. Prefix-sum to get cell offsets.
        self.cell_offsets.clear();
        self.cell_offsets.resize(total_cells, 0);
        let mut running = 0u32;
        for c in 0..total_cells {
            self.cell_offsets[c] = running;
            running += self.cell_counts[c];
        }

        // 4. Scatter particle indices into sorted order.
        self.sorted_indices.resize(n, 0);
        let mut write_heads: Vec<u32> = self.cell_offsets.clone();
        for i in 0..n {
            let ci = self.cell_indices[i] as usize;
            let pos = write_heads[ci] as usize;
            self.sorted_indices[pos] = i as u32;
            write_heads[ci] += 1;
        }
    }

    /// Invoke `f` for every particle within `radius` of `particle_idx`,
    /// scanning the 9 (3x3) cells around the particle's own cell.
    ///
    /// The particle itself is skipped. Each candidate is visited exactly
    /// once because every particle lives in exactly one cell.
    pub fn for_each_neighbor<F>(&self, particle_idx: usize, x: &[f32], y: &[f32], radius: f32, mut f: F)
    where
        F: FnMut(usize),
    {
        let px = x[particle_idx];
        let py = y[particle_idx];
        let (cx, cy) = self.pos_to_cell(px, py);
        let radius_sq = radius * radius;

        for dy in -1i32..=1 {
            let ny = cy as i32 + dy;
            if ny < 0 || ny >= self.grid_dims[1] as i32 {
                continue;
            }
            for dx in -1i32..=1 {
                let nx = cx as i32 + dx;
                if nx < 0 || nx >= self.grid_dims[0] as i32 {
                    continue;
                }
                let cell = self.cell_hash(nx as u32, ny as u32) as usize;
                let start = self.cell_offsets[cell] as usize;
                let count = self.cell_counts[cell] as usize;

                for s in start..start + count {
                    let j = self.sorted_indices[s] as usize;
                    if j == particle_idx {
                        continue;
                    }
                    let ddx = px - x[j];
                    let ddy = py - y[j];
                    if ddx * ddx + ddy * ddy <= radius_sq {
                        f(j);
                    }
                }
            }
        }
    }
}

/// Per-particle neighbor lists for the owned region, rebuilt each substep
/// after halo exchange.
///
/// Indices refer to the combined owned + halo arena. Each list is capped at
/// [`MAX_NEIGHBORS`]; candidates past the cap are dropped.
pub struct NeighborLists {
    indices: Vec<u32>,
    counts: Vec<u32>,
}

impl NeighborLists {
    /// Create an empty set of lists.
    pub fn new() -> Self {
        Self { indices: Vec::new(), counts: Vec::new() }
    }

    /// Reset to `owned` empty lists. Used directly when the smoothing
    /// radius degenerates and no neighborhood is meaningful.
    pub fn reset(&mut self, owned: usize) {
        self.indices.clear();
        self.indices.resize(owned * MAX_NEIGHBORS, 0);
        self.counts.clear();
        self.counts.resize(owned, 0);
    }

    /// Rebuild lists for the first `owned` particles from the given grid and
    /// positions (owned followed by halo).
    pub fn rebuild(&mut self, grid: &NeighborGrid, x: &[f32], y: &[f32], owned: usize, h: f32) {
        self.reset(owned);

        for i in 0..owned {
            let base = i * MAX_NEIGHBORS;
            let mut count = 0usize;
            grid.for_each_neighbor(i, x, y, h, |j| {
                if count < MAX_NEIGHBORS {
                    self.indices[base + count] = j as u32;
                    count += 1;
                }
            });
            self.counts[i] = count as u32;
        }
    }

    /// Neighbor indices of owned particle `i`.
    pub fn neighbors(&self, i: usize) -> &[u32] {
        let base = i * MAX_NEIGHBORS;
        &self.indices[base..base + self.counts[i] as usize]
    }
}

impl Default for NeighborLists {
    fn default() -> Self {
        Self::new()
    }
}
