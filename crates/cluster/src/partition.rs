//! Coordinator-owned 1-D partition layout of the simulation domain.
//!
//! Active slabs `[0, num_active)` tile `[0, domain_max_x)` in rank order and
//! adjacent slabs meet exactly. Inactive slabs are parked one unit past the
//! domain with zero width so no particle can ever fall inside them.

/// Minimum active slab width, in smoothing radii. A slab narrower than this
/// cannot be split and would let halo bands overlap.
pub const MIN_SLAB_RADII: f32 = 2.5;

/// 1-D slab decomposition over the worker set.
#[derive(Debug, Clone)]
pub struct PartitionLayout {
    starts: Vec<f32>,
    ends: Vec<f32>,
    num_active: usize,
}

impl PartitionLayout {
    /// Split `[0, domain_max_x)` evenly among `num_workers` slabs, all active.
    pub fn new(num_workers: usize, domain_max_x: f32) -> Self {
        assert!(num_workers >= 1, "layout needs at least one worker");
        let width = domain_max_x / num_workers as f32;
        let starts: Vec<f32> = (0..num_workers).map(|i| i as f32 * width).collect();
        let mut ends: Vec<f32> = (1..=num_workers).map(|i| i as f32 * width).collect();
        // Tile exactly: no float drift on the outer edge.
        ends[num_workers - 1] = domain_max_x;
        Self { starts, ends, num_active: num_workers }
    }

    /// Total number of worker slabs, active and parked.
    pub fn num_workers(&self) -> usize {
        self.starts.len()
    }

    /// Number of currently active slabs.
    pub fn num_active(&self) -> usize {
        self.num_active
    }

    /// Whether worker `w` (zero-based) is in the active set.
    pub fn is_active(&self, w: usize) -> bool {
        w < self.num_active
    }

    /// The `[start, end)` x-range of worker `w`'s slab.
    pub fn slab(&self, w: usize) -> (f32, f32) {
        (self.starts[w], self.ends[w])
    }

    /// Retire the rightmost active slab, absorbing it into its left
    /// neighbor. Returns `false` if only one slab is active.
    pub fn remove_partition(&mut self) -> bool {
        if self.num_active == 1 {
            return false;
        }

        let removed = self.num_active - 1;

        // The left neighbor takes over up to the old outer edge.
        self.ends[removed - 1] = self.ends[removed];

        // Park the retired slab out of simulation bounds with zero width.
        let position = self.ends[removed] + 1.0;
        self.starts[removed] = position;
        self.ends[removed] = position;

        self.num_active -= 1;
        true
    }

    /// Reactivate the next parked slab by splitting the rightmost active
    /// slab in half. Returns `false` when every slab is already active or
    /// the rightmost slab is too narrow to split.
    pub fn add_partition(&mut self, smoothing_radius: f32) -> bool {
        if self.num_active == self.num_workers() {
            return false;
        }

        let last = self.num_active - 1;
        let length = self.ends[last] - self.starts[last];
        if length < MIN_SLAB_RADII * smoothing_radius {
            return false;
        }

        self.ends[self.num_active] = self.ends[last];
        let split = self.starts[last] + length * 0.5;
        self.ends[last] = split;
        self.starts[self.num_active] = split;

        self.num_active += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_tiles(layout: &PartitionLayout, domain_max_x: f32) {
        assert_eq!(layout.slab(0).0, 0.0);
        for w in 1..layout.num_active() {
            assert_eq!(
                layout.slab(w - 1).1,
                layout.slab(w).0,
                "active slabs {w} and {} do not meet exactly",
                w - 1
            );
        }
        assert_eq!(layout.slab(layout.num_active() - 1).1, domain_max_x);
        for w in layout.num_active()..layout.num_workers() {
            let (start, end) = layout.slab(w);
            assert!(start > domain_max_x, "parked slab {w} overlaps the domain");
            assert_eq!(start, end, "parked slab {w} should have zero width");
        }
    }

    #[test]
    fn even_split_tiles_domain() {
        let layout = PartitionLayout::new(4, 10.0);
        assert_eq!(layout.num_active(), 4);
        assert_tiles(&layout, 10.0);
        assert_eq!(layout.slab(1), (2.5, 5.0));
    }

    #[test]
    fn remove_absorbs_into_left_neighbor() {
        let mut layout = PartitionLayout::new(4, 10.0);
        assert!(layout.remove_partition());
        assert_eq!(layout.num_active(), 3);
        assert_eq!(layout.slab(2), (5.0, 10.0));
        assert_tiles(&layout, 10.0);
    }

    #[test]
    fn last_active_partition_cannot_be_removed() {
        let mut layout = PartitionLayout::new(2, 10.0);
        assert!(layout.remove_partition());
        assert!(!layout.remove_partition());
        assert_eq!(layout.num_active(), 1);
    }

    #[test]
    fn add_splits_rightmost_slab() {
        let mut layout = PartitionLayout::new(4, 10.0);
        layout.remove_partition();
        assert!(layout.add_partition(0.1));
        assert_eq!(layout.num_active(), 4);
        assert_eq!(layout.slab(2), (5.0, 7.5));
        assert_eq!(layout.slab(3), (7.5, 10.0));
        assert_tiles(&layout, 10.0);
    }

    #[test]
    fn add_refuses_narrow_slab() {
        let mut layout = PartitionLayout::new(2, 1.0);
        layout.remove_partition();
        // Rightmost active slab is 1.0 wide; 2.5 * h = 2.5 > 1.0.
        assert!(!layout.add_partition(1.0));
        assert_eq!(layout.num_active(), 1);
    }

    #[test]
    fn add_refuses_when_all_active() {
        let mut layout = PartitionLayout::new(3, 10.0);
        assert!(!layout.add_partition(0.1));
    }

    #[test]
    fn retire_and_restore_round_trip() {
        let h = 0.2;
        let mut layout = PartitionLayout::new(4, 10.0);
        assert!(layout.remove_partition());
        assert!(layout.add_partition(h));
        assert_eq!(layout.num_active(), 4);
        assert_tiles(&layout, 10.0);
        for w in 0..layout.num_active() {
            let (start, end) = layout.slab(w);
            assert!(end - start >= MIN_SLAB_RADII * h, "slab {w} narrower than 2.5 h");
        }
    }
}
