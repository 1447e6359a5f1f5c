//! Collision-free placement of new nodes.
//!
//! Every function here is pure: the same existing positions (in the same
//! order) and the same anchor always produce the same result, and placement
//! never fails. A candidate is rejected when it lies closer than
//! `min_distance` to an existing node on both axes.

use std::f64::consts::FRAC_PI_4;

use crate::types::{LayoutConfig, Position};

/// Probes per spiral ring, one every 45 degrees
const DIRECTIONS: usize = 8;

#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    config: LayoutConfig,
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Position for one new node.
    ///
    /// With a parent the base sits `horizontal_spacing` to its right; without
    /// one the node goes below everything already placed, or at the origin on
    /// an empty canvas.
    pub fn place(&self, existing: &[Position], parent: Option<Position>) -> Position {
        let base = match parent {
            Some(parent) => Position::new(parent.x + self.config.horizontal_spacing, parent.y),
            None => match self.below_all(existing) {
                Some(base) => base,
                None => return self.snap(Position::ORIGIN),
            },
        };

        self.search(base, existing)
    }

    /// Positions for a batch, in a row below the canvas.
    ///
    /// Each placed position joins the occupancy set of the next, so batch
    /// members never overlap each other either.
    pub fn place_many(&self, existing: &[Position], count: usize) -> Vec<Position> {
        let origin = self.below_all(existing).unwrap_or(Position::ORIGIN);
        let mut occupied = existing.to_vec();
        let mut placed = Vec::with_capacity(count);

        for i in 0..count {
            let base = Position::new(origin.x + i as f64 * self.config.file_spacing, origin.y);
            let position = self.search(base, &occupied);
            occupied.push(position);
            placed.push(position);
        }

        placed
    }

    /// Position centered under `cluster`, below its lowest member
    pub fn place_below_cluster(&self, existing: &[Position], cluster: &[Position]) -> Position {
        if cluster.is_empty() {
            return self.place(existing, None);
        }

        let centroid_x = cluster.iter().map(|p| p.x).sum::<f64>() / cluster.len() as f64;
        let bottom = cluster.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        let base = Position::new(centroid_x, bottom + self.config.vertical_spacing);

        self.search(base, existing)
    }

    /// Base for an unattached node: leftmost column, one row below the lowest node
    fn below_all(&self, existing: &[Position]) -> Option<Position> {
        if existing.is_empty() {
            return None;
        }

        let left = existing.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let bottom = existing.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        Some(Position::new(left, bottom + self.config.vertical_spacing))
    }

    /// Snap `base`, then spiral outward until a free grid point is found.
    fn search(&self, base: Position, occupied: &[Position]) -> Position {
        let start = self.snap(base);
        if self.is_free(start, occupied) {
            return start;
        }

        // The base itself was the first probe
        for probe in 0..self.config.max_attempts.saturating_sub(1) {
            let ring = (probe / DIRECTIONS + 1) as f64;
            let angle = (probe % DIRECTIONS) as f64 * FRAC_PI_4;

            let candidate = self.snap(Position::new(
                base.x + angle.cos() * ring * self.config.horizontal_spacing,
                base.y + angle.sin() * ring * self.config.vertical_spacing,
            ));

            if self.is_free(candidate, occupied) {
                return candidate;
            }
        }

        self.fallback(base, occupied)
    }

    /// Out of probes: shift right by node count, then keep stepping right
    fn fallback(&self, base: Position, occupied: &[Position]) -> Position {
        // At least one grid cell, or snapping lands back on the same spot
        let step = self
            .config
            .horizontal_spacing
            .max(self.config.min_distance)
            .max(self.config.grid);
        let mut candidate = self.snap(Position::new(
            base.x + occupied.len() as f64 * self.config.horizontal_spacing,
            base.y,
        ));

        while !self.is_free(candidate, occupied) {
            candidate = self.snap(Position::new(candidate.x + step, candidate.y));
        }

        tracing::debug!(x = candidate.x, y = candidate.y, "layout probe budget exhausted");
        candidate
    }

    fn is_free(&self, candidate: Position, occupied: &[Position]) -> bool {
        let min = self.config.min_distance;
        !occupied
            .iter()
            .any(|p| (p.x - candidate.x).abs() < min && (p.y - candidate.y).abs() < min)
    }

    fn snap(&self, position: Position) -> Position {
        let grid = self.config.grid;
        if grid <= 0.0 {
            return position;
        }
        Position::new(
            (position.x / grid).round() * grid,
            (position.y / grid).round() * grid,
        )
    }
}
