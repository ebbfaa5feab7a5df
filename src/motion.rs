// PixelPose
// copyright zipxing@hotmail.com 2022～2025

//! Motion smoothing: converts discrete directional input into a
//! continuously animated, clamped, quantized cell index.
//!
//! Each tick moves the current position toward the target with a simple
//! exponential filter, `current += (target - current) * smoothing`, per
//! axis. The target is only ever written by input handlers and the current
//! position only by tick(), both on the cooperative thread; the last writer
//! before a tick wins, no merging across input sources.

use crate::atlas::GridSpec;
use crate::config::clamp_smoothing;
use crate::util::PointF32;
use serde::Serialize;

/// Quantized grid cell, the unit consumed by the sprite atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CellIndex {
    pub col: u16,
    pub row: u16,
}

pub struct MotionDriver {
    current: PointF32,
    target: PointF32,
    smoothing: f32,
    grid: GridSpec,
}

impl MotionDriver {
    /// Start at the grid center with both current and target positions.
    pub fn new(grid: GridSpec, smoothing: f32) -> Self {
        let center = grid.center();
        Self {
            current: center,
            target: center,
            smoothing: clamp_smoothing(smoothing),
            grid,
        }
    }

    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.smoothing = clamp_smoothing(smoothing);
    }

    /// Last write wins; tolerates targets outside the grid, which converge
    /// onto the clamped boundary.
    pub fn set_target(&mut self, col: f32, row: f32) {
        self.target = PointF32::new(col, row);
    }

    /// Reposition to the center of a (possibly new) grid, e.g. after the
    /// loader fell back from the mobile to the desktop variant.
    pub fn recenter(&mut self, grid: GridSpec) {
        self.grid = grid;
        self.current = grid.center();
        self.target = grid.center();
    }

    pub fn current(&self) -> PointF32 {
        self.current
    }

    pub fn target(&self) -> PointF32 {
        self.target
    }

    /// Advance one animation frame and quantize to the nearest cell.
    pub fn tick(&mut self) -> CellIndex {
        let max = self.grid.max_index();
        self.current.x += (self.target.x - self.current.x) * self.smoothing;
        self.current.y += (self.target.y - self.current.y) * self.smoothing;
        self.current.x = self.current.x.clamp(0.0, max);
        self.current.y = self.current.y.clamp(0.0, max);
        CellIndex {
            col: self.current.x.round() as u16,
            row: self.current.y.round() as u16,
        }
    }
}
