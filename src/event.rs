// PixelPose
// copyright zipxing@hotmail.com 2022～2025

//! Input events from the embedding layer, converted to a grid target.
//!
//! Three kinds of directional input feed the motion driver: absolute
//! pointer position relative to the widget bounds, multi-touch midpoint,
//! and device-orientation angles. They are not reconciled against each
//! other; whichever arrives last before a tick wins.

use crate::atlas::GridSpec;
use crate::util::PointF32;
use serde::Serialize;

/// Tilt angle of the neutral pose: a phone held naturally sits at roughly
/// 45° front-back tilt, which must map to the grid center.
pub const NEUTRAL_BETA: f32 = 45.0;

/// Tilt span covered by the grid on either side of the neutral pose.
pub const TILT_SPAN: f32 = 45.0;

/// Widget surface size in the same units as pointer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WidgetBounds {
    pub width: f32,
    pub height: f32,
}

impl WidgetBounds {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Directional position updates from the embedding layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum InputEvent {
    /// Absolute pointer position relative to the widget's screen bounds.
    Pointer { x: f32, y: f32 },
    /// Simultaneous touch points. Fewer than two are ignored entirely so
    /// the page can scroll on single-finger drags.
    Touch { points: Vec<(f32, f32)> },
    /// Device-orientation angles in degrees: beta front-back, gamma
    /// left-right.
    Orientation { beta: f32, gamma: f32 },
}

/// Convert an input event to a continuous grid target, or None when the
/// event carries no usable direction.
pub fn target_for(event: &InputEvent, bounds: WidgetBounds, grid: GridSpec) -> Option<PointF32> {
    match event {
        InputEvent::Pointer { x, y } => position_target(*x, *y, bounds, grid),
        InputEvent::Touch { points } => {
            if points.len() < 2 {
                return None;
            }
            let n = points.len() as f32;
            let (sx, sy) = points
                .iter()
                .fold((0.0f32, 0.0f32), |(ax, ay), (x, y)| (ax + x, ay + y));
            position_target(sx / n, sy / n, bounds, grid)
        }
        InputEvent::Orientation { beta, gamma } => {
            let col = ((gamma / TILT_SPAN).clamp(-1.0, 1.0) * 0.5 + 0.5) * grid.max_index();
            let row =
                (((beta - NEUTRAL_BETA) / TILT_SPAN).clamp(-1.0, 1.0) * 0.5 + 0.5) * grid.max_index();
            Some(PointF32::new(col, row))
        }
    }
}

fn position_target(x: f32, y: f32, bounds: WidgetBounds, grid: GridSpec) -> Option<PointF32> {
    if bounds.width <= 0.0 || bounds.height <= 0.0 {
        return None;
    }
    let col = (x / bounds.width).clamp(0.0, 1.0) * grid.max_index();
    let row = (y / bounds.height).clamp(0.0, 1.0) * grid.max_index();
    Some(PointF32::new(col, row))
}

#[cfg(test)]
mod tests {
    use super::*;

    const B: WidgetBounds = WidgetBounds {
        width: 200.0,
        height: 100.0,
    };

    #[test]
    fn test_pointer_corners() {
        let g = GridSpec::desktop();
        let tl = target_for(&InputEvent::Pointer { x: 0.0, y: 0.0 }, B, g).unwrap();
        assert_eq!(tl, PointF32::new(0.0, 0.0));
        let br = target_for(&InputEvent::Pointer { x: 200.0, y: 100.0 }, B, g).unwrap();
        assert_eq!(br, PointF32::new(29.0, 29.0));
        // off-surface positions clamp to the edge
        let off = target_for(&InputEvent::Pointer { x: 400.0, y: -5.0 }, B, g).unwrap();
        assert_eq!(off, PointF32::new(29.0, 0.0));
    }

    #[test]
    fn test_single_touch_ignored() {
        let g = GridSpec::desktop();
        let ev = InputEvent::Touch {
            points: vec![(10.0, 10.0)],
        };
        assert!(target_for(&ev, B, g).is_none());
        let ev = InputEvent::Touch { points: vec![] };
        assert!(target_for(&ev, B, g).is_none());
    }

    #[test]
    fn test_touch_midpoint() {
        let g = GridSpec::desktop();
        let ev = InputEvent::Touch {
            points: vec![(0.0, 0.0), (200.0, 100.0)],
        };
        let t = target_for(&ev, B, g).unwrap();
        assert!((t.x - 14.5).abs() < 1e-4);
        assert!((t.y - 14.5).abs() < 1e-4);
    }

    #[test]
    fn test_orientation_neutral_is_center() {
        let g = GridSpec::desktop();
        let ev = InputEvent::Orientation {
            beta: NEUTRAL_BETA,
            gamma: 0.0,
        };
        let t = target_for(&ev, B, g).unwrap();
        assert!((t.x - 14.5).abs() < 1e-4);
        assert!((t.y - 14.5).abs() < 1e-4);
    }

    #[test]
    fn test_orientation_extremes_clamp() {
        let g = GridSpec::desktop();
        let ev = InputEvent::Orientation {
            beta: 180.0,
            gamma: -90.0,
        };
        let t = target_for(&ev, B, g).unwrap();
        assert_eq!(t, PointF32::new(0.0, 29.0));
    }

    #[test]
    fn test_zero_bounds_yield_nothing() {
        let g = GridSpec::desktop();
        let b = WidgetBounds::new(0.0, 0.0);
        assert!(target_for(&InputEvent::Pointer { x: 1.0, y: 1.0 }, b, g).is_none());
    }
}
