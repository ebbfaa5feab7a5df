// PixelPose
// copyright zipxing@hotmail.com 2022～2025

//! PixelPose renders an animated character that reacts to pointer, touch or
//! device-tilt input by selecting the matching pre-rendered frame from a
//! quadrant-tiled sprite atlas and easing toward it.
//!
//! The grid of poses is split into four quadrant images (q0..q3), each
//! tiling quadrant_size × quadrant_size frames in pixel space. Input events
//! move a continuous target position; every animation frame the motion
//! driver pulls the current position toward it, quantizes to a cell and the
//! atlas resolves the cell to a pixel sub-region of the right quadrant.
//!
//! Everything runs on one cooperative thread driven at a fixed tick rate.
//! Asset fetches and render-context creation are the only suspension
//! points; both are modeled as poll-able state machines behind trait seams
//! (AssetFetcher, ContextSupplier), so the same core serves native file
//! loading and hosts that deliver bytes asynchronously.
//!
//! Expensive render-context startup is shared: a process-wide ResourcePool
//! creates one context lazily and serializes every instance's full init
//! sequence through a FIFO queue with a settling delay, so several widgets
//! on the same page never fight over the platform's scarce contexts.

/// framerate per second, set to moderate number to save CPUs
pub const POSE_FRAME: u32 = 60;

/// Grid side of the desktop asset variant.
pub const DESKTOP_GRID_SIZE: u16 = 30;

/// Grid side of the mobile asset variant.
pub const MOBILE_GRID_SIZE: u16 = 20;

/// Pixel cap of a single frame axis; larger frames scale down uniformly.
pub const MAX_FRAME_DIM: u32 = 1000;

/// quadrant atlas addressing and the memoized sub-image cache
pub mod atlas;

/// public configuration surface: asset root and smoothing coefficient
pub mod config;

/// error taxonomy for loading and context management
pub mod error;

/// input events converted to grid targets
pub mod event;

/// one widget instance binding motion, atlas and loader
pub mod instance;

/// sequential quadrant loading with variant fallback
pub mod loader;

/// log
pub mod log;

/// motion smoothing state machine
pub mod motion;

/// shared rendering-resource pool and init serialization
pub mod pool;

/// common helpers: points, pixel rects, path normalization
pub mod util;
