// PixelPose
// copyright zipxing@hotmail.com 2022～2025

//! Sprite atlas addressing: maps a logical (row, col) cell of the N×N grid
//! to a pixel sub-region of one of four quadrant images.
//!
//! The grid is split into four equal quadrants, each backed by its own image
//! asset holding quadrant_size × quadrant_size frames tiled in pixel space:
//!
//! ```text
//!        col < half   col >= half
//!       ┌───────────┬───────────┐
//! row < │    q0     │    q1     │
//! half  │ top-left  │ top-right │
//!       ├───────────┼───────────┤
//! row >=│    q2     │    q3     │
//! half  │bottom-left│bottom-rght│
//!       └───────────┴───────────┘
//! ```
//!
//! The boundary belongs to the quadrant with the larger index: a coordinate
//! equal to half lands in q1/q2/q3, never q0.
//!
//! Computed sub-images are memoized per (row, col). Installing a new set of
//! quadrant images starts a new atlas generation and drops the whole cache,
//! there is no partial invalidation.

use crate::util::{PixelRect, PointF32};
use crate::{DESKTOP_GRID_SIZE, MAX_FRAME_DIM, MOBILE_GRID_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;

/// One of the four fixed image assets, each covering a quarter of the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quadrant {
    Q0,
    Q1,
    Q2,
    Q3,
}

impl Quadrant {
    /// Fixed loading order, q0 first.
    pub const ALL: [Quadrant; 4] = [Quadrant::Q0, Quadrant::Q1, Quadrant::Q2, Quadrant::Q3];

    pub fn index(self) -> usize {
        match self {
            Quadrant::Q0 => 0,
            Quadrant::Q1 => 1,
            Quadrant::Q2 => 2,
            Quadrant::Q3 => 3,
        }
    }

    /// Token used in the asset naming convention: "q0".."q3".
    pub fn url_token(self) -> &'static str {
        match self {
            Quadrant::Q0 => "q0",
            Quadrant::Q1 => "q1",
            Quadrant::Q2 => "q2",
            Quadrant::Q3 => "q3",
        }
    }
}

/// Square grid of addressable animation cells. grid_size is always even,
/// quadrant_size is half of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    pub grid_size: u16,
    pub quadrant_size: u16,
}

impl GridSpec {
    fn of(grid_size: u16) -> Self {
        debug_assert!(grid_size % 2 == 0, "grid size must be even");
        Self {
            grid_size,
            quadrant_size: grid_size / 2,
        }
    }

    pub fn desktop() -> Self {
        Self::of(DESKTOP_GRID_SIZE)
    }

    pub fn mobile() -> Self {
        Self::of(MOBILE_GRID_SIZE)
    }

    /// Largest valid continuous coordinate on either axis.
    pub fn max_index(&self) -> f32 {
        (self.grid_size - 1) as f32
    }

    pub fn center(&self) -> PointF32 {
        PointF32::new(
            self.grid_size as f32 / 2.0,
            self.grid_size as f32 / 2.0,
        )
    }
}

/// A decoded quadrant image.
pub struct QuadImage {
    pixels: image::RgbaImage,
}

impl QuadImage {
    pub fn new(pixels: image::RgbaImage) -> Self {
        Self { pixels }
    }

    /// Uniform-color image, handy for tests and placeholder fills.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::new(image::RgbaImage::from_pixel(width, height, image::Rgba(rgba)))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &image::RgbaImage {
        &self.pixels
    }

    /// Raw RGBA bytes, row-major.
    pub fn raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }
}

/// A single animation frame: a rectangular view into one quadrant image.
pub struct SubImage {
    pub quadrant: Quadrant,
    pub region: PixelRect,
    pub image: Rc<QuadImage>,
}

/// Infer the frame size from a quadrant image. Each quadrant tiles
/// quadrant_size × quadrant_size frames, so a frame axis is the image axis
/// divided by quadrant_size, rounded. If either axis exceeds the pixel cap
/// both are scaled down proportionally, preserving aspect.
pub fn infer_frame_size(quad_width: u32, quad_height: u32, quadrant_size: u16) -> (u32, u32) {
    let qs = quadrant_size as f64;
    let mut fw = (quad_width as f64 / qs).round();
    let mut fh = (quad_height as f64 / qs).round();
    let max = fw.max(fh);
    if max > MAX_FRAME_DIM as f64 {
        let scale = MAX_FRAME_DIM as f64 / max;
        fw = (fw * scale).round();
        fh = (fh * scale).round();
    }
    (fw as u32, fh as u32)
}

/// Pure mapping from grid coordinates to quadrant sub-regions, with a
/// lazily filled sub-image cache valid for one atlas generation.
pub struct SpriteAtlas {
    grid: GridSpec,
    images: [Option<Rc<QuadImage>>; 4],
    frame_width: u32,
    frame_height: u32,
    generation: u64,
    cache: HashMap<(u16, u16), Rc<SubImage>>,
}

impl SpriteAtlas {
    pub fn new(grid: GridSpec) -> Self {
        Self {
            grid,
            images: [None, None, None, None],
            frame_width: 0,
            frame_height: 0,
            generation: 0,
            cache: HashMap::new(),
        }
    }

    pub fn grid(&self) -> GridSpec {
        self.grid
    }

    /// Generation counter, bumped on every install.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }

    pub fn has_images(&self) -> bool {
        self.images.iter().all(|i| i.is_some())
    }

    /// Install a freshly loaded set of quadrant images. Starts a new
    /// generation: the sub-image cache is cleared wholesale.
    pub fn install(
        &mut self,
        grid: GridSpec,
        images: [Rc<QuadImage>; 4],
        frame_width: u32,
        frame_height: u32,
    ) {
        let [q0, q1, q2, q3] = images;
        self.grid = grid;
        self.images = [Some(q0), Some(q1), Some(q2), Some(q3)];
        self.frame_width = frame_width;
        self.frame_height = frame_height;
        self.generation += 1;
        self.cache.clear();
    }

    /// Decompose a cell into its quadrant and local coordinates.
    /// The boundary row/column (== quadrant_size) belongs to the quadrant
    /// with the larger index.
    pub fn locate(&self, row: u16, col: u16) -> (Quadrant, u16, u16) {
        let half = self.grid.quadrant_size;
        if row < half {
            if col < half {
                (Quadrant::Q0, row, col)
            } else {
                (Quadrant::Q1, row, col - half)
            }
        } else if col < half {
            (Quadrant::Q2, row - half, col)
        } else {
            (Quadrant::Q3, row - half, col - half)
        }
    }

    /// Look up the frame for a cell. Returns None when the cell is out of
    /// range or the backing quadrant image is absent. Repeated lookups
    /// within one generation return the same cached Rc.
    pub fn lookup(&mut self, row: u16, col: u16) -> Option<Rc<SubImage>> {
        if row >= self.grid.grid_size || col >= self.grid.grid_size {
            return None;
        }
        if let Some(sub) = self.cache.get(&(row, col)) {
            return Some(Rc::clone(sub));
        }
        let (quadrant, local_row, local_col) = self.locate(row, col);
        let image = self.images[quadrant.index()].as_ref()?;
        let region = PixelRect::new(
            local_col as u32 * self.frame_width,
            local_row as u32 * self.frame_height,
            self.frame_width,
            self.frame_height,
        );
        let sub = Rc::new(SubImage {
            quadrant,
            region,
            image: Rc::clone(image),
        });
        self.cache.insert((row, col), Rc::clone(&sub));
        Some(sub)
    }
}
