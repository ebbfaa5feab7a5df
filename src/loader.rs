// PixelPose
// copyright zipxing@hotmail.com 2022～2025

//! Asset loader: fetches the four quadrant images for a root path and grid
//! variant, with sequential per-quadrant loading, cross-validation and
//! mobile→desktop fallback.
//!
//! Loading is modeled as an explicit state machine pumped once per tick:
//!
//! ```text
//! Idle → Loading(mobile) → Success
//!                        ↘ fallback → Loading(desktop) → Success
//!                                                      ↘ Failed
//! ```
//!
//! Quadrants are fetched strictly in q0..q3 order, never in parallel, so a
//! failed variant leaves no partial state behind; the fallback restarts the
//! full set of four from the beginning with the desktop suffix and the
//! desktop grid. Fetching itself goes through the AssetFetcher seam:
//! completion is either immediate (file backend) or delivered later by the
//! host, observed on the next pump.

use crate::atlas::{infer_frame_size, GridSpec, QuadImage, Quadrant};
use crate::error::PoseError;
use crate::util::normalize_root;
use itertools::Itertools;
use log::{info, warn};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// File extension of the quadrant assets.
pub const ASSET_EXT: &str = "webp";

/// URL suffix selecting the mobile (20-grid) asset variant.
pub const MOBILE_SUFFIX: &str = "_20";

/// Result of polling a fetch: the backend either has the bytes, knows the
/// asset is unavailable, or is still waiting on I/O.
pub enum FetchStatus {
    Pending,
    Ready(Vec<u8>),
    Missing,
}

/// Seam to the asset storage collaborator. fetch() is called repeatedly for
/// the same URL until it stops answering Pending.
pub trait AssetFetcher {
    fn fetch(&mut self, url: &str) -> FetchStatus;
}

/// Reads assets straight from the filesystem. Completion is immediate.
#[derive(Default)]
pub struct FileFetcher;

impl AssetFetcher for FileFetcher {
    fn fetch(&mut self, url: &str) -> FetchStatus {
        match std::fs::read(url) {
            Ok(bytes) => FetchStatus::Ready(bytes),
            Err(_) => FetchStatus::Missing,
        }
    }
}

/// In-memory backend. Hosts that receive bytes asynchronously push them in
/// with deliver(); tests preload entries up front.
#[derive(Default)]
pub struct MemoryFetcher {
    entries: HashMap<String, Vec<u8>>,
    pending: HashSet<String>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: &str, bytes: Vec<u8>) {
        self.entries.insert(url.to_string(), bytes);
    }

    /// Mark a URL as in flight: fetch() answers Pending until deliver().
    pub fn mark_pending(&mut self, url: &str) {
        self.pending.insert(url.to_string());
    }

    /// Complete an in-flight fetch. None means the asset is unavailable.
    pub fn deliver(&mut self, url: &str, bytes: Option<Vec<u8>>) {
        self.pending.remove(url);
        match bytes {
            Some(b) => {
                self.entries.insert(url.to_string(), b);
            }
            None => {
                self.entries.remove(url);
            }
        }
    }
}

impl AssetFetcher for MemoryFetcher {
    fn fetch(&mut self, url: &str) -> FetchStatus {
        if self.pending.contains(url) {
            return FetchStatus::Pending;
        }
        match self.entries.get(url) {
            Some(bytes) => FetchStatus::Ready(bytes.clone()),
            None => FetchStatus::Missing,
        }
    }
}

/// Shared handle to a MemoryFetcher. The instance owns the fetcher box,
/// but the host still has to deliver bytes into it from outside when they
/// arrive; cloning this handle keeps both sides on the same store.
#[derive(Clone, Default)]
pub struct SharedMemoryFetcher(Rc<RefCell<MemoryFetcher>>);

impl SharedMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.0.borrow_mut().insert(url, bytes);
    }

    pub fn mark_pending(&self, url: &str) {
        self.0.borrow_mut().mark_pending(url);
    }

    pub fn deliver(&self, url: &str, bytes: Option<Vec<u8>>) {
        self.0.borrow_mut().deliver(url, bytes);
    }
}

impl AssetFetcher for SharedMemoryFetcher {
    fn fetch(&mut self, url: &str) -> FetchStatus {
        self.0.borrow_mut().fetch(url)
    }
}

/// Device-variant of the asset set. Each variant pins its own immutable
/// grid configuration; the fallback switches variants instead of mutating
/// grid fields mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Mobile,
    Desktop,
}

impl Variant {
    pub fn suffix(self) -> &'static str {
        match self {
            Variant::Mobile => MOBILE_SUFFIX,
            Variant::Desktop => "",
        }
    }

    pub fn grid(self) -> GridSpec {
        match self {
            Variant::Mobile => GridSpec::mobile(),
            Variant::Desktop => GridSpec::desktop(),
        }
    }
}

/// A complete, validated atlas generation ready to install.
pub struct AtlasSet {
    pub images: [Rc<QuadImage>; 4],
    pub frame_width: u32,
    pub frame_height: u32,
    pub grid: GridSpec,
}

enum LoadState {
    Idle,
    Loading {
        variant: Variant,
        next: usize,
        loaded: Vec<Rc<QuadImage>>,
    },
    Success(Option<AtlasSet>),
    Failed(PoseError),
}

pub struct AssetLoader {
    root: String,
    state: LoadState,
}

impl Default for AssetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetLoader {
    pub fn new() -> Self {
        Self {
            root: normalize_root("/"),
            state: LoadState::Idle,
        }
    }

    /// URL per the asset naming convention:
    /// `{root}q{0..3}{"_20" if mobile}.webp`.
    pub fn url(root: &str, quadrant: Quadrant, variant: Variant) -> String {
        format!(
            "{}{}{}.{}",
            root,
            quadrant.url_token(),
            variant.suffix(),
            ASSET_EXT
        )
    }

    /// Start (or restart) a load cycle. A load already in flight for an
    /// older root is superseded and its result discarded.
    pub fn begin(&mut self, root: &str, mobile: bool) {
        if self.is_loading() {
            info!("asset load superseded, restarting for {}", root);
        }
        self.root = normalize_root(root);
        let variant = if mobile {
            Variant::Mobile
        } else {
            Variant::Desktop
        };
        self.state = LoadState::Loading {
            variant,
            next: 0,
            loaded: Vec::with_capacity(4),
        };
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, LoadState::Loading { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, LoadState::Idle)
    }

    pub fn error(&self) -> Option<&PoseError> {
        match &self.state {
            LoadState::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Take the finished set, once. The loader returns to Idle.
    pub fn take_success(&mut self) -> Option<AtlasSet> {
        if let LoadState::Success(set) = &mut self.state {
            let set = set.take();
            self.state = LoadState::Idle;
            return set;
        }
        None
    }

    /// Advance as far as available data allows. Safe to call every tick.
    pub fn pump(&mut self, fetcher: &mut dyn AssetFetcher) {
        loop {
            let (variant, next) = match &self.state {
                LoadState::Loading { variant, next, .. } => (*variant, *next),
                _ => return,
            };
            let url = Self::url(&self.root, Quadrant::ALL[next], variant);
            match fetcher.fetch(&url) {
                FetchStatus::Pending => return,
                FetchStatus::Ready(bytes) => match image::load_from_memory(&bytes) {
                    Ok(img) => {
                        let quad = Rc::new(QuadImage::new(img.to_rgba8()));
                        if let LoadState::Loading { next, loaded, .. } = &mut self.state {
                            loaded.push(quad);
                            *next += 1;
                            if *next == 4 {
                                self.finish(variant);
                            }
                        }
                    }
                    Err(e) => {
                        warn!("asset decode failed for {}: {}", url, e);
                        self.miss(variant, url);
                    }
                },
                FetchStatus::Missing => self.miss(variant, url),
            }
        }
    }

    /// A quadrant 404'd or failed to decode. Any mobile failure forces a
    /// full desktop reload from q0; a desktop failure is terminal.
    fn miss(&mut self, variant: Variant, url: String) {
        match variant {
            Variant::Mobile => {
                info!("mobile variant missing ({}), falling back to desktop", url);
                self.state = LoadState::Loading {
                    variant: Variant::Desktop,
                    next: 0,
                    loaded: Vec::with_capacity(4),
                };
            }
            Variant::Desktop => {
                self.state = LoadState::Failed(PoseError::AssetMissing { url });
            }
        }
    }

    /// All four quadrants decoded: validate and assemble the atlas set.
    fn finish(&mut self, variant: Variant) {
        let loaded = match std::mem::replace(&mut self.state, LoadState::Idle) {
            LoadState::Loading { loaded, .. } => loaded,
            _ => unreachable!(),
        };
        debug_assert_eq!(loaded.len(), 4);

        // each asset must be non-empty; an empty one counts as missing
        if let Some(idx) = loaded
            .iter()
            .position(|q| q.width() == 0 || q.height() == 0)
        {
            let url = Self::url(&self.root, Quadrant::ALL[idx], variant);
            warn!("asset has zero pixel dimensions: {}", url);
            self.miss(variant, url);
            return;
        }

        // all four must share identical pixel dimensions, mismatch is fatal
        let expected = (loaded[0].width(), loaded[0].height());
        for (idx, quad) in loaded.iter().enumerate().skip(1) {
            let found = (quad.width(), quad.height());
            if found != expected {
                let url = Self::url(&self.root, Quadrant::ALL[idx], variant);
                self.state = LoadState::Failed(PoseError::AssetDimensionMismatch {
                    url,
                    expected,
                    found,
                });
                return;
            }
        }

        // byte-identical quadrant pairs are suspicious but some pipelines
        // legitimately coalesce identical assets: warn, don't fail
        for (a, b) in (0..4usize).tuple_combinations() {
            if loaded[a].raw() == loaded[b].raw() {
                warn!(
                    "quadrants {} and {} share identical pixel data",
                    Quadrant::ALL[a].url_token(),
                    Quadrant::ALL[b].url_token()
                );
            }
        }

        let grid = variant.grid();
        let (frame_width, frame_height) =
            infer_frame_size(expected.0, expected.1, grid.quadrant_size);
        info!(
            "atlas loaded: variant {:?}, quadrants {}x{}, frame {}x{}",
            variant, expected.0, expected.1, frame_width, frame_height
        );

        let images: [Rc<QuadImage>; 4] = match loaded.try_into() {
            Ok(arr) => arr,
            Err(_) => unreachable!("exactly four quadrants loaded"),
        };
        self.state = LoadState::Success(Some(AtlasSet {
            images,
            frame_width,
            frame_height,
            grid,
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(w: u32, h: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(w, h, image::Rgba(rgba));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn fill_desktop(fetcher: &mut MemoryFetcher, root: &str, w: u32, h: u32) {
        for (i, q) in Quadrant::ALL.iter().enumerate() {
            fetcher.insert(
                &AssetLoader::url(root, *q, Variant::Desktop),
                png_bytes(w, h, [i as u8 * 10, 0, 0, 255]),
            );
        }
    }

    fn fill_mobile(fetcher: &mut MemoryFetcher, root: &str, w: u32, h: u32) {
        for (i, q) in Quadrant::ALL.iter().enumerate() {
            fetcher.insert(
                &AssetLoader::url(root, *q, Variant::Mobile),
                png_bytes(w, h, [i as u8 * 10, 50, 0, 255]),
            );
        }
    }

    #[test]
    fn test_url_convention() {
        assert_eq!(
            AssetLoader::url("/char/", Quadrant::Q2, Variant::Mobile),
            "/char/q2_20.webp"
        );
        assert_eq!(
            AssetLoader::url("/char/", Quadrant::Q0, Variant::Desktop),
            "/char/q0.webp"
        );
    }

    #[test]
    fn test_desktop_load_success() {
        let mut fetcher = MemoryFetcher::new();
        fill_desktop(&mut fetcher, "a/", 150, 150);
        let mut loader = AssetLoader::new();
        loader.begin("a", false);
        loader.pump(&mut fetcher);
        let set = loader.take_success().expect("load should succeed");
        assert_eq!(set.grid, GridSpec::desktop());
        assert_eq!((set.frame_width, set.frame_height), (10, 10));
        assert!(loader.is_idle());
    }

    #[test]
    fn test_mobile_load_success() {
        let mut fetcher = MemoryFetcher::new();
        fill_mobile(&mut fetcher, "a/", 100, 100);
        let mut loader = AssetLoader::new();
        loader.begin("a", true);
        loader.pump(&mut fetcher);
        let set = loader.take_success().expect("load should succeed");
        assert_eq!(set.grid, GridSpec::mobile());
        assert_eq!((set.frame_width, set.frame_height), (10, 10));
    }

    #[test]
    fn test_mobile_fallback_to_desktop() {
        // mobile variant entirely absent, desktop present
        let mut fetcher = MemoryFetcher::new();
        fill_desktop(&mut fetcher, "a/", 150, 150);
        let mut loader = AssetLoader::new();
        loader.begin("a", true);
        loader.pump(&mut fetcher);
        let set = loader.take_success().expect("fallback should succeed");
        assert_eq!(set.grid.grid_size, 30);
    }

    #[test]
    fn test_partial_mobile_forces_full_desktop_reload() {
        // q0_20/q1_20 exist but q2_20 404s: the whole set reloads as desktop
        let mut fetcher = MemoryFetcher::new();
        fill_mobile(&mut fetcher, "a/", 100, 100);
        fetcher.deliver("a/q2_20.webp", None);
        fill_desktop(&mut fetcher, "a/", 150, 150);
        let mut loader = AssetLoader::new();
        loader.begin("a", true);
        loader.pump(&mut fetcher);
        let set = loader.take_success().expect("fallback should succeed");
        assert_eq!(set.grid.grid_size, 30);
    }

    #[test]
    fn test_both_variants_missing_fails() {
        let mut fetcher = MemoryFetcher::new();
        let mut loader = AssetLoader::new();
        loader.begin("a", true);
        loader.pump(&mut fetcher);
        match loader.error() {
            Some(PoseError::AssetMissing { url }) => assert_eq!(url, "a/q0.webp"),
            other => panic!("expected AssetMissing, got {:?}", other),
        }
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let mut fetcher = MemoryFetcher::new();
        fill_desktop(&mut fetcher, "a/", 150, 150);
        fetcher.insert(
            &AssetLoader::url("a/", Quadrant::Q3, Variant::Desktop),
            png_bytes(150, 148, [9, 9, 9, 255]),
        );
        let mut loader = AssetLoader::new();
        loader.begin("a", false);
        loader.pump(&mut fetcher);
        match loader.error() {
            Some(PoseError::AssetDimensionMismatch {
                expected, found, ..
            }) => {
                assert_eq!(*expected, (150, 150));
                assert_eq!(*found, (150, 148));
            }
            other => panic!("expected AssetDimensionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_undecodable_asset_counts_as_missing() {
        let mut fetcher = MemoryFetcher::new();
        for q in Quadrant::ALL {
            fetcher.insert(
                &AssetLoader::url("a/", q, Variant::Desktop),
                vec![0xde, 0xad, 0xbe, 0xef],
            );
        }
        let mut loader = AssetLoader::new();
        loader.begin("a", false);
        loader.pump(&mut fetcher);
        assert!(matches!(
            loader.error(),
            Some(PoseError::AssetMissing { .. })
        ));
    }

    #[test]
    fn test_duplicate_quadrants_warn_but_load() {
        let mut fetcher = MemoryFetcher::new();
        fill_desktop(&mut fetcher, "a/", 150, 150);
        let dup = png_bytes(150, 150, [7, 7, 7, 255]);
        fetcher.insert(&AssetLoader::url("a/", Quadrant::Q0, Variant::Desktop), dup.clone());
        fetcher.insert(&AssetLoader::url("a/", Quadrant::Q1, Variant::Desktop), dup);
        let mut loader = AssetLoader::new();
        loader.begin("a", false);
        loader.pump(&mut fetcher);
        assert!(loader.take_success().is_some());
    }

    #[test]
    fn test_pending_fetch_resumes_on_next_pump() {
        let mut fetcher = MemoryFetcher::new();
        fill_desktop(&mut fetcher, "a/", 150, 150);
        let q1 = AssetLoader::url("a/", Quadrant::Q1, Variant::Desktop);
        fetcher.mark_pending(&q1);
        let mut loader = AssetLoader::new();
        loader.begin("a", false);
        loader.pump(&mut fetcher);
        assert!(loader.is_loading());

        fetcher.deliver(&q1, Some(png_bytes(150, 150, [1, 0, 0, 255])));
        loader.pump(&mut fetcher);
        assert!(loader.take_success().is_some());
    }

    #[test]
    fn test_file_fetcher_reads_from_disk() {
        let dir = std::env::temp_dir().join("pixel_pose_loader_test");
        std::fs::create_dir_all(&dir).unwrap();
        let root = format!("{}/", dir.display());
        for q in Quadrant::ALL {
            std::fs::write(
                AssetLoader::url(&root, q, Variant::Desktop),
                png_bytes(150, 150, [3, 3, 3, 255]),
            )
            .unwrap();
        }

        let mut loader = AssetLoader::new();
        loader.begin(&root, false);
        loader.pump(&mut FileFetcher);
        let set = loader.take_success().expect("load from disk should succeed");
        assert_eq!((set.frame_width, set.frame_height), (10, 10));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_begin_supersedes_inflight_load() {
        let mut fetcher = MemoryFetcher::new();
        fill_desktop(&mut fetcher, "a/", 150, 150);
        fill_desktop(&mut fetcher, "b/", 300, 300);
        let q2 = AssetLoader::url("a/", Quadrant::Q2, Variant::Desktop);
        fetcher.mark_pending(&q2);

        let mut loader = AssetLoader::new();
        loader.begin("a", false);
        loader.pump(&mut fetcher);
        assert!(loader.is_loading());

        // root changes while in flight: old load is discarded wholesale
        loader.begin("b", false);
        loader.pump(&mut fetcher);
        let set = loader.take_success().expect("new load should succeed");
        assert_eq!((set.frame_width, set.frame_height), (20, 20));
    }
}
