// PixelPose
// copyright zipxing@hotmail.com 2022～2025

//! One widget instance: binds a motion driver, a sprite atlas and an asset
//! loader to a visual surface, driven through the resource pool.
//!
//! Instances are created as Rc<RefCell<..>> handles so the pool can keep
//! weak references in its queue and active set while the embedding layer
//! owns the instance. All access happens on the cooperative thread.
//!
//! Lifecycle: enqueue through the pool → init (context + asset load) →
//! Ready, ticking every frame. Changing the asset root restarts the load
//! cycle in place without a teardown; context loss pauses the instance and
//! a restore reloads it automatically. A failed instance keeps exposing its
//! last successfully displayed frame as a static fallback and never
//! disturbs siblings sharing the pool.

use crate::atlas::{GridSpec, SpriteAtlas, SubImage};
use crate::config::{clamp_smoothing, PoseConfig};
use crate::error::PoseError;
use crate::event::{target_for, InputEvent, WidgetBounds};
use crate::loader::{AssetFetcher, AssetLoader, AtlasSet};
use crate::motion::{CellIndex, MotionDriver};
use crate::pool::{ContextHandle, ResourcePool};
use crate::util::normalize_root;
use log::{info, warn};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Ready/loading/error surface exposed to the embedding UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PoseStatus {
    Loading,
    Ready,
    Degraded,
    Failed,
}

/// Progress of a queued init routine, polled by the pool's drain loop.
pub enum InitProgress {
    Pending,
    Ready,
    Failed(PoseError),
}

thread_local! {
    static NEXT_INSTANCE_ID: Cell<u64> = Cell::new(1);
}

fn next_instance_id() -> u64 {
    NEXT_INSTANCE_ID.with(|c| {
        let id = c.get();
        c.set(id + 1);
        id
    })
}

pub struct PoseInstance {
    id: u64,
    config: PoseConfig,
    mobile: bool,
    bounds: WidgetBounds,
    motion: MotionDriver,
    atlas: SpriteAtlas,
    loader: AssetLoader,
    fetcher: Box<dyn AssetFetcher>,
    ctx: Option<Rc<ContextHandle>>,
    status: PoseStatus,
    ticking: bool,
    listening: bool,
    torn_down: bool,
    current_cell: Option<CellIndex>,
    current_frame: Option<Rc<SubImage>>,
    last_good_frame: Option<Rc<SubImage>>,
    last_error: Option<PoseError>,
}

impl PoseInstance {
    pub fn new(
        config: PoseConfig,
        mobile: bool,
        fetcher: Box<dyn AssetFetcher>,
        bounds: WidgetBounds,
    ) -> Rc<RefCell<Self>> {
        let config = config.normalized();
        let grid = if mobile {
            GridSpec::mobile()
        } else {
            GridSpec::desktop()
        };
        let id = next_instance_id();
        info!(
            "instance {} created, root {}, grid {}",
            id, config.asset_root, grid.grid_size
        );
        Rc::new(RefCell::new(Self {
            id,
            motion: MotionDriver::new(grid, config.smoothing),
            atlas: SpriteAtlas::new(grid),
            loader: AssetLoader::new(),
            config,
            mobile,
            bounds,
            fetcher,
            ctx: None,
            status: PoseStatus::Loading,
            ticking: false,
            listening: false,
            torn_down: false,
            current_cell: None,
            current_frame: None,
            last_good_frame: None,
            last_error: None,
        }))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(&self) -> PoseStatus {
        self.status
    }

    pub fn grid(&self) -> GridSpec {
        self.atlas.grid()
    }

    /// Atlas generation currently installed, 0 before the first load.
    pub fn generation(&self) -> u64 {
        self.atlas.generation()
    }

    pub fn context(&self) -> Option<&Rc<ContextHandle>> {
        self.ctx.as_ref()
    }

    pub fn current_cell(&self) -> Option<CellIndex> {
        self.current_cell
    }

    /// Frame currently displayed.
    pub fn current_frame(&self) -> Option<&Rc<SubImage>> {
        self.current_frame.as_ref()
    }

    /// Last successfully displayed frame, the static fallback while
    /// degraded or failed.
    pub fn last_good_frame(&self) -> Option<&Rc<SubImage>> {
        self.last_good_frame.as_ref()
    }

    pub fn last_error(&self) -> Option<&PoseError> {
        self.last_error.as_ref()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Start the full startup sequence. Called by the pool's drain loop,
    /// strictly serialized against every other queued instance.
    pub(crate) fn begin_init(&mut self, ctx: Rc<ContextHandle>) {
        self.ctx = Some(ctx);
        self.status = PoseStatus::Loading;
        self.listening = true;
        self.loader.begin(&self.config.asset_root, self.mobile);
    }

    /// Advance the startup sequence one frame.
    pub(crate) fn drive_init(&mut self) -> InitProgress {
        if self.torn_down {
            return InitProgress::Failed(PoseError::InstanceGone);
        }
        match &self.ctx {
            Some(ctx) if ctx.is_valid() => {}
            _ => {
                let e = PoseError::ContextLost;
                self.fail_init(e.clone());
                return InitProgress::Failed(e);
            }
        }
        self.loader.pump(self.fetcher.as_mut());
        if let Some(set) = self.loader.take_success() {
            self.install_set(set);
            self.status = PoseStatus::Ready;
            self.ticking = true;
            InitProgress::Ready
        } else if let Some(e) = self.loader.error().cloned() {
            self.fail_init(e.clone());
            InitProgress::Failed(e)
        } else {
            InitProgress::Pending
        }
    }

    pub(crate) fn fail_init(&mut self, e: PoseError) {
        warn!("instance {} init failed: {}", self.id, e);
        self.last_error = Some(e);
        self.status = PoseStatus::Failed;
        self.ticking = false;
    }

    /// Install a validated atlas generation. A grid change (variant
    /// fallback) repositions the motion state to the new grid center.
    fn install_set(&mut self, set: AtlasSet) {
        if set.grid != self.atlas.grid() {
            self.motion.recenter(set.grid);
        }
        self.atlas
            .install(set.grid, set.images, set.frame_width, set.frame_height);
    }

    /// Route a directional input to the motion target. Events arriving
    /// after teardown, or while subscriptions are not yet attached, are
    /// dropped.
    pub fn handle_input(&mut self, event: &InputEvent) {
        if !self.listening {
            return;
        }
        if let Some(target) = target_for(event, self.bounds, self.atlas.grid()) {
            self.motion.set_target(target.x, target.y);
        }
    }

    /// Advance one animation frame: finish any in-place reload, move the
    /// smoothed position and look up the displayed frame.
    pub fn on_tick(&mut self) {
        if !self.ticking {
            return;
        }
        if self.loader.is_loading() {
            self.loader.pump(self.fetcher.as_mut());
            if let Some(set) = self.loader.take_success() {
                self.install_set(set);
                self.status = PoseStatus::Ready;
            } else if let Some(e) = self.loader.error().cloned() {
                if self.atlas.has_images() {
                    // previous generation keeps working, keep serving it
                    warn!(
                        "instance {} reload failed, keeping previous atlas: {}",
                        self.id, e
                    );
                    self.last_error = Some(e);
                    self.status = PoseStatus::Ready;
                } else {
                    self.fail_init(e);
                    return;
                }
            }
        }
        let cell = self.motion.tick();
        self.current_cell = Some(cell);
        if let Some(frame) = self.atlas.lookup(cell.row, cell.col) {
            self.last_good_frame = Some(Rc::clone(&frame));
            self.current_frame = Some(frame);
        }
    }

    /// Point the instance at a different asset root. Triggers a fresh load
    /// cycle in place; the current atlas generation keeps rendering until
    /// the new one installs.
    pub fn set_asset_root(&mut self, root: &str) {
        self.config.asset_root = normalize_root(root);
        if self.torn_down {
            return;
        }
        if self.ctx.is_some() {
            info!("instance {} switching asset root to {}", self.id, self.config.asset_root);
            self.status = PoseStatus::Loading;
            self.loader.begin(&self.config.asset_root, self.mobile);
        }
        // not yet initialized: the queued init picks up the new root
    }

    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.config.smoothing = clamp_smoothing(smoothing);
        self.motion.set_smoothing(smoothing);
    }

    pub fn set_bounds(&mut self, bounds: WidgetBounds) {
        self.bounds = bounds;
    }

    /// The platform lost the shared context: pause ticking and mark the
    /// instance degraded. The last good frame stays displayable.
    pub(crate) fn on_context_lost(&mut self) {
        warn!("instance {} paused, render context lost", self.id);
        self.ticking = false;
        self.status = PoseStatus::Degraded;
        self.ctx = None;
    }

    /// Queued for re-init after a context restore.
    pub(crate) fn prepare_reload(&mut self) {
        self.status = PoseStatus::Loading;
    }

    /// Synchronously detach from everything: input subscriptions, ticking
    /// and the pool's active set. The pool and its shared context live on.
    pub fn teardown(&mut self, pool: &mut ResourcePool) {
        info!("instance {} teardown", self.id);
        self.listening = false;
        self.ticking = false;
        self.torn_down = true;
        self.ctx = None;
        pool.unregister(self.id);
    }

    /// Status surface for the embedding layer.
    pub fn status_json(&self) -> String {
        #[derive(Serialize)]
        struct StatusView {
            status: PoseStatus,
            cell: Option<CellIndex>,
            generation: u64,
        }
        serde_json::to_string(&StatusView {
            status: self.status,
            cell: self.current_cell,
            generation: self.atlas.generation(),
        })
        .unwrap_or_else(|_| "{}".to_string())
    }
}
