// PixelPose
// copyright zipxing@hotmail.com 2022～2025

//! Shared rendering-resource pool.
//!
//! The underlying rendering context is a scarce process-wide resource: the
//! host platform only permits a small number of concurrent contexts. The
//! pool creates one shared context lazily, reuses it while valid, and
//! serializes every instance's full startup sequence through a FIFO queue
//! with a fixed settling delay between entries, so heavyweight
//! initializations never overlap.
//!
//! The pool runs on the cooperative thread: pump() is called once per
//! animation frame and is the drain loop. Only the head entry is ever
//! driven; a second entry cannot start while the head is in flight, and a
//! failing head settles its ticket and never stalls the entries behind it.
//! The pool itself is never torn down, it stays warm for future instances
//! even when the active set drains empty.

use crate::error::PoseError;
use crate::instance::{InitProgress, PoseInstance};
use crate::POSE_FRAME;
use log::{info, warn};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

/// Frames to wait between successive queued initializations, letting the
/// shared context stabilize. Half a second at the fixed tick rate.
pub const SETTLE_FRAMES: u32 = POSE_FRAME / 2;

/// Opaque handle to the shared rendering context. Invalidated on context
/// loss; a fresh handle is created on the next acquisition.
pub struct ContextHandle {
    valid: Cell<bool>,
    label: String,
}

impl ContextHandle {
    pub fn new(label: &str) -> Self {
        Self {
            valid: Cell::new(true),
            label: label.to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid.get()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn invalidate(&self) {
        self.valid.set(false);
    }
}

/// Seam to the platform rendering subsystem that actually creates contexts.
pub trait ContextSupplier {
    fn create_context(&mut self) -> Result<Rc<ContextHandle>, PoseError>;
}

/// Supplier that always succeeds. Used by embeddings without a real
/// rendering backend and by tests.
#[derive(Default)]
pub struct HeadlessSupplier {
    created: u32,
}

impl HeadlessSupplier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of contexts created so far.
    pub fn created(&self) -> u32 {
        self.created
    }
}

impl ContextSupplier for HeadlessSupplier {
    fn create_context(&mut self) -> Result<Rc<ContextHandle>, PoseError> {
        self.created += 1;
        info!("headless context #{} created", self.created);
        Ok(Rc::new(ContextHandle::new(&format!(
            "headless-{}",
            self.created
        ))))
    }
}

/// Outcome slot of a queued initialization, polled by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum TicketState {
    Pending,
    Resolved,
    Rejected(PoseError),
}

/// Poll-able promise for one enqueued instance init.
#[derive(Clone)]
pub struct InitTicket(Rc<RefCell<TicketState>>);

impl InitTicket {
    fn new() -> Self {
        Self(Rc::new(RefCell::new(TicketState::Pending)))
    }

    pub fn state(&self) -> TicketState {
        self.0.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.0.borrow(), TicketState::Pending)
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.0.borrow(), TicketState::Resolved)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(*self.0.borrow(), TicketState::Rejected(_))
    }

    fn resolve(&self) {
        *self.0.borrow_mut() = TicketState::Resolved;
    }

    fn reject(&self, e: PoseError) {
        *self.0.borrow_mut() = TicketState::Rejected(e);
    }
}

struct QueueEntry {
    instance: Weak<RefCell<PoseInstance>>,
    ticket: InitTicket,
}

pub struct ResourcePool {
    supplier: Box<dyn ContextSupplier>,
    shared: Option<Rc<ContextHandle>>,
    queue: VecDeque<QueueEntry>,
    /// Head entry currently in flight. Guards against a second drain.
    draining: bool,
    /// Remaining settling frames before the next entry may start.
    settle: u32,
    active: HashMap<u64, Weak<RefCell<PoseInstance>>>,
}

impl ResourcePool {
    pub fn new(supplier: Box<dyn ContextSupplier>) -> Self {
        Self {
            supplier,
            shared: None,
            queue: VecDeque::new(),
            draining: false,
            settle: 0,
            active: HashMap::new(),
        }
    }

    /// Idempotent: returns the already-created handle while it is valid,
    /// creates one otherwise.
    pub fn acquire_shared_context(&mut self) -> Result<Rc<ContextHandle>, PoseError> {
        if let Some(ctx) = &self.shared {
            if ctx.is_valid() {
                return Ok(Rc::clone(ctx));
            }
        }
        let ctx = self.supplier.create_context()?;
        self.shared = Some(Rc::clone(&ctx));
        Ok(ctx)
    }

    pub fn has_shared_context(&self) -> bool {
        matches!(&self.shared, Some(c) if c.is_valid())
    }

    /// Register an instance's startup routine to run strictly after all
    /// previously enqueued instances have settled.
    pub fn enqueue_init(&mut self, instance: &Rc<RefCell<PoseInstance>>) -> InitTicket {
        let ticket = InitTicket::new();
        self.queue.push_back(QueueEntry {
            instance: Rc::downgrade(instance),
            ticket: ticket.clone(),
        });
        info!(
            "instance {} enqueued for init, queue depth {}",
            instance.borrow().id(),
            self.queue.len()
        );
        ticket
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Remove an instance from the active set on teardown. The shared
    /// context stays alive for future instances.
    pub fn unregister(&mut self, id: u64) {
        if self.active.remove(&id).is_some() {
            info!("instance {} unregistered, {} active", id, self.active.len());
        }
    }

    /// The drain loop, called once per animation frame.
    pub fn pump(&mut self) {
        if self.settle > 0 {
            self.settle -= 1;
            return;
        }
        if !self.draining {
            if self.queue.is_empty() {
                return;
            }
            let ctx = match self.acquire_shared_context() {
                Ok(ctx) => ctx,
                Err(e) => {
                    // fatal for every queued instance
                    warn!("context creation failed, rejecting {} queued inits", self.queue.len());
                    for entry in self.queue.drain(..) {
                        entry.ticket.reject(e.clone());
                        if let Some(inst) = entry.instance.upgrade() {
                            inst.borrow_mut().fail_init(e.clone());
                        }
                    }
                    return;
                }
            };
            let weak = self
                .queue
                .front()
                .map(|e| e.instance.clone())
                .expect("queue checked non-empty");
            match weak.upgrade() {
                Some(inst) if !inst.borrow().is_torn_down() => {
                    inst.borrow_mut().begin_init(ctx);
                    self.draining = true;
                }
                _ => {
                    // instance disappeared while queued
                    self.settle_head(|t| t.reject(PoseError::InstanceGone));
                    return;
                }
            }
        }

        // drive the head entry; everything behind it waits
        let weak = self
            .queue
            .front()
            .map(|e| e.instance.clone())
            .expect("draining head must be queued");
        let progress = match weak.upgrade() {
            Some(inst) => inst.borrow_mut().drive_init(),
            None => InitProgress::Failed(PoseError::InstanceGone),
        };
        match progress {
            InitProgress::Pending => {}
            InitProgress::Ready => {
                self.settle_head(|t| t.resolve());
                if let Some(inst) = weak.upgrade() {
                    let id = inst.borrow().id();
                    self.active.insert(id, weak);
                }
            }
            InitProgress::Failed(e) => {
                // settle and move on, a failing init never stalls the queue
                self.settle_head(|t| t.reject(e));
            }
        }
    }

    /// Pop the head entry, settle its ticket and arm the settling delay.
    fn settle_head(&mut self, settle: impl FnOnce(&InitTicket)) {
        let entry = self.queue.pop_front().expect("head entry present");
        settle(&entry.ticket);
        self.draining = false;
        self.settle = SETTLE_FRAMES;
    }

    /// Platform signaled loss of the shared context: invalidate the handle
    /// and pause every active instance.
    pub fn notify_context_lost(&mut self) {
        warn!("shared render context lost");
        if let Some(ctx) = self.shared.take() {
            ctx.invalidate();
        }
        for weak in self.active.values() {
            if let Some(inst) = weak.upgrade() {
                inst.borrow_mut().on_context_lost();
            }
        }
    }

    /// Context is available again: every active instance reloads its
    /// current asset set through the queue, serialized like any other init.
    pub fn notify_context_restored(&mut self) {
        info!("shared render context restored, reloading active instances");
        let survivors: Vec<Rc<RefCell<PoseInstance>>> = self
            .active
            .values()
            .filter_map(|w| w.upgrade())
            .collect();
        self.active.retain(|_, w| w.upgrade().is_some());
        for inst in survivors {
            inst.borrow_mut().prepare_reload();
            // outcome is tracked on the instance status, ticket dropped
            let _ = self.enqueue_init(&inst);
        }
    }
}
