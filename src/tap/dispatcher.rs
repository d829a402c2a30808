//! Event dispatcher
//!
//! The dispatcher owns the tap registry and holds at most one hook on its
//! [`EventSource`]. The hook goes in when the first tap is registered and
//! comes out again when the last tap is stopped, so a source with no taps
//! pays nothing beyond its own "is anything hooked" check. Several
//! dispatchers may share one source; each adds and removes only its own hook.
//!
//! Dispatch is synchronous and runs on the thread that produced the event.
//! For each event the dispatcher takes one registry snapshot, matches every
//! active tap against it and invokes the matching handlers in registration
//! order. No registry lock is held while a handler runs, so handlers are free
//! to register and stop taps. Events raised while the current thread is
//! already dispatching (for example by a handler calling traced code) are
//! dropped.

use super::call_site::{self, CallSite};
use super::matcher::{filters_allow, Filter, FilterContext, TapTarget};
use super::payload::Payload;
use super::registry::{ActiveTaps, StopTarget, TapHandler, TapId, TapRegistry};
use crate::config::{DispatcherConfig, HandlerErrorPolicy};
use crate::event::{EventSource, HookId, TraceEvent};
use crate::{Result, TapError};
use parking_lot::Mutex;
use serde::Serialize;
use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, trace};

thread_local! {
    static DISPATCH_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as dispatching until dropped
struct DispatchGuard {
    _private: (),
}

impl DispatchGuard {
    /// `None` when the thread is already inside a dispatch
    fn enter() -> Option<Self> {
        DISPATCH_DEPTH.with(|depth| {
            if depth.get() > 0 {
                None
            } else {
                depth.set(depth.get() + 1);
                Some(Self { _private: () })
            }
        })
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCH_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Whether a dispatch is running on the current thread
pub fn in_dispatch() -> bool {
    DISPATCH_DEPTH.with(|depth| depth.get() > 0)
}

/// Hook state of a dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatcherState {
    /// No hook installed; no taps
    Idle,
    /// Hook installed; at least one tap
    Armed,
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherState::Idle => write!(f, "idle"),
            DispatcherState::Armed => write!(f, "armed"),
        }
    }
}

/// Counters describing what a dispatcher has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Events received from the source
    pub events_seen: u64,
    /// Events dropped because they were raised during a dispatch
    pub events_dropped: u64,
    /// Handler invocations that succeeded
    pub payloads_delivered: u64,
    /// Handler invocations that returned an error or panicked
    pub handler_failures: u64,
}

#[derive(Default)]
struct Counters {
    events_seen: AtomicU64,
    events_dropped: AtomicU64,
    payloads_delivered: AtomicU64,
    handler_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            events_seen: self.events_seen.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            payloads_delivered: self.payloads_delivered.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
        }
    }
}

struct DispatcherInner {
    source: Arc<dyn EventSource>,
    registry: TapRegistry,
    config: DispatcherConfig,
    // Serializes registry mutation with hook install/removal.
    transition: Mutex<()>,
    hook: Mutex<Option<HookId>>,
    counters: Counters,
}

impl DispatcherInner {
    fn dispatch(&self, event: &TraceEvent) -> Result<()> {
        Counters::bump(&self.counters.events_seen);

        let Some(_guard) = DispatchGuard::enter() else {
            Counters::bump(&self.counters.events_dropped);
            trace!(method = %event.method_name, "dropping event raised during dispatch");
            return Ok(());
        };

        let mut site: Option<CallSite> = None;
        let mut first_failure: Option<TapError> = None;

        for tap in self.registry.active_taps() {
            if !tap.target().matches(event) {
                continue;
            }

            let site = *site.get_or_insert_with(|| call_site::resolve(&event.frames));
            let ctx = FilterContext {
                event,
                call_site: &site,
            };
            if !filters_allow(tap.filters(), &ctx) {
                continue;
            }

            let payload = Payload::build(tap.id(), event, &site);
            match tap.invoke(&payload) {
                Ok(()) => Counters::bump(&self.counters.payloads_delivered),
                Err(err) => {
                    Counters::bump(&self.counters.handler_failures);
                    error!(tap_id = %tap.id(), call_site = %site, "Tap handler failed: {}", err);
                    if first_failure.is_none() {
                        first_failure = Some(err);
                    }
                }
            }
        }

        match (self.config.handler_errors, first_failure) {
            (HandlerErrorPolicy::Propagate, Some(err)) => Err(err),
            _ => Ok(()),
        }
    }
}

/// Owns a tap registry and the hook it installs on an event source.
///
/// Dropping the dispatcher removes its hook.
///
/// # Examples
///
/// ```
/// use calltap::config::DispatcherConfig;
/// use calltap::runtime::Runtime;
/// use calltap::tap::{DispatcherState, EventDispatcher, TapTarget};
/// use std::sync::Arc;
///
/// let runtime = Arc::new(Runtime::new());
/// let student = runtime.define_class("Student", None).unwrap();
/// let dispatcher = EventDispatcher::new(runtime.clone(), DispatcherConfig::default());
///
/// let target = TapTarget::construction(&student).unwrap();
/// let handler = |_payload: &calltap::Payload| -> anyhow::Result<()> { Ok(()) };
/// let id = dispatcher.register(target, vec![], Arc::new(handler));
/// assert_eq!(dispatcher.state(), DispatcherState::Armed);
///
/// dispatcher.stop(&id.into());
/// assert_eq!(dispatcher.state(), DispatcherState::Idle);
/// ```
pub struct EventDispatcher {
    inner: Arc<DispatcherInner>,
}

impl EventDispatcher {
    pub fn new(source: Arc<dyn EventSource>, config: DispatcherConfig) -> Self {
        debug!(handler_errors = %config.handler_errors, "Creating event dispatcher");
        Self {
            inner: Arc::new(DispatcherInner {
                source,
                registry: TapRegistry::new(),
                config,
                transition: Mutex::new(()),
                hook: Mutex::new(None),
                counters: Counters::default(),
            }),
        }
    }

    /// Register a tap, installing the hook if this is the first one
    pub fn register(&self, target: TapTarget, filters: Vec<Filter>, handler: TapHandler) -> TapId {
        let _transition = self.inner.transition.lock();
        let description = target.to_string();
        let id = self.inner.registry.register(target, filters, handler);
        if !self.is_armed() {
            self.arm();
        }
        debug!(tap_id = %id, target = %description, "Registered tap");
        id
    }

    /// Remove the selected taps; removes the hook when none remain
    pub fn stop(&self, target: &StopTarget) -> usize {
        let _transition = self.inner.transition.lock();
        let removed = self.inner.registry.stop(target);
        if removed > 0 {
            debug!(removed, target = ?target, "Stopped taps");
        }
        self.disarm_if_empty();
        removed
    }

    /// Remove every tap and the hook
    pub fn stop_all(&self) -> usize {
        let _transition = self.inner.transition.lock();
        let removed = self.inner.registry.stop_all();
        debug!(removed, "Stopped all taps");
        self.disarm_if_empty();
        removed
    }

    /// Snapshot of the currently active taps
    pub fn active_taps(&self) -> ActiveTaps {
        self.inner.registry.active_taps()
    }

    pub fn registry(&self) -> &TapRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn state(&self) -> DispatcherState {
        if self.is_armed() {
            DispatcherState::Armed
        } else {
            DispatcherState::Idle
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.inner.counters.snapshot()
    }

    fn is_armed(&self) -> bool {
        self.inner.hook.lock().is_some()
    }

    fn arm(&self) {
        let weak: Weak<DispatcherInner> = Arc::downgrade(&self.inner);
        let id = self.inner.source.install(Arc::new(move |event: &TraceEvent| -> Result<()> {
            match weak.upgrade() {
                Some(inner) => inner.dispatch(event),
                None => Ok(()),
            }
        }));
        *self.inner.hook.lock() = Some(id);
        info!(hook = %id, "Event hook installed");
    }

    fn disarm_if_empty(&self) {
        if !self.inner.registry.is_empty() {
            return;
        }
        if let Some(id) = self.inner.hook.lock().take() {
            self.inner.source.uninstall(id);
            info!(hook = %id, "Event hook removed");
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        let _transition = self.inner.transition.lock();
        self.inner.registry.stop_all();
        self.disarm_if_empty();
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("state", &self.state())
            .field("taps", &self.inner.registry.len())
            .field("config", &self.inner.config)
            .finish()
    }
}
