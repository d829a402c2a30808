//! Tap registry
//!
//! Holds every active tap in registration order. Taps are shared as
//! `Arc<Tap>` so a dispatch can keep iterating its snapshot while handlers
//! register or stop taps; a stopped tap is flagged inactive before it leaves
//! the registry, and snapshot iteration skips inactive taps.

use super::matcher::{Filter, TapTarget};
use super::payload::Payload;
use crate::runtime::ObjectRef;
use crate::{Result, TapError};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Caller-supplied tap handler
pub type TapHandler = Arc<dyn Fn(&Payload) -> anyhow::Result<()> + Send + Sync>;

/// Unique identifier of a registered tap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TapId(Uuid);

impl TapId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for TapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered observation rule
pub struct Tap {
    id: TapId,
    target: TapTarget,
    filters: Vec<Filter>,
    handler: TapHandler,
    active: AtomicBool,
}

impl Tap {
    pub(crate) fn new(target: TapTarget, filters: Vec<Filter>, handler: TapHandler) -> Self {
        Self {
            id: TapId::new(),
            target,
            filters,
            handler,
            active: AtomicBool::new(true),
        }
    }

    pub fn id(&self) -> TapId {
        self.id
    }

    pub fn target(&self) -> &TapTarget {
        &self.target
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Run the handler, turning both returned errors and panics into `TapError::Handler`
    pub(crate) fn invoke(&self, payload: &Payload) -> Result<()> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(payload)));
        let message = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => format!("{:#}", err),
            Err(panic) => panic_message(panic.as_ref()),
        };
        Err(TapError::Handler {
            tap_id: self.id.to_string(),
            message,
        })
    }
}

impl fmt::Debug for Tap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tap")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("filters", &self.filters)
            .field("active", &self.is_active())
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {}", message)
    } else {
        "handler panicked".to_string()
    }
}

/// What to stop: a single tap, or every tap whose target involves an object
#[derive(Debug, Clone)]
pub enum StopTarget {
    Id(TapId),
    Object(ObjectRef),
}

impl StopTarget {
    fn selects(&self, tap: &Tap) -> bool {
        match self {
            StopTarget::Id(id) => tap.id == *id,
            StopTarget::Object(object) => tap.target.involves(object),
        }
    }
}

impl From<TapId> for StopTarget {
    fn from(id: TapId) -> Self {
        StopTarget::Id(id)
    }
}

impl From<&TapId> for StopTarget {
    fn from(id: &TapId) -> Self {
        StopTarget::Id(*id)
    }
}

impl From<ObjectRef> for StopTarget {
    fn from(object: ObjectRef) -> Self {
        StopTarget::Object(object)
    }
}

impl From<&ObjectRef> for StopTarget {
    fn from(object: &ObjectRef) -> Self {
        StopTarget::Object(object.clone())
    }
}

/// Active taps, in registration order
#[derive(Debug, Default)]
pub struct TapRegistry {
    taps: RwLock<Vec<Arc<Tap>>>,
}

impl TapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new active tap and return its id
    pub fn register(&self, target: TapTarget, filters: Vec<Filter>, handler: TapHandler) -> TapId {
        let tap = Arc::new(Tap::new(target, filters, handler));
        let id = tap.id();
        self.taps.write().push(tap);
        id
    }

    /// Remove every tap selected by `target`; returns how many were removed
    pub fn stop(&self, target: &StopTarget) -> usize {
        let mut taps = self.taps.write();
        let before = taps.len();
        taps.retain(|tap| {
            if target.selects(tap) {
                tap.deactivate();
                false
            } else {
                true
            }
        });
        before - taps.len()
    }

    /// Remove every tap; returns how many were removed
    pub fn stop_all(&self) -> usize {
        let removed: Vec<Arc<Tap>> = self.taps.write().drain(..).collect();
        for tap in &removed {
            tap.deactivate();
        }
        removed.len()
    }

    /// Snapshot of the registry taken now
    pub fn active_taps(&self) -> ActiveTaps {
        ActiveTaps {
            snapshot: self.taps.read().clone().into_iter(),
        }
    }

    pub fn len(&self) -> usize {
        self.taps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.read().is_empty()
    }

    pub fn contains(&self, id: TapId) -> bool {
        self.taps.read().iter().any(|tap| tap.id == id)
    }
}

/// Iterator over a registry snapshot.
///
/// Taps stopped after the snapshot was taken are skipped when reached.
pub struct ActiveTaps {
    snapshot: std::vec::IntoIter<Arc<Tap>>,
}

impl Iterator for ActiveTaps {
    type Item = Arc<Tap>;

    fn next(&mut self) -> Option<Self::Item> {
        self.snapshot.by_ref().find(|tap| tap.is_active())
    }
}
