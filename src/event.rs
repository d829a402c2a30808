//! Raw invocation events and the source that emits them.
//!
//! A host runtime reports every method invocation as a pair of [`TraceEvent`]s:
//! a `CallStart` before the method body runs and a `CallReturn` after it
//! produced a value. Events are ephemeral; they are handed to the installed
//! [`EventHook`] synchronously, on the thread that performed the call, and are
//! not retained afterwards.
//!
//! # Examples
//!
//! ```
//! use calltap::event::{EventHook, EventSource, HookId, TraceEvent};
//! use parking_lot::RwLock;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct RecordingSource {
//!     hooks: RwLock<Vec<(HookId, EventHook)>>,
//! }
//!
//! impl EventSource for RecordingSource {
//!     fn install(&self, hook: EventHook) -> HookId {
//!         let id = HookId::next();
//!         self.hooks.write().push((id, hook));
//!         id
//!     }
//!
//!     fn uninstall(&self, id: HookId) -> bool {
//!         let mut hooks = self.hooks.write();
//!         let before = hooks.len();
//!         hooks.retain(|(installed, _)| *installed != id);
//!         hooks.len() != before
//!     }
//!
//!     fn is_installed(&self) -> bool {
//!         !self.hooks.read().is_empty()
//!     }
//! }
//! ```

use crate::runtime::ObjectRef;
use crate::Result;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::panic::Location;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback installed on an [`EventSource`]; receives every invocation event.
pub type EventHook = Arc<dyn Fn(&TraceEvent) -> Result<()> + Send + Sync>;

/// Identifies one hook installed on an [`EventSource`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct HookId(u64);

impl HookId {
    /// A process-unique id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hook-{}", self.0)
    }
}

/// The "invocation observed" notification stream of a host runtime.
///
/// A source may carry several hooks at once. Each event is delivered to every
/// installed hook in installation order, and removing one hook leaves the
/// others in place.
pub trait EventSource: Send + Sync {
    /// Start delivering events to `hook`
    fn install(&self, hook: EventHook) -> HookId;

    /// Stop delivering events to the hook installed as `id`; false if it was not installed
    fn uninstall(&self, id: HookId) -> bool;

    /// Whether any hook is currently installed
    fn is_installed(&self) -> bool;
}

/// Which side of an invocation an event describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CallStart,
    CallReturn,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::CallStart => write!(f, "call"),
            EventKind::CallReturn => write!(f, "return"),
        }
    }
}

/// Who pushed a frame onto the call stack.
///
/// `Engine` frames come from the runtime's own internal re-dispatch (for
/// example the constructor call behind `instantiate`) and never count as a
/// call-site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameOrigin {
    Host,
    Engine,
}

/// One entry of the call stack: where a method was invoked from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    /// Source file of the invoking line
    pub path: &'static str,
    /// Line number of the invoking line
    pub line: u32,
    /// Name of the method that was invoked from this line
    pub method: String,
    /// Whether the frame belongs to user code or to the runtime internals
    pub origin: FrameOrigin,
}

impl Frame {
    pub fn new(
        location: &'static Location<'static>,
        method: impl Into<String>,
        origin: FrameOrigin,
    ) -> Self {
        Self {
            path: location.file(),
            line: location.line(),
            method: method.into(),
            origin,
        }
    }

    pub fn is_engine(&self) -> bool {
        self.origin == FrameOrigin::Engine
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} in `{}`", self.path, self.line, self.method)
    }
}

/// A single invocation notification emitted by the host runtime.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub kind: EventKind,
    /// Class that owns the executing method
    pub defined_class: ObjectRef,
    /// Object the method was invoked on
    pub receiver: ObjectRef,
    /// Name used at the call-site (alias name when called through an alias)
    pub method_name: String,
    /// Bound arguments in declaration order
    pub arguments: Vec<(String, Value)>,
    /// Value produced by the method; only set on `CallReturn`
    pub return_value: Option<Value>,
    /// Call stack snapshot, innermost frame first
    pub frames: Vec<Frame>,
}

impl TraceEvent {
    /// Build a `CallStart` event
    pub fn call_start(
        defined_class: ObjectRef,
        receiver: ObjectRef,
        method_name: impl Into<String>,
        arguments: Vec<(String, Value)>,
        frames: Vec<Frame>,
    ) -> Self {
        Self {
            kind: EventKind::CallStart,
            defined_class,
            receiver,
            method_name: method_name.into(),
            arguments,
            return_value: None,
            frames,
        }
    }

    /// Build a `CallReturn` event carrying the produced value
    pub fn call_return(
        defined_class: ObjectRef,
        receiver: ObjectRef,
        method_name: impl Into<String>,
        arguments: Vec<(String, Value)>,
        return_value: Value,
        frames: Vec<Frame>,
    ) -> Self {
        Self {
            kind: EventKind::CallReturn,
            defined_class,
            receiver,
            method_name: method_name.into(),
            arguments,
            return_value: Some(return_value),
            frames,
        }
    }

    pub fn is_call_start(&self) -> bool {
        self.kind == EventKind::CallStart
    }

    pub fn is_call_return(&self) -> bool {
        self.kind == EventKind::CallReturn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use serde_json::json;

    #[test]
    fn test_frame_from_location() {
        let frame = Frame::new(Location::caller(), "name", FrameOrigin::Host);
        assert_eq!(frame.path, file!());
        assert!(frame.line > 0);
        assert!(!frame.is_engine());
    }

    #[test]
    fn test_frame_display() {
        let frame = Frame {
            path: "src/app.rs",
            line: 12,
            method: "age".to_string(),
            origin: FrameOrigin::Host,
        };
        assert_eq!(frame.to_string(), "src/app.rs:12 in `age`");
    }

    #[test]
    fn test_call_start_has_no_return_value() {
        let runtime = Runtime::new();
        let class = runtime.define_class("Student", None).unwrap();
        let instance = runtime.instantiate(&class, vec![]).unwrap();

        let event = TraceEvent::call_start(class, instance, "initialize", vec![], vec![]);
        assert!(event.is_call_start());
        assert!(event.return_value.is_none());
    }

    #[test]
    fn test_call_return_carries_value() {
        let runtime = Runtime::new();
        let class = runtime.define_class("Student", None).unwrap();
        let instance = runtime.instantiate(&class, vec![]).unwrap();

        let event = TraceEvent::call_return(class, instance, "age", vec![], json!(18), vec![]);
        assert!(event.is_call_return());
        assert_eq!(event.return_value, Some(json!(18)));
    }

    #[test]
    fn test_hook_ids_are_unique() {
        let first = HookId::next();
        let second = HookId::next();
        assert_ne!(first, second);
        assert!(first.to_string().starts_with("hook-"));
    }

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EventKind::CallStart.to_string(), "call");
        assert_eq!(EventKind::CallReturn.to_string(), "return");
    }
}
