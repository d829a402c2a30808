//! Dynamic call tracing.
//!
//! Attach taps to a running program and receive a structured [`Payload`]
//! for every matching invocation: all constructions of a class, or all calls
//! received by specific instances. The traced code is never modified; the
//! engine subscribes to the host's invocation events through [`EventSource`]
//! and only while at least one tap is active.
//!
//! [`Runtime`](runtime::Runtime) is the host shipped with the crate: a small
//! dynamic object model whose method calls report their Rust call-site.

pub mod config;
pub mod error;
pub mod event;
pub mod output;
pub mod runtime;
pub mod tap;
pub mod tapping_device;

#[cfg(test)]
mod testing;

pub use error::{Result, TapError};
pub use event::{EventHook, EventKind, EventSource, HookId, TraceEvent};
pub use tap::{Payload, StopTarget, TapId, TapOptions};
pub use tapping_device::TappingDevice;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::{DispatcherConfig, HandlerErrorPolicy};
    pub use crate::error::{Result, TapError};
    pub use crate::event::{EventKind, EventSource};
    pub use crate::output::{handler_for, MemoryWriter, OutputFormat, StreamWriter, Writer};
    pub use crate::runtime::{ObjectRef, Runtime};
    pub use crate::tap::{Payload, TapId, TapOptions};
    pub use crate::tapping_device::TappingDevice;
}
