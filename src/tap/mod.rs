//! The tap engine: registration, matching and dispatch of invocation events.
//!
//! A runtime event flows through the engine like this:
//!
//! 1. The [`EventDispatcher`]'s hook receives the raw event
//! 2. Every active tap's [`TapTarget`] decides whether the event is its own
//! 3. The call-site is resolved once and the tap's [`Filter`]s run against it
//! 4. A [`Payload`] is built for the tap and handed to its handler

pub mod call_site;
pub mod dispatcher;
pub mod matcher;
pub mod options;
pub mod payload;
pub mod registry;

pub use call_site::CallSite;
pub use dispatcher::{in_dispatch, DispatchStats, DispatcherState, EventDispatcher};
pub use matcher::{Filter, FilterContext, InstanceSet, Instances, Predicate, TapTarget};
pub use options::TapOptions;
pub use payload::Payload;
pub use registry::{ActiveTaps, StopTarget, Tap, TapHandler, TapId, TapRegistry};
