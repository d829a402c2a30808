//! The public entry point for attaching taps.
//!
//! [`TappingDevice`] validates targets, compiles [`TapOptions`] and hands the
//! resulting taps to its [`EventDispatcher`]. Nothing is hooked on the event
//! source until the first tap is attached.
//!
//! # Examples
//!
//! ```
//! use calltap::prelude::*;
//! use serde_json::json;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let runtime = Arc::new(Runtime::new());
//! let student = runtime.define_class("Student", None).unwrap();
//! let device = TappingDevice::new(runtime.clone());
//!
//! let count = Arc::new(AtomicUsize::new(0));
//! let seen = count.clone();
//! device
//!     .tap_construction_of(
//!         &student,
//!         move |_payload| {
//!             seen.fetch_add(1, Ordering::SeqCst);
//!             Ok(())
//!         },
//!         TapOptions::new(),
//!     )
//!     .unwrap();
//!
//! runtime.instantiate(&student, vec![]).unwrap();
//! assert_eq!(count.load(Ordering::SeqCst), 1);
//! ```

use crate::config::DispatcherConfig;
use crate::event::EventSource;
use crate::runtime::ObjectRef;
use crate::tap::{
    ActiveTaps, DispatchStats, DispatcherState, EventDispatcher, Instances, Payload, StopTarget,
    TapId, TapOptions, TapTarget,
};
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// Attaches taps to an event source
#[derive(Debug)]
pub struct TappingDevice {
    dispatcher: EventDispatcher,
}

impl TappingDevice {
    /// Create a device with the default configuration
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self::with_config(source, DispatcherConfig::default())
    }

    pub fn with_config(source: Arc<dyn EventSource>, config: DispatcherConfig) -> Self {
        Self {
            dispatcher: EventDispatcher::new(source, config),
        }
    }

    /// Observe every construction of `class`
    ///
    /// The handler is invoked once per instance of exactly `class` created,
    /// before its constructor body runs. Subclass constructions and
    /// class-level methods are not observed.
    ///
    /// # Arguments
    ///
    /// * `class` - The class whose constructions to observe
    /// * `handler` - Called with the payload of each construction
    /// * `options` - Path and condition filters for this tap
    ///
    /// # Errors
    ///
    /// `TapError::InvalidTarget` when `class` is not a class object,
    /// `TapError::InvalidPattern` when a path pattern does not compile.
    pub fn tap_construction_of<F>(
        &self,
        class: &ObjectRef,
        handler: F,
        options: TapOptions,
    ) -> Result<TapId>
    where
        F: Fn(&Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let target = TapTarget::construction(class)?;
        let filters = options.into_filters()?;
        let id = self.dispatcher.register(target, filters, Arc::new(handler));
        info!(tap_id = %id, class = %class.class_name(), "Tapping construction");
        Ok(id)
    }

    /// Observe every call received by one instance or a set of instances
    ///
    /// The handler is invoked once per call, after the method returned, with
    /// the method name as called and the produced value.
    ///
    /// # Errors
    ///
    /// `TapError::InvalidTarget` when any target is not an instance or no
    /// target is given, `TapError::InvalidPattern` for a bad path pattern.
    pub fn tap_calls_on<F>(
        &self,
        instances: impl Into<Instances>,
        handler: F,
        options: TapOptions,
    ) -> Result<TapId>
    where
        F: Fn(&Payload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let target = TapTarget::calls(instances.into())?;
        let filters = options.into_filters()?;
        let description = target.to_string();
        let id = self.dispatcher.register(target, filters, Arc::new(handler));
        info!(tap_id = %id, target = %description, "Tapping calls");
        Ok(id)
    }

    /// Stop one tap by id, or every tap targeting an object; returns how many stopped
    pub fn stop(&self, target: impl Into<StopTarget>) -> usize {
        self.dispatcher.stop(&target.into())
    }

    /// Stop every tap
    pub fn stop_all(&self) -> usize {
        self.dispatcher.stop_all()
    }

    pub fn active_taps(&self) -> ActiveTaps {
        self.dispatcher.active_taps()
    }

    pub fn is_tapping(&self, id: TapId) -> bool {
        self.dispatcher.registry().contains(id)
    }

    pub fn state(&self) -> DispatcherState {
        self.dispatcher.state()
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }
}
