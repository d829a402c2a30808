//! Host runtime: a small dynamic object model that reports its invocations.
//!
//! The runtime is the event source the tap engine sits on. It supports
//! classes with single inheritance, instance variables, instance and
//! class-level methods, method aliases and constructors. Every invocation
//! made through [`Runtime::call`] or [`Runtime::instantiate`] pushes a frame
//! carrying the Rust source location of the call, and, while a hook is
//! installed, emits a `CallStart` and a `CallReturn` [`TraceEvent`].
//!
//! With no hook installed the only cost per call is one atomic load.
//!
//! # Examples
//!
//! ```
//! use calltap::runtime::Runtime;
//! use serde_json::json;
//!
//! let runtime = Runtime::new();
//! let student = runtime.define_class("Student", None).unwrap();
//! runtime
//!     .define_method(&student, "initialize", &["name"], |ctx| {
//!         ctx.ivar_set("name", ctx.arg("name"));
//!         Ok(json!(null))
//!     })
//!     .unwrap();
//! runtime
//!     .define_method(&student, "name", &[], |ctx| Ok(ctx.ivar_get("name")))
//!     .unwrap();
//!
//! let stan = runtime.instantiate(&student, vec![json!("Stan")]).unwrap();
//! assert_eq!(runtime.call(&stan, "name", vec![]).unwrap(), json!("Stan"));
//! ```

mod frames;
pub mod object;

pub use object::{Method, MethodBody, ObjectId, ObjectKind, ObjectRef};

use crate::event::{EventHook, EventSource, Frame, FrameOrigin, HookId, TraceEvent};
use crate::{Result, TapError};
use parking_lot::RwLock;
use serde_json::Value;
use std::panic::Location;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Name of the instance constructor run by [`Runtime::instantiate`]
pub const CONSTRUCTOR: &str = "initialize";

/// The host object model and its invocation event stream
pub struct Runtime {
    hooks: RwLock<Vec<(HookId, EventHook)>>,
    hooked: AtomicBool,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            hooks: RwLock::new(Vec::new()),
            hooked: AtomicBool::new(false),
        }
    }

    /// Define a new class, optionally inheriting from `superclass`
    pub fn define_class(
        &self,
        name: impl Into<String>,
        superclass: Option<&ObjectRef>,
    ) -> Result<ObjectRef> {
        if let Some(parent) = superclass {
            ensure_class(parent)?;
        }
        let class = ObjectRef::new_class(name, superclass.cloned());
        debug!(class = %class.inspect(), "defined class");
        Ok(class)
    }

    /// Define an instance method on `class`
    ///
    /// # Arguments
    ///
    /// * `class` - The class that owns the method
    /// * `name` - Method name
    /// * `params` - Parameter names, bound positionally to call arguments
    /// * `body` - The method implementation
    pub fn define_method<F>(
        &self,
        class: &ObjectRef,
        name: &str,
        params: &[&str],
        body: F,
    ) -> Result<()>
    where
        F: Fn(&CallContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        ensure_class(class)?;
        class.insert_method(Method::new(name, to_params(params), Arc::new(body)));
        Ok(())
    }

    /// Define a class-level method on `class` (invoked with the class as receiver)
    pub fn define_class_method<F>(
        &self,
        class: &ObjectRef,
        name: &str,
        params: &[&str],
        body: F,
    ) -> Result<()>
    where
        F: Fn(&CallContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        ensure_class(class)?;
        class.insert_class_method(Method::new(name, to_params(params), Arc::new(body)));
        Ok(())
    }

    /// Make `new_name` another name for the instance method currently found as `old_name`
    pub fn alias_method(&self, class: &ObjectRef, new_name: &str, old_name: &str) -> Result<()> {
        ensure_class(class)?;
        let (_, method) = class.lookup_method(old_name).ok_or_else(|| TapError::NoMethod {
            receiver: class.inspect(),
            method: old_name.to_string(),
        })?;
        class.insert_method_as(new_name, method);
        Ok(())
    }

    /// Allocate an instance of `class` and run its constructor with `args`.
    ///
    /// Classes without an `initialize` anywhere on their chain get an implicit
    /// zero-argument constructor owned by the class itself.
    #[track_caller]
    pub fn instantiate(&self, class: &ObjectRef, args: Vec<Value>) -> Result<ObjectRef> {
        let site = Location::caller();
        ensure_class(class)?;

        let instance = ObjectRef::new_instance(class.clone());
        let _frame = frames::push(Frame::new(site, "new", FrameOrigin::Host));
        self.construct(class, &instance, args)?;
        Ok(instance)
    }

    /// Invoke `method` on `receiver`.
    ///
    /// Instances resolve through their class chain, class objects through
    /// class-level methods. When called through an alias the event carries
    /// the alias name.
    #[track_caller]
    pub fn call(&self, receiver: &ObjectRef, method: &str, args: Vec<Value>) -> Result<Value> {
        let site = Location::caller();
        let (owner, resolved) = receiver.resolve_method(method).ok_or_else(|| TapError::NoMethod {
            receiver: receiver.inspect(),
            method: method.to_string(),
        })?;
        self.invoke(site, FrameOrigin::Host, receiver, &owner, method, &resolved, args)
    }

    /// Whether any event hook is currently installed
    pub fn is_hooked(&self) -> bool {
        self.hooked.load(Ordering::Acquire)
    }

    /// Number of frames on the current thread's call stack
    pub fn stack_depth(&self) -> usize {
        frames::depth()
    }

    fn construct(&self, class: &ObjectRef, instance: &ObjectRef, args: Vec<Value>) -> Result<()> {
        let (owner, constructor) = class
            .lookup_method(CONSTRUCTOR)
            .unwrap_or_else(|| (class.clone(), implicit_constructor()));
        self.invoke(
            Location::caller(),
            FrameOrigin::Engine,
            instance,
            &owner,
            CONSTRUCTOR,
            &constructor,
            args,
        )?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn invoke(
        &self,
        site: &'static Location<'static>,
        origin: FrameOrigin,
        receiver: &ObjectRef,
        owner: &ObjectRef,
        method_name: &str,
        method: &Method,
        args: Vec<Value>,
    ) -> Result<Value> {
        if args.len() != method.arity() {
            return Err(TapError::Arity {
                method: method_name.to_string(),
                expected: method.arity(),
                given: args.len(),
            });
        }

        let arguments: Vec<(String, Value)> = method.params().iter().cloned().zip(args).collect();
        let _frame = frames::push(Frame::new(site, method_name, origin));

        if self.is_hooked() {
            self.emit(&TraceEvent::call_start(
                owner.clone(),
                receiver.clone(),
                method_name,
                arguments.clone(),
                frames::snapshot(),
            ))?;
        }

        let ctx = CallContext {
            runtime: self,
            receiver,
            arguments: &arguments,
        };
        let value = (method.body())(&ctx)?;

        if self.is_hooked() {
            self.emit(&TraceEvent::call_return(
                owner.clone(),
                receiver.clone(),
                method_name,
                arguments,
                value.clone(),
                frames::snapshot(),
            ))?;
        }

        Ok(value)
    }

    /// Deliver `event` to every hook; all hooks run and the first error wins
    fn emit(&self, event: &TraceEvent) -> Result<()> {
        // Clone out of the lock so hooks may install or uninstall.
        let hooks: Vec<EventHook> = self.hooks.read().iter().map(|(_, h)| h.clone()).collect();
        let mut first_error = None;
        for hook in hooks {
            match hook(event) {
                Err(err) if first_error.is_none() => first_error = Some(err),
                _ => {}
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for Runtime {
    fn install(&self, hook: EventHook) -> HookId {
        let id = HookId::next();
        let mut hooks = self.hooks.write();
        hooks.push((id, hook));
        self.hooked.store(true, Ordering::Release);
        debug!(hook = %id, hooks = hooks.len(), "event hook installed");
        id
    }

    fn uninstall(&self, id: HookId) -> bool {
        let mut hooks = self.hooks.write();
        let before = hooks.len();
        hooks.retain(|(installed, _)| *installed != id);
        self.hooked.store(!hooks.is_empty(), Ordering::Release);
        let removed = hooks.len() != before;
        if removed {
            debug!(hook = %id, hooks = hooks.len(), "event hook removed");
        }
        removed
    }

    fn is_installed(&self) -> bool {
        self.is_hooked()
    }
}

/// What a method body sees while it runs
pub struct CallContext<'a> {
    runtime: &'a Runtime,
    receiver: &'a ObjectRef,
    arguments: &'a [(String, Value)],
}

impl CallContext<'_> {
    pub fn runtime(&self) -> &Runtime {
        self.runtime
    }

    pub fn receiver(&self) -> &ObjectRef {
        self.receiver
    }

    /// Bound arguments in declaration order
    pub fn arguments(&self) -> &[(String, Value)] {
        self.arguments
    }

    /// Value bound to parameter `name`; `Null` if there is no such parameter
    pub fn arg(&self, name: &str) -> Value {
        self.arguments
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value.clone())
            .unwrap_or(Value::Null)
    }

    pub fn ivar_get(&self, name: &str) -> Value {
        self.receiver.ivar_get(name)
    }

    pub fn ivar_set(&self, name: impl Into<String>, value: Value) {
        self.receiver.ivar_set(name, value);
    }

    /// Invoke a method on another object from inside a method body
    #[track_caller]
    pub fn call(&self, receiver: &ObjectRef, method: &str, args: Vec<Value>) -> Result<Value> {
        self.runtime.call(receiver, method, args)
    }

    /// Invoke a method on the current receiver
    #[track_caller]
    pub fn call_self(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.runtime.call(self.receiver, method, args)
    }
}

fn ensure_class(object: &ObjectRef) -> Result<()> {
    if object.is_class() {
        Ok(())
    } else {
        Err(TapError::NotAClass(object.inspect()))
    }
}

fn to_params(params: &[&str]) -> Vec<String> {
    params.iter().map(|p| p.to_string()).collect()
}

fn implicit_constructor() -> Method {
    Method::new(CONSTRUCTOR, Vec::new(), Arc::new(|_ctx: &CallContext<'_>| Ok(Value::Null)))
}
