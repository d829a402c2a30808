//! Shared fixtures for unit tests.

use crate::event::{EventSource, HookId, TraceEvent};
use crate::runtime::{ObjectRef, Runtime};
use crate::tap::{call_site, Payload, TapId};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

/// A runtime with `Student` and `School` classes defined
pub(crate) struct World {
    pub runtime: Arc<Runtime>,
    pub student: ObjectRef,
    pub school: ObjectRef,
}

impl World {
    #[track_caller]
    pub fn student(&self, name: &str, age: u32) -> ObjectRef {
        self.runtime
            .instantiate(&self.student, vec![json!(name), json!(age)])
            .unwrap()
    }

    #[track_caller]
    pub fn school(&self, name: &str) -> ObjectRef {
        self.runtime.instantiate(&self.school, vec![json!(name)]).unwrap()
    }

    #[track_caller]
    pub fn call(&self, receiver: &ObjectRef, method: &str, args: Vec<Value>) -> Value {
        self.runtime.call(receiver, method, args).unwrap()
    }
}

pub(crate) fn student_world() -> World {
    let runtime = Arc::new(Runtime::new());

    let student = runtime.define_class("Student", None).unwrap();
    runtime
        .define_method(&student, "initialize", &["name", "age"], |ctx| {
            ctx.ivar_set("name", ctx.arg("name"));
            ctx.ivar_set("age", ctx.arg("age"));
            Ok(Value::Null)
        })
        .unwrap();
    runtime
        .define_method(&student, "name", &[], |ctx| Ok(ctx.ivar_get("name")))
        .unwrap();
    runtime
        .define_method(&student, "age", &[], |ctx| Ok(ctx.ivar_get("age")))
        .unwrap();
    runtime
        .define_method(&student, "age=", &["age"], |ctx| {
            let age = ctx.arg("age");
            ctx.ivar_set("age", age.clone());
            Ok(age)
        })
        .unwrap();
    runtime
        .define_class_method(&student, "foo", &[], |_ctx| Ok(Value::Null))
        .unwrap();

    let school = runtime.define_class("School", None).unwrap();
    runtime
        .define_method(&school, "initialize", &["name"], |ctx| {
            ctx.ivar_set("name", ctx.arg("name"));
            Ok(Value::Null)
        })
        .unwrap();
    runtime
        .define_method(&school, "name", &[], |ctx| Ok(ctx.ivar_get("name")))
        .unwrap();

    World {
        runtime,
        student,
        school,
    }
}

/// Hook that records every raw event it receives
#[derive(Clone)]
pub(crate) struct EventLog {
    hook: HookId,
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl EventLog {
    pub fn install(runtime: &Runtime) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let hook = runtime.install(Arc::new(move |event: &TraceEvent| -> crate::Result<()> {
            sink.lock().push(event.clone());
            Ok(())
        }));
        Self { hook, events }
    }

    /// Uninstall the log's hook; recorded events are kept
    pub fn remove(&self, runtime: &Runtime) -> bool {
        runtime.uninstall(self.hook)
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }
}

/// Payload for the construction of a fresh `Student`, built outside any dispatcher
pub(crate) fn construction_payload(world: &World) -> Payload {
    let log = EventLog::install(&world.runtime);
    world.student("Stan", 18);
    log.remove(&world.runtime);

    let event = log.events().remove(0);
    let site = call_site::resolve(&event.frames);
    Payload::build(TapId::new(), &event, &site)
}
