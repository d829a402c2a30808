//! Tapping a small student registry.
//!
//! Builds `Student` and `School` classes on the bundled runtime, then:
//! - counts Student constructions (School constructions are ignored)
//! - prints every call received by one student
//! - stops the taps and shows nothing more is reported
//!
//! Set `RUST_LOG=calltap=debug` to see the engine's own logging and
//! `CALLTAP_HANDLER_ERRORS=propagate` to make handler failures fail the call.

use anyhow::Result;
use calltap::prelude::*;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn define_classes(runtime: &Runtime) -> Result<(ObjectRef, ObjectRef)> {
    let student = runtime.define_class("Student", None)?;
    runtime.define_method(&student, "initialize", &["name", "age"], |ctx| {
        ctx.ivar_set("name", ctx.arg("name"));
        ctx.ivar_set("age", ctx.arg("age"));
        Ok(Value::Null)
    })?;
    runtime.define_method(&student, "name", &[], |ctx| Ok(ctx.ivar_get("name")))?;
    runtime.define_method(&student, "age", &[], |ctx| Ok(ctx.ivar_get("age")))?;
    runtime.define_method(&student, "age=", &["age"], |ctx| {
        let age = ctx.arg("age");
        ctx.ivar_set("age", age.clone());
        Ok(age)
    })?;
    runtime.define_method(&student, "birthday", &[], |ctx| {
        let age = ctx.call_self("age", vec![])?.as_u64().unwrap_or(0);
        ctx.call_self("age=", vec![json!(age + 1)])
    })?;
    runtime.alias_method(&student, "full_name", "name")?;

    let school = runtime.define_class("School", None)?;
    runtime.define_method(&school, "initialize", &["name"], |ctx| {
        ctx.ivar_set("name", ctx.arg("name"));
        Ok(Value::Null)
    })?;

    Ok((student, school))
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let runtime = Arc::new(Runtime::new());
    let (student, school) = define_classes(&runtime)?;

    let config = DispatcherConfig::from_env()?;
    println!("Handler error policy: {}", config.handler_errors);
    let device = TappingDevice::with_config(runtime.clone(), config);

    println!("\n=== Counting constructions ===");
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();
    device.tap_construction_of(
        &student,
        move |payload| {
            counter.fetch_add(1, Ordering::SeqCst);
            println!("new Student from {}", payload.call_site());
            Ok(())
        },
        TapOptions::new(),
    )?;

    let stan = runtime.instantiate(&student, vec![json!("Stan"), json!(18)])?;
    runtime.instantiate(&student, vec![json!("Jane"), json!(23)])?;
    runtime.instantiate(&school, vec![json!("A school")])?;
    println!("Student constructions: {}", constructed.load(Ordering::SeqCst));

    println!("\n=== Calls received by Stan ===");
    device.tap_calls_on(
        &stan,
        handler_for(StreamWriter::stdout(OutputFormat::Summary)),
        TapOptions::new(),
    )?;

    runtime.call(&stan, "name", vec![])?;
    runtime.call(&stan, "full_name", vec![])?;
    runtime.call(&stan, "age=", vec![json!(25)])?;
    runtime.call(&stan, "birthday", vec![])?;

    println!("\n=== Same calls as JSON ===");
    let json_writer = Arc::new(MemoryWriter::new(OutputFormat::Json));
    let json_tap = device.tap_calls_on(&stan, handler_for(json_writer.clone()), TapOptions::new())?;
    runtime.call(&stan, "age", vec![])?;
    for line in json_writer.lines() {
        println!("{}", line);
    }
    device.stop(json_tap);

    println!("\n=== After stopping ===");
    let stopped = device.stop(&stan) + device.stop(&student);
    println!("Stopped {} taps, runtime hooked: {}", stopped, runtime.is_hooked());
    runtime.call(&stan, "name", vec![])?;
    runtime.instantiate(&student, vec![json!("Late"), json!(30)])?;
    println!("Student constructions: {}", constructed.load(Ordering::SeqCst));

    let stats = device.stats();
    println!(
        "\nEvents seen: {}, delivered: {}, dropped: {}, failed: {}",
        stats.events_seen, stats.payloads_delivered, stats.events_dropped, stats.handler_failures
    );

    Ok(())
}
