//! Payloads handed to tap handlers
//!
//! A [`Payload`] is built once per (event, matching tap) pair and never
//! mutated afterwards. The receiver is the traced object itself, not a copy,
//! so handlers can compare it by identity.

use super::call_site::{self, CallSite};
use super::registry::TapId;
use crate::event::{EventKind, Frame, TraceEvent};
use crate::runtime::ObjectRef;
use crate::Result;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Longest rendered value kept in a printable summary
const PREVIEW_LIMIT: usize = 100;

/// Structured record of one matched invocation
#[derive(Debug, Clone, Serialize)]
pub struct Payload {
    tap_id: TapId,
    /// Unix timestamp of when the invocation was observed
    timestamp: f64,
    kind: EventKind,
    receiver: ObjectRef,
    defined_class: String,
    method_name: String,
    arguments: Vec<(String, Value)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    return_value: Option<Value>,
    filepath: &'static str,
    line_number: u32,
    trace: Vec<Frame>,
}

impl Payload {
    /// Build the payload for `event` as seen by tap `tap_id`
    pub(crate) fn build(tap_id: TapId, event: &TraceEvent, site: &CallSite) -> Self {
        let return_value = match event.kind {
            EventKind::CallReturn => event.return_value.clone(),
            EventKind::CallStart => None,
        };

        Self {
            tap_id,
            timestamp: current_timestamp(),
            kind: event.kind,
            receiver: event.receiver.clone(),
            defined_class: event.defined_class.class_name().to_string(),
            method_name: event.method_name.clone(),
            arguments: event.arguments.clone(),
            return_value,
            filepath: site.filepath,
            line_number: site.line_number,
            trace: call_site::external_frames(&event.frames),
        }
    }

    pub fn tap_id(&self) -> TapId {
        self.tap_id
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The object that received the call
    pub fn receiver(&self) -> &ObjectRef {
        &self.receiver
    }

    /// Name of the class that owns the executed method
    pub fn defined_class(&self) -> &str {
        &self.defined_class
    }

    /// Name used at the call-site
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// (parameter, value) bindings in declaration order
    pub fn arguments(&self) -> &[(String, Value)] {
        &self.arguments
    }

    /// Value bound to parameter `name`
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments
            .iter()
            .find(|(param, _)| param == name)
            .map(|(_, value)| value)
    }

    /// Produced value; `None` for call-start payloads
    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    pub fn filepath(&self) -> &'static str {
        self.filepath
    }

    pub fn line_number(&self) -> u32 {
        self.line_number
    }

    pub fn call_site(&self) -> CallSite {
        CallSite {
            filepath: self.filepath,
            line_number: self.line_number,
        }
    }

    /// External frames of the call stack, innermost first
    pub fn trace(&self) -> &[Frame] {
        &self.trace
    }

    /// `Student#age` for instance receivers, `Student.foo` for class receivers
    pub fn method_label(&self) -> String {
        if self.receiver.is_class() {
            format!("{}.{}", self.receiver.class_name(), self.method_name)
        } else {
            format!("{}#{}", self.defined_class, self.method_name)
        }
    }

    /// Get a formatted string summary of the payload
    pub fn printable_summary(&self) -> String {
        let dt = DateTime::from_timestamp(self.timestamp as i64, 0)
            .unwrap_or_default()
            .with_timezone(&Local);
        let time_str = dt.format("%H:%M:%S%.3f").to_string();

        let mut summary = format!(
            "[{}] {} ({}) from {}:{}\n   Receiver: {}",
            time_str,
            self.method_label(),
            self.kind,
            self.filepath,
            self.line_number,
            self.receiver.inspect()
        );

        if !self.arguments.is_empty() {
            let rendered: Vec<String> = self
                .arguments
                .iter()
                .map(|(name, value)| format!("{}: {}", name, preview(value)))
                .collect();
            summary.push_str(&format!("\n   Arguments: {}", rendered.join(", ")));
        }

        if let Some(value) = &self.return_value {
            summary.push_str(&format!("\n   Return: {}", preview(value)));
        }

        summary
    }

    /// Render the payload as a single JSON line
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn preview(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() > PREVIEW_LIMIT {
        let cut: String = rendered.chars().take(PREVIEW_LIMIT).collect();
        format!("{}...", cut)
    } else {
        rendered
    }
}

fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{student_world, EventLog};
    use serde_json::json;

    fn events_for_age_call() -> (crate::testing::World, Vec<TraceEvent>, u32) {
        let world = student_world();
        let stan = world.student("Stan", 18);
        let log = EventLog::install(&world.runtime);
        let line = line!() + 1;
        world.call(&stan, "age=", vec![json!(25)]);
        let events = log.events();
        (world, events, line)
    }

    #[test]
    fn test_build_from_return_event() {
        let (_world, events, line) = events_for_age_call();
        let event = &events[1];
        let site = call_site::resolve(&event.frames);

        let payload = Payload::build(TapId::new(), event, &site);
        assert_eq!(payload.method_name(), "age=");
        assert_eq!(payload.arguments(), &[("age".to_string(), json!(25))]);
        assert_eq!(payload.argument("age"), Some(&json!(25)));
        assert_eq!(payload.return_value(), Some(&json!(25)));
        assert_eq!(payload.filepath(), file!());
        assert_eq!(payload.line_number(), line);
        assert_eq!(payload.defined_class(), "Student");
        assert!(payload.receiver().ptr_eq(&event.receiver));
    }

    #[test]
    fn test_call_start_has_no_return_value() {
        let (_world, events, _) = events_for_age_call();
        let event = &events[0];
        let site = call_site::resolve(&event.frames);

        let payload = Payload::build(TapId::new(), event, &site);
        assert_eq!(payload.kind(), EventKind::CallStart);
        assert!(payload.return_value().is_none());

        let value: Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert!(value.get("return_value").is_none());
    }

    #[test]
    fn test_method_label() {
        let world = student_world();
        let log = EventLog::install(&world.runtime);
        world.call(&world.student, "foo", vec![]);

        let events = log.events();
        let site = call_site::resolve(&events[0].frames);
        let payload = Payload::build(TapId::new(), &events[0], &site);
        assert_eq!(payload.method_label(), "Student.foo");
    }

    #[test]
    fn test_printable_summary() {
        let (_world, events, _) = events_for_age_call();
        let site = call_site::resolve(&events[1].frames);
        let payload = Payload::build(TapId::new(), &events[1], &site);

        let summary = payload.printable_summary();
        assert!(summary.contains("Student#age= (return)"));
        assert!(summary.contains("Arguments: age: 25"));
        assert!(summary.contains("Return: 25"));
        assert!(summary.contains(file!()));
    }

    #[test]
    fn test_preview_truncates_long_values() {
        let long = json!("x".repeat(300));
        let rendered = preview(&long);
        assert!(rendered.ends_with("..."));
        assert_eq!(rendered.chars().count(), PREVIEW_LIMIT + 3);
    }

    #[test]
    fn test_to_json_renders_receiver_identity() {
        let (_world, events, _) = events_for_age_call();
        let site = call_site::resolve(&events[1].frames);
        let payload = Payload::build(TapId::new(), &events[1], &site);

        let value: Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(value["receiver"]["object_id"], json!(events[1].receiver.id()));
        assert_eq!(value["method_name"], json!("age="));
        assert_eq!(value["arguments"], json!([["age", 25]]));
    }
}
