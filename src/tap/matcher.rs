//! Match engine: decides which events a tap owns.
//!
//! Matching happens in two steps. The target check ([`TapTarget::matches`])
//! looks only at the event and is evaluated for every active tap. Filters
//! ([`Filter`]) run afterwards, in registration order, against the resolved
//! call-site, so the call-site is only computed for events some target
//! already accepted.

use super::call_site::CallSite;
use crate::event::{EventKind, Frame, TraceEvent};
use crate::runtime::{ObjectId, ObjectRef, CONSTRUCTOR};
use crate::{Result, TapError};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Instances handed to `tap_calls_on`: one object or several.
#[derive(Debug, Clone, Default)]
pub struct Instances(Vec<ObjectRef>);

impl Instances {
    pub fn iter(&self) -> impl Iterator<Item = &ObjectRef> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&ObjectRef> for Instances {
    fn from(object: &ObjectRef) -> Self {
        Self(vec![object.clone()])
    }
}

impl From<ObjectRef> for Instances {
    fn from(object: ObjectRef) -> Self {
        Self(vec![object])
    }
}

impl From<Vec<ObjectRef>> for Instances {
    fn from(objects: Vec<ObjectRef>) -> Self {
        Self(objects)
    }
}

impl From<&[ObjectRef]> for Instances {
    fn from(objects: &[ObjectRef]) -> Self {
        Self(objects.to_vec())
    }
}

impl<const N: usize> From<[&ObjectRef; N]> for Instances {
    fn from(objects: [&ObjectRef; N]) -> Self {
        Self(objects.into_iter().cloned().collect())
    }
}

/// A fixed set of instances matched by identity
#[derive(Debug, Clone)]
pub struct InstanceSet {
    members: Vec<ObjectRef>,
    ids: HashSet<ObjectId>,
}

impl InstanceSet {
    fn new(members: Vec<ObjectRef>) -> Self {
        let mut ids = HashSet::with_capacity(members.len());
        let members = members.into_iter().filter(|m| ids.insert(m.id())).collect();
        Self { members, ids }
    }

    pub fn contains(&self, object: &ObjectRef) -> bool {
        self.ids.contains(&object.id())
    }

    pub fn members(&self) -> &[ObjectRef] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// What a tap observes
#[derive(Debug, Clone)]
pub enum TapTarget {
    /// Every construction of exactly this class
    Construction(ObjectRef),
    /// Every call received by this instance
    Calls(ObjectRef),
    /// Every call received by any member of the set
    CallsOnAny(InstanceSet),
}

impl TapTarget {
    /// Target constructions of `class`; fails unless `class` is a class object
    pub fn construction(class: &ObjectRef) -> Result<Self> {
        if !class.is_class() {
            return Err(TapError::InvalidTarget {
                expected: "a class",
                got: class.inspect(),
            });
        }
        Ok(TapTarget::Construction(class.clone()))
    }

    /// Target calls received by `instances`; every member must be an instance
    pub fn calls(instances: Instances) -> Result<Self> {
        if let Some(not_instance) = instances.iter().find(|object| !object.is_instance()) {
            return Err(TapError::InvalidTarget {
                expected: "an instance",
                got: not_instance.inspect(),
            });
        }

        let mut members = instances.0;
        match members.len() {
            0 => Err(TapError::InvalidTarget {
                expected: "an instance",
                got: "no objects".to_string(),
            }),
            1 => Ok(TapTarget::Calls(members.remove(0))),
            _ => Ok(TapTarget::CallsOnAny(InstanceSet::new(members))),
        }
    }

    /// Whether `event` falls under this target
    ///
    /// A construction is the constructor dispatched by the runtime itself for
    /// a new instance of exactly the target class, wherever on the class chain
    /// that constructor is defined. Calling `initialize` directly on an
    /// existing object is not a construction.
    pub fn matches(&self, event: &TraceEvent) -> bool {
        match self {
            TapTarget::Construction(class) => {
                event.kind == EventKind::CallStart
                    && event.method_name == CONSTRUCTOR
                    && event.frames.first().is_some_and(Frame::is_engine)
                    && event
                        .receiver
                        .class_of()
                        .is_some_and(|receiver_class| receiver_class.ptr_eq(class))
            }
            TapTarget::Calls(instance) => {
                event.kind == EventKind::CallReturn && event.receiver.ptr_eq(instance)
            }
            TapTarget::CallsOnAny(set) => {
                event.kind == EventKind::CallReturn && set.contains(&event.receiver)
            }
        }
    }

    /// Whether stopping `object` removes this target
    pub fn involves(&self, object: &ObjectRef) -> bool {
        match self {
            TapTarget::Construction(class) | TapTarget::Calls(class) => class.ptr_eq(object),
            TapTarget::CallsOnAny(set) => set.contains(object),
        }
    }
}

impl fmt::Display for TapTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TapTarget::Construction(class) => write!(f, "construction of {}", class.inspect()),
            TapTarget::Calls(instance) => write!(f, "calls on {}", instance.inspect()),
            TapTarget::CallsOnAny(set) => {
                let names: Vec<String> = set.members().iter().map(|m| m.inspect()).collect();
                write!(f, "calls on any of [{}]", names.join(", "))
            }
        }
    }
}

/// What a filter sees for one candidate event
pub struct FilterContext<'a> {
    pub event: &'a TraceEvent,
    pub call_site: &'a CallSite,
}

/// Custom filter predicate
pub type Predicate = Arc<dyn Fn(&FilterContext<'_>) -> bool + Send + Sync>;

/// A post-target check; every filter of a tap must allow the event
#[derive(Clone)]
pub enum Filter {
    /// Allow only call-sites whose path matches one of the patterns
    FilterPaths(Vec<Regex>),
    /// Reject call-sites whose path matches any of the patterns
    ExcludePaths(Vec<Regex>),
    /// Allow when the predicate returns true
    Condition(Predicate),
}

impl Filter {
    pub fn allows(&self, ctx: &FilterContext<'_>) -> bool {
        let path = ctx.call_site.filepath;
        match self {
            Filter::FilterPaths(patterns) => patterns.iter().any(|p| p.is_match(path)),
            Filter::ExcludePaths(patterns) => !patterns.iter().any(|p| p.is_match(path)),
            Filter::Condition(predicate) => predicate(ctx),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::FilterPaths(patterns) => f.debug_tuple("FilterPaths").field(patterns).finish(),
            Filter::ExcludePaths(patterns) => {
                f.debug_tuple("ExcludePaths").field(patterns).finish()
            }
            Filter::Condition(_) => f.write_str("Condition(<fn>)"),
        }
    }
}

/// Run `filters` in order; the first rejection wins
pub fn filters_allow(filters: &[Filter], ctx: &FilterContext<'_>) -> bool {
    filters.iter().all(|filter| filter.allows(ctx))
}
