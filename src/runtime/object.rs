//! Heap objects of the host runtime.
//!
//! Everything a traced program holds a reference to is an [`Object`]: either a
//! class or an instance of one. [`ObjectRef`] equality is identity: two
//! references are equal only when they point at the same allocation, never
//! because their state happens to match.

use super::CallContext;
use crate::Result;
use parking_lot::RwLock;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counter for generating unique object ids
static OBJECT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-unique object identity
pub type ObjectId = u64;

/// Executable body of a method
pub type MethodBody = Arc<dyn Fn(&CallContext<'_>) -> Result<Value> + Send + Sync>;

/// A method definition: declared parameter names and a body
#[derive(Clone)]
pub struct Method {
    name: String,
    params: Vec<String>,
    body: MethodBody,
}

impl Method {
    pub fn new(name: impl Into<String>, params: Vec<String>, body: MethodBody) -> Self {
        Self {
            name: name.into(),
            params,
            body,
        }
    }

    /// Name the method was originally defined with
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub(crate) fn body(&self) -> &MethodBody {
        &self.body
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// State of a class object
pub struct ClassData {
    name: String,
    superclass: Option<ObjectRef>,
    methods: RwLock<HashMap<String, Method>>,
    class_methods: RwLock<HashMap<String, Method>>,
}

/// State of an instance object
pub struct InstanceData {
    class: ObjectRef,
    ivars: RwLock<HashMap<String, Value>>,
}

pub enum ObjectKind {
    Class(ClassData),
    Instance(InstanceData),
}

pub struct Object {
    id: ObjectId,
    kind: ObjectKind,
}

/// Shared, identity-compared handle to an [`Object`]
#[derive(Clone)]
pub struct ObjectRef(Arc<Object>);

impl ObjectRef {
    pub(crate) fn new_class(name: impl Into<String>, superclass: Option<ObjectRef>) -> Self {
        Self::allocate(ObjectKind::Class(ClassData {
            name: name.into(),
            superclass,
            methods: RwLock::new(HashMap::new()),
            class_methods: RwLock::new(HashMap::new()),
        }))
    }

    pub(crate) fn new_instance(class: ObjectRef) -> Self {
        Self::allocate(ObjectKind::Instance(InstanceData {
            class,
            ivars: RwLock::new(HashMap::new()),
        }))
    }

    fn allocate(kind: ObjectKind) -> Self {
        Self(Arc::new(Object {
            id: OBJECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            kind,
        }))
    }

    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    pub fn kind(&self) -> &ObjectKind {
        &self.0.kind
    }

    /// Identity comparison
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_class(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Class(_))
    }

    pub fn is_instance(&self) -> bool {
        matches!(self.0.kind, ObjectKind::Instance(_))
    }

    pub(crate) fn as_class(&self) -> Option<&ClassData> {
        match &self.0.kind {
            ObjectKind::Class(data) => Some(data),
            ObjectKind::Instance(_) => None,
        }
    }

    fn as_instance(&self) -> Option<&InstanceData> {
        match &self.0.kind {
            ObjectKind::Instance(data) => Some(data),
            ObjectKind::Class(_) => None,
        }
    }

    /// The class an instance was created from; `None` for class objects
    pub fn class_of(&self) -> Option<&ObjectRef> {
        self.as_instance().map(|data| &data.class)
    }

    /// Name of a class object
    pub fn name(&self) -> Option<&str> {
        self.as_class().map(|data| data.name.as_str())
    }

    /// Superclass of a class object
    pub fn superclass(&self) -> Option<&ObjectRef> {
        self.as_class().and_then(|data| data.superclass.as_ref())
    }

    /// Name of the object's class, or of the class itself for class objects
    pub fn class_name(&self) -> &str {
        match &self.0.kind {
            ObjectKind::Class(data) => &data.name,
            ObjectKind::Instance(data) => data.class.name().unwrap_or("?"),
        }
    }

    /// Whether this instance's class is `class` or inherits from it
    pub fn is_a(&self, class: &ObjectRef) -> bool {
        let mut current = self.class_of().cloned();
        while let Some(candidate) = current {
            if candidate.ptr_eq(class) {
                return true;
            }
            current = candidate.superclass().cloned();
        }
        false
    }

    /// Read an instance variable; `Null` when unset or on class objects
    pub fn ivar_get(&self, name: &str) -> Value {
        self.as_instance()
            .and_then(|data| data.ivars.read().get(name).cloned())
            .unwrap_or(Value::Null)
    }

    /// Write an instance variable; ignored on class objects
    pub fn ivar_set(&self, name: impl Into<String>, value: Value) {
        if let Some(data) = self.as_instance() {
            data.ivars.write().insert(name.into(), value);
        }
    }

    pub(crate) fn insert_method(&self, method: Method) {
        if let Some(data) = self.as_class() {
            data.methods.write().insert(method.name().to_string(), method);
        }
    }

    pub(crate) fn insert_method_as(&self, name: impl Into<String>, method: Method) {
        if let Some(data) = self.as_class() {
            data.methods.write().insert(name.into(), method);
        }
    }

    pub(crate) fn insert_class_method(&self, method: Method) {
        if let Some(data) = self.as_class() {
            data.class_methods.write().insert(method.name().to_string(), method);
        }
    }

    /// Find an instance method on this class or its ancestors.
    ///
    /// Returns the owning class together with the method.
    pub fn lookup_method(&self, name: &str) -> Option<(ObjectRef, Method)> {
        self.lookup_in_chain(name, false)
    }

    /// Find a class-level method on this class or its ancestors.
    pub fn lookup_class_method(&self, name: &str) -> Option<(ObjectRef, Method)> {
        self.lookup_in_chain(name, true)
    }

    fn lookup_in_chain(&self, name: &str, class_level: bool) -> Option<(ObjectRef, Method)> {
        let mut current = Some(self.clone());
        while let Some(class) = current {
            let data = class.as_class()?;
            let table = if class_level {
                &data.class_methods
            } else {
                &data.methods
            };
            if let Some(method) = table.read().get(name).cloned() {
                return Some((class.clone(), method));
            }
            current = data.superclass.clone();
        }
        None
    }

    /// Resolve the method a call named `name` on this object would run
    pub fn resolve_method(&self, name: &str) -> Option<(ObjectRef, Method)> {
        match &self.0.kind {
            ObjectKind::Class(_) => self.lookup_class_method(name),
            ObjectKind::Instance(data) => data.class.lookup_method(name),
        }
    }

    /// Short human-readable rendering, e.g. `#<Student:42>` or `Student`
    pub fn inspect(&self) -> String {
        match &self.0.kind {
            ObjectKind::Class(data) => data.name.clone(),
            ObjectKind::Instance(_) => format!("#<{}:{}>", self.class_name(), self.id()),
        }
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inspect())
    }
}

impl Serialize for ObjectRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ObjectRef", 3)?;
        state.serialize_field("object_id", &self.id())?;
        state.serialize_field("class", self.class_name())?;
        state.serialize_field("inspect", &self.inspect())?;
        state.end()
    }
}
