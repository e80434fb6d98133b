use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::types::{TypeHandle, TypeInfo};

/// World-space position and rotation of a foreign object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Placement {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Unit vector the object faces (+Z in local space).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::Z
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

pub type ObjectRef = Arc<Object>;

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// A live object owned by the foreign runtime.
///
/// Instance field storage lives in named slots; the declaring type decides
/// which slots mean anything.
pub struct Object {
    id: u64,
    name: String,
    type_handle: TypeHandle,
    slots: RwLock<HashMap<String, Value>>,
    placement: RwLock<Placement>,
}

impl Object {
    pub fn new(name: impl Into<String>, type_handle: TypeHandle) -> ObjectRef {
        Self::with_placement(name, type_handle, Placement::default())
    }

    pub fn with_placement(
        name: impl Into<String>,
        type_handle: TypeHandle,
        placement: Placement,
    ) -> ObjectRef {
        Arc::new(Self {
            id: NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            type_handle,
            slots: RwLock::new(HashMap::new()),
            placement: RwLock::new(placement),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_handle(&self) -> &TypeHandle {
        &self.type_handle
    }

    pub fn is_instance_of(&self, ty: &TypeInfo) -> bool {
        self.type_handle.is_assignable_to(ty)
    }

    pub fn slot(&self, name: &str) -> Option<Value> {
        self.slots.read().ok().and_then(|slots| slots.get(name).cloned())
    }

    pub fn set_slot(&self, name: impl Into<String>, value: impl Into<Value>) {
        if let Ok(mut slots) = self.slots.write() {
            slots.insert(name.into(), value.into());
        }
    }

    pub fn placement(&self) -> Placement {
        match self.placement.read() {
            Ok(p) => *p,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn set_placement(&self, placement: Placement) {
        match self.placement.write() {
            Ok(mut p) => *p = placement,
            Err(poisoned) => *poisoned.into_inner() = placement,
        }
    }

    /// Copy of this object with fresh identity, same type and slot contents.
    pub fn duplicate(&self, placement: Placement) -> ObjectRef {
        let copy = Self::with_placement(
            format!("{}(Clone)", self.name),
            self.type_handle.clone(),
            placement,
        );
        if let (Ok(src), Ok(mut dst)) = (self.slots.read(), copy.slots.write()) {
            dst.extend(src.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        copy
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("type", &self.type_handle.full_name())
            .finish()
    }
}

/// A dynamically typed value crossing the host boundary.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Vec3(Vec3),
    Quat(Quat),
    Object(ObjectRef),
    /// A foreign exception, carried by message.
    Exception(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view with the widening the host applies to enum-backed statuses.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Message text of an exception (or a bare string standing in for one).
    pub fn as_message(&self) -> Option<&str> {
        match self {
            Value::Exception(m) | Value::Str(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn into_object(self) -> Option<ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Vec3(_) => "vector3",
            Value::Quat(_) => "quaternion",
            Value::Object(_) => "object",
            Value::Exception(_) => "exception",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Vec3(a), Value::Vec3(b)) => a == b,
            (Value::Quat(a), Value::Quat(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec3> for Value {
    fn from(v: Vec3) -> Self {
        Value::Vec3(v)
    }
}

impl From<Quat> for Value {
    fn from(v: Quat) -> Self {
        Value::Quat(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

impl From<Option<ObjectRef>> for Value {
    fn from(v: Option<ObjectRef>) -> Self {
        v.map_or(Value::Null, Value::Object)
    }
}
