//! Descriptors for foreign types and their members.
//!
//! A host embedding builds these from whatever metadata its runtime exposes;
//! the binding layer only ever sees them through [`TypeHandle`] and friends.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::value::Value;
use crate::HostFault;

pub type TypeHandle = Arc<TypeInfo>;
pub type MethodHandle = Arc<MethodInfo>;
pub type FieldHandle = Arc<FieldInfo>;
pub type PropertyHandle = Arc<PropertyInfo>;
pub type EventHandle = Arc<EventInfo>;

/// Module that ships the runtime's primitive types.
pub const CORE_MODULE: &str = "System.Private.CoreLib";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    Internal,
    Private,
}

pub struct TypeInfo {
    full_name: String,
    module: String,
    base: Option<TypeHandle>,
    methods: Vec<MethodHandle>,
    fields: Vec<FieldHandle>,
    properties: Vec<PropertyHandle>,
    events: Vec<EventHandle>,
}

impl TypeInfo {
    pub fn builder(full_name: impl Into<String>, module: impl Into<String>) -> TypeBuilder {
        TypeBuilder {
            info: TypeInfo {
                full_name: full_name.into(),
                module: module.into(),
                base: None,
                methods: Vec::new(),
                fields: Vec::new(),
                properties: Vec::new(),
                events: Vec::new(),
            },
        }
    }

    /// A member-less type living in [`CORE_MODULE`].
    pub fn primitive(full_name: impl Into<String>) -> TypeHandle {
        Self::builder(full_name, CORE_MODULE).build()
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Name without namespace or nesting prefix.
    pub fn name(&self) -> &str {
        self.full_name
            .rsplit(|c: char| c == '.' || c == '+')
            .next()
            .unwrap_or(&self.full_name)
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// `"Full.Name, Module"`
    pub fn qualified_name(&self) -> String {
        format!("{}, {}", self.full_name, self.module)
    }

    pub fn base(&self) -> Option<&TypeHandle> {
        self.base.as_ref()
    }

    pub fn methods(&self) -> &[MethodHandle] {
        &self.methods
    }

    pub fn fields(&self) -> &[FieldHandle] {
        &self.fields
    }

    pub fn properties(&self) -> &[PropertyHandle] {
        &self.properties
    }

    pub fn events(&self) -> &[EventHandle] {
        &self.events
    }

    /// This type followed by each of its base types.
    pub fn lineage(&self) -> impl Iterator<Item = &TypeInfo> {
        std::iter::successors(Some(self), |&t| t.base.as_deref())
    }

    pub fn same_type(&self, other: &TypeInfo) -> bool {
        self.full_name == other.full_name && self.module == other.module
    }

    pub fn is_assignable_to(&self, other: &TypeInfo) -> bool {
        self.lineage().any(|t| t.same_type(other))
    }

    /// Non-generic method whose parameter types match `params` exactly,
    /// searching declared members before inherited ones.
    pub fn find_method(&self, name: &str, params: &[TypeHandle]) -> Option<MethodHandle> {
        self.lineage()
            .flat_map(|t| t.methods.iter())
            .find(|m| m.name == name && !m.is_generic_definition() && m.matches(params))
            .cloned()
    }

    /// Every method called `name`, including generic definitions and
    /// inherited members, in lookup order.
    pub fn find_methods(&self, name: &str) -> Vec<MethodHandle> {
        self.lineage()
            .flat_map(|t| t.methods.iter())
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }

    pub fn find_field(&self, name: &str) -> Option<FieldHandle> {
        self.lineage()
            .flat_map(|t| t.fields.iter())
            .find(|f| f.name == name)
            .cloned()
    }

    pub fn find_property(&self, name: &str) -> Option<PropertyHandle> {
        self.lineage()
            .flat_map(|t| t.properties.iter())
            .find(|p| p.name == name)
            .cloned()
    }

    pub fn find_event(&self, name: &str) -> Option<EventHandle> {
        self.lineage()
            .flat_map(|t| t.events.iter())
            .find(|e| e.name == name)
            .cloned()
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

pub struct TypeBuilder {
    info: TypeInfo,
}

impl TypeBuilder {
    pub fn base(mut self, base: TypeHandle) -> Self {
        self.info.base = Some(base);
        self
    }

    pub fn method(mut self, method: MethodInfo) -> Self {
        self.info.methods.push(Arc::new(method));
        self
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.info.fields.push(Arc::new(field));
        self
    }

    pub fn property(mut self, property: PropertyInfo) -> Self {
        self.info.properties.push(Arc::new(property));
        self
    }

    pub fn event(mut self, event: EventInfo) -> Self {
        self.info.events.push(Arc::new(event));
        self
    }

    pub fn build(self) -> TypeHandle {
        Arc::new(self.info)
    }
}

/// Arguments handed to a method body.
pub struct CallFrame<'a> {
    pub target: Option<&'a Value>,
    pub args: &'a [Value],
    pub type_args: &'a [TypeHandle],
}

pub type Invoker = Arc<dyn Fn(CallFrame<'_>) -> Result<Value, HostFault> + Send + Sync>;

pub struct MethodInfo {
    name: String,
    params: Vec<TypeHandle>,
    visibility: Visibility,
    is_static: bool,
    generic_arity: usize,
    invoker: Invoker,
}

impl MethodInfo {
    pub fn new<F>(name: impl Into<String>, params: Vec<TypeHandle>, body: F) -> Self
    where
        F: Fn(CallFrame<'_>) -> Result<Value, HostFault> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params,
            visibility: Visibility::Public,
            is_static: false,
            generic_arity: 0,
            invoker: Arc::new(body),
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn static_member(mut self) -> Self {
        self.is_static = true;
        self
    }

    /// Marks this as a generic definition taking `arity` type arguments.
    pub fn generic(mut self, arity: usize) -> Self {
        self.generic_arity = arity;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[TypeHandle] {
        &self.params
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn generic_arity(&self) -> usize {
        self.generic_arity
    }

    pub fn is_generic_definition(&self) -> bool {
        self.generic_arity > 0
    }

    pub fn matches(&self, params: &[TypeHandle]) -> bool {
        self.params.len() == params.len()
            && self.params.iter().zip(params).all(|(a, b)| a.same_type(b))
    }

    pub fn invoke(&self, target: Option<&Value>, args: &[Value]) -> Result<Value, HostFault> {
        if self.is_generic_definition() {
            return Err(HostFault::OpenGeneric(self.name.clone()));
        }
        self.call(target, args, &[])
    }

    /// Closes a generic definition over `type_args`.
    pub fn make_generic(
        self: &Arc<Self>,
        type_args: &[TypeHandle],
    ) -> Result<BoundMethod, HostFault> {
        if self.generic_arity == 0 || self.generic_arity != type_args.len() {
            return Err(HostFault::GenericArity {
                method: self.name.clone(),
                expected: self.generic_arity,
                got: type_args.len(),
            });
        }
        Ok(BoundMethod {
            method: self.clone(),
            type_args: type_args.to_vec(),
        })
    }

    fn call(
        &self,
        target: Option<&Value>,
        args: &[Value],
        type_args: &[TypeHandle],
    ) -> Result<Value, HostFault> {
        if args.len() != self.params.len() {
            return Err(HostFault::ArgumentCount {
                method: self.name.clone(),
                expected: self.params.len(),
                got: args.len(),
            });
        }
        if !self.is_static && target.map_or(true, Value::is_null) {
            return Err(HostFault::NullTarget(self.name.clone()));
        }
        (self.invoker)(CallFrame {
            target,
            args,
            type_args,
        })
    }
}

impl fmt::Debug for MethodInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<&str> = self.params.iter().map(|p| p.full_name()).collect();
        write!(f, "{}", self.name)?;
        if self.generic_arity > 0 {
            write!(f, "<{}>", self.generic_arity)?;
        }
        write!(f, "({})", params.join(", "))
    }
}

/// A generic method closed over concrete type arguments.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    method: MethodHandle,
    type_args: Vec<TypeHandle>,
}

impl BoundMethod {
    pub fn method(&self) -> &MethodHandle {
        &self.method
    }

    pub fn type_args(&self) -> &[TypeHandle] {
        &self.type_args
    }

    pub fn invoke(&self, target: Option<&Value>, args: &[Value]) -> Result<Value, HostFault> {
        self.method.call(target, args, &self.type_args)
    }
}

pub struct FieldInfo {
    name: String,
    visibility: Visibility,
    is_static: bool,
    static_value: RwLock<Value>,
}

impl FieldInfo {
    /// Instance field backed by the object's slot of the same name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            is_static: false,
            static_value: RwLock::new(Value::Null),
        }
    }

    pub fn static_member(mut self, initial: impl Into<Value>) -> Self {
        self.is_static = true;
        self.static_value = RwLock::new(initial.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn get(&self, target: Option<&Value>) -> Result<Value, HostFault> {
        if self.is_static {
            return self
                .static_value
                .read()
                .map(|v| v.clone())
                .map_err(|_| HostFault::Raised(format!("field {} is poisoned", self.name)));
        }
        let object = target
            .and_then(Value::as_object)
            .ok_or_else(|| HostFault::NullTarget(self.name.clone()))?;
        Ok(object.slot(&self.name).unwrap_or_default())
    }

    pub fn set(&self, target: Option<&Value>, value: Value) -> Result<(), HostFault> {
        if self.is_static {
            let mut slot = self
                .static_value
                .write()
                .map_err(|_| HostFault::Raised(format!("field {} is poisoned", self.name)))?;
            *slot = value;
            return Ok(());
        }
        let object = target
            .and_then(Value::as_object)
            .ok_or_else(|| HostFault::NullTarget(self.name.clone()))?;
        object.set_slot(self.name.clone(), value);
        Ok(())
    }
}

impl fmt::Debug for FieldInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field {}", self.name)
    }
}

pub type Getter = Arc<dyn Fn(Option<&Value>) -> Result<Value, HostFault> + Send + Sync>;
pub type Setter = Arc<dyn Fn(Option<&Value>, Value) -> Result<(), HostFault> + Send + Sync>;

pub struct PropertyInfo {
    name: String,
    visibility: Visibility,
    is_static: bool,
    getter: Option<Getter>,
    setter: Option<Setter>,
}

impl PropertyInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility: Visibility::Public,
            is_static: false,
            getter: None,
            setter: None,
        }
    }

    /// Read/write instance property stored in the object slot `slot`.
    pub fn backed_by(name: impl Into<String>, slot: impl Into<String>) -> Self {
        let read_slot: String = slot.into();
        let write_slot = read_slot.clone();
        Self::new(name)
            .getter(move |target| {
                let object = target
                    .and_then(Value::as_object)
                    .ok_or_else(|| HostFault::NullTarget(read_slot.clone()))?;
                Ok(object.slot(&read_slot).unwrap_or_default())
            })
            .setter(move |target, value| {
                let object = target
                    .and_then(Value::as_object)
                    .ok_or_else(|| HostFault::NullTarget(write_slot.clone()))?;
                object.set_slot(write_slot.clone(), value);
                Ok(())
            })
    }

    pub fn getter<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Value>) -> Result<Value, HostFault> + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(f));
        self
    }

    pub fn setter<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Value>, Value) -> Result<(), HostFault> + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(f));
        self
    }

    pub fn static_member(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn can_read(&self) -> bool {
        self.getter.is_some()
    }

    pub fn can_write(&self) -> bool {
        self.setter.is_some()
    }

    pub fn get(&self, target: Option<&Value>) -> Result<Value, HostFault> {
        let getter = self
            .getter
            .as_ref()
            .ok_or_else(|| HostFault::Unsupported(format!("property {} has no getter", self.name)))?;
        getter(if self.is_static { None } else { target })
    }

    pub fn set(&self, target: Option<&Value>, value: Value) -> Result<(), HostFault> {
        let setter = self
            .setter
            .as_ref()
            .ok_or_else(|| HostFault::Unsupported(format!("property {} has no setter", self.name)))?;
        setter(if self.is_static { None } else { target }, value)
    }
}

impl fmt::Debug for PropertyInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "property {}", self.name)
    }
}

/// A callback with the exact shape a foreign event expects.
pub struct Delegate {
    shape: TypeHandle,
    body: Box<dyn FnMut(Value) + Send>,
}

impl Delegate {
    pub fn new<F>(shape: TypeHandle, body: F) -> Self
    where
        F: FnMut(Value) + Send + 'static,
    {
        Self {
            shape,
            body: Box::new(body),
        }
    }

    pub fn shape(&self) -> &TypeHandle {
        &self.shape
    }

    pub fn invoke(&mut self, arg: Value) {
        (self.body)(arg)
    }
}

impl fmt::Debug for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Delegate<{}>", self.shape.full_name())
    }
}

pub type Subscribe = Arc<dyn Fn(&Value, Delegate) -> Result<(), HostFault> + Send + Sync>;

pub struct EventInfo {
    name: String,
    handler_shape: TypeHandle,
    add: Subscribe,
}

impl EventInfo {
    pub fn new<F>(name: impl Into<String>, handler_shape: TypeHandle, add: F) -> Self
    where
        F: Fn(&Value, Delegate) -> Result<(), HostFault> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler_shape,
            add: Arc::new(add),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler_shape(&self) -> &TypeHandle {
        &self.handler_shape
    }

    pub fn subscribe(&self, target: &Value, delegate: Delegate) -> Result<(), HostFault> {
        if !delegate.shape().same_type(&self.handler_shape) {
            return Err(HostFault::DelegateShape {
                expected: self.handler_shape.full_name().to_string(),
                got: delegate.shape().full_name().to_string(),
            });
        }
        (self.add)(target, delegate)
    }
}

impl fmt::Debug for EventInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event {}<{}>", self.name, self.handler_shape.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Object;

    fn int() -> TypeHandle {
        TypeInfo::primitive("System.Int32")
    }

    #[test]
    fn test_short_name_strips_namespace_and_nesting() {
        assert_eq!(TypeInfo::primitive("Game.Vehicles.VehicleClient").name(), "VehicleClient");
        assert_eq!(TypeInfo::primitive("Outer+Inner").name(), "Inner");
        assert_eq!(TypeInfo::primitive("Server").name(), "Server");
    }

    #[test]
    fn test_find_method_searches_base_types() {
        let base = TypeInfo::builder("Game.Machine", "Assembly-CSharp")
            .method(MethodInfo::new("Activate", vec![], |_| Ok(Value::Null)))
            .build();
        let derived = TypeInfo::builder("Game.Gate", "Assembly-CSharp")
            .base(base.clone())
            .build();

        assert!(derived.find_method("Activate", &[]).is_some());
        assert!(derived.is_assignable_to(&base));
        assert!(!base.is_assignable_to(&derived));
    }

    #[test]
    fn test_find_method_skips_generic_definitions() {
        let ty = TypeInfo::builder("Game.Spawner", "Assembly-CSharp")
            .method(MethodInfo::new("Spawn", vec![], |_| Ok(Value::Null)).generic(1))
            .build();

        assert!(ty.find_method("Spawn", &[]).is_none());
        assert_eq!(ty.find_methods("Spawn").len(), 1);
    }

    #[test]
    fn test_invoke_checks_arity_and_target() {
        let m = MethodInfo::new("Add", vec![int(), int()], |frame| {
            let a = frame.args[0].as_int().unwrap_or(0);
            let b = frame.args[1].as_int().unwrap_or(0);
            Ok(Value::Int(a + b))
        })
        .static_member();

        assert_eq!(m.invoke(None, &[Value::Int(2), Value::Int(3)]), Ok(Value::Int(5)));
        assert!(matches!(
            m.invoke(None, &[Value::Int(2)]),
            Err(HostFault::ArgumentCount { expected: 2, got: 1, .. })
        ));

        let instance = MethodInfo::new("Tick", vec![], |_| Ok(Value::Null));
        assert!(matches!(instance.invoke(None, &[]), Err(HostFault::NullTarget(_))));
    }

    #[test]
    fn test_make_generic_passes_type_args() {
        let m = Arc::new(
            MethodInfo::new("Load", vec![TypeInfo::primitive("System.Object")], |frame| {
                Ok(Value::from(frame.type_args[0].full_name()))
            })
            .static_member()
            .generic(1),
        );

        assert!(matches!(m.invoke(None, &[Value::Null]), Err(HostFault::OpenGeneric(_))));
        assert!(m.make_generic(&[]).is_err());

        let bound = m.make_generic(&[int()]).unwrap();
        assert_eq!(bound.invoke(None, &[Value::from("key")]), Ok(Value::from("System.Int32")));
    }

    #[test]
    fn test_backed_property_and_instance_field() {
        let ty = TypeInfo::builder("Game.ObjectMetaData", "Assembly-CSharp")
            .property(PropertyInfo::backed_by("typeID", "m_typeID").with_visibility(Visibility::Internal))
            .field(FieldInfo::new("objectID").with_visibility(Visibility::Private))
            .build();
        let object = Value::from(Object::new("gate", ty.clone()));

        let prop = ty.find_property("typeID").unwrap();
        prop.set(Some(&object), Value::Int(4055)).unwrap();
        assert_eq!(prop.get(Some(&object)), Ok(Value::Int(4055)));

        let field = ty.find_field("objectID").unwrap();
        assert_eq!(field.get(Some(&object)), Ok(Value::Null));
        field.set(Some(&object), Value::from("gate-1")).unwrap();
        assert_eq!(field.get(Some(&object)), Ok(Value::from("gate-1")));
        assert!(field.get(None).is_err());
    }

    #[test]
    fn test_event_rejects_mismatched_delegate_shape() {
        let shape = TypeInfo::primitive("System.Action`1");
        let other = TypeInfo::primitive("System.Action");
        let event = EventInfo::new("Completed", shape.clone(), |_, _| Ok(()));

        assert!(event.subscribe(&Value::Null, Delegate::new(shape, |_| {})).is_ok());
        assert!(matches!(
            event.subscribe(&Value::Null, Delegate::new(other, |_| {})),
            Err(HostFault::DelegateShape { .. })
        ));
    }
}
