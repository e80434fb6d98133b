//! Name-based lookup of foreign types and members, with a process-lifetime cache.
//!
//! Hits are cached forever; misses never are, because the host may still be
//! loading the module that defines the name.

use api::{
    FieldHandle, HostRuntime, MethodHandle, PropertyHandle, TypeHandle, TypeInfo,
};
use common::ResolverConfig;
use dashmap::DashMap;
use log::{debug, trace, warn};
use std::fmt;
use std::sync::Arc;

const LOG_TARGET: &str = "member_resolver";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum MemberKind {
    Type,
    Method,
    /// Method reached through an `"Owner:Member"` descriptor, which may bind leniently.
    Descriptor,
    Field,
    Property,
}

/// Structural cache key: owner, member and ordered parameter signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingKey {
    kind: MemberKind,
    owner: String,
    member: String,
    signature: Vec<String>,
}

impl BindingKey {
    pub fn for_type(name: &str) -> Self {
        Self {
            kind: MemberKind::Type,
            owner: name.to_string(),
            member: String::new(),
            signature: Vec::new(),
        }
    }

    pub fn for_method(owner: &str, member: &str, params: &[TypeHandle]) -> Self {
        Self {
            kind: MemberKind::Method,
            owner: owner.to_string(),
            member: member.to_string(),
            signature: params.iter().map(|p| p.full_name().to_string()).collect(),
        }
    }

    pub fn for_descriptor(owner: &str, member: &str, params: &[TypeHandle]) -> Self {
        Self {
            kind: MemberKind::Descriptor,
            ..Self::for_method(owner, member, params)
        }
    }

    pub fn for_field(owner: &TypeInfo, member: &str) -> Self {
        Self {
            kind: MemberKind::Field,
            owner: owner.full_name().to_string(),
            member: member.to_string(),
            signature: Vec::new(),
        }
    }

    pub fn for_property(owner: &TypeInfo, member: &str) -> Self {
        Self {
            kind: MemberKind::Property,
            owner: owner.full_name().to_string(),
            member: member.to_string(),
            signature: Vec::new(),
        }
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MemberKind::Type => write!(f, "{}", self.owner),
            MemberKind::Method | MemberKind::Descriptor => write!(
                f,
                "{}:{}|{}",
                self.owner,
                self.member,
                self.signature.join(",")
            ),
            MemberKind::Field => write!(f, "{}.{}#field", self.owner, self.member),
            MemberKind::Property => write!(f, "{}.{}#prop", self.owner, self.member),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub types: usize,
    pub methods: usize,
    pub fields: usize,
    pub properties: usize,
}

pub struct MemberResolver {
    host: Arc<dyn HostRuntime>,
    fallback_modules: Vec<String>,
    types: DashMap<BindingKey, TypeHandle>,
    methods: DashMap<BindingKey, MethodHandle>,
    fields: DashMap<BindingKey, FieldHandle>,
    properties: DashMap<BindingKey, PropertyHandle>,
}

impl MemberResolver {
    pub fn new(host: Arc<dyn HostRuntime>, config: &ResolverConfig) -> Self {
        Self {
            host,
            fallback_modules: config.fallback_modules.clone(),
            types: DashMap::new(),
            methods: DashMap::new(),
            fields: DashMap::new(),
            properties: DashMap::new(),
        }
    }

    pub fn host(&self) -> &Arc<dyn HostRuntime> {
        &self.host
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            types: self.types.len(),
            methods: self.methods.len(),
            fields: self.fields.len(),
            properties: self.properties.len(),
        }
    }

    /// Resolves a bare or module-qualified type name.
    ///
    /// Tries the host's own lookup, then each configured fallback module.
    pub fn resolve_type(&self, name: &str) -> Option<TypeHandle> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let key = BindingKey::for_type(name);
        if let Some(hit) = self.types.get(&key) {
            #[cfg(feature = "xtralog")]
            trace!(target: LOG_TARGET, "cache hit {}", key);
            return Some(hit.value().clone());
        }

        let found = self.lookup(name).or_else(|| {
            if name.contains(',') {
                return None;
            }
            self.fallback_modules
                .iter()
                .find_map(|module| self.lookup(&format!("{}, {}", name, module)))
        });

        match found {
            Some(ty) => {
                debug!(target: LOG_TARGET, "resolved type '{}' -> {:?}", name, ty);
                Some(self.types.entry(key).or_insert(ty).value().clone())
            }
            None => {
                trace!(target: LOG_TARGET, "type '{}' not resolvable yet", name);
                None
            }
        }
    }

    /// Resolves an `"Owner:Member"` descriptor with an exact parameter signature.
    ///
    /// When `params` is empty and no exact match exists, the first
    /// zero-parameter member of that name is accepted.
    pub fn resolve_method(&self, descriptor: &str, params: &[TypeHandle]) -> Option<MethodHandle> {
        let Some((owner, member)) = split_descriptor(descriptor) else {
            debug!(target: LOG_TARGET, "'{}' is not an Owner:Member descriptor", descriptor);
            return None;
        };

        let key = BindingKey::for_descriptor(owner, member, params);
        if let Some(hit) = self.methods.get(&key) {
            return Some(hit.value().clone());
        }

        let found = self
            .lookup(owner)
            .and_then(|ty| ty.find_method(member, params))
            .or_else(|| {
                let ty = self.resolve_type(owner)?;
                ty.find_method(member, params).or_else(|| {
                    if params.is_empty() {
                        first_parameterless(&ty, member)
                    } else {
                        None
                    }
                })
            });

        self.remember_method(key, found)
    }

    /// Exact-signature method lookup on an already resolved type.
    pub fn method(&self, ty: &TypeInfo, name: &str, params: &[TypeHandle]) -> Option<MethodHandle> {
        if name.is_empty() {
            return None;
        }
        let key = BindingKey::for_method(ty.full_name(), name, params);
        if let Some(hit) = self.methods.get(&key) {
            return Some(hit.value().clone());
        }
        let found = ty.find_method(name, params);
        self.remember_method(key, found)
    }

    /// Field of any visibility, declared or inherited.
    pub fn field(&self, ty: &TypeInfo, name: &str) -> Option<FieldHandle> {
        if name.is_empty() {
            return None;
        }
        let key = BindingKey::for_field(ty, name);
        if let Some(hit) = self.fields.get(&key) {
            return Some(hit.value().clone());
        }
        let found = ty.find_field(name)?;
        debug!(target: LOG_TARGET, "resolved {}", key);
        Some(self.fields.entry(key).or_insert(found).value().clone())
    }

    /// Property of any visibility, declared or inherited.
    pub fn property(&self, ty: &TypeInfo, name: &str) -> Option<PropertyHandle> {
        if name.is_empty() {
            return None;
        }
        let key = BindingKey::for_property(ty, name);
        if let Some(hit) = self.properties.get(&key) {
            return Some(hit.value().clone());
        }
        let found = ty.find_property(name)?;
        debug!(target: LOG_TARGET, "resolved {}", key);
        Some(self.properties.entry(key).or_insert(found).value().clone())
    }

    fn remember_method(&self, key: BindingKey, found: Option<MethodHandle>) -> Option<MethodHandle> {
        match found {
            Some(method) => {
                debug!(target: LOG_TARGET, "resolved {} -> {:?}", key, method);
                Some(self.methods.entry(key).or_insert(method).value().clone())
            }
            None => {
                trace!(target: LOG_TARGET, "{} not resolvable yet", key);
                None
            }
        }
    }

    /// Host lookup with faults folded into absence.
    fn lookup(&self, name: &str) -> Option<TypeHandle> {
        match self.host.find_type(name) {
            Ok(found) => found,
            Err(fault) => {
                debug!(target: LOG_TARGET, "lookup of '{}' faulted: {}", name, fault);
                None
            }
        }
    }
}

fn split_descriptor(descriptor: &str) -> Option<(&str, &str)> {
    let idx = descriptor.find(':')?;
    if idx == 0 {
        return None;
    }
    let (owner, member) = (descriptor[..idx].trim(), descriptor[idx + 1..].trim());
    if owner.is_empty() || member.is_empty() {
        return None;
    }
    Some((owner, member))
}

fn first_parameterless(ty: &TypeInfo, name: &str) -> Option<MethodHandle> {
    let candidates: Vec<MethodHandle> = ty
        .find_methods(name)
        .into_iter()
        .filter(|m| m.params().is_empty())
        .collect();
    if candidates.len() > 1 {
        warn!(
            target: LOG_TARGET,
            "{} has {} parameterless '{}' members; binding the first",
            ty.full_name(),
            candidates.len(),
            name
        );
    }
    candidates.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::{FieldInfo, MethodInfo, Module, PropertyInfo, Value, Visibility};
    use test_host::MemoryHost;

    fn resolver(host: &Arc<MemoryHost>) -> MemberResolver {
        MemberResolver::new(host.clone(), &ResolverConfig::default())
    }

    fn noop(name: &str, params: Vec<TypeHandle>) -> MethodInfo {
        MethodInfo::new(name, params, |_| Ok(Value::Null))
    }

    fn game_module(host: &MemoryHost) -> Vec<TypeHandle> {
        let int = host.builtins().int.clone();
        let boolean = host.builtins().boolean.clone();
        vec![
            TypeInfo::builder("VehicleClient", "Assembly-CSharp")
                .method(noop("HonkHorn", vec![]))
                .method(noop("HonkHorn", vec![int]))
                .build(),
            TypeInfo::builder("DoorBlocker", "Assembly-CSharp")
                .method(noop("DoorIsBlocked", vec![boolean]).with_visibility(Visibility::Private))
                .build(),
            TypeInfo::builder("Game.Spawner", "Assembly-CSharp")
                .method(noop("Spawn", vec![]).generic(1))
                .build(),
        ]
    }

    #[test]
    fn test_repeat_resolution_returns_same_handle() {
        let host = MemoryHost::new();
        host.load_module(Module::new("Assembly-CSharp", game_module(&host)));
        let resolver = resolver(&host);

        let a = resolver.resolve_type("VehicleClient").unwrap();
        let b = resolver.resolve_type("VehicleClient").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let m1 = resolver.resolve_method("VehicleClient:HonkHorn", &[]).unwrap();
        let calls = host.find_type_calls();
        let m2 = resolver.resolve_method("VehicleClient:HonkHorn", &[]).unwrap();
        assert!(Arc::ptr_eq(&m1, &m2));
        assert_eq!(host.find_type_calls(), calls);
    }

    #[test]
    fn test_overloads_do_not_collide() {
        let host = MemoryHost::new();
        host.load_module(Module::new("Assembly-CSharp", game_module(&host)));
        let resolver = resolver(&host);
        let int = host.builtins().int.clone();

        let with_int = resolver.resolve_method("VehicleClient:HonkHorn", &[int]).unwrap();
        let without = resolver.resolve_method("VehicleClient:HonkHorn", &[]).unwrap();

        assert_eq!(with_int.params().len(), 1);
        assert!(without.params().is_empty());
        assert!(!Arc::ptr_eq(&with_int, &without));
        assert_eq!(resolver.stats().methods, 2);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let host = MemoryHost::new();
        let resolver = resolver(&host);

        assert!(resolver.resolve_type("VehicleClient").is_none());
        assert!(resolver.resolve_method("VehicleClient:HonkHorn", &[]).is_none());
        assert_eq!(resolver.stats(), CacheStats::default());

        host.load_module(Module::new("Assembly-CSharp", game_module(&host)));

        assert!(resolver.resolve_type("VehicleClient").is_some());
        assert!(resolver.resolve_method("VehicleClient:HonkHorn", &[]).is_some());
    }

    #[test]
    fn test_fallback_module_suffix() {
        let host = MemoryHost::new();
        // Only reachable through its qualified name.
        host.set_bare_lookup(false);
        host.load_module(Module::new("Assembly-CSharp", game_module(&host)));
        let resolver = resolver(&host);

        let ty = resolver.resolve_type("DoorBlocker").unwrap();
        assert_eq!(ty.module(), "Assembly-CSharp");
        assert!(resolver.resolve_type("DoorBlocker, Unity.Addressables").is_none());
    }

    #[test]
    fn test_parameterless_fallback_binds_generic_definition() {
        let host = MemoryHost::new();
        host.load_module(Module::new("Assembly-CSharp", game_module(&host)));
        let resolver = resolver(&host);
        let int = host.builtins().int.clone();

        let spawn = resolver.resolve_method("Game.Spawner:Spawn", &[]).unwrap();
        assert!(spawn.is_generic_definition());
        assert!(resolver.resolve_method("Game.Spawner:Spawn", &[int]).is_none());
    }

    #[test]
    fn test_malformed_descriptors() {
        let host = MemoryHost::new();
        host.load_module(Module::new("Assembly-CSharp", game_module(&host)));
        let resolver = resolver(&host);

        assert!(resolver.resolve_method("VehicleClient", &[]).is_none());
        assert!(resolver.resolve_method(":HonkHorn", &[]).is_none());
        assert!(resolver.resolve_method("VehicleClient:", &[]).is_none());
        assert!(resolver.resolve_type("  ").is_none());
    }

    #[test]
    fn test_lookup_faults_are_absence() {
        let host = MemoryHost::new();
        host.load_module(Module::new("Assembly-CSharp", game_module(&host)));
        host.set_lookup_fault(true);
        let resolver = resolver(&host);

        assert!(resolver.resolve_type("VehicleClient").is_none());
        assert!(resolver.resolve_method("VehicleClient:HonkHorn", &[]).is_none());

        host.set_lookup_fault(false);
        assert!(resolver.resolve_type("VehicleClient").is_some());
    }

    #[test]
    fn test_private_members_and_keys() {
        let host = MemoryHost::new();
        host.load_module(Module::new("Assembly-CSharp", game_module(&host)));
        let resolver = resolver(&host);
        let boolean = host.builtins().boolean.clone();

        let blocker = resolver.resolve_type("DoorBlocker").unwrap();
        let m = resolver.method(&blocker, "DoorIsBlocked", &[boolean.clone()]).unwrap();
        assert_eq!(m.visibility(), Visibility::Private);
        assert!(resolver.method(&blocker, "DoorIsBlocked", &[]).is_none());

        assert_eq!(
            BindingKey::for_method("DoorBlocker", "DoorIsBlocked", &[boolean]).to_string(),
            "DoorBlocker:DoorIsBlocked|System.Boolean"
        );
        assert_eq!(
            BindingKey::for_field(&blocker, "objectID").to_string(),
            "DoorBlocker.objectID#field"
        );
    }

    #[test]
    fn test_lenient_descriptor_bind_does_not_leak_into_exact_lookup() {
        let host = MemoryHost::new();
        host.load_module(Module::new("Assembly-CSharp", game_module(&host)));
        let resolver = resolver(&host);

        let spawner = resolver.resolve_type("Game.Spawner").unwrap();
        assert!(resolver.resolve_method("Game.Spawner:Spawn", &[]).unwrap().is_generic_definition());
        assert!(resolver.method(&spawner, "Spawn", &[]).is_none());
    }

    fn blocker_with_members() -> TypeHandle {
        TypeInfo::builder("DoorBlocker", "Assembly-CSharp")
            .field(FieldInfo::new("blockCount").with_visibility(Visibility::Private))
            .property(PropertyInfo::backed_by("IsOpen", "open").with_visibility(Visibility::Internal))
            .build()
    }

    #[test]
    fn test_field_and_property_cached_with_any_visibility() {
        let host = MemoryHost::new();
        let resolver = resolver(&host);
        let blocker = blocker_with_members();

        let f1 = resolver.field(&blocker, "blockCount").unwrap();
        let f2 = resolver.field(&blocker, "blockCount").unwrap();
        assert!(Arc::ptr_eq(&f1, &f2));
        assert_eq!(f1.visibility(), Visibility::Private);

        let p1 = resolver.property(&blocker, "IsOpen").unwrap();
        let p2 = resolver.property(&blocker, "IsOpen").unwrap();
        assert!(Arc::ptr_eq(&p1, &p2));
        assert_eq!(p1.visibility(), Visibility::Internal);

        assert!(resolver.field(&blocker, "IsOpen").is_none());
        assert!(resolver.property(&blocker, "").is_none());
        assert_eq!(resolver.stats().fields, 1);
        assert_eq!(resolver.stats().properties, 1);
    }

    #[test]
    fn test_missing_field_and_property_are_not_cached() {
        let host = MemoryHost::new();
        let resolver = resolver(&host);
        let early = TypeInfo::builder("DoorBlocker", "Assembly-CSharp").build();

        assert!(resolver.field(&early, "blockCount").is_none());
        assert!(resolver.property(&early, "IsOpen").is_none());
        assert_eq!(resolver.stats(), CacheStats::default());

        let loaded = blocker_with_members();
        assert!(resolver.field(&loaded, "blockCount").is_some());
        assert!(resolver.property(&loaded, "IsOpen").is_some());
    }
}
