use glam::Vec3;
use std::sync::Arc;

use crate::types::{MethodHandle, TypeHandle, TypeInfo};
use crate::value::{ObjectRef, Placement, Value};
use crate::HostFault;

pub type ModuleHandle = Arc<Module>;

/// A separately built unit of foreign code (an assembly, a shared library...).
#[derive(Debug)]
pub struct Module {
    name: String,
    types: Vec<TypeHandle>,
}

impl Module {
    pub fn new(name: impl Into<String>, types: Vec<TypeHandle>) -> ModuleHandle {
        Arc::new(Self {
            name: name.into(),
            types,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn types(&self) -> &[TypeHandle] {
        &self.types
    }

    pub fn get_type(&self, full_name: &str) -> Option<TypeHandle> {
        self.types
            .iter()
            .find(|t| t.full_name() == full_name)
            .cloned()
    }
}

/// Callback run after a patched foreign method returns, given its instance.
pub type PostfixHook = Box<dyn FnMut(&Value) + Send>;

/// The foreign runtime's type namespace.
///
/// Availability of any name is time-varying: host subsystems load modules
/// progressively, so every query must be safe to repeat.
pub trait HostRuntime: Send + Sync {
    /// Snapshot of the modules loaded right now.
    fn modules(&self) -> Result<Vec<ModuleHandle>, HostFault>;

    /// Direct lookup by bare full name or `"Full.Name, Module"`.
    fn find_type(&self, name: &str) -> Result<Option<TypeHandle>, HostFault> {
        Ok(lookup_type(&self.modules()?, name))
    }

    fn scene(&self) -> Option<Arc<dyn Scene>> {
        None
    }

    fn install_postfix(&self, method: &MethodHandle, _hook: PostfixHook) -> Result<(), HostFault> {
        Err(HostFault::Unsupported(format!(
            "postfix hooks (requested for {})",
            method.name()
        )))
    }
}

/// Name lookup over a module snapshot.
///
/// A qualified name only matches inside its module. A bare name matches a
/// full name in any module first, then a short (namespace-less) name.
pub fn lookup_type(modules: &[ModuleHandle], name: &str) -> Option<TypeHandle> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    if let Some((type_name, module_name)) = name.split_once(',') {
        let (type_name, module_name) = (type_name.trim(), module_name.trim());
        return modules
            .iter()
            .filter(|m| m.name() == module_name)
            .find_map(|m| m.get_type(type_name));
    }

    modules
        .iter()
        .find_map(|m| m.get_type(name))
        .or_else(|| {
            modules
                .iter()
                .flat_map(|m| m.types().iter())
                .find(|t| t.name() == name)
                .cloned()
        })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Search {
    SelfAndParents,
    SelfAndChildren,
}

/// Object-graph primitives of the host environment.
pub trait Scene: Send + Sync {
    /// Clone `template` into the world at `placement`.
    fn instantiate(&self, template: &ObjectRef, placement: Placement) -> Result<ObjectRef, HostFault>;

    fn destroy(&self, object: &ObjectRef) -> Result<(), HostFault>;

    fn overlap_sphere(&self, origin: Vec3, radius: f32) -> Result<Vec<ObjectRef>, HostFault>;

    fn find_component(&self, object: &ObjectRef, ty: &TypeInfo, search: Search) -> Option<ObjectRef>;

    fn key_held(&self, key: char) -> bool;

    fn play_clip_at(&self, clip: &ObjectRef, position: Vec3);
}

/// A payload type the loader can be asked for, named as the host knows it.
pub trait PayloadKind {
    const TYPE_NAME: &'static str;
}

pub struct GameObject;

impl PayloadKind for GameObject {
    const TYPE_NAME: &'static str = "UnityEngine.GameObject";
}

pub struct AudioClip;

impl PayloadKind for AudioClip {
    const TYPE_NAME: &'static str = "UnityEngine.AudioClip";
}
