//! Dynamic binding to a host runtime that is not linked at build time:
//! member resolution by name and the host's async content loader.

mod completion;
mod hooks;
mod hosting;
mod loader;
mod resolver;

pub use completion::{Continuation, RequestState};
pub use hooks::{HookRegistry, HookTarget, Mod, ModContext};
pub use hosting::{attach_host, binding, Binding};
pub use loader::{Capability, ContentLoader, InstantiateShape, LoaderCapabilities};
pub use resolver::{BindingKey, CacheStats, MemberResolver};

use api::{
    FieldHandle, HostFault, MethodHandle, ObjectRef, PayloadKind, PropertyHandle, Quat,
    TypeHandle, TypeInfo, Vec3,
};
use log::warn;

/// Errors specific to attaching hosts and mods
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("A host is already attached")]
    HostAlreadyAttached,
    #[error("No host attached")]
    HostNotAttached,
    #[error("Hook target not found: {0}")]
    HookTargetNotFound(String),
    #[error("Mod {name} failed to initialize: {message}")]
    ModInit { name: String, message: String },
    #[error(transparent)]
    Host(#[from] HostFault),
}

pub fn resolve_type(name: &str) -> Option<TypeHandle> {
    binding()?.resolver().resolve_type(name)
}

pub fn resolve_method(descriptor: &str, params: &[TypeHandle]) -> Option<MethodHandle> {
    binding()?.resolver().resolve_method(descriptor, params)
}

pub fn method(ty: &TypeInfo, name: &str, params: &[TypeHandle]) -> Option<MethodHandle> {
    binding()?.resolver().method(ty, name, params)
}

pub fn field(ty: &TypeInfo, name: &str) -> Option<FieldHandle> {
    binding()?.resolver().field(ty, name)
}

pub fn property(ty: &TypeInfo, name: &str) -> Option<PropertyHandle> {
    binding()?.resolver().property(ty, name)
}

pub fn load_async<K, F>(address: &str, on_loaded: F)
where
    K: PayloadKind,
    F: FnOnce(Option<ObjectRef>) + Send + 'static,
{
    match binding() {
        Some(binding) => binding.loader().load_async::<K, F>(address, on_loaded),
        None => {
            warn!("No host attached. Cannot load '{}'.", address);
            on_loaded(None);
        }
    }
}

pub fn instantiate_async<F>(address: &str, position: Vec3, rotation: Quat, on_instantiated: F)
where
    F: FnOnce(Option<ObjectRef>) + Send + 'static,
{
    match binding() {
        Some(binding) => binding
            .loader()
            .instantiate_async(address, position, rotation, on_instantiated),
        None => {
            warn!("No host attached. Cannot instantiate '{}'.", address);
            on_instantiated(None);
        }
    }
}

pub fn release(asset: &ObjectRef) -> bool {
    binding().is_some_and(|b| b.loader().release(asset))
}

pub fn release_instance(instance: &ObjectRef) {
    if let Some(binding) = binding() {
        binding.loader().release_instance(instance);
    }
}

pub fn is_available() -> bool {
    binding().is_some_and(|b| b.loader().is_available())
}

pub fn initialization_error() -> Option<&'static str> {
    match binding() {
        Some(binding) => binding.loader().initialization_error(),
        None => Some("No host attached"),
    }
}
