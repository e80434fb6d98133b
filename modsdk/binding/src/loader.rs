//! Loads and instantiates content through the host's async loader, found by
//! name and parameter shape the first time it is needed.

use api::{
    GameObject, HostFault, MethodHandle, MethodInfo, ObjectRef, PayloadKind, Placement, Quat, TypeHandle,
    TypeInfo, Value, Vec3, Visibility,
};
use common::{LoaderConfig, SDK_VERSION};
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use std::sync::Arc;

use crate::completion::{CompletionAdapter, Continuation, HandleShape, LoadRequest};
use crate::resolver::MemberResolver;

pub(crate) const LOG_TARGET: &str = "content_loader";

/// An optional feature of the host API, decided once at probe time.
#[derive(Debug, Clone)]
pub enum Capability<T> {
    Present(T),
    Absent,
}

impl<T> Capability<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Capability::Present(_))
    }

    pub fn present(&self) -> Option<&T> {
        match self {
            Capability::Present(inner) => Some(inner),
            Capability::Absent => None,
        }
    }
}

impl<T> From<Option<T>> for Capability<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Capability::Absent, Capability::Present)
    }
}

#[derive(Debug, Clone)]
pub enum InstantiateShape {
    /// `(key, position, rotation, parent)`
    Placed(MethodHandle),
    /// `(key)`; placement has to be applied after completion.
    KeyOnly(MethodHandle),
}

#[derive(Debug, Clone)]
pub struct LoaderCapabilities {
    pub load: Capability<MethodHandle>,
    pub instantiate: Capability<InstantiateShape>,
    pub release: Capability<MethodHandle>,
}

impl LoaderCapabilities {
    pub fn absent() -> Self {
        Self {
            load: Capability::Absent,
            instantiate: Capability::Absent,
            release: Capability::Absent,
        }
    }

    /// Shape-matches the loader's public static methods on `root`.
    pub fn probe(root: &TypeInfo, config: &LoaderConfig) -> Self {
        let statics: Vec<&MethodHandle> = root
            .methods()
            .iter()
            .filter(|m| m.is_static() && m.visibility() == Visibility::Public)
            .collect();
        let load = statics
            .iter()
            .find(|m| {
                m.name() == config.load_method
                    && m.generic_arity() == 1
                    && m.params().len() == 1
                    && param_is(m, 0, &config.key_type)
            })
            .map(|m| (*m).clone());

        let mut instantiate = None;
        let mut key_only = None;
        for m in statics
            .iter()
            .filter(|m| m.name() == config.instantiate_method && !m.is_generic_definition())
        {
            let placed = m.params().len() == 4
                && param_is(m, 0, &config.key_type)
                && param_is(m, 1, &config.position_type)
                && param_is(m, 2, &config.rotation_type)
                && param_is(m, 3, &config.parent_type);
            if placed {
                instantiate = Some(InstantiateShape::Placed((*m).clone()));
                break;
            }
            if key_only.is_none() && m.params().len() == 1 && param_is(m, 0, &config.key_type) {
                key_only = Some(InstantiateShape::KeyOnly((*m).clone()));
            }
        }

        let release = statics
            .iter()
            .find(|m| {
                m.name() == config.release_method
                    && m.generic_arity() == 1
                    && m.params().len() == 1
            })
            .map(|m| (*m).clone());

        Self {
            load: load.into(),
            instantiate: instantiate.or(key_only).into(),
            release: release.into(),
        }
    }
}

fn param_is(method: &MethodInfo, index: usize, type_name: &str) -> bool {
    method
        .params()
        .get(index)
        .is_some_and(|p| p.full_name() == type_name)
}

struct LoaderState {
    root: Option<TypeHandle>,
    capabilities: LoaderCapabilities,
    error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum DispatchError {
    #[error(transparent)]
    Host(#[from] HostFault),
    #[error("null handle")]
    NullHandle,
    #[error("no {0} event on {1}")]
    NoCompletionChannel(String, String),
}

pub struct ContentLoader {
    resolver: Arc<MemberResolver>,
    config: LoaderConfig,
    shape: HandleShape,
    state: OnceCell<LoaderState>,
}

impl ContentLoader {
    pub fn new(resolver: Arc<MemberResolver>, config: LoaderConfig) -> Self {
        Self {
            shape: HandleShape::from(&config),
            resolver,
            config,
            state: OnceCell::new(),
        }
    }

    pub fn resolver(&self) -> &Arc<MemberResolver> {
        &self.resolver
    }

    /// True once the loader's root type has been found. Probes on first call.
    pub fn is_available(&self) -> bool {
        self.state().root.is_some()
    }

    pub fn initialization_error(&self) -> Option<&str> {
        self.state().error.as_deref()
    }

    pub fn capabilities(&self) -> &LoaderCapabilities {
        &self.state().capabilities
    }

    pub fn load_async<K, F>(&self, address: &str, on_loaded: F)
    where
        K: PayloadKind,
        F: FnOnce(Option<ObjectRef>) + Send + 'static,
    {
        if !self.capabilities().load.is_present() {
            self.unavailable("LoadAssetAsync", address, Box::new(on_loaded));
            return;
        }
        match self.resolver.resolve_type(K::TYPE_NAME) {
            Some(payload) => self.load_async_as(address, &payload, on_loaded),
            None => {
                warn!(
                    target: LOG_TARGET,
                    "Payload type {} is not loaded. Cannot load '{}'.",
                    K::TYPE_NAME,
                    address
                );
                on_loaded(None);
            }
        }
    }

    pub fn load_game_object<F>(&self, address: &str, on_loaded: F)
    where
        F: FnOnce(Option<ObjectRef>) + Send + 'static,
    {
        self.load_async::<GameObject, F>(address, on_loaded)
    }

    /// Loads `address` as the runtime type `payload`.
    pub fn load_async_as<F>(&self, address: &str, payload: &TypeHandle, on_loaded: F)
    where
        F: FnOnce(Option<ObjectRef>) + Send + 'static,
    {
        let Some(load) = self.capabilities().load.present().cloned() else {
            self.unavailable("LoadAssetAsync", address, Box::new(on_loaded));
            return;
        };

        let request = LoadRequest::new(address, Box::new(on_loaded));
        let adapter = CompletionAdapter::load(request.clone(), self.shape.clone(), payload.clone());
        let dispatched = load
            .make_generic(std::slice::from_ref(payload))
            .and_then(|bound| bound.invoke(None, &[Value::from(address)]))
            .map_err(DispatchError::from)
            .and_then(|handle| self.subscribe(&request, handle, adapter));

        if let Err(e) = dispatched {
            warn!(target: LOG_TARGET, "Load failed '{}': {}", address, e);
            request.fire(None);
        }
    }

    pub fn instantiate_async<F>(&self, address: &str, position: Vec3, rotation: Quat, on_instantiated: F)
    where
        F: FnOnce(Option<ObjectRef>) + Send + 'static,
    {
        let placement = Placement::new(position, rotation);
        let shape = match self.capabilities().instantiate.present().cloned() {
            Some(shape) => shape,
            None => {
                self.instantiate_by_clone(address, placement, Box::new(on_instantiated));
                return;
            }
        };

        let Some(payload) = self.resolver.resolve_type(GameObject::TYPE_NAME) else {
            warn!(
                target: LOG_TARGET,
                "Payload type {} is not loaded. Cannot instantiate '{}'.",
                GameObject::TYPE_NAME,
                address
            );
            on_instantiated(None);
            return;
        };

        let (method, args, post_placement) = match shape {
            InstantiateShape::Placed(method) => (
                method,
                vec![
                    Value::from(address),
                    Value::Vec3(position),
                    Value::Quat(rotation),
                    Value::Null,
                ],
                None,
            ),
            InstantiateShape::KeyOnly(method) => (method, vec![Value::from(address)], Some(placement)),
        };

        let request = LoadRequest::new(address, Box::new(on_instantiated));
        let adapter = CompletionAdapter::instantiate(request.clone(), self.shape.clone(), payload, post_placement);
        let dispatched = method
            .invoke(None, &args)
            .map_err(DispatchError::from)
            .and_then(|handle| self.subscribe(&request, handle, adapter));

        if let Err(e) = dispatched {
            warn!(target: LOG_TARGET, "Instantiate failed '{}': {}", address, e);
            request.fire(None);
        }
    }

    pub fn instantiate_at_origin<F>(&self, address: &str, on_instantiated: F)
    where
        F: FnOnce(Option<ObjectRef>) + Send + 'static,
    {
        self.instantiate_async(address, Vec3::ZERO, Quat::IDENTITY, on_instantiated)
    }

    /// Hands a loaded asset back to the host. Returns whether the host accepted it.
    pub fn release(&self, asset: &ObjectRef) -> bool {
        let Some(release) = self.capabilities().release.present().cloned() else {
            warn!(target: LOG_TARGET, "Release not available. '{}' may leak memory.", asset.name());
            return false;
        };
        let released = release
            .make_generic(std::slice::from_ref(asset.type_handle()))
            .and_then(|bound| bound.invoke(None, &[Value::Object(asset.clone())]));
        match released {
            Ok(_) => true,
            Err(fault) => {
                warn!(target: LOG_TARGET, "Release failed for '{}': {}", asset.name(), fault);
                false
            }
        }
    }

    /// Releases an instantiated object, destroying it directly if the host
    /// cannot take it back.
    pub fn release_instance(&self, instance: &ObjectRef) {
        if self.capabilities().release.is_present() && self.release(instance) {
            return;
        }
        match self.resolver.host().scene() {
            Some(scene) => {
                if let Err(fault) = scene.destroy(instance) {
                    warn!(target: LOG_TARGET, "Destroy failed for '{}': {}", instance.name(), fault);
                }
            }
            None => warn!(target: LOG_TARGET, "No scene to destroy '{}' in.", instance.name()),
        }
    }

    fn state(&self) -> &LoaderState {
        self.state.get_or_init(|| self.probe())
    }

    fn probe(&self) -> LoaderState {
        let root = match self.find_root() {
            Ok(Some(root)) => root,
            Ok(None) => {
                let error = format!(
                    "{} not loaded. Ensure the {} module is installed.",
                    self.config.root_type, self.config.root_module
                );
                warn!(target: LOG_TARGET, "{}", error);
                return LoaderState {
                    root: None,
                    capabilities: LoaderCapabilities::absent(),
                    error: Some(error),
                };
            }
            Err(fault) => {
                warn!(target: LOG_TARGET, "Init failed: {}", fault);
                return LoaderState {
                    root: None,
                    capabilities: LoaderCapabilities::absent(),
                    error: Some(fault.to_string()),
                };
            }
        };

        let capabilities = LoaderCapabilities::probe(&root, &self.config);
        info!(
            target: LOG_TARGET,
            "v{} initialized. Load={}, Instantiate={}, Release={}",
            SDK_VERSION,
            capabilities.load.is_present(),
            match capabilities.instantiate {
                Capability::Present(InstantiateShape::Placed(_)) => "placed",
                Capability::Present(InstantiateShape::KeyOnly(_)) => "key-only",
                Capability::Absent => "absent",
            },
            capabilities.release.is_present()
        );
        LoaderState {
            root: Some(root),
            capabilities,
            error: None,
        }
    }

    /// Direct lookup of the root type, then a scan of matching modules.
    fn find_root(&self) -> Result<Option<TypeHandle>, HostFault> {
        let host = self.resolver.host();
        let qualified = format!("{}, {}", self.config.root_type, self.config.root_module);
        match host.find_type(&qualified) {
            Ok(Some(root)) => return Ok(Some(root)),
            Ok(None) => {}
            Err(fault) => debug!(target: LOG_TARGET, "direct lookup of {} faulted: {}", qualified, fault),
        }

        Ok(host
            .modules()?
            .iter()
            .filter(|m| m.name().starts_with(&self.config.root_module))
            .find_map(|m| m.get_type(&self.config.root_type)))
    }

    fn subscribe(
        &self,
        request: &Arc<LoadRequest>,
        handle: Value,
        adapter: CompletionAdapter,
    ) -> Result<(), DispatchError> {
        let object = handle.as_object().ok_or(DispatchError::NullHandle)?;
        let event = object
            .type_handle()
            .find_event(&self.config.completed_event)
            .ok_or_else(|| {
                DispatchError::NoCompletionChannel(
                    self.config.completed_event.clone(),
                    object.type_handle().full_name().to_string(),
                )
            })?;
        request.mark_dispatched();
        event.subscribe(&handle, adapter.into_delegate(event.handler_shape().clone()))?;
        Ok(())
    }

    fn instantiate_by_clone(&self, address: &str, placement: Placement, on_instantiated: Continuation) {
        debug!(target: LOG_TARGET, "no instantiate capability; cloning '{}' locally", address);
        let scene = self.resolver.host().scene();
        let owned = address.to_string();
        self.load_game_object(address, move |template| {
            let instance = template.and_then(|template| match &scene {
                Some(scene) => match scene.instantiate(&template, placement) {
                    Ok(instance) => Some(instance),
                    Err(fault) => {
                        warn!(target: LOG_TARGET, "Instantiate failed '{}': {}", owned, fault);
                        None
                    }
                },
                None => {
                    warn!(target: LOG_TARGET, "No scene to instantiate '{}' into.", owned);
                    None
                }
            });
            on_instantiated(instance);
        });
    }

    fn unavailable(&self, capability: &str, address: &str, continuation: Continuation) {
        warn!(
            target: LOG_TARGET,
            "{} not available. Cannot load '{}'.",
            capability, address
        );
        continuation(None);
    }
}
