//! Adapters between a foreign completion channel and a caller's continuation.

use api::{Delegate, HostFault, ObjectRef, Placement, TypeHandle, TypeInfo, Value};
use common::LoaderConfig;
use log::{debug, trace, warn};
use std::sync::{Arc, Mutex};

use crate::loader::LOG_TARGET;

/// Receives the loaded object, or `None` when nothing could be delivered.
pub type Continuation = Box<dyn FnOnce(Option<ObjectRef>) + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Created,
    Dispatched,
    Succeeded,
    Failed,
}

/// One pending request whose continuation runs at most once.
pub(crate) struct LoadRequest {
    address: String,
    inner: Mutex<(RequestState, Option<Continuation>)>,
}

impl LoadRequest {
    pub(crate) fn new(address: impl Into<String>, continuation: Continuation) -> Arc<Self> {
        Arc::new(Self {
            address: address.into(),
            inner: Mutex::new((RequestState::Created, Some(continuation))),
        })
    }

    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    pub(crate) fn state(&self) -> RequestState {
        match self.inner.lock() {
            Ok(inner) => inner.0,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    pub(crate) fn mark_dispatched(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            if inner.0 == RequestState::Created {
                inner.0 = RequestState::Dispatched;
            }
        }
    }

    /// Runs the continuation unless it already ran. Returns whether it ran.
    pub(crate) fn fire(&self, result: Option<ObjectRef>) -> bool {
        let continuation = {
            let mut inner = match self.inner.lock() {
                Ok(inner) => inner,
                Err(poisoned) => poisoned.into_inner(),
            };
            let taken = inner.1.take();
            if taken.is_some() {
                inner.0 = if result.is_some() {
                    RequestState::Succeeded
                } else {
                    RequestState::Failed
                };
            }
            taken
        };

        match continuation {
            Some(continuation) => {
                trace!(target: LOG_TARGET, "delivering '{}' (found: {})", self.address, result.is_some());
                continuation(result);
                true
            }
            None => {
                debug!(target: LOG_TARGET, "duplicate completion for '{}' ignored", self.address);
                false
            }
        }
    }
}

/// Member names used to read a completed handle.
#[derive(Debug, Clone)]
pub(crate) struct HandleShape {
    status: String,
    result: String,
    exception: String,
    succeeded: i64,
}

impl From<&LoaderConfig> for HandleShape {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            status: config.status_member.clone(),
            result: config.result_member.clone(),
            exception: config.exception_member.clone(),
            succeeded: config.succeeded_status,
        }
    }
}

/// Subscribed to a handle's completion channel on behalf of one request.
pub(crate) struct CompletionAdapter {
    request: Arc<LoadRequest>,
    shape: HandleShape,
    verb: &'static str,
    payload: Option<TypeHandle>,
    placement: Option<Placement>,
}

impl CompletionAdapter {
    pub(crate) fn load(request: Arc<LoadRequest>, shape: HandleShape, payload: TypeHandle) -> Self {
        Self {
            request,
            shape,
            verb: "Load",
            payload: Some(payload),
            placement: None,
        }
    }

    /// `placement` is applied to the result when the foreign call could not take it.
    pub(crate) fn instantiate(
        request: Arc<LoadRequest>,
        shape: HandleShape,
        payload: TypeHandle,
        placement: Option<Placement>,
    ) -> Self {
        Self {
            request,
            shape,
            verb: "Instantiate",
            payload: Some(payload),
            placement,
        }
    }

    pub(crate) fn into_delegate(self, shape: TypeHandle) -> Delegate {
        Delegate::new(shape, move |handle| self.on_completed(handle))
    }

    fn on_completed(&self, handle: Value) {
        match self.decode(&handle) {
            Ok(result) => {
                self.request.fire(result);
            }
            Err(fault) => {
                warn!(target: LOG_TARGET, "Callback error '{}': {}", self.request.address(), fault);
                self.request.fire(None);
            }
        }
    }

    fn decode(&self, handle: &Value) -> Result<Option<ObjectRef>, HostFault> {
        let object = handle
            .as_object()
            .ok_or_else(|| HostFault::NullTarget("completed handle".to_string()))?;
        let ty = object.type_handle();
        let address = self.request.address();

        if let Some(status) = read_member(ty, handle, &self.shape.status)? {
            let code = status.as_int().ok_or_else(|| {
                HostFault::Raised(format!("status is a {}, not a number", status.kind()))
            })?;
            if code != self.shape.succeeded {
                let cause = read_member(ty, handle, &self.shape.exception)
                    .ok()
                    .flatten()
                    .and_then(|v| v.as_message().map(str::to_string))
                    .unwrap_or_else(|| "Unknown error".to_string());
                warn!(target: LOG_TARGET, "{} failed '{}': {}", self.verb, address, cause);
                return Ok(None);
            }
        }

        let mut result = read_member(ty, handle, &self.shape.result)?.and_then(Value::into_object);
        let mismatched = match (&result, &self.payload) {
            (Some(found), Some(payload)) if !found.is_instance_of(payload) => {
                warn!(
                    target: LOG_TARGET,
                    "{} '{}' produced a {}, not a {}",
                    self.verb,
                    address,
                    found.type_handle().full_name(),
                    payload.full_name()
                );
                true
            }
            _ => false,
        };
        if mismatched {
            result = None;
        }

        match &result {
            Some(object) => {
                if let Some(placement) = self.placement {
                    object.set_placement(placement);
                }
            }
            None => warn!(
                target: LOG_TARGET,
                "{} succeeded but result is null for '{}'. Check if the address exists in the catalog.",
                self.verb,
                address
            ),
        }
        Ok(result)
    }
}

/// Property first, then field; null reads as absent.
fn read_member(ty: &TypeInfo, target: &Value, name: &str) -> Result<Option<Value>, HostFault> {
    let value = if let Some(property) = ty.find_property(name) {
        property.get(Some(target))?
    } else if let Some(field) = ty.find_field(name) {
        field.get(Some(target))?
    } else {
        return Ok(None);
    };
    Ok((!value.is_null()).then_some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use api::{FieldInfo, Object, PropertyInfo};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(count: &Arc<AtomicUsize>, seen: &Arc<Mutex<Vec<Option<u64>>>>) -> Continuation {
        let count = count.clone();
        let seen = seen.clone();
        Box::new(move |result| {
            count.fetch_add(1, Ordering::SeqCst);
            seen.lock().unwrap().push(result.map(|o| o.id()));
        })
    }

    fn handle_type() -> TypeHandle {
        TypeInfo::builder("AsyncOperationHandle`1", "Unity.ResourceManager")
            .property(PropertyInfo::backed_by("Status", "status"))
            .property(PropertyInfo::backed_by("Result", "result"))
            .field(FieldInfo::new("OperationException"))
            .build()
    }

    fn shape() -> HandleShape {
        HandleShape::from(&LoaderConfig::default())
    }

    #[test]
    fn test_request_fires_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let request = LoadRequest::new("Pack/Widget", counting(&count, &seen));
        assert_eq!(request.state(), RequestState::Created);
        request.mark_dispatched();
        assert_eq!(request.state(), RequestState::Dispatched);

        assert!(request.fire(None));
        assert!(!request.fire(None));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(request.state(), RequestState::Failed);
    }

    #[test]
    fn test_failed_status_delivers_none() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let request = LoadRequest::new("Pack/Widget", counting(&count, &seen));
        let mut delegate = CompletionAdapter::load(request.clone(), shape(), TypeInfo::primitive("Asset"))
            .into_delegate(TypeInfo::primitive("System.Action`1"));

        let op = Object::new("op", handle_type());
        op.set_slot("status", 2);
        op.set_slot("OperationException", Value::Exception("not found".into()));
        delegate.invoke(Value::from(op.clone()));
        delegate.invoke(Value::from(op));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![None]);
        assert_eq!(request.state(), RequestState::Failed);
    }

    #[test]
    fn test_success_delivers_result_and_applies_placement() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let request = LoadRequest::new("Pack/Widget", counting(&count, &seen));
        let at = Placement::new(api::Vec3::new(4.0, 0.0, 1.0), api::Quat::from_rotation_y(1.0));
        let game_object = TypeInfo::primitive("UnityEngine.GameObject");
        let mut delegate = CompletionAdapter::instantiate(request.clone(), shape(), game_object.clone(), Some(at))
            .into_delegate(TypeInfo::primitive("System.Action`1"));

        let widget = Object::new("Widget", game_object);
        let op = Object::new("op", handle_type());
        op.set_slot("status", 1);
        op.set_slot("result", widget.clone());
        delegate.invoke(Value::from(op));

        assert_eq!(*seen.lock().unwrap(), vec![Some(widget.id())]);
        assert_eq!(widget.placement(), at);
        assert_eq!(request.state(), RequestState::Succeeded);
    }

    #[test]
    fn test_wrong_payload_type_is_null() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let request = LoadRequest::new("Sfx/Honk", counting(&count, &seen));
        let mut delegate = CompletionAdapter::load(request, shape(), TypeInfo::primitive("UnityEngine.AudioClip"))
            .into_delegate(TypeInfo::primitive("System.Action`1"));

        let op = Object::new("op", handle_type());
        op.set_slot("status", 1);
        op.set_slot("result", Object::new("Widget", TypeInfo::primitive("UnityEngine.GameObject")));
        delegate.invoke(Value::from(op));

        assert_eq!(*seen.lock().unwrap(), vec![None]);
    }

    #[test]
    fn test_undecodable_handle_still_fires() {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let request = LoadRequest::new("Pack/Widget", counting(&count, &seen));
        let mut delegate = CompletionAdapter::load(request, shape(), TypeInfo::primitive("Asset"))
            .into_delegate(TypeInfo::primitive("System.Action`1"));

        let op = Object::new("op", handle_type());
        op.set_slot("status", "succeeded?");
        delegate.invoke(Value::from(op));
        delegate.invoke(Value::Null);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(*seen.lock().unwrap(), vec![None]);
    }
}
