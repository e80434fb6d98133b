use api::{
    CallFrame, Delegate, EventInfo, HostFault, MethodInfo, Module, Object, ObjectRef, Placement,
    PropertyInfo, TypeHandle, TypeInfo, Value,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::{MemoryHost, MemoryScene};

pub const ROOT_TYPE: &str = "UnityEngine.AddressableAssets.Addressables";
pub const ROOT_MODULE: &str = "Unity.Addressables";
pub const HANDLE_TYPE: &str = "UnityEngine.ResourceManagement.AsyncOperations.AsyncOperationHandle";
pub const HANDLE_MODULE: &str = "Unity.ResourceManager";

const STATUS_NONE: i64 = 0;
const STATUS_SUCCEEDED: i64 = 1;
const STATUS_FAILED: i64 = 2;

/// What the catalog holds for an address.
#[derive(Clone)]
pub enum Entry {
    Asset(ObjectRef),
    Failure(String),
    SucceedNull,
    /// The load call itself returns a null handle.
    NullHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Handles complete before the call returns.
    Immediate,
    /// Handles stay pending until `complete` or `complete_all`.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstantiateKind {
    Placed,
    KeyOnly,
    Both,
    Missing,
}

/// Which loader entry points the fake root type exposes.
#[derive(Debug, Clone, Copy)]
pub struct Shapes {
    pub load: bool,
    pub instantiate: InstantiateKind,
    pub release: bool,
    pub completed_event: bool,
}

impl Default for Shapes {
    fn default() -> Self {
        Self {
            load: true,
            instantiate: InstantiateKind::Placed,
            release: true,
            completed_event: true,
        }
    }
}

#[derive(Clone, Copy)]
enum OpKind {
    Load,
    Instantiate(Placement),
}

struct PendingOp {
    address: String,
    handle: ObjectRef,
    kind: OpKind,
}

struct State {
    catalog: RwLock<HashMap<String, Entry>>,
    completion: RwLock<Completion>,
    pending: Mutex<Vec<PendingOp>>,
    listeners: Mutex<HashMap<u64, Vec<Delegate>>>,
    scene: Arc<MemoryScene>,
    handle_type: RwLock<Option<TypeHandle>>,
    load_calls: AtomicUsize,
    instantiate_calls: AtomicUsize,
    released: Mutex<Vec<u64>>,
    duplicate: AtomicBool,
}

/// A scriptable stand-in for the host's addressable asset system.
pub struct FakeAddressables {
    state: Arc<State>,
    root: TypeHandle,
    handle_type: TypeHandle,
}

impl FakeAddressables {
    pub fn new(host: &MemoryHost, shapes: Shapes) -> Self {
        let state = Arc::new(State {
            catalog: RwLock::new(HashMap::new()),
            completion: RwLock::new(Completion::Immediate),
            pending: Mutex::new(Vec::new()),
            listeners: Mutex::new(HashMap::new()),
            scene: host.memory_scene().clone(),
            handle_type: RwLock::new(None),
            load_calls: AtomicUsize::new(0),
            instantiate_calls: AtomicUsize::new(0),
            released: Mutex::new(Vec::new()),
            duplicate: AtomicBool::new(false),
        });
        let handle_type = handle_type(&state, shapes.completed_event);
        if let Ok(mut slot) = state.handle_type.write() {
            *slot = Some(handle_type.clone());
        }
        let root = root_type(&state, host, shapes);
        Self {
            state,
            root,
            handle_type,
        }
    }

    /// Loads the root and handle modules into `host`.
    pub fn install(&self, host: &MemoryHost) {
        host.load_module(Module::new(ROOT_MODULE, vec![self.root.clone()]));
        host.load_module(Module::new(HANDLE_MODULE, vec![self.handle_type.clone()]));
    }

    pub fn root(&self) -> &TypeHandle {
        &self.root
    }

    pub fn insert(&self, address: &str, entry: Entry) {
        if let Ok(mut catalog) = self.state.catalog.write() {
            catalog.insert(address.to_string(), entry);
        }
    }

    pub fn set_completion(&self, completion: Completion) {
        if let Ok(mut slot) = self.state.completion.write() {
            *slot = completion;
        }
    }

    pub fn load_calls(&self) -> usize {
        self.state.load_calls.load(Ordering::SeqCst)
    }

    pub fn instantiate_calls(&self) -> usize {
        self.state.instantiate_calls.load(Ordering::SeqCst)
    }

    /// Ids of every object handed to `Release`.
    pub fn released(&self) -> Vec<u64> {
        self.state.released.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn pending(&self) -> usize {
        self.state.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Completes the oldest pending operation for `address`.
    pub fn complete(&self, address: &str) -> bool {
        let op = self.state.pending.lock().ok().and_then(|mut pending| {
            let index = pending.iter().position(|op| op.address == address)?;
            Some(pending.remove(index))
        });
        match op {
            Some(op) => {
                self.state.finish(&op);
                true
            }
            None => false,
        }
    }

    pub fn complete_all(&self) -> usize {
        let ops: Vec<PendingOp> = self
            .state
            .pending
            .lock()
            .map(|mut pending| pending.drain(..).collect())
            .unwrap_or_default();
        for op in &ops {
            self.state.finish(op);
        }
        ops.len()
    }

    /// Makes every completion callback run twice, as a misbehaving host might.
    pub fn set_duplicate_callbacks(&self, duplicate: bool) {
        self.state.duplicate.store(duplicate, Ordering::SeqCst);
    }
}

impl State {
    fn dispatch(&self, address: &str, kind: OpKind) -> Result<Value, HostFault> {
        if matches!(self.entry(address), Some(Entry::NullHandle)) {
            return Ok(Value::Null);
        }
        let handle_type = self
            .handle_type
            .read()
            .ok()
            .and_then(|t| t.clone())
            .ok_or_else(|| HostFault::Raised("handle type missing".to_string()))?;
        let handle = Object::new(format!("op:{}", address), handle_type);
        handle.set_slot("status", STATUS_NONE);
        let op = PendingOp {
            address: address.to_string(),
            handle: handle.clone(),
            kind,
        };

        let completion = self.completion.read().map(|c| *c).unwrap_or(Completion::Immediate);
        match completion {
            Completion::Immediate => self.finish(&op),
            Completion::Deferred => {
                if let Ok(mut pending) = self.pending.lock() {
                    pending.push(op);
                }
            }
        }
        Ok(Value::Object(handle))
    }

    fn entry(&self, address: &str) -> Option<Entry> {
        self.catalog.read().ok()?.get(address).cloned()
    }

    fn finish(&self, op: &PendingOp) {
        let handle = &op.handle;
        match self.entry(&op.address) {
            Some(Entry::Asset(asset)) => {
                let result = match op.kind {
                    OpKind::Load => asset,
                    OpKind::Instantiate(placement) => self.scene.spawn(asset.duplicate(placement)),
                };
                handle.set_slot("result", result);
                handle.set_slot("status", STATUS_SUCCEEDED);
            }
            Some(Entry::SucceedNull) => handle.set_slot("status", STATUS_SUCCEEDED),
            Some(Entry::Failure(message)) => {
                handle.set_slot("exception", Value::Exception(message));
                handle.set_slot("status", STATUS_FAILED);
            }
            Some(Entry::NullHandle) | None => {
                handle.set_slot(
                    "exception",
                    Value::Exception(format!(
                        "InvalidKeyException: No Location found for Key={}",
                        op.address
                    )),
                );
                handle.set_slot("status", STATUS_FAILED);
            }
        }

        let listeners = self
            .listeners
            .lock()
            .ok()
            .and_then(|mut l| l.remove(&handle.id()))
            .unwrap_or_default();
        let value = Value::Object(handle.clone());
        for mut delegate in listeners {
            self.deliver(&mut delegate, &value);
        }
    }

    fn deliver(&self, delegate: &mut Delegate, handle: &Value) {
        delegate.invoke(handle.clone());
        if self.duplicate.load(Ordering::SeqCst) {
            delegate.invoke(handle.clone());
        }
    }

    fn subscribe(&self, target: &Value, mut delegate: Delegate) -> Result<(), HostFault> {
        let handle = target
            .as_object()
            .ok_or_else(|| HostFault::NullTarget("Completed".to_string()))?;
        {
            let mut listeners = self
                .listeners
                .lock()
                .map_err(|_| HostFault::Raised("listeners poisoned".to_string()))?;
            let done = handle.slot("status").and_then(|s| s.as_int()) != Some(STATUS_NONE);
            if !done {
                listeners.entry(handle.id()).or_default().push(delegate);
                return Ok(());
            }
        }
        self.deliver(&mut delegate, target);
        Ok(())
    }
}

fn address_arg(frame: &CallFrame<'_>) -> Result<String, HostFault> {
    frame
        .args
        .first()
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| HostFault::Raised("InvalidKeyException: key is not a string".to_string()))
}

fn handle_type(state: &Arc<State>, completed_event: bool) -> TypeHandle {
    let mut builder = TypeInfo::builder(HANDLE_TYPE, HANDLE_MODULE)
        .property(PropertyInfo::backed_by("Status", "status"))
        .property(PropertyInfo::backed_by("Result", "result"))
        .property(PropertyInfo::backed_by("OperationException", "exception"));
    if completed_event {
        let subscriber = state.clone();
        builder = builder.event(EventInfo::new(
            "Completed",
            TypeInfo::primitive("System.Action`1"),
            move |target, delegate| subscriber.subscribe(target, delegate),
        ));
    }
    builder.build()
}

fn root_type(state: &Arc<State>, host: &MemoryHost, shapes: Shapes) -> TypeHandle {
    let b = host.builtins();
    let mut root = TypeInfo::builder(ROOT_TYPE, ROOT_MODULE);

    if shapes.load {
        let s = state.clone();
        root = root.method(
            MethodInfo::new("LoadAssetAsync", vec![b.object.clone()], move |frame| {
                s.load_calls.fetch_add(1, Ordering::SeqCst);
                let address = address_arg(&frame)?;
                s.dispatch(&address, OpKind::Load)
            })
            .static_member()
            .generic(1),
        );
    }

    if matches!(shapes.instantiate, InstantiateKind::KeyOnly | InstantiateKind::Both) {
        let s = state.clone();
        root = root.method(
            MethodInfo::new("InstantiateAsync", vec![b.object.clone()], move |frame| {
                s.instantiate_calls.fetch_add(1, Ordering::SeqCst);
                let address = address_arg(&frame)?;
                s.dispatch(&address, OpKind::Instantiate(Placement::default()))
            })
            .static_member(),
        );
    }

    if matches!(shapes.instantiate, InstantiateKind::Placed | InstantiateKind::Both) {
        let s = state.clone();
        let params = vec![
            b.object.clone(),
            b.vector3.clone(),
            b.quaternion.clone(),
            b.transform.clone(),
        ];
        root = root.method(
            MethodInfo::new("InstantiateAsync", params, move |frame| {
                s.instantiate_calls.fetch_add(1, Ordering::SeqCst);
                let address = address_arg(&frame)?;
                let placement = match (frame.args.get(1), frame.args.get(2)) {
                    (Some(Value::Vec3(position)), Some(Value::Quat(rotation))) => {
                        Placement::new(*position, *rotation)
                    }
                    _ => return Err(HostFault::Raised("ArgumentException: bad placement".to_string())),
                };
                s.dispatch(&address, OpKind::Instantiate(placement))
            })
            .static_member(),
        );
    }

    if shapes.release {
        let s = state.clone();
        root = root.method(
            MethodInfo::new("Release", vec![b.object.clone()], move |frame| {
                let released = frame
                    .args
                    .first()
                    .and_then(Value::as_object)
                    .ok_or_else(|| HostFault::NullTarget("Release".to_string()))?;
                if let Ok(mut r) = s.released.lock() {
                    r.push(released.id());
                }
                Ok(Value::Null)
            })
            .static_member()
            .generic(1),
        );
    }

    // A non-static overload the probe must ignore.
    root = root.method(MethodInfo::new("LoadAssetAsync", vec![b.string.clone()], |_| {
        Err(HostFault::Raised("instance overload".to_string()))
    }));

    root.build()
}
