//! In-memory host runtime for exercising the binding layer without a game.

mod addressables;
pub mod capture;
mod scene;

pub use addressables::{Completion, Entry, FakeAddressables, InstantiateKind, Shapes};
pub use scene::MemoryScene;

use api::{
    lookup_type, HostFault, HostRuntime, MethodHandle, MethodInfo, Module, ModuleHandle,
    PostfixHook, Scene, TypeHandle, TypeInfo, Value, CORE_MODULE,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

pub const UNITY_MODULE: &str = "UnityEngine.CoreModule";

/// Types every host has loaded from the start.
pub struct Builtins {
    pub object: TypeHandle,
    pub int: TypeHandle,
    pub boolean: TypeHandle,
    pub string: TypeHandle,
    pub single: TypeHandle,
    pub unity_object: TypeHandle,
    pub game_object: TypeHandle,
    pub component: TypeHandle,
    pub transform: TypeHandle,
    pub audio_clip: TypeHandle,
    pub vector3: TypeHandle,
    pub quaternion: TypeHandle,
}

impl Builtins {
    fn new() -> Self {
        let unity_object = TypeInfo::builder("UnityEngine.Object", UNITY_MODULE).build();
        let component = TypeInfo::builder("UnityEngine.Component", UNITY_MODULE)
            .base(unity_object.clone())
            .build();
        Self {
            object: TypeInfo::primitive("System.Object"),
            int: TypeInfo::primitive("System.Int32"),
            boolean: TypeInfo::primitive("System.Boolean"),
            string: TypeInfo::primitive("System.String"),
            single: TypeInfo::primitive("System.Single"),
            game_object: TypeInfo::builder("UnityEngine.GameObject", UNITY_MODULE)
                .base(unity_object.clone())
                .build(),
            transform: TypeInfo::builder("UnityEngine.Transform", UNITY_MODULE)
                .base(component.clone())
                .build(),
            audio_clip: TypeInfo::builder("UnityEngine.AudioClip", UNITY_MODULE)
                .base(unity_object.clone())
                .build(),
            vector3: TypeInfo::builder("UnityEngine.Vector3", UNITY_MODULE).build(),
            quaternion: TypeInfo::builder("UnityEngine.Quaternion", UNITY_MODULE).build(),
            unity_object,
            component,
        }
    }

    fn modules(&self) -> Vec<ModuleHandle> {
        vec![
            Module::new(
                CORE_MODULE,
                vec![
                    self.object.clone(),
                    self.int.clone(),
                    self.boolean.clone(),
                    self.string.clone(),
                    self.single.clone(),
                ],
            ),
            Module::new(
                UNITY_MODULE,
                vec![
                    self.unity_object.clone(),
                    self.game_object.clone(),
                    self.component.clone(),
                    self.transform.clone(),
                    self.audio_clip.clone(),
                    self.vector3.clone(),
                    self.quaternion.clone(),
                ],
            ),
        ]
    }
}

type SharedHook = Arc<Mutex<PostfixHook>>;

/// A host whose modules are loaded by the test, one at a time.
pub struct MemoryHost {
    modules: RwLock<Vec<ModuleHandle>>,
    builtins: Builtins,
    scene: Arc<MemoryScene>,
    postfixes: Mutex<Vec<(MethodHandle, SharedHook)>>,
    find_type_calls: AtomicUsize,
    module_scans: AtomicUsize,
    lookup_fault: AtomicBool,
    bare_lookup: AtomicBool,
}

impl MemoryHost {
    pub fn new() -> Arc<Self> {
        let builtins = Builtins::new();
        Arc::new(Self {
            modules: RwLock::new(builtins.modules()),
            builtins,
            scene: Arc::new(MemoryScene::new()),
            postfixes: Mutex::new(Vec::new()),
            find_type_calls: AtomicUsize::new(0),
            module_scans: AtomicUsize::new(0),
            lookup_fault: AtomicBool::new(false),
            bare_lookup: AtomicBool::new(true),
        })
    }

    pub fn builtins(&self) -> &Builtins {
        &self.builtins
    }

    pub fn memory_scene(&self) -> &Arc<MemoryScene> {
        &self.scene
    }

    pub fn load_module(&self, module: ModuleHandle) {
        if let Ok(mut modules) = self.modules.write() {
            modules.push(module);
        }
    }

    /// Direct type lookups made so far.
    pub fn find_type_calls(&self) -> usize {
        self.find_type_calls.load(Ordering::SeqCst)
    }

    /// Module enumerations made so far.
    pub fn module_scans(&self) -> usize {
        self.module_scans.load(Ordering::SeqCst)
    }

    /// Make direct lookups raise instead of answering.
    pub fn set_lookup_fault(&self, fault: bool) {
        self.lookup_fault.store(fault, Ordering::SeqCst);
    }

    /// When off, direct lookups only answer module-qualified names.
    pub fn set_bare_lookup(&self, enabled: bool) {
        self.bare_lookup.store(enabled, Ordering::SeqCst);
    }

    pub fn postfix_count(&self) -> usize {
        self.postfixes.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Calls `method` the way patched game code would: body first, then
    /// every postfix installed on it.
    pub fn call(&self, method: &MethodHandle, instance: &Value, args: &[Value]) -> Result<Value, HostFault> {
        let target = (!method.is_static()).then_some(instance);
        let result = method.invoke(target, args)?;
        let hooks: Vec<SharedHook> = match self.postfixes.lock() {
            Ok(postfixes) => postfixes
                .iter()
                .filter(|(patched, _)| Arc::ptr_eq(patched, method))
                .map(|(_, hook)| hook.clone())
                .collect(),
            Err(_) => Vec::new(),
        };
        for hook in hooks {
            if let Ok(mut hook) = hook.lock() {
                hook(instance);
            }
        }
        Ok(result)
    }

    fn snapshot(&self) -> Vec<ModuleHandle> {
        self.modules.read().map(|m| m.clone()).unwrap_or_default()
    }
}

impl HostRuntime for MemoryHost {
    fn modules(&self) -> Result<Vec<ModuleHandle>, HostFault> {
        self.module_scans.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot())
    }

    fn find_type(&self, name: &str) -> Result<Option<TypeHandle>, HostFault> {
        self.find_type_calls.fetch_add(1, Ordering::SeqCst);
        if self.lookup_fault.load(Ordering::SeqCst) {
            return Err(HostFault::Raised(format!("TypeLoadException: {}", name)));
        }
        if !name.contains(',') && !self.bare_lookup.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(lookup_type(&self.snapshot(), name))
    }

    fn scene(&self) -> Option<Arc<dyn Scene>> {
        Some(self.scene.clone() as Arc<dyn Scene>)
    }

    fn install_postfix(&self, method: &MethodHandle, hook: PostfixHook) -> Result<(), HostFault> {
        let mut postfixes = self
            .postfixes
            .lock()
            .map_err(|_| HostFault::Raised("postfix table poisoned".to_string()))?;
        postfixes.push((method.clone(), Arc::new(Mutex::new(hook))));
        Ok(())
    }
}

/// A method whose body does nothing and returns null.
pub fn noop_method(name: &str, params: Vec<TypeHandle>) -> MethodInfo {
    MethodInfo::new(name, params, |_| Ok(Value::Null))
}
