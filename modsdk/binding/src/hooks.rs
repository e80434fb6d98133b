use anyhow::Result;
use api::{MethodHandle, ModLogger, Scene, TypeHandle, Value};
use log::{info, warn};
use std::sync::{Arc, Mutex};

use crate::loader::ContentLoader;
use crate::resolver::MemberResolver;
use crate::BindingError;

/// The foreign method a mod runs after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookTarget {
    /// `"Owner:Member"`
    pub descriptor: String,
    /// Parameter type names, resolved like any other type name.
    pub params: Vec<String>,
}

impl HookTarget {
    pub fn parameterless(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            params: Vec::new(),
        }
    }
}

/// Everything a mod may reach the host through.
#[derive(Clone)]
pub struct ModContext {
    resolver: Arc<MemberResolver>,
    loader: Arc<ContentLoader>,
}

impl ModContext {
    pub fn new(resolver: Arc<MemberResolver>, loader: Arc<ContentLoader>) -> Self {
        Self { resolver, loader }
    }

    pub fn resolver(&self) -> &MemberResolver {
        &self.resolver
    }

    pub fn loader(&self) -> &ContentLoader {
        &self.loader
    }

    pub fn scene(&self) -> Option<Arc<dyn Scene>> {
        self.resolver.host().scene()
    }
}

pub trait Mod: Send {
    fn name(&self) -> &str;
    fn target(&self) -> HookTarget;
    fn initialize(&mut self, logger: ModLogger) -> Result<()>;
    /// Runs after every call of the target; `instance` is its receiver.
    fn postfix(&mut self, instance: &Value, ctx: &ModContext) -> Result<()>;
    /// Per-frame update driven by the host.
    fn tick(&mut self, _dt: f32, _ctx: &ModContext) {}
    fn unload(&mut self) {}
}

type SharedMod = Arc<Mutex<Box<dyn Mod>>>;

pub struct HookRegistry {
    context: ModContext,
    mods: Vec<(String, SharedMod)>,
}

impl HookRegistry {
    pub fn new(context: ModContext) -> Self {
        Self {
            context,
            mods: Vec::new(),
        }
    }

    pub fn context(&self) -> &ModContext {
        &self.context
    }

    /// Resolves the mod's target, initializes it and installs its postfix.
    pub fn register(&mut self, mut module: Box<dyn Mod>) -> Result<(), BindingError> {
        let name = module.name().to_string();
        let target = module.target();
        let method = self
            .resolve_target(&target)
            .ok_or_else(|| BindingError::HookTargetNotFound(target.descriptor.clone()))?;

        module
            .initialize(ModLogger::new(name.clone()))
            .map_err(|e| BindingError::ModInit {
                name: name.clone(),
                message: format!("{:#}", e),
            })?;

        let shared: SharedMod = Arc::new(Mutex::new(module));
        let hooked = shared.clone();
        let context = self.context.clone();
        let hook_name = name.clone();
        let installed = self.context.resolver.host().install_postfix(
            &method,
            Box::new(move |instance: &Value| {
                let Ok(mut module) = hooked.lock() else {
                    warn!("[{}] mod state poisoned; skipping postfix", hook_name);
                    return;
                };
                if let Err(e) = module.postfix(instance, &context) {
                    warn!("[{}] postfix failed: {:#}", hook_name, e);
                }
            }),
        );
        if let Err(fault) = installed {
            warn!("Could not hook mod {} on {}: {}", name, target.descriptor, fault);
            if let Ok(mut module) = shared.lock() {
                module.unload();
            }
            return Err(fault.into());
        }

        info!("✓ Registered mod {} on {}", name, target.descriptor);
        self.mods.push((name, shared));
        Ok(())
    }

    pub fn tick(&self, dt: f32) {
        for (_, module) in &self.mods {
            if let Ok(mut module) = module.lock() {
                module.tick(dt, &self.context);
            }
        }
    }

    pub fn unload_all(&mut self) {
        for (name, module) in self.mods.drain(..) {
            if let Ok(mut module) = module.lock() {
                module.unload();
            }
            info!("Unloaded mod {}", name);
        }
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.mods.iter().map(|(name, _)| name.as_str())
    }

    fn resolve_target(&self, target: &HookTarget) -> Option<MethodHandle> {
        let params = target
            .params
            .iter()
            .map(|p| self.context.resolver.resolve_type(p))
            .collect::<Option<Vec<TypeHandle>>>()?;
        self.context.resolver.resolve_method(&target.descriptor, &params)
    }
}
