//! Honk to open nearby gates, then close them again once the doorway is clear.

use anyhow::Result;
use api::{
    FieldHandle, MethodHandle, ModLogger, ObjectRef, PropertyHandle, Scene, Search, TypeHandle,
    Value, Vec3,
};
use binding::{HookTarget, Mod, ModContext};
use common::{Attempt, Finished, RetryPolicy, RetryScheduler};
use std::collections::HashSet;

/// `ObjectMetaData.typeID` values of the gates we open.
pub const GATE_TYPE_IDS: [i64; 3] = [4055, 4056, 4059];
pub const SEARCH_RADIUS: f32 = 25.0;
pub const MAX_DOORS: usize = 6;

pub const CLOSE_POLICY: RetryPolicy = RetryPolicy {
    initial_delay: 10.0,
    retry_delay: 5.0,
    max_attempts: 3,
};

#[derive(Default)]
struct Members {
    object_meta: Option<TypeHandle>,
    machine: Option<TypeHandle>,
    activate: Option<MethodHandle>,
    type_id: Option<PropertyHandle>,
    object_id: Option<FieldHandle>,
    deactivate: Option<MethodHandle>,
    door_blocker: Option<TypeHandle>,
    door_is_blocked: Option<MethodHandle>,
}

impl Members {
    /// Fills whatever is still missing; game types may load late.
    fn ensure(&mut self, ctx: &ModContext) {
        let resolver = ctx.resolver();
        if self.object_meta.is_none() {
            self.object_meta = resolver.resolve_type("ObjectMetaData");
        }
        if self.machine.is_none() {
            self.machine = resolver.resolve_type("MachineInteraction");
        }
        if let Some(machine) = &self.machine {
            if self.activate.is_none() {
                self.activate = resolver.method(machine, "ActivateInstantiatingMachineWithPartCheck", &[]);
            }
        }
        if let Some(meta) = &self.object_meta {
            if self.type_id.is_none() {
                self.type_id = resolver.property(meta, "typeID");
            }
            if self.object_id.is_none() {
                self.object_id = resolver.field(meta, "objectID");
            }
            if self.deactivate.is_none() {
                self.deactivate = resolver.method(meta, "DeActivateInstantiatingMachine", &[]);
            }
        }
        if self.door_blocker.is_none() {
            self.door_blocker = resolver.resolve_type("DoorBlocker");
        }
        if let Some(blocker) = &self.door_blocker {
            if self.door_is_blocked.is_none() {
                let boolean = resolver.resolve_type("System.Boolean");
                self.door_is_blocked = boolean.and_then(|b| resolver.method(blocker, "DoorIsBlocked", &[b]));
            }
        }
    }
}

/// A gate waiting to be closed.
pub struct PendingClose {
    object_meta: ObjectRef,
    deactivate: MethodHandle,
    blocker: Option<(TypeHandle, MethodHandle)>,
}

pub struct HornGates {
    debug: bool,
    logger: Option<ModLogger>,
    members: Members,
    closes: RetryScheduler<PendingClose>,
}

impl HornGates {
    pub fn new() -> Self {
        Self {
            debug: true,
            logger: None,
            members: Members::default(),
            closes: RetryScheduler::new(),
        }
    }

    pub fn quiet(mut self) -> Self {
        self.debug = false;
        self
    }

    pub fn pending_closes(&self) -> usize {
        self.closes.pending()
    }

    fn info(&self, message: &str) {
        if self.debug {
            if let Some(logger) = &self.logger {
                logger.info(message);
            }
        }
    }

    fn warn(&self, message: &str) {
        if let Some(logger) = &self.logger {
            logger.warn(message);
        }
    }

    /// Activates up to [`MAX_DOORS`] known gates around `origin`. Returns how many opened.
    pub fn open_nearby(&mut self, origin: Vec3, ctx: &ModContext) -> usize {
        self.members.ensure(ctx);
        let Some(scene) = ctx.scene() else {
            self.warn("No scene available");
            return 0;
        };
        let hits = match scene.overlap_sphere(origin, SEARCH_RADIUS) {
            Ok(hits) => hits,
            Err(e) => {
                self.warn(&format!("OverlapSphere failed: {}", e));
                return 0;
            }
        };
        if hits.is_empty() {
            self.info("OverlapSphere found 0 colliders");
            return 0;
        }
        self.info(&format!("OverlapSphere hits: {}", hits.len()));

        let (Some(meta_type), Some(type_id)) = (self.members.object_meta.clone(), self.members.type_id.clone()) else {
            return 0;
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut opened = 0;
        for hit in &hits {
            if opened >= MAX_DOORS {
                break;
            }
            let Some(meta) = scene.find_component(hit, &meta_type, Search::SelfAndParents) else {
                continue;
            };
            let meta_value = Value::Object(meta.clone());
            let gate_type = type_id
                .get(Some(&meta_value))
                .ok()
                .and_then(|v| v.as_int())
                .unwrap_or(0);
            if !GATE_TYPE_IDS.contains(&gate_type) {
                continue;
            }

            let object_id = self
                .members
                .object_id
                .as_ref()
                .and_then(|f| f.get(Some(&meta_value)).ok())
                .and_then(|v| v.as_str().map(str::to_string))
                .filter(|id| !id.is_empty());
            if object_id.as_ref().is_some_and(|id| seen.contains(id)) {
                continue;
            }

            let machine = self.members.machine.as_ref().and_then(|ty| {
                scene
                    .find_component(&meta, ty, Search::SelfAndChildren)
                    .or_else(|| scene.find_component(&meta, ty, Search::SelfAndParents))
            });
            let (Some(machine), Some(activate)) = (machine, self.members.activate.clone()) else {
                continue;
            };

            match activate.invoke(Some(&Value::Object(machine)), &[]) {
                Ok(_) => {
                    self.info(&format!(
                        "Gate(OM type {}) -> ActivateInstantiatingMachineWithPartCheck()",
                        gate_type
                    ));
                    if let Some(id) = object_id {
                        seen.insert(id);
                    }
                    opened += 1;
                    self.schedule_close(meta);
                }
                Err(e) => self.warn(&format!(
                    "Gate(OM type {}) instantiating activation failed: {}",
                    gate_type, e
                )),
            }
        }
        opened
    }

    fn schedule_close(&mut self, object_meta: ObjectRef) {
        let Some(deactivate) = self.members.deactivate.clone() else {
            return;
        };
        let blocker = self
            .members
            .door_blocker
            .clone()
            .zip(self.members.door_is_blocked.clone());
        self.closes.schedule(
            PendingClose {
                object_meta,
                deactivate,
                blocker,
            },
            CLOSE_POLICY,
        );
    }
}

impl Default for HornGates {
    fn default() -> Self {
        Self::new()
    }
}

fn is_blocked(close: &PendingClose, scene: Option<&dyn Scene>) -> bool {
    let (Some(scene), Some((blocker_type, door_is_blocked))) = (scene, &close.blocker) else {
        return false;
    };
    scene
        .find_component(&close.object_meta, blocker_type, Search::SelfAndChildren)
        .and_then(|blocker| {
            door_is_blocked
                .invoke(Some(&Value::Object(blocker)), &[Value::Bool(false)])
                .ok()
        })
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}

fn attempt_close(close: &PendingClose, scene: Option<&dyn Scene>, logger: Option<&ModLogger>) -> Attempt {
    if is_blocked(close, scene) {
        if let Some(logger) = logger {
            logger.info(&format!("Close blocked; retrying in {:.1}s...", CLOSE_POLICY.retry_delay));
        }
        return Attempt::Blocked;
    }
    match close.deactivate.invoke(Some(&Value::Object(close.object_meta.clone())), &[]) {
        Ok(_) => {
            if let Some(logger) = logger {
                logger.info("Gate -> DeActivateInstantiatingMachine() after delay");
            }
        }
        Err(e) => {
            if let Some(logger) = logger {
                logger.warn(&format!("Delayed close failed: {}", e));
            }
        }
    }
    Attempt::Done
}

impl Mod for HornGates {
    fn name(&self) -> &str {
        "HornGates"
    }

    fn target(&self) -> HookTarget {
        HookTarget::parameterless("VehicleClient:HonkHorn")
    }

    fn initialize(&mut self, logger: ModLogger) -> Result<()> {
        logger.info("Honk near a gate to open it");
        self.logger = Some(logger);
        Ok(())
    }

    fn postfix(&mut self, instance: &Value, ctx: &ModContext) -> Result<()> {
        let Some(vehicle) = instance.as_object() else {
            self.warn("Postfix instance is not a Component; aborting");
            return Ok(());
        };
        let origin = vehicle.placement().position;
        self.info(&format!("HonkHorn postfix fired at {}", origin));
        self.open_nearby(origin, ctx);
        Ok(())
    }

    fn tick(&mut self, dt: f32, ctx: &ModContext) {
        if self.closes.is_idle() {
            return;
        }
        let scene = ctx.scene();
        let logger = if self.debug { self.logger.as_ref() } else { None };
        let finished = self
            .closes
            .tick(dt, |close| attempt_close(close, scene.as_deref(), logger));
        for done in finished {
            if let Finished::GaveUp(_) = done {
                self.info("Skipping close after max blocked attempts");
            }
        }
    }

    fn unload(&mut self) {
        let dropped = self.closes.pending();
        self.closes = RetryScheduler::new();
        self.info(&format!("Unloaded with {} gate(s) left open", dropped));
    }
}
