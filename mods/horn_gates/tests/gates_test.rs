use api::{FieldInfo, MethodInfo, Module, Object, ObjectRef, Placement, PropertyInfo, Quat, TypeHandle, TypeInfo, Value, Vec3};
use binding::{ContentLoader, HookRegistry, MemberResolver, Mod, ModContext};
use common::{LoaderConfig, ResolverConfig};
use horn_gates::gates::{HornGates, MAX_DOORS};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use test_host::{noop_method, MemoryHost};

#[derive(Default)]
struct Calls {
    activated: AtomicUsize,
    deactivated: AtomicUsize,
}

struct World {
    host: Arc<MemoryHost>,
    calls: Arc<Calls>,
    meta: TypeHandle,
    machine: TypeHandle,
    blocker: TypeHandle,
    vehicle: TypeHandle,
    collider: TypeHandle,
}

impl World {
    fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let host = MemoryHost::new();
        let calls = Arc::new(Calls::default());
        let boolean = host.builtins().boolean.clone();

        let on_deactivate = calls.clone();
        let meta = TypeInfo::builder("ObjectMetaData", "Assembly-CSharp")
            .property(PropertyInfo::backed_by("typeID", "typeID"))
            .field(FieldInfo::new("objectID"))
            .method(MethodInfo::new("DeActivateInstantiatingMachine", vec![], move |frame| {
                on_deactivate.deactivated.fetch_add(1, Ordering::SeqCst);
                if let Some(meta) = frame.target.and_then(Value::as_object) {
                    meta.set_slot("open", false);
                }
                Ok(Value::Null)
            }))
            .build();
        let on_activate = calls.clone();
        let machine = TypeInfo::builder("MachineInteraction", "Assembly-CSharp")
            .method(MethodInfo::new("ActivateInstantiatingMachineWithPartCheck", vec![], move |_| {
                on_activate.activated.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }))
            .build();
        let blocker = TypeInfo::builder("DoorBlocker", "Assembly-CSharp")
            .method(MethodInfo::new("DoorIsBlocked", vec![boolean], |frame| {
                let blocked = frame
                    .target
                    .and_then(Value::as_object)
                    .and_then(|b| b.slot("blocked"))
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                Ok(Value::Bool(blocked))
            }))
            .build();
        let vehicle = TypeInfo::builder("VehicleClient", "Assembly-CSharp")
            .method(noop_method("HonkHorn", vec![]))
            .build();
        let collider = TypeInfo::builder("UnityEngine.BoxCollider", "UnityEngine.PhysicsModule").build();

        host.load_module(Module::new(
            "Assembly-CSharp",
            vec![meta.clone(), machine.clone(), blocker.clone(), vehicle.clone()],
        ));

        Self {
            host,
            calls,
            meta,
            machine,
            blocker,
            vehicle,
            collider,
        }
    }

    fn context(&self) -> ModContext {
        let resolver = Arc::new(MemberResolver::new(self.host.clone(), &ResolverConfig::default()));
        let loader = Arc::new(ContentLoader::new(resolver.clone(), LoaderConfig::default()));
        ModContext::new(resolver, loader)
    }

    /// A gate with two colliders, a machine and a door blocker. Returns the blocker.
    fn gate(&self, type_id: i32, object_id: &str, at: Vec3) -> ObjectRef {
        let scene = self.host.memory_scene();
        let placed = Placement::new(at, Quat::IDENTITY);
        let meta = scene.spawn(Object::with_placement("gate", self.meta.clone(), placed));
        meta.set_slot("typeID", type_id);
        meta.set_slot("objectID", object_id);
        for _ in 0..2 {
            scene.attach(Object::with_placement("collider", self.collider.clone(), placed), &meta);
        }
        scene.attach(Object::with_placement("machine", self.machine.clone(), placed), &meta);
        scene.attach(Object::with_placement("blocker", self.blocker.clone(), placed), &meta)
    }

    fn car(&self) -> Value {
        Value::from(Object::new("car", self.vehicle.clone()))
    }

    fn activated(&self) -> usize {
        self.calls.activated.load(Ordering::SeqCst)
    }

    fn deactivated(&self) -> usize {
        self.calls.deactivated.load(Ordering::SeqCst)
    }
}

#[test]
fn test_opens_each_known_gate_once() {
    let world = World::new();
    world.gate(4055, "gate-a", Vec3::new(5.0, 0.0, 0.0));
    world.gate(4059, "gate-b", Vec3::new(0.0, 0.0, -12.0));
    world.gate(1234, "not-a-gate", Vec3::new(2.0, 0.0, 0.0));
    world.gate(4056, "too-far", Vec3::new(80.0, 0.0, 0.0));

    let mut gates = HornGates::new();
    let opened = gates.open_nearby(Vec3::ZERO, &world.context());

    assert_eq!(opened, 2);
    assert_eq!(world.activated(), 2);
    assert_eq!(gates.pending_closes(), 2);
}

#[test]
fn test_gate_count_is_capped() {
    let world = World::new();
    for i in 0..10 {
        world.gate(4055, &format!("gate-{}", i), Vec3::new(i as f32, 0.0, 0.0));
    }

    let mut gates = HornGates::new().quiet();
    assert_eq!(gates.open_nearby(Vec3::ZERO, &world.context()), MAX_DOORS);
    assert_eq!(world.activated(), MAX_DOORS);
}

#[test]
fn test_honk_opens_and_closes_after_delay() {
    let world = World::new();
    world.gate(4055, "gate-a", Vec3::new(3.0, 0.0, 0.0));

    let mut hooks = HookRegistry::new(world.context());
    hooks.register(horn_gates::create_mod()).unwrap();

    let honk = world.vehicle.find_method("HonkHorn", &[]).unwrap();
    world.host.call(&honk, &world.car(), &[]).unwrap();
    assert_eq!(world.activated(), 1);

    hooks.tick(9.5);
    assert_eq!(world.deactivated(), 0);
    hooks.tick(0.5);
    assert_eq!(world.deactivated(), 1);

    hooks.tick(60.0);
    assert_eq!(world.deactivated(), 1);
}

#[test]
fn test_blocked_door_retries_then_gives_up() {
    let world = World::new();
    let blocker = world.gate(4055, "gate-a", Vec3::new(3.0, 0.0, 0.0));
    blocker.set_slot("blocked", true);

    let ctx = world.context();
    let mut hooks = HookRegistry::new(ctx);
    hooks.register(Box::new(HornGates::new())).unwrap();
    let honk = world.vehicle.find_method("HonkHorn", &[]).unwrap();
    world.host.call(&honk, &world.car(), &[]).unwrap();

    hooks.tick(10.0);
    hooks.tick(5.0);
    hooks.tick(5.0);
    hooks.tick(5.0);
    assert_eq!(world.deactivated(), 0);
}

#[test]
fn test_closes_once_blocker_clears() {
    let world = World::new();
    let blocker = world.gate(4055, "gate-a", Vec3::new(3.0, 0.0, 0.0));
    blocker.set_slot("blocked", true);

    let mut hooks = HookRegistry::new(world.context());
    hooks.register(Box::new(HornGates::new())).unwrap();
    let honk = world.vehicle.find_method("HonkHorn", &[]).unwrap();
    world.host.call(&honk, &world.car(), &[]).unwrap();

    hooks.tick(10.0);
    assert_eq!(world.deactivated(), 0);
    blocker.set_slot("blocked", false);
    hooks.tick(5.0);
    assert_eq!(world.deactivated(), 1);
}

#[test]
fn test_non_object_instance_is_ignored() {
    let world = World::new();
    world.gate(4055, "gate-a", Vec3::ZERO);

    let mut gates = HornGates::new();
    gates.postfix(&Value::Null, &world.context()).unwrap();
    assert_eq!(world.activated(), 0);
    assert_eq!(gates.pending_closes(), 0);
}
