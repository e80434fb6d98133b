use api::{FieldInfo, Module, Object, PropertyInfo, TypeHandle, TypeInfo, Value};
use binding::{ContentLoader, HookRegistry, MemberResolver, Mod, ModContext};
use common::{LoaderConfig, ResolverConfig};
use server_debug::server::ServerDebug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use test_host::{capture, noop_method, MemoryHost};

fn context(host: &Arc<MemoryHost>) -> ModContext {
    let resolver = Arc::new(MemberResolver::new(host.clone(), &ResolverConfig::default()));
    let loader = Arc::new(ContentLoader::new(resolver.clone(), LoaderConfig::default()));
    ModContext::new(resolver, loader)
}

fn server_with_property(flag: &Arc<AtomicBool>, reads: &Arc<AtomicUsize>) -> TypeHandle {
    let flag = flag.clone();
    let reads = reads.clone();
    TypeInfo::builder("Game.Net.Server", "Assembly-CSharp")
        .property(
            PropertyInfo::new("IsServer")
                .getter(move |_| {
                    reads.fetch_add(1, Ordering::SeqCst);
                    Ok(Value::Bool(flag.load(Ordering::SeqCst)))
                })
                .static_member(),
        )
        .method(noop_method("Update", vec![]))
        .build()
}

#[test]
fn test_logs_once_when_server() {
    capture::install();
    let host = MemoryHost::new();
    let flag = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicUsize::new(0));
    let server = server_with_property(&flag, &reads);
    host.load_module(Module::new("Assembly-CSharp", vec![server.clone()]));

    let mut hooks = HookRegistry::new(context(&host));
    hooks.register(server_debug::create_mod()).unwrap();
    let update = server.find_method("Update", &[]).unwrap();
    let instance = Value::from(Object::new("server", server.clone()));

    host.call(&update, &instance, &[]).unwrap();
    assert_eq!(reads.load(Ordering::SeqCst), 1);

    flag.store(true, Ordering::SeqCst);
    for _ in 0..3 {
        host.call(&update, &instance, &[]).unwrap();
    }
    assert_eq!(reads.load(Ordering::SeqCst), 2);
    assert_eq!(
        capture::messages_for("ServerDebug", log::Level::Info)
            .iter()
            .filter(|m| m.contains("Server mod initialized"))
            .count(),
        1
    );
}

#[test]
fn test_falls_back_to_static_field() {
    let host = MemoryHost::new();
    let server = TypeInfo::builder("Server", "Assembly-CSharp")
        .field(FieldInfo::new("IsServer").static_member(true))
        .method(noop_method("Update", vec![]))
        .build();
    host.load_module(Module::new("Assembly-CSharp", vec![server]));

    let mut module = ServerDebug::new();
    module.postfix(&Value::Null, &context(&host)).unwrap();
    assert!(module.has_logged());
}

#[test]
fn test_missing_server_type_is_quiet() {
    let host = MemoryHost::new();
    let mut module = ServerDebug::new();
    module.postfix(&Value::Null, &context(&host)).unwrap();
    assert!(!module.has_logged());
}
