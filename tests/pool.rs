use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;
use std::thread;

use glam::Vec3;
use kestrel_lua::bindings::EventRegistry;
use kestrel_lua::pool::{CollectorConfig, CollectorMode, InstanceState, InterpreterInstance};
use kestrel_lua::value::Rotator;
use kestrel_lua::{HostWorld, InterpreterPool, PoolConfig, ScriptError};
use parking_lot::Mutex;

fn pool_with_capacity(max_pool_size: usize) -> InterpreterPool {
    InterpreterPool::new(PoolConfig { max_pool_size, ..PoolConfig::default() })
}

#[test]
fn released_instance_is_reused_with_new_generation() {
    let pool = pool_with_capacity(1);
    let first = pool.acquire().expect("acquire first");
    let id = first.id();
    assert_eq!(first.generation(), 0);
    assert_eq!(first.state(), InstanceState::Acquired);
    pool.release(first);
    assert_eq!(pool.idle_count(), 1);

    let second = pool.acquire().expect("acquire again");
    assert_eq!(second.id(), id, "capacity-1 pool should hand the same state back");
    assert_eq!(second.generation(), 1);
    assert!(second.bindings_registered(), "bindings are registered again on acquire");
    let stats = pool.stats();
    assert_eq!((stats.created, stats.reused), (1, 1));
}

#[test]
fn reused_instance_has_the_global_shape_of_a_fresh_one() {
    let fresh = InterpreterInstance::create(&CollectorConfig::default()).expect("fresh instance");
    let fresh_names = fresh.global_names();

    let pool = pool_with_capacity(2);
    let dirty = pool.acquire().expect("acquire");
    dirty
        .exec(
            r#"
            score = 10
            function helper() return 1 end
            print = nil
            tostring = function() return "patched" end
            setmetatable(_G, { __index = function() return 42 end })
            "#,
            "=dirty",
        )
        .expect("dirty the instance");
    pool.release(dirty);

    let reused = pool.acquire().expect("reacquire");
    assert_eq!(reused.global_names(), fresh_names);
    let (print_kind, rendered, missing): (String, String, bool) = reused
        .lua()
        .load("return type(print), tostring(12), undefined_global == nil")
        .eval()
        .expect("inspect reused state");
    assert_eq!(print_kind, "function");
    assert_eq!(rendered, "12");
    assert!(missing, "the global metatable must be dropped on reset");
}

#[test]
fn reset_removes_session_modules_but_keeps_standard_ones() {
    let pool = pool_with_capacity(1);
    let instance = pool.acquire().expect("acquire");
    instance.exec("package.loaded.session_module = { value = 1 }", "=modules").expect("add module");
    pool.release(instance);

    let instance = pool.acquire().expect("reacquire");
    let (session, string_lib): (bool, bool) = instance
        .lua()
        .load("return package.loaded.session_module == nil, package.loaded.string ~= nil")
        .eval()
        .expect("inspect package.loaded");
    assert!(session);
    assert!(string_lib);
}

#[test]
fn reset_clears_event_registry_and_world_binding() {
    let world = HostWorld::shared();
    world.advance(0.5);
    let pool = pool_with_capacity(1);
    let instance = pool.acquire().expect("acquire");
    instance.bind_world(world.binding());
    instance.exec(r#"UE.Event.Register("Ping", function() end)"#, "=events").expect("register");
    let dt: f64 = instance.lua().load("return UE.GetDeltaTime()").eval().expect("bound delta");
    assert_eq!(dt, 0.5);
    pool.release(instance);

    let instance = pool.acquire().expect("reacquire");
    let registry = EventRegistry::get(instance.lua()).expect("registry");
    assert_eq!(registry.count("Ping").expect("count"), 0);
    let dt: f64 = instance.lua().load("return UE.GetDeltaTime()").eval().expect("unbound delta");
    assert_eq!(dt, 0.0);
}

#[test]
fn locked_global_metatable_fails_reset_and_discards() {
    let pool = pool_with_capacity(4);
    let instance = pool.acquire().expect("acquire");
    instance
        .exec("setmetatable(_G, { __metatable = 'locked' })", "=lock")
        .expect("lock the global metatable");
    pool.release(instance);

    assert_eq!(pool.idle_count(), 0, "an instance that failed to reset must not be pooled");
    let stats = pool.stats();
    assert_eq!(stats.reset_failures, 1);
    assert_eq!(stats.discarded, 1);

    let next = pool.acquire().expect("pool keeps working");
    assert_eq!(next.generation(), 0);
    assert_eq!(pool.stats().created, 2);
}

#[test]
fn release_beyond_capacity_discards() {
    let pool = pool_with_capacity(1);
    let first = pool.acquire().expect("first");
    let second = pool.acquire().expect("second");
    pool.release(first);
    pool.release(second);
    assert_eq!(pool.idle_count(), 1);
    assert_eq!(pool.stats().discarded, 1);
}

#[test]
fn release_after_shutdown_discards() {
    let pool = pool_with_capacity(4);
    let instance = pool.acquire().expect("acquire");
    pool.shutdown();
    pool.release(instance);
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.stats().discarded, 1);
}

#[test]
fn concurrent_hosts_never_share_an_instance() {
    let pool = Arc::new(pool_with_capacity(3));
    let checked_out = Arc::new(Mutex::new(HashSet::new()));
    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let pool = pool.clone();
            let checked_out = checked_out.clone();
            thread::spawn(move || {
                for round in 0..20 {
                    let instance = pool.acquire().expect("acquire in worker");
                    assert!(checked_out.lock().insert(instance.id()), "instance handed out twice");
                    instance
                        .exec(&format!("worker = {worker} round = {round}"), "=worker")
                        .expect("run in worker");
                    let seen: i64 = instance.global("worker").expect("read back");
                    assert_eq!(seen, worker);
                    checked_out.lock().remove(&instance.id());
                    pool.release(instance);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("worker panicked");
    }
    assert!(pool.idle_count() <= 3);
    let stats = pool.stats();
    assert_eq!(stats.created + stats.reused, 160);
}

#[test]
fn generational_collector_config_is_accepted() {
    let collector = CollectorConfig { mode: CollectorMode::Generational, ..CollectorConfig::default() };
    let instance = InterpreterInstance::create(&collector).expect("generational instance");
    instance.exec("local t = {} for i = 1, 1000 do t[i] = { i } end", "=alloc").expect("allocate");
    instance.collect_garbage();
    assert!(instance.used_memory() > 0);
}

#[test]
fn shared_instance_requires_initialize() {
    let pool = InterpreterPool::default();
    let err = pool.execute_string("x = 1").unwrap_err();
    assert!(matches!(err, ScriptError::NotInitialized));

    pool.initialize().expect("initialize");
    pool.initialize().expect("initialize twice");
    assert!(pool.is_initialized());
    assert_eq!(pool.stats().created, 1);
}

#[test]
fn shared_instance_keeps_state_between_calls() {
    let pool = InterpreterPool::default();
    pool.initialize().expect("initialize");
    pool.execute_string("counter = (counter or 0) + 1").expect("first call");
    pool.execute_string("counter = (counter or 0) + 1").expect("second call");
    let counter: i64 = pool.main_global("counter").expect("read counter");
    assert_eq!(counter, 2);
}

#[test]
fn shared_instance_errors_are_classified() {
    let pool = InterpreterPool::default();
    pool.initialize().expect("initialize");

    let err = pool.execute_string("this is not lua").unwrap_err();
    assert!(err.is_load(), "expected a load error, got {err:?}");

    let err = pool
        .execute_string("local function explode() error('kaboom') end\nexplode()")
        .unwrap_err();
    assert!(err.is_runtime(), "expected a runtime error, got {err:?}");
    let message = err.to_string();
    assert!(message.contains("kaboom"), "{message}");
    assert!(message.contains("stack traceback:"), "{message}");
}

#[test]
fn shared_instance_errors_keep_bridge_messages() {
    let world = HostWorld::shared();
    world.spawn_actor_named("Actor", Some("Hero"), Vec3::ZERO, Rotator::ZERO).expect("spawn hero");
    let pool = InterpreterPool::default();
    pool.initialize().expect("initialize");
    pool.bind_main_world(world.binding()).expect("bind world");

    let cases = [
        ("UE.Actor.Destroy(nil)", "call to 'Actor.Destroy' failed: invalid actor provided for destruction"),
        (
            "local hero = UE.Actor.Find('Hero')\nUE.Actor.Destroy(hero)\nreturn hero.Name",
            "attempt to access 'Name' on an invalid object",
        ),
        ("UE.Actor.Spawn('Actor').Colour = 'red'", "property 'Colour' not found or cannot be set"),
    ];
    for (source, expected) in cases {
        let err = pool.execute_string(source).unwrap_err();
        assert!(err.is_runtime(), "expected a runtime error, got {err:?}");
        let message = err.to_string();
        assert!(message.starts_with(expected), "{source}: {message}");
        assert!(message.contains("stack traceback:"), "{message}");
    }
}

#[test]
fn execute_file_runs_on_shared_instance() {
    let pool = InterpreterPool::default();
    pool.initialize().expect("initialize");

    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "from_file = 'yes'").expect("write script");
    pool.execute_file(file.path()).expect("execute file");
    let value: String = pool.main_global("from_file").expect("read global");
    assert_eq!(value, "yes");

    let err = pool.execute_file(file.path().with_extension("missing")).unwrap_err();
    assert!(matches!(err, ScriptError::Io { .. }), "got {err:?}");
}
