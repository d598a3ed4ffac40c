use std::sync::Arc;

use glam::Vec3;
use kestrel_lua::marshal;
use kestrel_lua::pool::{CollectorConfig, InterpreterInstance};
use kestrel_lua::value::Rotator;
use kestrel_lua::{HostWorld, ObjectHandle, ObjectId, WorldContext};

fn world_with_hero() -> (Arc<HostWorld>, ObjectId) {
    let world = HostWorld::shared();
    let hero = world.spawn_actor_named("Actor", Some("Hero"), Vec3::ZERO, Rotator::ZERO).expect("spawn hero");
    (world, hero)
}

fn instance_for(world: &Arc<HostWorld>) -> InterpreterInstance {
    let instance = InterpreterInstance::create(&CollectorConfig::default()).expect("create instance");
    instance.bind_world(world.binding());
    instance
}

#[test]
fn destroyed_object_resolves_to_invalid() {
    let (world, hero) = world_with_hero();
    let binding = world.binding();
    let handle = ObjectHandle::wrap(binding.model(), Some(hero)).expect("wrap live actor");
    assert!(handle.is_valid());
    assert_eq!(handle.live_id(), Some(hero));

    assert!(world.destroy_actor(hero));
    assert!(handle.resolve().is_none(), "dead handle must not resolve");
    assert!(!handle.is_valid());
    assert_eq!(handle.id(), hero, "the handle still remembers which object it was made for");
}

#[test]
fn reused_slot_does_not_revive_old_handle() {
    let (world, hero) = world_with_hero();
    let binding = world.binding();
    let handle = ObjectHandle::wrap(binding.model(), Some(hero)).expect("wrap live actor");
    world.destroy_actor(hero);
    let successor = world.spawn_actor_named("Actor", Some("Successor"), Vec3::ZERO, Rotator::ZERO).expect("spawn");
    assert_ne!(successor, hero);
    assert!(!handle.is_valid(), "a new object in the same slot must not satisfy an old handle");
}

#[test]
fn missing_object_wraps_to_nil() {
    let (world, _) = world_with_hero();
    let instance = instance_for(&world);
    let binding = world.binding();
    assert!(ObjectHandle::wrap(binding.model(), None).is_none());
    let value = marshal::object_to_lua(instance.lua(), binding.model(), None).expect("marshal none");
    assert!(value.is_nil());
}

#[test]
fn script_access_through_dead_handle_raises() {
    let (world, hero) = world_with_hero();
    let instance = instance_for(&world);
    instance.set_global_object("hero", &world.binding(), Some(hero)).expect("inject hero");
    let name: String = instance.lua().load("return hero.Name").eval().expect("read live name");
    assert_eq!(name, "Hero");

    world.destroy_actor(hero);
    let (ok, message): (bool, String) = instance
        .lua()
        .load("local ok, err = pcall(function() return hero.Name end) return ok, tostring(err)")
        .eval()
        .expect("pcall dead access");
    assert!(!ok);
    assert!(message.contains("invalid object"), "unexpected message: {message}");
    assert!(message.contains("Name"), "message should name the member: {message}");
}

#[test]
fn handles_to_same_object_compare_equal() {
    let (world, hero) = world_with_hero();
    world.spawn_actor_named("Actor", Some("Sidekick"), Vec3::ZERO, Rotator::ZERO).expect("spawn sidekick");
    let instance = instance_for(&world);
    instance.set_global_object("hero", &world.binding(), Some(hero)).expect("inject hero");
    let (same, different): (bool, bool) = instance
        .lua()
        .load(r#"return UE.Actor.Find("Hero") == hero, UE.Actor.Find("Sidekick") == hero"#)
        .eval()
        .expect("compare handles");
    assert!(same, "two handles to the same actor must be equal");
    assert!(!different);
}

#[test]
fn tostring_shows_class_and_liveness() {
    let (world, hero) = world_with_hero();
    let instance = instance_for(&world);
    instance.set_global_object("hero", &world.binding(), Some(hero)).expect("inject hero");
    let live: String = instance.lua().load("return tostring(hero)").eval().expect("tostring");
    assert_eq!(live, format!("Actor({hero})"));
    world.destroy_actor(hero);
    let dead: String = instance.lua().load("return tostring(hero)").eval().expect("tostring dead");
    assert_eq!(dead, "Actor(invalid)");
}

#[test]
fn collecting_handles_leaves_native_object_alive() {
    let (world, hero) = world_with_hero();
    let instance = instance_for(&world);
    instance
        .lua()
        .load(r#"for i = 1, 100 do local h = UE.Actor.Find("Hero") end"#)
        .exec()
        .expect("create garbage handles");
    instance.collect_garbage();
    assert_eq!(world.actor_name(hero).as_deref(), Some("Hero"));
}
