//! Host executors over the in-memory scene.

use std::sync::{MutexGuard, PoisonError};

use nexus_protocol::Params;
use nexus_rpc::{ExecutorError, Registry};
use serde_json::Value;

use super::{ObjectKind, Scene, SceneObject, SharedScene, params};

/// Builds the daemon's operation registry over `scene`.
#[must_use]
pub fn registry(scene: &SharedScene) -> Registry {
    let create = scene.clone();
    let moved = scene.clone();
    let rotated = scene.clone();
    let scaled = scene.clone();
    let deleted = scene.clone();
    let coloured = scene.clone();
    let imported = scene.clone();
    let listed = scene.clone();
    let detailed = scene.clone();

    Registry::builder()
        .action("create_primitive", move |params| {
            create_primitive(&mut lock(&create), params)
        })
        .action("move_object", move |params| {
            let location = params::vector(params, "location")?;
            update(&moved, params, "Moved", |object| object.location = location)
        })
        .action("rotate_object", move |params| {
            let rotation = params::vector(params, "rotation")?;
            update(&rotated, params, "Rotated", |object| object.rotation = rotation)
        })
        .action("scale_object", move |params| {
            let factors = params::scale(params)?;
            update(&scaled, params, "Scaled", |object| object.scale = factors)
        })
        .action("delete_object", move |params| {
            let name = params::name(params)?;
            lock(&deleted)
                .remove(name)
                .map(|object| format!("Deleted {}.", object.name()))
                .ok_or_else(|| not_found(name))
        })
        .action("set_object_color", move |params| {
            let rgba = params::colour(params)?;
            update(&coloured, params, "Set color for", |object| {
                object.color = rgba;
            })
        })
        .action("import_asset", move |params| {
            import_asset(&mut lock(&imported), params)
        })
        .query("list_scene_objects", move |_| {
            Ok(Value::from(lock(&listed).names()))
        })
        .query("get_object_details", move |params| {
            let name = params::name(params)?;
            lock(&detailed)
                .get(name)
                .map(SceneObject::details)
                .ok_or_else(|| not_found(name))
        })
        .build()
}

fn lock(scene: &SharedScene) -> MutexGuard<'_, Scene> {
    scene.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(name: &str) -> ExecutorError {
    ExecutorError::not_found(format!("Object not found: {name}"))
}

fn create_primitive(scene: &mut Scene, params: &Params) -> Result<String, ExecutorError> {
    let shape = params::shape(params)?;
    let size = params::size(params)?;
    let location = params::optional_vector(params, "location")?.unwrap_or_default();

    let name = scene.add_with(shape.as_ref(), ObjectKind::Mesh, |object| {
        object.location = location;
        object.scale = [size; 3];
    });
    Ok(format!("{shape} created as {name}."))
}

/// Records a glTF asset as a mesh named after its file.
///
/// The link is validated but never fetched; the scene holds no geometry.
fn import_asset(scene: &mut Scene, params: &Params) -> Result<String, ExecutorError> {
    let asset = params::asset(params)?;
    let location = params::optional_vector(params, "location")?.unwrap_or_default();
    let name = scene.add_with(&asset.stem, ObjectKind::Mesh, |object| {
        object.location = location;
    });
    Ok(format!("Imported asset from {} as {name}.", asset.url))
}

/// Applies `change` to the named object and reports `verb name.`.
fn update<F>(scene: &SharedScene, params: &Params, verb: &str, change: F) -> Result<String, ExecutorError>
where
    F: FnOnce(&mut SceneObject),
{
    let name = params::name(params)?;
    let mut guard = lock(scene);
    let object = guard.get_mut(name).ok_or_else(|| not_found(name))?;
    change(object);
    Ok(format!("{verb} {}.", object.name()))
}
