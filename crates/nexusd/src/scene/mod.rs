//! In-memory scene model operated on by the host executors.
//!
//! The daemon owns one [`Scene`] behind a mutex. Executors only ever touch it
//! from the host execution context, so the lock is uncontended in practice;
//! it exists so the registry closures can be `Send + Sync`.

mod executors;
mod params;

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Value, json};
use strum::{AsRefStr, Display};

pub use executors::registry;
pub use params::{Asset, Primitive, Rgba, Vector3};

/// Scene shared between the registry's executors.
pub type SharedScene = Arc<Mutex<Scene>>;

/// Broad category of a scene object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ObjectKind {
    /// Geometry.
    Mesh,
    /// Light source.
    Light,
    /// Camera.
    Camera,
}

/// One named object in the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    name: String,
    kind: ObjectKind,
    /// World-space location.
    pub location: Vector3,
    /// Euler rotation in degrees.
    pub rotation: Vector3,
    /// Per-axis scale.
    pub scale: Vector3,
    /// Viewport colour.
    pub color: Rgba,
    /// Names of the modifiers applied to the object.
    pub modifiers: Vec<String>,
}

impl SceneObject {
    fn new(name: String, kind: ObjectKind) -> Self {
        Self {
            name,
            kind,
            location: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
            color: [1.0; 4],
            modifiers: Vec::new(),
        }
    }

    /// Unique object name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Object category.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Detail payload returned by `get_object_details`.
    #[must_use]
    pub fn details(&self) -> Value {
        json!({
            "name": self.name,
            "type": self.kind,
            "location": self.location,
            "rotation_degrees": self.rotation,
            "scale": self.scale,
            "color": self.color,
            "modifiers": self.modifiers,
        })
    }
}

/// Ordered collection of uniquely named objects.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Scene {
    objects: Vec<SceneObject>,
}

impl Scene {
    /// An empty scene.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            objects: Vec::new(),
        }
    }

    /// The start-up scene: a cube at the origin, a light and a camera.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut scene = Self::new();
        scene.add("Cube", ObjectKind::Mesh);
        scene.add_with("Light", ObjectKind::Light, |light| {
            light.location = [4.076, 1.005, 5.904];
            light.rotation = [37.3, 3.2, 106.9];
        });
        scene.add_with("Camera", ObjectKind::Camera, |camera| {
            camera.location = [7.359, -6.926, 4.958];
            camera.rotation = [63.6, 0.0, 46.7];
        });
        scene
    }

    /// Wraps the scene for sharing with executors.
    #[must_use]
    pub fn shared(self) -> SharedScene {
        Arc::new(Mutex::new(self))
    }

    /// Object names in insertion order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.objects.iter().map(|object| object.name.clone()).collect()
    }

    /// Number of objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the scene has no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Looks an object up by exact name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SceneObject> {
        self.objects.iter().find(|object| object.name == name)
    }

    /// Mutable lookup by exact name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|object| object.name == name)
    }

    /// Adds an object under the first free name derived from `base` and
    /// returns that name.
    pub fn add(&mut self, base: &str, kind: ObjectKind) -> String {
        self.add_with(base, kind, |_| {})
    }

    /// Like [`Scene::add`], letting `configure` set the object up before it
    /// joins the scene.
    pub fn add_with<F>(&mut self, base: &str, kind: ObjectKind, configure: F) -> String
    where
        F: FnOnce(&mut SceneObject),
    {
        let mut object = SceneObject::new(self.unique_name(base), kind);
        configure(&mut object);
        let name = object.name.clone();
        self.objects.push(object);
        name
    }

    /// Removes an object, returning it when it existed.
    pub fn remove(&mut self, name: &str) -> Option<SceneObject> {
        let index = self.objects.iter().position(|object| object.name == name)?;
        Some(self.objects.remove(index))
    }

    /// `base` if unused, else `base.001`, `base.002`, ...
    fn unique_name(&self, base: &str) -> String {
        if self.get(base).is_none() {
            return base.to_owned();
        }
        (1_u32..)
            .map(|suffix| format!("{base}.{suffix:03}"))
            .find(|candidate| self.get(candidate).is_none())
            .unwrap_or_else(|| base.to_owned())
    }
}
