//! The rendering scene: named lights and non-owning handles to them.

use crate::common::LightId;
use crate::error::SceneError;
use slotmap::SlotMap;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::debug;

/// A light in the scene. Only the range is modelled.
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    pub name: String,
    pub range: f64,
}

#[derive(Debug, Default)]
struct SceneData {
    lights: SlotMap<LightId, Light>,
    by_name: HashMap<String, LightId>,
}

/// Shared handle to the scene graph. Clones refer to the same scene.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    data: Arc<RwLock<SceneData>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_light(&self, name: &str, range: f64) -> Result<LightId, SceneError> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        if data.by_name.contains_key(name) {
            return Err(SceneError::DuplicateLight(name.to_string()));
        }
        let id = data.lights.insert(Light {
            name: name.to_string(),
            range,
        });
        data.by_name.insert(name.to_string(), id);
        debug!("Added light '{}' with range {}", name, range);
        Ok(id)
    }

    /// Removes a light. Outstanding handles to it become invalid.
    pub fn remove_light(&self, name: &str) -> Option<Light> {
        let mut data = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let id = data.by_name.remove(name)?;
        data.lights.remove(id)
    }

    /// Looks a light up by name and returns a non-owning handle to it.
    pub fn light(&self, name: &str) -> Option<LightHandle> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let id = *data.by_name.get(name)?;
        Some(LightHandle {
            scene: Arc::downgrade(&self.data),
            id,
            name: name.to_string(),
        })
    }

    /// Current range of the named light.
    pub fn range(&self, name: &str) -> Option<f64> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let id = data.by_name.get(name)?;
        data.lights.get(*id).map(|light| light.range)
    }

    /// Snapshot of every light, sorted by name.
    pub fn lights(&self) -> Vec<Light> {
        let data = self.data.read().unwrap_or_else(PoisonError::into_inner);
        let mut lights: Vec<Light> = data.lights.values().cloned().collect();
        lights.sort_by(|a, b| a.name.cmp(&b.name));
        lights
    }
}

/// Something with a numeric range that can be set from outside.
pub trait RangeTarget: Send + Sync {
    fn set_range(&self, range: i32) -> Result<(), SceneError>;

    /// Human-readable name for logging.
    fn label(&self) -> &str;
}

/// A non-owning reference to a light.
///
/// Holding a handle keeps neither the scene nor the light alive. Every access
/// re-validates: if the scene was dropped or the light removed (even if a new
/// light took its name), the access fails instead of touching stale data.
#[derive(Debug, Clone)]
pub struct LightHandle {
    scene: Weak<RwLock<SceneData>>,
    id: LightId,
    name: String,
}

impl LightHandle {
    pub fn is_valid(&self) -> bool {
        self.scene
            .upgrade()
            .map(|data| {
                data.read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .lights
                    .contains_key(self.id)
            })
            .unwrap_or(false)
    }

    pub fn range(&self) -> Result<f64, SceneError> {
        let data = self.scene.upgrade().ok_or(SceneError::SceneDropped)?;
        let data = data.read().unwrap_or_else(PoisonError::into_inner);
        data.lights
            .get(self.id)
            .map(|light| light.range)
            .ok_or_else(|| SceneError::LightRemoved(self.name.clone()))
    }
}

impl RangeTarget for LightHandle {
    fn set_range(&self, range: i32) -> Result<(), SceneError> {
        let data = self.scene.upgrade().ok_or(SceneError::SceneDropped)?;
        let mut data = data.write().unwrap_or_else(PoisonError::into_inner);
        let light = data
            .lights
            .get_mut(self.id)
            .ok_or_else(|| SceneError::LightRemoved(self.name.clone()))?;
        light.range = f64::from(range);
        Ok(())
    }

    fn label(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_sets_range_verbatim() {
        let scene = Scene::new();
        scene.add_light("lamp", 5.0).unwrap();
        let handle = scene.light("lamp").unwrap();

        handle.set_range(1000).unwrap();
        assert_eq!(scene.range("lamp"), Some(1000.0));
        handle.set_range(-3).unwrap();
        assert_eq!(handle.range().unwrap(), -3.0);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let scene = Scene::new();
        scene.add_light("lamp", 1.0).unwrap();
        assert_eq!(
            scene.add_light("lamp", 2.0),
            Err(SceneError::DuplicateLight("lamp".to_string()))
        );
    }

    #[test]
    fn removed_light_invalidates_handle_even_if_name_reused() {
        let scene = Scene::new();
        scene.add_light("lamp", 5.0).unwrap();
        let handle = scene.light("lamp").unwrap();

        scene.remove_light("lamp").unwrap();
        scene.add_light("lamp", 7.0).unwrap();

        assert!(!handle.is_valid());
        assert_eq!(
            handle.set_range(0),
            Err(SceneError::LightRemoved("lamp".to_string()))
        );
        assert_eq!(scene.range("lamp"), Some(7.0));
    }

    #[test]
    fn dropped_scene_invalidates_handle() {
        let scene = Scene::new();
        scene.add_light("lamp", 5.0).unwrap();
        let handle = scene.light("lamp").unwrap();
        drop(scene);

        assert!(!handle.is_valid());
        assert_eq!(handle.set_range(0), Err(SceneError::SceneDropped));
    }

    #[test]
    fn unknown_light_has_no_handle() {
        let scene = Scene::new();
        assert!(scene.light("missing").is_none());
        assert!(scene.range("missing").is_none());
    }
}
