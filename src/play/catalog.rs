use crate::core::errors::{Result, SchedulerError};
use std::collections::HashMap;
use std::ops::Add;
use tracing::debug;

use super::scene::{Scene, SceneName};

/// Every scene a play may visit, with all routing resolved.
///
/// Construction fails on the first scene (in insertion order) whose
/// `next_scene` or `on_error_scene` is not part of the catalog.
#[derive(Debug, Clone, Default)]
pub struct PlayCatalog {
    scenes: Vec<Scene>,
    index: HashMap<SceneName, usize>,
}

impl PlayCatalog {
    pub fn new(scenes: impl IntoIterator<Item = Scene>) -> Result<Self> {
        let mut catalog = Self::default();
        for scene in scenes {
            if catalog.index.contains_key(scene.name()) {
                return Err(SchedulerError::DuplicateScene {
                    name: scene.name().to_string(),
                });
            }
            catalog
                .index
                .insert(scene.name().to_string(), catalog.scenes.len());
            catalog.scenes.push(scene);
        }
        catalog.validate()?;
        debug!(scenes = catalog.len(), "play catalog built");
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        for scene in &self.scenes {
            if let Some(next_scene) = scene.next_scene() {
                if !self.contains(next_scene) {
                    return Err(SchedulerError::NextSceneNotInPlayCatalog {
                        scene: scene.name().to_string(),
                        next_scene: next_scene.to_string(),
                    });
                }
            }
            if let Some(on_error_scene) = scene.on_error_scene() {
                if !self.contains(on_error_scene) {
                    return Err(SchedulerError::OnErrorSceneNotInPlayCatalog {
                        scene: scene.name().to_string(),
                        on_error_scene: on_error_scene.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Scene> {
        self.index
            .get(name)
            .map(|&i| &self.scenes[i])
            .ok_or_else(|| SchedulerError::SceneNotFound {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Union of both catalogs, validated again as a whole
    pub fn merge(&self, other: &PlayCatalog) -> Result<PlayCatalog> {
        Self::new(self.scenes.iter().chain(other.scenes.iter()).cloned())
    }

    /// Scene names in insertion order
    pub fn names(&self) -> Vec<&str> {
        self.scenes.iter().map(|s| s.name()).collect()
    }

    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.iter()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

impl Add for PlayCatalog {
    type Output = Result<PlayCatalog>;

    fn add(self, other: PlayCatalog) -> Self::Output {
        Self::new(self.scenes.into_iter().chain(other.scenes))
    }
}

impl Add for &PlayCatalog {
    type Output = Result<PlayCatalog>;

    fn add(self, other: &PlayCatalog) -> Self::Output {
        self.merge(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_is_resolved() {
        let catalog = PlayCatalog::new([
            Scene::new("start", vec![])
                .with_next_scene("run")
                .with_on_error_scene("cleanup"),
            Scene::new("run", vec![]),
            Scene::new("cleanup", vec![]),
        ])
        .unwrap();

        assert_eq!(catalog.names(), vec!["start", "run", "cleanup"]);
        assert!(catalog.contains("run"));
        assert!(!catalog.contains("missing"));
        assert_eq!(catalog.get("start").unwrap().next_scene(), Some("run"));
        assert!(matches!(
            catalog.get("missing"),
            Err(SchedulerError::SceneNotFound { .. })
        ));
    }

    #[test]
    fn test_first_unresolved_reference_wins() {
        let err = PlayCatalog::new([
            Scene::new("a", vec![]).with_on_error_scene("nope"),
            Scene::new("b", vec![]).with_next_scene("nope"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::OnErrorSceneNotInPlayCatalog { ref scene, .. } if scene == "a"
        ));
    }

    #[test]
    fn test_duplicate_scene() {
        let err = PlayCatalog::new([Scene::new("a", vec![]), Scene::new("a", vec![])]).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateScene { .. }));
    }

    #[test]
    fn test_add_resolves_across_catalogs() {
        let left = PlayCatalog::new([Scene::new("x", vec![])]).unwrap();
        let right = PlayCatalog::new([Scene::new("y", vec![])]).unwrap();
        let both = (&left + &right).unwrap();
        assert_eq!(both.len(), 2);

        let duplicate = (&left + &left).unwrap_err();
        assert!(matches!(duplicate, SchedulerError::DuplicateScene { .. }));
    }
}
