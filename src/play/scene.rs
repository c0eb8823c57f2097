use crate::step::Step;
use std::fmt;
use std::sync::Arc;

pub type SceneName = String;

/// A named sequence of steps with success and error routing.
///
/// A scene may reference scenes that do not exist yet; references are only
/// checked when scenes are gathered into a [`PlayCatalog`](super::PlayCatalog).
#[derive(Clone)]
pub struct Scene {
    name: SceneName,
    steps: Vec<Arc<dyn Step>>,
    next_scene: Option<SceneName>,
    on_error_scene: Option<SceneName>,
}

impl Scene {
    pub fn new(name: impl Into<SceneName>, steps: Vec<Arc<dyn Step>>) -> Self {
        Self {
            name: name.into(),
            steps,
            next_scene: None,
            on_error_scene: None,
        }
    }

    /// Scene to run once every step succeeded
    pub fn with_next_scene(mut self, next_scene: impl Into<SceneName>) -> Self {
        self.next_scene = Some(next_scene.into());
        self
    }

    /// Scene to run when a step fails
    pub fn with_on_error_scene(mut self, on_error_scene: impl Into<SceneName>) -> Self {
        self.on_error_scene = Some(on_error_scene.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Arc<dyn Step>] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn next_scene(&self) -> Option<&str> {
        self.next_scene.as_deref()
    }

    pub fn on_error_scene(&self) -> Option<&str> {
        self.on_error_scene.as_deref()
    }

    /// No success and no error transition
    pub fn is_terminal(&self) -> bool {
        self.next_scene.is_none() && self.on_error_scene.is_none()
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .field("next_scene", &self.next_scene)
            .field("on_error_scene", &self.on_error_scene)
            .finish()
    }
}
