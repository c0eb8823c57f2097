//! Scenes and the catalog routing between them
//!
//! A [`Scene`] runs its steps in order and names the scene to continue with
//! on success (`next_scene`) and on failure (`on_error_scene`). A
//! [`PlayCatalog`] checks when it is built that every such name resolves, so a
//! running play never meets an unknown scene.

pub mod catalog;
pub mod manager;
pub mod runner;
pub mod scene;

pub use catalog::PlayCatalog;
pub use manager::{FinishedPlay, PlayManager};
pub use runner::{exception_info, PlayReport, PlayRunner, PlayTracker, SceneFailure, EXCEPTION_INFO_KEY};
pub use scene::{Scene, SceneName};
