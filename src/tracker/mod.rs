//! Tracking of dynamic service instances
//!
//! [`ServiceTracker`] keeps one [`TrackedServiceModel`] per node id in a
//! [`KeyValueStore`]: [`InMemoryStore`] for tests, [`SledStore`] when records
//! must survive a restart.

pub mod model;
pub mod presence;
pub mod service;
pub mod store;

pub use model::{NodeId, SchedulerServiceState, TrackedServiceModel, UserRequestedState};
pub use presence::{ServiceState, ServicesPresence};
pub use service::ServiceTracker;
pub use store::{InMemoryStore, KeyPattern, KeyValueStore, SledStore};
