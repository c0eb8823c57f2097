//! Steps and the context they read from and write to
//!
//! A step is pure computation: it reads values from a [`PlayContext`], does
//! its work and returns a [`PartialState`] which the runner merges back into
//! the context. Steps never mutate the context directly.

mod attempt;
pub mod base;
pub mod context;
pub mod registry;

pub use base::*;
pub use context::*;
pub use registry::*;

pub(crate) use attempt::run_attempts;
