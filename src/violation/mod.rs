//! Violation event storage.

pub mod store;

pub use store::{ViolationEvent, ViolationListener, ViolationSource, ViolationStore};
