// src/engine/mod.rs

//! Event-driven dispatch engine.
//!
//! This module ties together:
//! - [`usertable`]: one rule table bound to one watch registry for one
//!   principal, with the per-event access check / expand / spawn path
//! - [`dispatcher`]: the top-level poll loop multiplexing the self-pipe,
//!   the table-management registry and every principal's registry

pub mod dispatcher;
pub mod usertable;

pub use dispatcher::EventDispatcher;
pub use usertable::{may_access, UserTable};
