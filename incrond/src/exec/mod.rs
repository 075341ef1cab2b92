// src/exec/mod.rs

//! Command execution layer.
//!
//! - [`expand`] turns a rule's command template plus an event into a
//!   concrete command string and argument tokens.
//! - [`supervisor`] forks/execs the commands under the right identity and
//!   reaps finished children.

pub mod expand;
pub mod supervisor;

pub use expand::{expand_command, tokenize, EventContext};
pub use supervisor::{ChildSupervisor, CompletionAction, Identity};
