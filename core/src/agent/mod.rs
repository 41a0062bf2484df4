//! Agent contract and its implementations.
//! - parallel.rs: ParallelAgent, the mailbox + worker thread wrapper
//! - builtin.rs: arithmetic agents (IncAgent, BinOpAgent and friends)
//! - factory.rs: AgentFactory, type name -> constructor registry

use crate::{Message, Result};
use std::any::Any;

mod builtin;
mod factory;
mod parallel;

pub use builtin::{BinOpAgent, IncAgent};
pub use factory::{AgentConstructor, AgentFactory, BuiltAgent};
pub use parallel::ParallelAgent;

/// A named unit of computation reacting to topic messages
///
/// Identity is the name: topics deduplicate and remove agents by name.
/// Implementations that are not wrapped in a [`ParallelAgent`] may be called
/// from several threads at once and must synchronize their own state.
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    /// Forget any accumulated state
    fn reset(&self);

    /// Handle `message` published on `topic`
    fn callback(&self, topic: &str, message: &Message) -> Result<()>;

    /// Detach from topics and release resources
    fn close(&self);
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
