//! MultiMind skill runtime boundary.
//!
//! A worker hosts a set of skills on its private [`MessageBus`]. Each skill
//! implements the [`Skill`] trait and subscribes to the message types it
//! cares about. Which skills a worker may load is decided per access key by
//! the [`CapabilityRegistry`]; which skills exist at all is decided by the
//! [`SkillCatalog`].

pub mod builtin;
pub mod bus;
pub mod capabilities;
pub mod catalog;
pub mod error;

use std::future::Future;
use std::pin::Pin;

use multimind_protocol::BusMessage;

pub use bus::MessageBus;
pub use capabilities::{CapabilityRegistry, DEFAULT_SKILLS};
pub use catalog::SkillCatalog;
pub use error::{RegistryError, SkillError};

/// Trait implemented by every skill.
///
/// `handle` is only called for message types listed in `subscriptions`.
/// Returned messages are published back onto the worker bus.
pub trait Skill: Send + Sync {
    /// Stable identifier (e.g. "skill-ovos-hello-world.openvoiceos").
    fn skill_id(&self) -> &str;

    /// Message types this skill wants delivered.
    fn subscriptions(&self) -> &[&'static str];

    /// React to one bus message.
    fn handle(
        &self,
        message: &BusMessage,
    ) -> impl Future<Output = Result<Vec<BusMessage>, SkillError>> + Send;

    /// Acquire whatever the skill needs before it starts receiving messages.
    fn load(&self) -> impl Future<Output = Result<(), SkillError>> + Send {
        async { Ok(()) }
    }

    /// Release skill resources (called once when the worker stops).
    fn shutdown(&self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe wrapper for the Skill trait.
pub trait SkillDyn: Send + Sync {
    fn skill_id_dyn(&self) -> &str;
    fn subscriptions_dyn(&self) -> &[&'static str];
    fn handle_dyn<'a>(
        &'a self,
        message: &'a BusMessage,
    ) -> BoxFuture<'a, Result<Vec<BusMessage>, SkillError>>;
    fn load_dyn(&self) -> BoxFuture<'_, Result<(), SkillError>>;
    fn shutdown_dyn(&self) -> BoxFuture<'_, ()>;
}

impl<T: Skill> SkillDyn for T {
    fn skill_id_dyn(&self) -> &str {
        self.skill_id()
    }
    fn subscriptions_dyn(&self) -> &[&'static str] {
        self.subscriptions()
    }
    fn handle_dyn<'a>(
        &'a self,
        message: &'a BusMessage,
    ) -> BoxFuture<'a, Result<Vec<BusMessage>, SkillError>> {
        Box::pin(self.handle(message))
    }
    fn load_dyn(&self) -> BoxFuture<'_, Result<(), SkillError>> {
        Box::pin(self.load())
    }
    fn shutdown_dyn(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.shutdown())
    }
}
