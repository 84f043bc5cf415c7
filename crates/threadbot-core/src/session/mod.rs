//! Conversation sessions: actor, idle timer, turn runner and registry.

pub mod actor;
pub mod idle;
pub mod registry;
pub mod turn;

pub use actor::Session;
pub use idle::IdleTimer;
pub use registry::SessionRegistry;
pub use turn::TurnRunner;
