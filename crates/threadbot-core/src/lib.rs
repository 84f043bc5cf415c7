//! Conversation session engine for Threadbot.
//!
//! This crate holds the engine and the "ports" (the `Transport` and
//! `LlmProvider` traits) that the infrastructure layer implements. It depends
//! only on `threadbot-types` -- never on `threadbot-infra` or any network
//! crate.

pub mod command;
pub mod context;
pub mod dispatch;
pub mod event;
pub mod generator;
pub mod llm;
pub mod session;
pub mod transport;
