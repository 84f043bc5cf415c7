//! Shared domain types for Threadbot.
//!
//! This crate contains the core domain types used across the Threadbot
//! workspace: thread messages, context windows, LLM request/response shapes,
//! session lifecycle types, commands, configuration, and their error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod command;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod llm;
pub mod message;
pub mod session;
