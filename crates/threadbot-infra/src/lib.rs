//! Infrastructure layer for Threadbot.
//!
//! Contains implementations of the ports defined in `threadbot-core`: the
//! OpenAI-compatible `LlmProvider`, the Discord and in-memory `Transport`s,
//! plus configuration loading and secret resolution.

pub mod config;
pub mod discord;
pub mod llm;
pub mod memory;
pub mod secret;
