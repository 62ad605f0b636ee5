//! Agent Runtime - routing, dispatch and capability workers
//!
//! This crate holds the agents of the switchboard assistant:
//! - Classifies free-form text into a capability (`router`)
//! - Calls the chosen worker synchronously with a history snapshot (`dispatcher`, `worker`)
//! - Resolves people and asks for clarification when a name is ambiguous (`workers`)
//! - Checks credentials and the per-sender action quota before side effects (`guardrails`)
//!
//! # Architecture
//!
//! Every agent is its own tokio task with a mailbox:
//! 1. **Routing** (`router`) - classifier call, keyword fallback in fixed priority order
//! 2. **Dispatch** (`dispatcher`) - auth intercept, worker call under a timeout, context update
//! 3. **Work** (`workers`) - entity resolution, guardrails, external action (`tools`)
//! 4. **Rendering** (`render`) - worker response to user-facing text
//!
//! # Key Types
//!
//! - `AgentRuntime` - cloneable handle to the running agents (see `runtime`)
//! - `LlmClient` - pluggable trait for OpenAI/Anthropic/Ollama
//! - `ActionGuard` - auth re-check and sliding-window quota
//!
//! # Safety Principle
//!
//! The language model only suggests a route. It never performs an action,
//! and a missing or malformed answer always falls back to keyword routing.

pub mod auth;
pub mod catalog;
pub mod conversation;
pub mod directory;
pub mod dispatcher;
pub mod guardrails;
pub mod llm;
pub mod render;
pub mod router;
pub mod runtime;
pub mod tools;
pub mod worker;
pub mod workers;

pub use dispatcher::{AgentHealth, DispatchReply, Dispatcher};
pub use runtime::{AgentRuntime, RuntimeComponents, RuntimeError, RuntimeSettings};
