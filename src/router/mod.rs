//! Request routing and the provider fallback chain
//!
//! # Architecture
//!
//! ```text
//! Front end → ChatRouter::route_chat(request)
//!                  ↓
//!             classify(message)
//!           ↙                 ↘
//!   CodeRunner (sandbox)    ChatProvider primary → fallback
//!                                      ↓ (both absent)
//!                               PendingQueue (replayed on recovery)
//! ```

pub mod chain;
pub mod classifier;
pub mod provider;
pub mod queue;

pub use chain::{compose_prompt, stub_reply, ChatRequest, ChatResult, ChatRouter, Provider, RouterConfig};
pub use classifier::{classify, Intent, MODEL_SYSTEM_INSTRUCTION};
pub use provider::{ChatProvider, ModelRequest};
pub use queue::{PendingQueue, QueueSnapshot};
