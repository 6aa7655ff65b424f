//! # context-relay
//!
//! A retrieval-augmented chat gateway. It sits between a client application
//! and an LLM provider, enriching conversations with context pulled from a
//! small fixed knowledge corpus before forwarding them upstream, and relays
//! the provider's response, including token-by-token streams, back to the
//! caller.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────────────┐   ┌───────────┐
//! │ Sanitizer │──▶│ Retrieval │──▶│ Prompt Assembly │──▶│ Dispatch  │
//! └──────────┘   │ cache+rank │   └─────────────────┘   │ buffered/ │
//!                └─────┬─────┘                          │ streamed  │
//!                      │ fill once per process          └───────────┘
//!                ┌─────▼─────┐
//!                │ Embeddings │
//!                └───────────┘
//! ```
//!
//! The corpus embedding cache fills lazily on the first request and lives
//! for the process lifetime; concurrent cold requests share one fill.
//! Retrieval failures degrade to a chat without corpus context; generation
//! failures are surfaced to the caller.
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=sk-...
//! relay serve                         # start the gateway
//! relay corpus                        # list knowledge entries
//! relay ask "How does onboarding work?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`corpus`] | Fixed knowledge corpus |
//! | [`models`] | Core data types |
//! | [`sanitize`] | Inbound message sanitization |
//! | [`embedding`] | Embedding backend and vector math |
//! | [`index`] | Process-lifetime embedding cache |
//! | [`retrieval`] | Similarity ranking and orchestration |
//! | [`prompt`] | System prompt assembly |
//! | [`upstream`] | Chat completion dispatch |
//! | [`server`] | HTTP gateway |

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod index;
pub mod models;
pub mod prompt;
pub mod retrieval;
pub mod sanitize;
pub mod server;
pub mod text;
pub mod upstream;
