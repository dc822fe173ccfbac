//! Agent layer - role routing, knowledge lookups and model calls
//!
//! This crate turns a request about the Creatio CRM data model into a single
//! grounded model answer:
//! - Picks the specialist role that owns the request
//! - Runs the role's knowledge lookups against the static tables in `crmcrew-core`
//! - Renders the role's system prompt and the task prompt with the lookup output embedded
//! - Sends the prompt to the configured provider and returns its text unmodified
//!
//! # Architecture
//!
//! 1. **Roles** (`roles`) - Four specialists and the tool sets each may use
//! 2. **Tools** (`tools`) - Deterministic lookups returning JSON records
//! 3. **Prompts** (`prompts`) - Tera templates for system and task prompts
//! 4. **Orchestrator** (`orchestrator`) - Routing, lookups, rendering and the provider call
//! 5. **Providers** (`llm`) - OpenAI, Anthropic and Ollama chat clients
//!
//! # Grounding Principle
//!
//! The model only explains. Every entity, column and KPI fact it sees comes
//! from a lookup record, and a missed lookup is embedded as a not-found record
//! rather than skipped.

pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod roles;
pub mod tools;

pub use llm::{client_from_config, LlmClient};
pub use orchestrator::{Category, Orchestrator, OrchestratorError, Request, Response};
pub use roles::{AgentRole, ToolSet};
pub use tools::{ToolError, ToolRegistry};
