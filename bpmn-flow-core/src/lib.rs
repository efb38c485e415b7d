//! BPMN flow engine core.
//!
//! Parses BPMN 2.0 process definitions into an arena-backed graph, resolves
//! resume/rollback requests against a running instance, and advances the
//! instance node by node. Every persistence write and node execution flows
//! through an [`intercept::Interceptor`] so runs can be recorded, replayed or
//! fully mocked.

pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod executor;
pub mod export;
pub mod expr;
pub mod intercept;
pub mod locks;
pub mod parser;
pub mod rollback;
pub mod service;
pub mod store;
pub mod store_memory;
pub mod types;
pub mod validate;

pub use config::EngineConfig;
pub use definition::ProcessDefinition;
pub use engine::ExecutionEngine;
pub use error::{EngineError, ErrorBody, ErrorCategory, ParseError};
pub use intercept::{InterceptMode, InterceptPolicy, Interceptor};
pub use parser::parse_bpmn;
pub use service::WorkflowService;
