//! REST surface for the BPMN flow engine.

pub mod config;
pub mod error;
pub mod handlers;
pub mod router;

pub use config::ServerConfig;
pub use router::{build_router, AppState};
