use anyhow::{Context, Result};
use bpmn_flow_core::EngineConfig;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const ENV_BIND_ADDR: &str = "BPMN_FLOW_BIND_ADDR";
pub const ENV_CONFIG: &str = "BPMN_FLOW_CONFIG";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4200";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub engine: EngineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::resolve(|name| std::env::var(name).ok())
    }

    /// Bind address and engine config from `lookup`; the engine YAML path, if
    /// any, comes from `BPMN_FLOW_CONFIG`.
    pub fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw_addr = lookup(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse()
            .with_context(|| format!("{ENV_BIND_ADDR}={raw_addr} is not a socket address"))?;

        let engine = match lookup(ENV_CONFIG).map(PathBuf::from) {
            Some(path) => EngineConfig::load_from_file(&path)?,
            None => EngineConfig::default(),
        };
        let engine = engine.with_overrides(&lookup)?;

        Ok(Self { bind_addr, engine })
    }
}
