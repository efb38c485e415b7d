//! Node behaviour.
//!
//! Only service tasks have an external effect: they POST their parameters as
//! JSON to the node's business URL. Every other kind is a no-op at execution
//! time; gateway conditions are evaluated while advancing, not here.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::EngineError;
use crate::types::{BusinessResponse, Node, NodeKind, Variables};

/// Calls a business endpoint on behalf of a service task.
#[async_trait]
pub trait BusinessClient: Send + Sync {
    async fn post_json(&self, url: &str, body: &Variables) -> Result<BusinessResponse>;
}

/// Runs the behaviour of a single node.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(
        &self,
        node: &Node,
        params: &Variables,
    ) -> Result<Option<BusinessResponse>, EngineError>;
}

// ─── HTTP client ──────────────────────────────────────────────

pub struct HttpBusinessClient {
    client: Client,
}

impl HttpBusinessClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build business HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BusinessClient for HttpBusinessClient {
    async fn post_json(&self, url: &str, body: &Variables) -> Result<BusinessResponse> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;

        let status = response.status().as_u16();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let text = response
            .text()
            .await
            .with_context(|| format!("Reading response body from {url} failed"))?;

        // Non-JSON bodies are carried as a JSON string.
        let body = if text.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text))
        };

        Ok(BusinessResponse {
            status,
            body,
            headers,
        })
    }
}

// ─── Node runner ──────────────────────────────────────────────

/// Default [`NodeExecutor`]: dispatches on [`NodeKind`].
pub struct NodeRunner {
    client: Arc<dyn BusinessClient>,
}

impl NodeRunner {
    pub fn new(client: Arc<dyn BusinessClient>) -> Self {
        Self { client }
    }

    async fn call_service(
        &self,
        node: &Node,
        params: &Variables,
    ) -> Result<Option<BusinessResponse>, EngineError> {
        let url = node
            .business_url
            .as_deref()
            .ok_or_else(|| EngineError::ServiceTaskError {
                node_id: node.id.clone(),
                url: None,
                message: "service task has no business URL".into(),
            })?;

        match self.client.post_json(url, params).await {
            Ok(response) => {
                tracing::debug!(node_id = %node.id, url, status = response.status, "service task answered");
                Ok(Some(response))
            }
            Err(err) => {
                tracing::error!(node_id = %node.id, url, error = %format!("{err:#}"), "service task call failed");
                Err(EngineError::ServiceTaskError {
                    node_id: node.id.clone(),
                    url: Some(url.to_string()),
                    message: format!("{err:#}"),
                })
            }
        }
    }
}

#[async_trait]
impl NodeExecutor for NodeRunner {
    async fn execute(
        &self,
        node: &Node,
        params: &Variables,
    ) -> Result<Option<BusinessResponse>, EngineError> {
        match node.kind {
            NodeKind::ServiceTask => self.call_service(node, params).await,
            NodeKind::Task
            | NodeKind::UserTask
            | NodeKind::ExclusiveGateway
            | NodeKind::ParallelGateway
            | NodeKind::EventBasedGateway
            | NodeKind::StartEvent
            | NodeKind::EndEvent
            | NodeKind::IntermediateCatchEvent
            | NodeKind::BoundaryEvent => Ok(None),
        }
    }
}
