#![allow(dead_code)]

use async_trait::async_trait;
use bpmn_flow_core::executor::NodeExecutor;
use bpmn_flow_core::store_memory::MemoryStore;
use bpmn_flow_core::types::*;
use bpmn_flow_core::{EngineConfig, EngineError, WorkflowService};
use serde_json::json;
use std::sync::{Arc, Mutex};

pub const ORDER_APPROVAL: &str = include_str!("../models/order_approval.bpmn");
pub const LINEAR: &str = include_str!("../models/linear.bpmn");
pub const FULFILMENT: &str = include_str!("../models/fulfilment.bpmn");
pub const ENDLESS_LOOP: &str = include_str!("../models/endless_loop.bpmn");
pub const SLOW_SERVICE: &str = include_str!("../models/slow_service.bpmn");
pub const NO_DEFAULT_ROUTE: &str = include_str!("../models/no_default_route.bpmn");
pub const START_END: &str = include_str!("../models/start_end.bpmn");

/// Answers service tasks with `{"handled": <node id>}` and logs node ids.
#[derive(Default)]
pub struct StubExecutor {
    pub called: Mutex<Vec<String>>,
}

impl StubExecutor {
    pub fn called(&self) -> Vec<String> {
        self.called.lock().unwrap().clone()
    }
}

#[async_trait]
impl NodeExecutor for StubExecutor {
    async fn execute(
        &self,
        node: &Node,
        params: &Variables,
    ) -> Result<Option<BusinessResponse>, EngineError> {
        if node.kind != NodeKind::ServiceTask {
            return Ok(None);
        }
        self.called.lock().unwrap().push(node.id.clone());
        Ok(Some(BusinessResponse {
            status: 200,
            body: json!({ "handled": node.id, "params": params }),
            headers: Default::default(),
        }))
    }
}

pub struct Harness {
    pub service: WorkflowService,
    pub store: Arc<MemoryStore>,
    pub executor: Arc<StubExecutor>,
}

pub fn harness(config: EngineConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let executor = Arc::new(StubExecutor::default());
    let service = WorkflowService::with_executor(store.clone(), executor.clone(), config);
    Harness {
        service,
        store,
        executor,
    }
}

/// Register `bpmn` and create an instance with `variables`.
pub async fn start(harness: &Harness, bpmn: &str, variables: Variables) -> WorkflowInstance {
    let record = harness
        .service
        .register_workflow(None, None, bpmn.to_string())
        .await
        .unwrap();
    harness
        .service
        .create_instance(&record.id, variables)
        .await
        .unwrap()
}

pub fn vars(pairs: &[(&str, serde_json::Value)]) -> Variables {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}
