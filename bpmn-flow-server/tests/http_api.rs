//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bpmn_flow_core::store_memory::MemoryStore;
use bpmn_flow_core::{EngineConfig, WorkflowService};
use bpmn_flow_server::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const LINEAR: &str = include_str!("../../bpmn-flow-core/tests/models/linear.bpmn");
const ORDER_APPROVAL: &str = include_str!("../../bpmn-flow-core/tests/models/order_approval.bpmn");

fn app() -> Router {
    let service = WorkflowService::new(Arc::new(MemoryStore::new()), EngineConfig::default())
        .expect("service");
    build_router(AppState::new(service))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Register `bpmn` and create an instance; returns the instance id.
async fn instance_of(app: &Router, bpmn: &str, variables: Value) -> String {
    let (status, workflow) = send(app, post_json("/api/workflows", json!({ "bpmnXml": bpmn }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, instance) = send(
        app,
        post_json(
            "/api/workflow-instances",
            json!({ "workflowId": workflow["id"], "variables": variables }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(instance["status"], "pending");
    instance["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = send(&app(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_invalid_bpmn_is_bad_request() {
    let (status, body) = send(
        &app(),
        post_json("/api/workflows", json!({ "bpmnXml": "<definitions/>" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_PROCESS_ELEMENT");
    assert!(body["error"]["message"].is_string());
    assert!(body["error"]["details"].is_object());
}

#[tokio::test]
async fn test_unknown_workflow_is_not_found() {
    let (status, body) = send(&app(), get("/api/workflows/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "WORKFLOW_NOT_FOUND");
}

#[tokio::test]
async fn test_execute_linear_workflow() {
    let app = app();
    let id = instance_of(&app, LINEAR, json!({})).await;

    let (status, body) = send(
        &app,
        post_json(
            &format!("/api/workflow-instances/{id}/execute"),
            json!({ "fromNodeId": "", "businessParams": {} }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["engineResponse"]["status"], "completed");
    assert_eq!(body["engineResponse"]["currentNodeIds"], json!([]));
    assert!(body["interceptedCalls"].as_array().unwrap().len() >= 4);

    let (status, instance) = send(&app, get(&format!("/api/workflow-instances/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(instance["status"], "completed");

    let (status, history) =
        send(&app, get(&format!("/api/workflow-instances/{id}/executions"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history[0]["status"], "completed");
}

#[tokio::test]
async fn test_execute_unknown_instance_is_not_found() {
    let (status, body) = send(
        &app(),
        post_json(
            &format!("/api/workflow-instances/{}/execute", uuid::Uuid::new_v4()),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "INSTANCE_NOT_FOUND");
}

#[tokio::test]
async fn test_skipped_step_is_bad_request() {
    let app = app();
    let id = instance_of(&app, ORDER_APPROVAL, json!({ "amount": 10 })).await;

    let (status, body) = send(
        &app,
        post_json(
            &format!("/api/workflow-instances/{id}/execute"),
            json!({ "fromNodeId": "ship" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "SKIPPED_STEP");
    assert_eq!(body["error"]["details"]["nodeId"], "ship");
}

#[tokio::test]
async fn test_policy_header_mocks_instance_updates() {
    let app = app();
    let id = instance_of(&app, LINEAR, json!({})).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/workflow-instances/{id}/execute"))
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-intercept-policy", r#"{"UpdateInstance": "enabled"}"#)
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["engineResponse"]["status"], "completed");

    let (_, instance) = send(&app, get(&format!("/api/workflow-instances/{id}"))).await;
    assert_eq!(instance["status"], "pending");
    assert_eq!(instance["version"], 0);
}

#[tokio::test]
async fn test_bad_policy_header_is_rejected() {
    let app = app();
    let id = instance_of(&app, LINEAR, json!({})).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/api/workflow-instances/{id}/execute"))
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-intercept-policy", r#"{"*": "sometimes"}"#)
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_mock_execute_needs_no_stored_state() {
    let instance_id = uuid::Uuid::new_v4();
    let (status, body) = send(
        &app(),
        post_json(
            "/api/workflow-instances/mock/execute",
            json!({
                "instance": { "id": instance_id, "workflowId": "order_approval" },
                "bpmnXml": ORDER_APPROVAL,
                "businessParams": { "amount": 5 },
                "mocks": {
                    format!("ExecuteNode:{instance_id}:ship"): {
                        "status": 201,
                        "body": { "trackingNo": "TRK-1" }
                    }
                }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["businessResponse"]["status"], 201);
    assert_eq!(body["businessResponse"]["body"]["trackingNo"], "TRK-1");
    assert_eq!(body["engineResponse"]["status"], "completed");
    let calls = body["interceptedCalls"].as_array().unwrap();
    assert!(calls.iter().all(|c| c["mocked"] == json!(true)));
}

#[tokio::test]
async fn test_export_returns_xml() {
    let app = app();
    send(&app, post_json("/api/workflows", json!({ "bpmnXml": ORDER_APPROVAL }))).await;

    let response = app
        .clone()
        .oneshot(get("/api/workflows/order_approval/export?prefix=bpmn2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/xml"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let xml = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(xml.contains("<bpmn2:process id=\"order_approval\""));
}

#[tokio::test]
async fn test_export_rejects_markup_in_prefix() {
    let app = app();
    send(&app, post_json("/api/workflows", json!({ "bpmnXml": ORDER_APPROVAL }))).await;

    let (status, body) = send(
        &app,
        get("/api/workflows/order_approval/export?prefix=a%22%3E%3Cx"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_malformed_json_uses_error_envelope() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/workflows")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"bpmnXml": 5"#))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");

    let (status, body) = send(
        &app,
        post_json("/api/workflow-instances", json!({ "variables": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_REQUEST");
}
