use super::*;
use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct ServerState {
    seen: Arc<Mutex<Vec<String>>>,
}

async fn handle_list_templates() -> Json<Value> {
    Json(json!([
        {"id": "jupyter", "description": "Jupyter notebook", "parameters": ["id"], "version": "7"},
        {"id": "zeppelin"},
    ]))
}

async fn handle_list_instances(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let template_id = query.get("templateId").cloned().unwrap_or_default();
    state.seen.lock().await.push(format!("list {template_id}"));
    Json(json!([
        {"id": "i-1", "templateId": template_id, "status": "running", "services": []},
    ]))
}

async fn handle_create_instance(
    State(state): State<ServerState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.seen.lock().await.push(format!("create {body}"));
    Json(json!({"id": "i-2", "templateId": body["templateId"], "status": "starting"}))
}

async fn handle_update_status(
    State(state): State<ServerState>,
    Path(instance_id): Path<String>,
    body: String,
) -> Json<Value> {
    state
        .seen
        .lock()
        .await
        .push(format!("status {instance_id} {body}"));
    let status: String = serde_json::from_str(&body).unwrap_or_default();
    Json(json!({"id": instance_id, "templateId": "jupyter", "status": status}))
}

async fn handle_delete_instance(
    State(state): State<ServerState>,
    Path(instance_id): Path<String>,
) -> (StatusCode, String) {
    state
        .seen
        .lock()
        .await
        .push(format!("delete {instance_id}"));
    if instance_id == "missing" {
        return (StatusCode::NOT_FOUND, "no such instance".to_string());
    }
    (StatusCode::NO_CONTENT, String::new())
}

async fn spawn_backend() -> (String, ServerState) {
    let state = ServerState::default();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route("/api/v1/templates", get(handle_list_templates))
        .route(
            "/api/v1/instances",
            get(handle_list_instances).post(handle_create_instance),
        )
        .route(
            "/api/v1/instances/:id",
            post(handle_update_status).delete(handle_delete_instance),
        )
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state)
}

#[tokio::test]
async fn lists_templates_keeping_unknown_fields() {
    let (base_url, _) = spawn_backend().await;
    let api = HttpTemplateApi::new(&base_url).expect("api");

    let templates = api.list_templates().await.expect("templates");

    assert_eq!(templates.len(), 2);
    assert_eq!(templates[0].id, TemplateId::new("jupyter"));
    assert_eq!(templates[0].parameters, vec!["id".to_string()]);
    assert_eq!(templates[0].extra.get("version"), Some(&json!("7")));
    assert!(templates[1].parameters.is_empty());
}

#[tokio::test]
async fn lists_instances_filtered_by_template_id() {
    let (base_url, state) = spawn_backend().await;
    let api = HttpTemplateApi::new(&base_url).expect("api");

    let instances = api
        .list_instances(&TemplateId::new("jupyter"))
        .await
        .expect("instances");

    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0].template_id, TemplateId::new("jupyter"));
    assert_eq!(instances[0].status, InstanceStatus::Running);
    assert_eq!(*state.seen.lock().await, vec!["list jupyter".to_string()]);
}

#[tokio::test]
async fn create_posts_template_id_and_parameters() {
    let (base_url, state) = spawn_backend().await;
    let api = HttpTemplateApi::new(&base_url).expect("api");
    let request = CreateInstanceRequest {
        template_id: TemplateId::new("jupyter"),
        parameters: [("id".to_string(), "notebook".to_string())].into(),
    };

    let created = api.create_instance(&request).await.expect("create");

    assert_eq!(created.id, InstanceId::new("i-2"));
    assert_eq!(created.status, InstanceStatus::Starting);
    let seen = state.seen.lock().await;
    let body: Value =
        serde_json::from_str(seen[0].trim_start_matches("create ")).expect("json body");
    assert_eq!(
        body,
        json!({"templateId": "jupyter", "parameters": {"id": "notebook"}})
    );
}

#[tokio::test]
async fn status_update_posts_bare_json_string() {
    let (base_url, state) = spawn_backend().await;
    let api = HttpTemplateApi::new(&base_url).expect("api");

    let updated = api
        .update_status(&InstanceId::new("i-1"), &InstanceStatus::Stopped)
        .await
        .expect("status");

    assert_eq!(updated.status, InstanceStatus::Stopped);
    assert_eq!(
        *state.seen.lock().await,
        vec!["status i-1 \"stopped\"".to_string()]
    );
}

#[tokio::test]
async fn delete_targets_instance_path() {
    let (base_url, state) = spawn_backend().await;
    let api = HttpTemplateApi::new(&base_url).expect("api");

    api.delete_instance(&InstanceId::new("i-1"))
        .await
        .expect("delete");

    assert_eq!(*state.seen.lock().await, vec!["delete i-1".to_string()]);
}

#[tokio::test]
async fn error_status_carries_response_body() {
    let (base_url, _) = spawn_backend().await;
    let api = HttpTemplateApi::new(&base_url).expect("api");

    let err = api
        .delete_instance(&InstanceId::new("missing"))
        .await
        .expect_err("not found");

    match err {
        ClientError::Status { status, body } => {
            assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
            assert_eq!(body, "no such instance");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn api_root_is_appended_to_base_path() {
    let api = HttpTemplateApi::new("http://localhost:9000/broccoli/").expect("api");
    assert_eq!(api.api_root().as_str(), "http://localhost:9000/broccoli/api/v1");

    let api = HttpTemplateApi::new("https://broccoli.example.com?debug=1").expect("api");
    assert_eq!(api.api_root().as_str(), "https://broccoli.example.com/api/v1");
}

#[test]
fn instance_ids_are_escaped_as_single_path_segment() {
    let api = HttpTemplateApi::new("http://localhost:9000").expect("api");
    assert_eq!(
        api.endpoint(&["instances", "a/b"]).as_str(),
        "http://localhost:9000/api/v1/instances/a%2Fb"
    );
}

#[test]
fn rejects_unsupported_base_urls() {
    assert!(matches!(
        HttpTemplateApi::new("ftp://localhost"),
        Err(ClientError::InvalidBaseUrl { .. })
    ));
    assert!(matches!(
        HttpTemplateApi::new("not a url"),
        Err(ClientError::InvalidBaseUrl { .. })
    ));
}
