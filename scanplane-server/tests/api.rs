use axum::http::StatusCode;
use serde_json::{Value, json};

use scanplane_core::SCAN_HOOK_PATH;
use scanplane_core::model::{AdapterId, ResultId, ScanResult, ScanStatus};

mod common;
use common::{
    REPORT_QUERY, StubAdapter, adapter_body, artifact_body, build_test_app, wait_for_status,
};

async fn register_default_adapter(server: &axum_test::TestServer) -> String {
    let response = server
        .post("/api/v1/adapters")
        .json(&adapter_body("http://trivy:8080", true))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_running_job_runtime() {
    let app = build_test_app(StubAdapter::ready_after(1));

    let response = app.server.get("/api/v1/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["job_runtime"]["running"], true);

    app.shutdown().await;
}

#[tokio::test]
async fn adapter_registry_crud_round_trip() {
    let app = build_test_app(StubAdapter::ready_after(1));
    let server = &app.server;

    let id = register_default_adapter(server).await;

    let duplicate = server
        .post("/api/v1/adapters")
        .json(&adapter_body("http://trivy:8080", false))
        .await;
    duplicate.assert_status(StatusCode::CONFLICT);
    let body: Value = duplicate.json();
    assert_eq!(body["error"]["status"], 409);

    let listed: Value = server.get("/api/v1/adapters").await.json();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["uid"], id.as_str());
    assert_eq!(listed[0]["accessCredential"], "*****");

    let filtered: Value = server.get("/api/v1/adapters?url=clair").await.json();
    assert!(filtered.as_array().unwrap().is_empty());

    let fetched = server.get(&format!("/api/v1/adapters/{id}")).await;
    fetched.assert_status_ok();
    let mut endpoint: Value = fetched.json();
    endpoint["url"] = json!("http://trivy-v2:8080");
    server
        .put(&format!("/api/v1/adapters/{id}"))
        .json(&endpoint)
        .await
        .assert_status_ok();

    let stored = app
        .state
        .registry
        .get(&AdapterId::from(id.as_str()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.url, "http://trivy-v2:8080");
    assert_eq!(stored.access_credential, "adapter-secret");

    server
        .post(&format!("/api/v1/adapters/{id}/ping"))
        .await
        .assert_status_ok();

    server
        .delete(&format!("/api/v1/adapters/{id}"))
        .await
        .assert_status(StatusCode::NO_CONTENT);
    server
        .get(&format!("/api/v1/adapters/{id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    app.shutdown().await;
}

#[tokio::test]
async fn unknown_auth_mode_is_rejected() {
    let app = build_test_app(StubAdapter::ready_after(1));

    let mut body = adapter_body("http://trivy:8080", true);
    body["auth"] = json!("Kerberos");
    app.server
        .post("/api/v1/adapters")
        .json(&body)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    app.shutdown().await;
}

#[tokio::test]
async fn scan_completes_and_report_lists_vulnerabilities() {
    let app = build_test_app(StubAdapter::ready_after(2));
    register_default_adapter(&app.server).await;

    let response = app.server.post("/api/v1/scan").json(&artifact_body()).await;
    response.assert_status(StatusCode::ACCEPTED);
    let accepted: Value = response.json();
    let id = accepted["id"].as_i64().unwrap();

    let report = wait_for_status(&app.server, "Success").await;
    assert_eq!(report["id"], id);
    assert_eq!(report["digest"], "sha256:abc");
    assert_eq!(report["statusCode"], 2);
    assert!(report["endTime"].is_string());
    assert_eq!(report["vulnerabilities"][0]["id"], "CVE-2024-0001");
    assert_eq!(report["vulnerabilities"][0]["fixedVersion"], "3.0.2");

    let rows: Value = app.server.get("/api/v1/scan/results/sha256:abc").await.json();
    assert_eq!(rows.as_array().unwrap().len(), 1);

    app.shutdown().await;
}

#[tokio::test]
async fn second_scan_while_in_flight_conflicts() {
    let app = build_test_app(StubAdapter::never_ready());
    register_default_adapter(&app.server).await;

    app.server
        .post("/api/v1/scan")
        .json(&artifact_body())
        .await
        .assert_status(StatusCode::ACCEPTED);

    let second = app.server.post("/api/v1/scan").json(&artifact_body()).await;
    second.assert_status(StatusCode::CONFLICT);
    let body: Value = second.json();
    let message = body["error"]["message"].as_str().unwrap();
    assert!(message.contains("a previous scanning is"), "{message}");

    let pending = app.server.get(REPORT_QUERY).await;
    pending.assert_status_ok();
    let view: Value = pending.json();
    assert!(view["vulnerabilities"].as_array().unwrap().is_empty());

    app.shutdown().await;
}

#[tokio::test]
async fn adapter_with_active_scan_cannot_be_deleted() {
    let app = build_test_app(StubAdapter::never_ready());
    let id = register_default_adapter(&app.server).await;

    app.server
        .post("/api/v1/scan")
        .json(&artifact_body())
        .await
        .assert_status(StatusCode::ACCEPTED);

    app.server
        .delete(&format!("/api/v1/adapters/{id}"))
        .await
        .assert_status(StatusCode::CONFLICT);

    app.shutdown().await;
}

#[tokio::test]
async fn scan_without_any_adapter_is_unprocessable() {
    let app = build_test_app(StubAdapter::ready_after(1));

    let response = app.server.post("/api/v1/scan").json(&artifact_body()).await;
    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert!(
        body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("not configured")
    );

    app.shutdown().await;
}

#[tokio::test]
async fn invalid_artifact_is_a_bad_request() {
    let app = build_test_app(StubAdapter::ready_after(1));
    register_default_adapter(&app.server).await;

    let mut artifact = artifact_body();
    artifact["namespace_id"] = json!(0);
    app.server
        .post("/api/v1/scan")
        .json(&artifact)
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    app.shutdown().await;
}

#[tokio::test]
async fn report_of_unscanned_artifact_is_not_found() {
    let app = build_test_app(StubAdapter::ready_after(1));
    register_default_adapter(&app.server).await;

    app.server
        .get(REPORT_QUERY)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    app.shutdown().await;
}

#[tokio::test]
async fn project_override_selects_its_adapter() {
    let app = build_test_app(StubAdapter::ready_after(1));
    register_default_adapter(&app.server).await;

    let created: Value = app
        .server
        .post("/api/v1/adapters")
        .json(&adapter_body("http://clair:6060", false))
        .await
        .json();
    let clair = created["id"].as_str().unwrap();

    app.server
        .put("/api/v1/projects/7/scanner")
        .json(&json!({ "adapterId": clair }))
        .await
        .assert_status_ok();

    let selected: Value = app.server.get("/api/v1/projects/7/scanner").await.json();
    assert_eq!(selected["url"], "http://clair:6060");

    let fallback: Value = app.server.get("/api/v1/projects/8/scanner").await.json();
    assert_eq!(fallback["url"], "http://trivy:8080");

    app.server
        .put("/api/v1/projects/7/scanner")
        .json(&json!({ "adapterId": "missing" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    app.shutdown().await;
}

#[tokio::test]
async fn job_hooks_update_result_rows() {
    let app = build_test_app(StubAdapter::ready_after(1));
    let id = app
        .state
        .results
        .create(ScanResult::new("sha256:hook", "trivy-1".into(), "trivy"))
        .await
        .unwrap();
    let hook = format!("{SCAN_HOOK_PATH}/{id}");

    app.server
        .post(&hook)
        .json(&json!({ "job_id": "job-1", "status": "Running" }))
        .await
        .assert_status_ok();
    let row = app.state.results.get(id).await.unwrap().unwrap();
    assert_eq!(row.status, ScanStatus::Running);

    app.server
        .post(&hook)
        .json(&json!({ "job_id": "job-1", "status": "Running", "check_in": "{\"severity\":\"Low\"}" }))
        .await
        .assert_status_ok();
    let row = app.state.results.get(id).await.unwrap().unwrap();
    assert_eq!(row.status, ScanStatus::Running);
    assert_eq!(row.report, "{\"severity\":\"Low\"}");
    assert_eq!(row.job_id, "job-1");

    app.server
        .post(&hook)
        .json(&json!({ "status": "Bogus" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    app.server
        .post(&format!("{SCAN_HOOK_PATH}/{}", ResultId(9_999)))
        .json(&json!({ "status": "Running", "check_in": "{}" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    app.shutdown().await;
}
