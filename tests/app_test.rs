#![cfg(feature = "web")]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use prodboard::app::{AppState, router};
use prodboard::section::reference_sections;
use prodboard::storage::MemoryStore;
use prodboard::{AdminGate, Ledger};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> Router {
    let ledger = Ledger::open(Box::new(MemoryStore::new()), reference_sections());
    let gate = AdminGate::new(Some("letmein")).unwrap();
    router(Arc::new(AppState::new(ledger, gate, None, None)))
}

fn json_request(method: &str, uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn login(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/login", json!({ "password": "letmein" }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("session cookie")
        .to_str()
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn cell_update(value: &str) -> Value {
    json!({
        "year": 2025, "month": 1, "section": "orgu",
        "row": "5", "column": "kyass", "value": value
    })
}

async fn orgu_cell(app: &Router) -> Value {
    let response = app
        .clone()
        .oneshot(get("/api/sections/orgu?year=2025&month=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    view["rows"][4]["values"][0].clone()
}

#[tokio::test]
async fn unauthorised_edit_is_rejected_and_changes_nothing() {
    let app = app();

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/cell", cell_update("50"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/sections/orgu/columns",
            json!({ "year": 2025, "month": 1, "label": "X" }),
            Some("session=forged"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(orgu_cell(&app).await, json!(""));
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let app = app();
    let response = app
        .oneshot(json_request("POST", "/api/login", json!({ "password": "nope" }), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn logged_in_edit_is_sanitised_and_visible() {
    let app = app();
    let cookie = login(&app).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/cell", cell_update("5a0"), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["value"], "50");

    assert_eq!(orgu_cell(&app).await, json!("50"));

    let response = app
        .clone()
        .oneshot(get("/api/dashboard?company=All"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn logout_ends_the_session() {
    let app = app();
    let cookie = login(&app).await;

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/logout", json!({}), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/cell", cell_update("1"), Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn schema_routes_round_trip() {
    let app = app();
    let cookie = login(&app).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/sections/dikim/columns",
            json!({ "year": 2025, "month": 1, "label": "NEW", "unit": "kg", "company": "ACME" }),
            Some(&cookie),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let column = body_json(response).await;
    let id = column["key"].as_str().unwrap().to_string();
    assert_eq!(column["type"], "kg");

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/sections/dikim/columns/{}?year=2025&month=1", id))
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/api/sections/dikim/columns/{}?year=2025&month=1", id))
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_section_and_bad_period_are_client_errors() {
    let app = app();

    let response = app
        .clone()
        .oneshot(get("/api/sections/nope?year=2025&month=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(get("/api/sections/orgu?year=2025&month=13"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn monthly_export_downloads_a_workbook() {
    let app = app();
    let response = app
        .oneshot(get("/api/export/monthly?year=2025&month=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let disposition = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("Report-2025-01.xlsx"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(b"PK"));
}

#[tokio::test]
async fn save_endpoint_needs_session_and_credential() {
    let app = app();
    let body = json!({ "content": {} });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/saveData", body.clone(), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let cookie = login(&app).await;
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/saveData", body, Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn sync_status_reports_disabled_without_mirror() {
    let app = app();
    let response = app.oneshot(get("/api/sync")).await.unwrap();
    assert_eq!(body_json(response).await, json!({ "state": "disabled" }));
}
