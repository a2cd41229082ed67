use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, App};
use serde_json::json;

use super::helpers::{send, TestBackend, RU_IP};
use crate::routes::health;

#[actix_web::test]
async fn health_endpoint() {
    let app = test::init_service(App::new().service(health)).await;
    let req = TestRequest::get().uri("/health").to_request();
    let (_req, res) = test::call_service(&app, req).await.into_parts();
    let status = res.status();
    let body = res.into_body().try_into_bytes().unwrap();
    assert!(status.is_success());
    assert_eq!(body, "👍️\n");
}

fn order_body(project_order_id: &str, amount: f64) -> serde_json::Value {
    json!({
        "project_id": "proj-game",
        "project_order_id": project_order_id,
        "amount": amount,
        "currency": "RUB",
        "payment_method": "BANKCARD",
        "user": { "ip": RU_IP, "email": "payer@example.com" }
    })
}

#[actix_web::test]
async fn create_and_fetch_order() {
    let _ = env_logger::try_init().ok();
    let backend = TestBackend::new().await;
    let req = TestRequest::post().uri("/api/order").set_json(order_body("web-1", 150.0));
    let (status, body) = send(backend.api.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 200);
    assert!(body.get("message").is_none());
    let item = &body["item"];
    assert_eq!(item["project_order_id"], "web-1");
    assert_eq!(item["status"], "created");
    assert_eq!(item["total_amount"], 150.0);
    assert!(item.get("id").is_none(), "the internal id must never be exposed");

    let uuid = item["uuid"].as_str().expect("uuid").to_string();
    let req = TestRequest::get().uri(&format!("/api/order/{uuid}"));
    let (status, body) = send(backend.api.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["uuid"], uuid);
    backend.tear_down().await;
}

#[actix_web::test]
async fn validation_failures_use_the_envelope() {
    let _ = env_logger::try_init().ok();
    let backend = TestBackend::new().await;
    let req = TestRequest::post().uri("/api/order").set_json(order_body("web-2", 99.0));
    let (status, body) = send(backend.api.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 400);
    assert_eq!(body["message"]["code"], "fm000027");
    assert!(body.get("item").is_none());

    let req = TestRequest::post().uri("/api/order").insert_header(("content-type", "application/json")).set_payload("{");
    let (status, body) = send(backend.api.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 400);
    assert_eq!(body["message"]["code"], "fm000048");
    backend.tear_down().await;
}

#[actix_web::test]
async fn unknown_orders_are_not_found() {
    let _ = env_logger::try_init().ok();
    let backend = TestBackend::new().await;
    let req = TestRequest::get().uri("/api/order/no-such-order");
    let (status, body) = send(backend.api.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 404);
    assert_eq!(body["message"]["code"], "fm000035");
    backend.tear_down().await;
}

#[actix_web::test]
async fn form_orders() {
    let _ = env_logger::try_init().ok();
    let backend = TestBackend::new().await;
    let form = [
        ("project", "proj-game"),
        ("order_id", "form-1"),
        ("amount", "200"),
        ("currency", "RUB"),
        ("payment_method", "BANKCARD"),
        ("ip", RU_IP),
    ];
    let req = TestRequest::post().uri("/api/order/form").set_form(form);
    let (status, body) = send(backend.api.clone(), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 200);
    assert_eq!(body["item"]["project_order_id"], "form-1");

    // Signed projects refuse unsigned forms
    let form = [
        ("project", "proj-signed"),
        ("order_id", "form-2"),
        ("amount", "200"),
        ("currency", "RUB"),
        ("payment_method", "BANKCARD"),
        ("ip", RU_IP),
    ];
    let req = TestRequest::post().uri("/api/order/form").set_form(form);
    let (_, body) = send(backend.api.clone(), req).await;
    assert_eq!(body["status"], 403);
    assert_eq!(body["message"]["code"], "fm000031");
    backend.tear_down().await;
}

#[actix_web::test]
async fn signed_json_orders() {
    let _ = env_logger::try_init().ok();
    let backend = TestBackend::new().await;
    let mut body = order_body("signed-1", 150.0);
    body["project_id"] = json!("proj-signed");
    let bytes = serde_json::to_vec(&body).unwrap();

    let req = TestRequest::post()
        .uri("/api/order")
        .insert_header(("content-type", "application/json"))
        .insert_header(("X-Signature", "00ff"))
        .set_payload(bytes.clone());
    let (_, response) = send(backend.api.clone(), req).await;
    assert_eq!(response["status"], 403);
    assert_eq!(response["message"]["code"], "fm000032");

    let signature = payment_engine::helpers::calculate_hmac(&bytes, "signed-secret").unwrap();
    let req = TestRequest::post()
        .uri("/api/order")
        .insert_header(("content-type", "application/json"))
        .insert_header(("X-Signature", signature))
        .set_payload(bytes);
    let (_, response) = send(backend.api.clone(), req).await;
    assert_eq!(response["status"], 200);
    backend.tear_down().await;
}
