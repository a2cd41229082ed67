use actix_web::{http::StatusCode, test::TestRequest};
use payment_engine::{helpers::calculate_hmac, test_utils::fixtures::CARD_CALLBACK_SECRET};
use serde_json::{json, Value};

use super::helpers::{send, TestBackend, RU_IP};

async fn create_card_order(backend: &TestBackend, project_order_id: &str) -> String {
    let body = json!({
        "project_id": "proj-game",
        "project_order_id": project_order_id,
        "amount": 150.0,
        "currency": "RUB",
        "payment_method": "BANKCARD",
        "user": { "ip": RU_IP }
    });
    let (_, body) = send(backend.api.clone(), TestRequest::post().uri("/api/order").set_json(body)).await;
    assert_eq!(body["status"], 200, "order creation failed: {body}");
    body["item"]["uuid"].as_str().expect("uuid").to_string()
}

async fn submit_card_payment(backend: &TestBackend, uuid: &str) -> Value {
    let body = json!({
        "order_uuid": uuid,
        "payment_method_id": "pm-card",
        "fields": { "pan": "4111111111111111", "cvv": "123", "month": "12", "year": "30", "card_holder": "IVAN IVANOV" }
    });
    let (status, body) = send(backend.api.clone(), TestRequest::post().uri("/api/payment").set_json(body)).await;
    assert_eq!(status, StatusCode::OK);
    body
}

fn callback_request(uuid: &str, outcome: &str, signature: Option<&str>) -> TestRequest {
    let body = json!({
        "outcome": outcome,
        "amount": 150.0,
        "currency": "RUB",
        "transaction_id": format!("tx-{uuid}"),
        "requisites": { "pan": "4111111111111111", "expiry_month": "12", "expiry_year": "30" }
    });
    let body = serde_json::to_vec(&body).unwrap();
    let signature = match signature {
        Some(s) => s.to_string(),
        None => calculate_hmac(&body, CARD_CALLBACK_SECRET).unwrap(),
    };
    TestRequest::post()
        .uri(&format!("/api/callback/{uuid}"))
        .insert_header(("content-type", "application/json"))
        .insert_header(("X-Signature", signature))
        .set_payload(body)
}

#[actix_web::test]
async fn pay_for_an_order() {
    let _ = env_logger::try_init().ok();
    let mut backend = TestBackend::new().await;
    let uuid = create_card_order(&backend, "pay-1").await;

    let body = submit_card_payment(&backend, &uuid).await;
    assert_eq!(body["status"], 200);
    assert_eq!(body["item"]["order_uuid"], uuid);
    assert_eq!(body["item"]["redirect_url"], format!("https://pay.example/{uuid}/3ds"));

    let (status, body) = send(backend.api.clone(), callback_request(&uuid, "completed", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 200);
    assert_eq!(body["item"]["status"], "processed");
    assert_eq!(body["item"]["masked_pan"], "411111******1111");

    // Providers retry. The repeat is answered the same way and changes nothing.
    let (_, body) = send(backend.api.clone(), callback_request(&uuid, "completed", None)).await;
    assert_eq!(body["status"], 200);
    assert_eq!(body["item"]["status"], "processed");

    let notified = backend.notifications.try_recv().expect("a merchant notification");
    assert_eq!(notified.uuid.to_string(), uuid);
    assert!(backend.notifications.try_recv().is_err());
    backend.tear_down().await;
}

#[actix_web::test]
async fn forged_callbacks_are_refused() {
    let _ = env_logger::try_init().ok();
    let backend = TestBackend::new().await;
    let uuid = create_card_order(&backend, "pay-2").await;
    submit_card_payment(&backend, &uuid).await;

    let (status, body) = send(backend.api.clone(), callback_request(&uuid, "completed", Some("deadbeef"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], 403);
    assert_eq!(body["message"]["code"], "fm000040");

    let (_, body) = send(backend.api.clone(), TestRequest::get().uri(&format!("/api/order/{uuid}"))).await;
    assert_eq!(body["item"]["status"], "created");
    backend.tear_down().await;
}

const GAME_SECRET: &str = "game-secret";

/// A merchant-side request for `uuid`, signed with the project secret unless `signature` overrides it. An empty
/// override sends no signature at all.
fn merchant_request(uuid: &str, action: &str, body: Option<Value>, signature: Option<&str>) -> TestRequest {
    let body = body.map(|b| serde_json::to_vec(&b).unwrap()).unwrap_or_default();
    let req = TestRequest::post()
        .uri(&format!("/api/order/{uuid}/{action}"))
        .insert_header(("content-type", "application/json"));
    let req = match signature {
        Some("") => req,
        Some(s) => req.insert_header(("X-Signature", s.to_string())),
        None => req.insert_header(("X-Signature", calculate_hmac(&body, GAME_SECRET).unwrap())),
    };
    req.set_payload(body)
}

#[actix_web::test]
async fn merchant_transitions() {
    let _ = env_logger::try_init().ok();
    let backend = TestBackend::new().await;
    let uuid = create_card_order(&backend, "pay-3").await;
    submit_card_payment(&backend, &uuid).await;
    send(backend.api.clone(), callback_request(&uuid, "completed", None)).await;

    let req = merchant_request(&uuid, "confirm", Some(json!({ "accepted": true })), None);
    let (_, body) = send(backend.api.clone(), req).await;
    assert_eq!(body["status"], 200);
    assert_eq!(body["item"]["status"], "processed");

    let (_, body) = send(backend.api.clone(), merchant_request(&uuid, "replace", None, None)).await;
    assert_eq!(body["status"], 400);
    assert_eq!(body["message"]["code"], "fm000047");

    let req = merchant_request(&uuid, "refund", Some(json!({ "reason": "Customer changed their mind" })), None);
    let (_, body) = send(backend.api.clone(), req).await;
    assert_eq!(body["status"], 200);
    assert_eq!(body["item"]["status"], "refunded");
    assert_eq!(body["item"]["cancellation_reason"], "Customer changed their mind");

    let req = TestRequest::post().uri(&format!("/api/order/{uuid}/recreate"));
    let (_, body) = send(backend.api.clone(), req).await;
    assert_eq!(body["status"], 400);
    assert_eq!(body["message"]["code"], "fm000046");
    backend.tear_down().await;
}

#[actix_web::test]
async fn merchant_routes_require_the_project_signature() {
    let _ = env_logger::try_init().ok();
    let backend = TestBackend::new().await;
    let uuid = create_card_order(&backend, "pay-4").await;
    submit_card_payment(&backend, &uuid).await;
    send(backend.api.clone(), callback_request(&uuid, "completed", None)).await;

    let reason = Some(json!({ "reason": "fraud" }));
    let attempts = [
        merchant_request(&uuid, "chargeback", reason.clone(), Some("")),
        merchant_request(&uuid, "refund", reason.clone(), Some("")),
        merchant_request(&uuid, "confirm", Some(json!({ "accepted": false })), Some("")),
        merchant_request(&uuid, "replace", None, Some("")),
    ];
    for req in attempts {
        let (status, body) = send(backend.api.clone(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], 403, "{body}");
        assert_eq!(body["message"]["code"], "fm000031");
    }

    // Signed with the wrong key, or signed over a different body
    let forged = calculate_hmac(br#"{"reason":"fraud"}"#, "not-the-secret").unwrap();
    let (_, body) = send(backend.api.clone(), merchant_request(&uuid, "chargeback", reason.clone(), Some(&forged))).await;
    assert_eq!(body["status"], 403);
    assert_eq!(body["message"]["code"], "fm000032");
    let other_body = calculate_hmac(br#"{"reason":"something else"}"#, GAME_SECRET).unwrap();
    let (_, body) =
        send(backend.api.clone(), merchant_request(&uuid, "chargeback", reason.clone(), Some(&other_body))).await;
    assert_eq!(body["status"], 403);
    assert_eq!(body["message"]["code"], "fm000032");

    let (_, body) = send(backend.api.clone(), TestRequest::get().uri(&format!("/api/order/{uuid}"))).await;
    assert_eq!(body["item"]["status"], "processed");
    assert!(body["item"]["cancellation_reason"].is_null());
    backend.tear_down().await;
}
