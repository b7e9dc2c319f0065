//! Integration tests for oracle-vision API endpoints

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::time::Duration;
use tower::util::ServiceExt;

use helpers::{create_test_app, png_bytes, png_data_url, MockGenerator, TestApp, TINY_PNG_BASE64};

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

async fn post_json(app: &TestApp, uri: &str, owner: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(owner) = owner {
        builder = builder.header("x-oracle-user", owner);
    }
    let request = builder
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn get_json(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn poll_until_completed(app: &TestApp, generation_id: &str) -> Value {
    let uri = format!("/api/vision-images-status/{}", generation_id);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let (status, json) = get_json(app, &uri).await;
        assert_eq!(status, StatusCode::OK);
        if json["status"] == "completed" || tokio::time::Instant::now() >= deadline {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = create_test_app(MockGenerator::new()).await;

    let (status, json) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "oracle-vision");
    assert_eq!(json["active_jobs"], 0);
    assert!(json["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_save_fire_image() {
    let app = create_test_app(MockGenerator::new()).await;

    let (status, json) = post_json(
        &app,
        "/api/save-fire-image",
        Some("alice"),
        json!({ "image_data": png_data_url(), "metadata": { "frame": 12 } }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    let filename = json["filename"].as_str().unwrap();
    assert!(filename.starts_with("fire_alice_"));
    assert!(filename.ends_with(".png"));
    assert_eq!(
        json["image_url"],
        format!("/artifacts/capture/alice/{}", filename)
    );
    assert_eq!(json["filepath"], format!("capture/alice/{}", filename));
}

#[tokio::test]
async fn test_save_fire_image_accepts_image_alias_and_defaults_owner() {
    let app = create_test_app(MockGenerator::new()).await;

    let (status, json) = post_json(
        &app,
        "/api/save-fire-image",
        None,
        json!({ "image": TINY_PNG_BASE64 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(json["filename"].as_str().unwrap().starts_with("fire_anonymous_"));
}

#[tokio::test]
async fn test_save_fire_image_rejects_non_image() {
    let app = create_test_app(MockGenerator::new()).await;

    let (status, json) = post_json(
        &app,
        "/api/save-fire-image",
        Some("alice"),
        json!({ "image_data": "data:image/png;base64,aGVsbG8gd29ybGQ=" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "INVALID_FORMAT");
}

#[tokio::test]
async fn test_save_fire_image_rejects_other_purposes() {
    let app = create_test_app(MockGenerator::new()).await;

    let (status, _) = post_json(
        &app,
        "/api/save-fire-image",
        Some("alice"),
        json!({ "image_data": png_data_url(), "purpose": "vision" }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_saved_image_is_served_statically() {
    let app = create_test_app(MockGenerator::new()).await;

    let (_, json) = post_json(
        &app,
        "/api/save-fire-image",
        Some("alice"),
        json!({ "image_data": png_data_url() }),
    )
    .await;
    let url = json["image_url"].as_str().unwrap();

    let request = Request::builder().uri(url).body(Body::empty()).unwrap();
    let (status, bytes) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, png_bytes());
}

#[tokio::test]
async fn test_capture_then_bind_to_reading() {
    let app = create_test_app(MockGenerator::new()).await;

    let (_, saved) = post_json(
        &app,
        "/api/save-fire-image",
        Some("alice"),
        json!({ "image_data": png_data_url() }),
    )
    .await;
    let capture_name = saved["filename"].as_str().unwrap().to_string();

    let (status, json) = post_json(
        &app,
        "/api/readings/r789/fire-image",
        Some("alice"),
        json!({ "fire_image_data": capture_name }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["reading_id"], "r789");
    assert_eq!(json["filename"], "reading_r789.png");
    assert_eq!(json["image_url"], "/artifacts/reading/reading_r789.png");

    // Capture was moved
    let request = Request::builder()
        .uri(saved["image_url"].as_str().unwrap())
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, images) = get_json(&app, "/api/readings/r789/images").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(images["images"].as_array().unwrap().len(), 1);
    assert_eq!(images["images"][0]["kind"], "fire");
    assert_eq!(images["images"][0]["filename"], "reading_r789.png");
}

#[tokio::test]
async fn test_resubmitting_reading_with_same_capture_succeeds() {
    let app = create_test_app(MockGenerator::new()).await;

    let (_, saved) = post_json(
        &app,
        "/api/save-fire-image",
        Some("alice"),
        json!({ "image_data": png_data_url() }),
    )
    .await;
    let body = json!({ "fire_image_data": saved["filename"] });

    let (first_status, first) =
        post_json(&app, "/api/readings/r789/fire-image", Some("alice"), body.clone()).await;
    let (second_status, second) =
        post_json(&app, "/api/readings/r789/fire-image", Some("alice"), body).await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first["filename"], "reading_r789.png");
    assert_eq!(second["filename"], "reading_r789.png");
    assert_eq!(second["image_url"], "/artifacts/reading/reading_r789.png");

    let (_, images) = get_json(&app, "/api/readings/r789/images").await;
    assert_eq!(images["images"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_bind_inline_fire_image() {
    let app = create_test_app(MockGenerator::new()).await;

    let (status, json) = post_json(
        &app,
        "/api/readings/r2/fire-image",
        Some("alice"),
        json!({ "fire_image_data": png_data_url() }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["filename"], "reading_r2.png");
}

#[tokio::test]
async fn test_bind_missing_capture_asks_for_new_capture() {
    let app = create_test_app(MockGenerator::new()).await;

    let (status, json) = post_json(
        &app,
        "/api/readings/r3/fire-image",
        Some("alice"),
        json!({ "fire_image_data": "fire_alice_20250101_000000_000.png" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "IMAGE_UNAVAILABLE");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("capture a new image"));
}

#[tokio::test]
async fn test_bind_rejects_bad_reading_id() {
    let app = create_test_app(MockGenerator::new()).await;

    let (status, _) = post_json(
        &app,
        "/api/readings/r%201/fire-image",
        Some("alice"),
        json!({ "fire_image_data": png_data_url() }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_extract_visions() {
    let app = create_test_app(MockGenerator::new()).await;

    let (status, json) = post_json(
        &app,
        "/api/extract-visions",
        None,
        json!({ "text": "I saw a Luminous Butterfly drifting over the coals." }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["visions"], json!(["Luminous Butterfly"]));

    let (status, json) = post_json(&app, "/api/extract-visions", None, json!({ "text": "" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["visions"], json!([]));

    let (status, json) = post_json(&app, "/api/extract-visions", None, json!({ "text": 7 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_generate_and_poll_vision_images() {
    let app = create_test_app(MockGenerator::new().failing_on("Moon")).await;

    let (status, json) = post_json(
        &app,
        "/api/generate-vision-images",
        Some("alice"),
        json!({
            "reading_id": "r1",
            "fire_image_filename": "reading_r1.png",
            "visions": ["Sun", "Moon", "Star"]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["expected_images"], 3);
    let generation_id = json["generation_id"].as_str().unwrap().to_string();

    let status_json = poll_until_completed(&app, &generation_id).await;
    assert_eq!(status_json["status"], "completed");
    assert_eq!(status_json["expected_images"], 3);

    let images = status_json["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0]["vision"], "Sun");
    assert_eq!(images[0]["filename"], "vision_r1_Sun.png");
    assert_eq!(images[0]["url"], "/artifacts/vision/alice/vision_r1_Sun.png");
    assert_eq!(images[1]["vision"], "Star");

    let items = status_json["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[1]["vision"], "Moon");
    assert_eq!(items[1]["state"], "failed");
    assert_eq!(items[1]["reason"], "Image generation service unavailable.");
    assert!(items[1].get("url").is_none());

    let calls = app.attacher.wait_for_calls(1, Duration::from_secs(2)).await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].images.len(), 2);
}

#[tokio::test]
async fn test_status_reason_hides_provider_detail() {
    let app = create_test_app(MockGenerator::new().failing_with(
        "Moon",
        "request failed: error sending request for url (http://10.0.0.5:8080/v1/images/generations?key=sk-secret)",
    ))
    .await;

    let (_, json) = post_json(
        &app,
        "/api/generate-vision-images",
        Some("alice"),
        json!({ "reading_id": "r1", "visions": ["Moon"] }),
    )
    .await;
    let status_json = poll_until_completed(&app, json["generation_id"].as_str().unwrap()).await;

    assert_eq!(status_json["items"][0]["state"], "failed");
    let body = status_json.to_string();
    assert!(!body.contains("10.0.0.5"));
    assert!(!body.contains("sk-secret"));
}

#[tokio::test]
async fn test_generate_rejects_empty_visions() {
    let app = create_test_app(MockGenerator::new()).await;

    let (status, json) = post_json(
        &app,
        "/api/generate-vision-images",
        Some("alice"),
        json!({ "reading_id": "r1", "visions": [] }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "INVALID_ARGUMENT");
    assert_eq!(app.generator.calls(), 0);
}

#[tokio::test]
async fn test_status_reports_pending_right_after_start() {
    let app = create_test_app(MockGenerator::new().with_delay(Duration::from_millis(200))).await;

    let (_, json) = post_json(
        &app,
        "/api/generate-vision-images",
        Some("alice"),
        json!({ "reading_id": "r1", "visions": ["Sun", "Moon", "Star"] }),
    )
    .await;
    let generation_id = json["generation_id"].as_str().unwrap();

    let (status, status_json) =
        get_json(&app, &format!("/api/vision-images-status/{}", generation_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(status_json["status"], "pending");
    assert!(status_json["items"]
        .as_array()
        .unwrap()
        .iter()
        .any(|item| item["state"] == "pending"));

    let (_, health) = get_json(&app, "/health").await;
    assert_eq!(health["active_jobs"], 1);
}

#[tokio::test]
async fn test_status_unknown_generation_is_not_found() {
    let app = create_test_app(MockGenerator::new()).await;

    let (status, _) = get_json(
        &app,
        "/api/vision-images-status/00000000-0000-0000-0000-000000000000",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(&app, "/api/vision-images-status/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reading_images_empty_list() {
    let app = create_test_app(MockGenerator::new()).await;

    let (status, json) = get_json(&app, "/api/readings/nothing-yet/images").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reading_id"], "nothing-yet");
    assert_eq!(json["images"], json!([]));
}

#[tokio::test]
async fn test_event_streams_are_sse() {
    let app = create_test_app(MockGenerator::new()).await;

    for uri in ["/api/vision-events", "/api/events"] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/event-stream"));
    }
}
