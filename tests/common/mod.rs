#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use style_compare::{
    app::{AppState, build_router},
    records::{
        GenerationRecord, GenerationStore, ManualPrompts, MemoryGenerationStore, ProviderResults,
    },
};
use tower::ServiceExt;

pub const BOUNDARY: &str = "integration-boundary";

pub struct TestContext {
    pub app: Router,
    pub records: Arc<MemoryGenerationStore>,
}

/// Router with in-memory history and no provider credentials.
pub fn build_test_context() -> TestContext {
    let records = Arc::new(MemoryGenerationStore::new());
    let state = AppState {
        pipeline: None,
        records: records.clone(),
        history_limit: 20,
        max_upload_bytes: 1024 * 1024,
    };
    TestContext {
        app: build_router(state, None),
        records,
    }
}

pub fn sample_record(index: i64, prompt: &str) -> GenerationRecord {
    let created_at = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(index);
    GenerationRecord {
        id: format!("record-{index}"),
        created_at,
        user_prompt: prompt.to_string(),
        style_prompt: "flat colors".to_string(),
        final_prompt: format!("{prompt}, flat colors"),
        negative_prompt: None,
        style_image_url: format!("https://blob.test/inputs/{index}.png"),
        pose_image_url: None,
        results: ProviderResults {
            openai: Some(format!("https://blob.test/outputs/openai-{index}.png")),
            ..Default::default()
        },
        manual_prompts: ManualPrompts::from_final_prompt(&format!("{prompt}, flat colors")),
    }
}

pub async fn seed(records: &MemoryGenerationStore, count: i64) {
    for index in 0..count {
        records
            .insert(&sample_record(index, &format!("prompt {index}")))
            .await
            .unwrap();
    }
}

async fn into_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

pub async fn request_no_body(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    into_json(app.clone().oneshot(request).await.unwrap()).await
}

/// `files` are `(field, file_name, content_type, bytes)`.
pub fn multipart_body(files: &[(&str, &str, &str, &[u8])], texts: &[(&str, &str)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, content_type, data) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in texts {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn request_multipart(app: &Router, uri: &str, body: Vec<u8>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    into_json(app.clone().oneshot(request).await.unwrap()).await
}

pub async fn request_json(app: &Router, uri: &str, json: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    into_json(app.clone().oneshot(request).await.unwrap()).await
}
