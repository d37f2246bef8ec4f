mod common;

use axum::Router;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use common::{HitCounter, closed_port_url, html_not_found, spawn_stub};
use relay::ai::EndpointResolver;
use serde_json::json;
use std::time::Duration;

fn resolver() -> EndpointResolver {
    EndpointResolver::new(reqwest::Client::new()).with_probe_timeout(Duration::from_secs(2))
}

#[tokio::test]
async fn test_urls_ending_in_v1_are_returned_unchanged() {
    let unreachable = closed_port_url().await;
    for url in [
        "https://api.openai.com/v1".to_string(),
        "https://api.openai.com/v1/".to_string(),
        format!("{unreachable}/proxy/v1"),
    ] {
        let expected = url.trim_end_matches('/').to_string();
        assert_eq!(resolver().resolve(&url).await, expected);
    }
}

#[tokio::test]
async fn test_specific_paths_are_not_probed() {
    let hits = HitCounter::default();
    let counter = hits.clone();
    let app = Router::new().fallback(move || {
        counter.hit();
        html_not_found()
    });
    let base = spawn_stub(app).await;

    let url = format!("{base}/gateway/openai");
    assert_eq!(resolver().resolve(&url).await, url);
    assert_eq!(hits.count(), 0);
}

#[tokio::test]
async fn test_root_probe_that_is_not_404_selects_v1() {
    let app = Router::new()
        .route(
            "/v1/chat/completions",
            post(|| async { StatusCode::UNAUTHORIZED }),
        )
        .fallback(html_not_found);
    let base = spawn_stub(app).await;

    assert_eq!(resolver().resolve(&format!("{base}/")).await, format!("{base}/v1"));
}

#[tokio::test]
async fn test_json_models_listing_selects_candidate() {
    let app = Router::new()
        .route(
            "/api/v1/models",
            get(|| async { axum::Json(json!({"object": "list", "data": []})) }),
        )
        .fallback(html_not_found);
    let base = spawn_stub(app).await;

    assert_eq!(resolver().resolve(&base).await, format!("{base}/api/v1"));
}

#[tokio::test]
async fn test_plain_text_models_listing_is_a_weak_match() {
    let app = Router::new()
        .route(
            "/api/models",
            get(|| async { ([(header::CONTENT_TYPE, "text/plain")], "gpt-4o\ngpt-3.5-turbo").into_response() }),
        )
        .fallback(html_not_found);
    let base = spawn_stub(app).await;

    assert_eq!(resolver().resolve(&base).await, format!("{base}/api"));
}

#[tokio::test]
async fn test_openai_prefix_is_tried_last() {
    let app = Router::new()
        .route(
            "/openai/v1/chat/completions",
            post(|| async { axum::Json(json!({})) }),
        )
        .fallback(html_not_found);
    let base = spawn_stub(app).await;

    assert_eq!(resolver().resolve(&base).await, format!("{base}/openai/v1"));
}

#[tokio::test]
async fn test_html_everywhere_keeps_the_original_url() {
    let app = Router::new().fallback(html_not_found);
    let base = spawn_stub(app).await;

    assert_eq!(resolver().resolve(&format!("{base}/")).await, base);
}

#[tokio::test]
async fn test_unreachable_host_keeps_the_original_url() {
    let base = closed_port_url().await;
    assert_eq!(resolver().resolve(&base).await, base);
}
