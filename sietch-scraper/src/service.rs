use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::module::sietch::SietchUpdater;

/// Body of every non-2xx response
#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        status: "error",
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

/// Scrape now, store the result and return the snapshots
async fn scrape(State(updater): State<Arc<SietchUpdater>>) -> Response {
    info!("Scrape triggered over HTTP");
    match updater.update().await {
        Ok(result) => {
            info!("Data successfully stored ({} servers)", result.servers.len());
            (StatusCode::OK, Json(result.servers)).into_response()
        }
        Err(e) => {
            error!("Failed to scrape data: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to scrape data: {}", e),
            )
        }
    }
}

/// Last successful pass, without scraping
async fn latest(State(updater): State<Arc<SietchUpdater>>) -> Response {
    match updater.latest().await {
        Some(result) => (StatusCode::OK, Json(result)).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No data scraped yet."),
    }
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Row totals and service info
async fn stats(State(updater): State<Arc<SietchUpdater>>) -> Response {
    match updater.store().counts().await {
        Ok(counts) => {
            let stats = serde_json::json!({
                "status": "running",
                "service": "sietch-scraper",
                "version": env!("CARGO_PKG_VERSION"),
                "servers": counts.servers,
                "observations": counts.observations,
            });
            (StatusCode::OK, Json(stats)).into_response()
        }
        Err(e) => {
            error!("Failed to read store counts: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

pub fn router(updater: Arc<SietchUpdater>) -> Router {
    Router::new()
        .route("/scrape", get(scrape))
        .route("/latest", get(latest))
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(updater)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::sietch::updater::tests::{STATUS_PAGE, updater};
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_scrape_ok() {
        let (updater, _store) = updater(Some(STATUS_PAGE));
        let app = router(Arc::new(updater));

        let (status, body) = get_json(app, "/scrape").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "Arrakis-1");
        assert_eq!(body[0]["region"], "US-East");
        assert_eq!(body[0]["sietches"].as_array().unwrap().len(), 2);
        assert_eq!(body[0]["sietches"][0]["player_count"], 42);
    }

    #[tokio::test]
    async fn test_scrape_render_failure_is_500() {
        let (updater, store) = updater(None);
        let app = router(Arc::new(updater));

        let (status, body) = get_json(app, "/scrape").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().starts_with("Failed to scrape data"));
        assert!(store.observations().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scrape_empty_page_is_500() {
        let (updater, _store) = updater(Some("<html></html>"));
        let (status, body) = get_json(router(Arc::new(updater)), "/scrape").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn test_latest_before_and_after_scrape() {
        let (updater, _store) = updater(Some(STATUS_PAGE));
        let updater = Arc::new(updater);

        let (status, body) = get_json(router(updater.clone()), "/latest").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "error");

        updater.update().await.unwrap();

        let (status, body) = get_json(router(updater), "/latest").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["observed_at"].is_string());
        assert_eq!(body["servers"][0]["name"], "Arrakis-1");
    }

    #[tokio::test]
    async fn test_stats_counts_rows() {
        let (updater, _store) = updater(Some(STATUS_PAGE));
        let updater = Arc::new(updater);
        updater.update().await.unwrap();

        let (status, body) = get_json(router(updater), "/stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["servers"], 1);
        assert_eq!(body["observations"], 2);
    }

    #[tokio::test]
    async fn test_health() {
        let (updater, _store) = updater(None);
        let response = router(Arc::new(updater))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
