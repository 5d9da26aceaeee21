//! REST API Server for the Market Insights Analyst
//!
//! `POST /analyze` runs the full pipeline for one query and returns the
//! synthesized report.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::analyst::Analyst;
use crate::error::AnalystError;

// =============================
// Request / Response Models
// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryResponse {
    pub report: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub detail: String,
}

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

// =============================
// API State
// =============================

#[derive(Clone)]
pub struct ApiState {
    pub analyst: Arc<Analyst>,
    /// Admission control: analyses allowed to run at once
    pub permits: Arc<Semaphore>,
}

fn failure(status: StatusCode, detail: impl Into<String>) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
}

// =============================
// Informational Endpoints
// =============================

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Welcome to the Market Insights Analyst API"
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// =============================
// Analysis Endpoint
// =============================

async fn analyze(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> ApiResult<QueryResponse> {
    info!(query = %req.query, "Received analysis request");

    let _permit = state.permits.acquire().await.map_err(|_| {
        failure(StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down")
    })?;

    match state.analyst.analyze(&req.query).await {
        Ok(result) => {
            info!(
                execution_time_ms = result.execution_time_ms,
                "Analysis request complete"
            );
            Ok(Json(QueryResponse {
                report: result.report,
            }))
        }
        Err(e @ AnalystError::InvalidQuery(_)) => {
            Err(failure(StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e) => {
            error!(error = %e, "Analysis request failed");
            Err(failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

// =============================
// Router
// =============================

pub fn create_router(analyst: Arc<Analyst>, max_concurrent_queries: usize) -> Router {
    let state = ApiState {
        analyst,
        permits: Arc::new(Semaphore::new(max_concurrent_queries.max(1))),
    };

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/analyze", post(analyze))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

// =============================
// Server Startup
// =============================

pub async fn start_server(
    analyst: Arc<Analyst>,
    port: u16,
    max_concurrent_queries: usize,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(analyst, max_concurrent_queries);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoopLimits;
    use crate::inference::{ScriptedInference, ScriptedStep};
    use crate::models::Message;
    use crate::test_support::{nvda_catalog, stock_call};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn router(steps: Vec<ScriptedStep>) -> Router {
        let model = Arc::new(ScriptedInference::new(steps));
        let analyst = Arc::new(Analyst::new(model, nvda_catalog(), LoopLimits::default()));
        create_router(analyst, 2)
    }

    fn post_query(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/analyze")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_welcome() {
        let response = router(vec![])
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Welcome to the Market Insights Analyst API");
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(vec![])
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_analyze_returns_report() {
        let app = router(vec![
            ScriptedStep::Reply(stock_call("call-1", "NVDA")),
            ScriptedStep::Reply(Message::assistant("NVDA is up 5%.")),
            ScriptedStep::Reply(Message::assistant("# NVDA\nUp 5.00% to $105.00.")),
        ]);

        let response = app
            .oneshot(post_query(serde_json::json!({"query": "How did NVDA trade?"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["report"], "# NVDA\nUp 5.00% to $105.00.");
    }

    #[tokio::test]
    async fn test_analyze_failure_is_500_with_detail() {
        let app = router(vec![ScriptedStep::Fail("model offline".to_string())]);

        let response = app
            .oneshot(post_query(serde_json::json!({"query": "Anything on AAPL?"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert_eq!(body["detail"], "Inference error: model offline");
    }

    #[tokio::test]
    async fn test_empty_query_is_400() {
        let response = router(vec![])
            .oneshot(post_query(serde_json::json!({"query": ""})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["detail"].as_str().unwrap().starts_with("Invalid query"));
    }

    #[tokio::test]
    async fn test_second_query_waits_for_permit() {
        let model = Arc::new(ScriptedInference::new(vec![
            ScriptedStep::Hang,
            ScriptedStep::Reply(Message::assistant("done researching")),
            ScriptedStep::Reply(Message::assistant("# Report")),
        ]));
        let analyst = Arc::new(Analyst::new(
            model.clone(),
            nvda_catalog(),
            LoopLimits::default(),
        ));
        let app = create_router(analyst, 1);

        let first = tokio::spawn(
            app.clone()
                .oneshot(post_query(serde_json::json!({"query": "first"}))),
        );
        while model.call_count() == 0 {
            tokio::task::yield_now().await;
        }

        // Holding the only permit, the hung query blocks the next one
        let mut second = Box::pin(
            app.clone()
                .oneshot(post_query(serde_json::json!({"query": "second"}))),
        );
        let waited = tokio::time::timeout(Duration::from_millis(50), &mut second).await;
        assert!(waited.is_err());
        assert_eq!(model.call_count(), 1);

        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());

        let response = second.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["report"], "# Report");
        assert_eq!(model.call_count(), 3);
    }
}
