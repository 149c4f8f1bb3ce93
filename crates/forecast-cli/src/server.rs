//! HTTP host for the online scorer.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use forecast_contracts::ScoringError;
use forecast_engine::{ScoreResponse, ScoringService};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    scorer: ScoringService,
}

pub fn router(scorer: ScoringService) -> Router {
    Router::new()
        .route("/health/live", get(liveness))
        .route("/score", post(score))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { scorer })
}

pub async fn serve(addr: SocketAddr, scorer: ScoringService) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("forecast-rs v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);
    axum::serve(listener, router(scorer))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn liveness(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.scorer.model().kind(),
    }))
}

async fn score(State(state): State<AppState>, body: Bytes) -> Response {
    // Models may block; score on the blocking pool.
    let scored = tokio::task::spawn_blocking(move || match std::str::from_utf8(&body) {
        Ok(text) => state.scorer.handle(text),
        Err(err) => ScoreResponse::from_result(Err(ScoringError::invalid_payload(format!(
            "request body is not UTF-8: {err}"
        )))),
    })
    .await;
    let response = scored.unwrap_or_else(|err| ScoreResponse::Rejected {
        kind: "internal",
        message: format!("scoring task failed: {err}"),
    });
    if let ScoreResponse::Rejected { kind, message } = &response {
        tracing::warn!(kind = *kind, %message, "rejected scoring request");
    }
    let status = StatusCode::from_u16(response.status()).unwrap_or(StatusCode::BAD_REQUEST);
    (status, [(CONTENT_TYPE, response.content_type())], response.body()).into_response()
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{self, Receiver};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::body::{to_bytes, Bytes};
    use axum::extract::State;
    use axum::http::StatusCode;
    use forecast_contracts::models::{ConstantModel, Forecaster};
    use forecast_contracts::table::Table;
    use forecast_contracts::{ScoringError, ScoringResult};
    use forecast_engine::ScoringService;

    use super::{liveness, score, AppState};

    /// Blocks inside `predict` until the test opens the gate.
    struct Gate(Mutex<Receiver<()>>);

    impl Forecaster for Gate {
        fn kind(&self) -> &str {
            "gate"
        }

        fn predict(&self, table: &Table) -> ScoringResult<Vec<f64>> {
            let opened = self
                .0
                .lock()
                .map_err(|_| ScoringError::schema("gate lock poisoned"))?
                .recv_timeout(Duration::from_secs(2));
            match opened {
                Ok(()) => Ok(vec![1.0; table.row_count()]),
                Err(_) => Err(ScoringError::schema("gate never opened")),
            }
        }
    }

    fn state() -> State<AppState> {
        State(AppState {
            scorer: ScoringService::new(Arc::new(ConstantModel { value: 4.2 })),
        })
    }

    async fn body_text(response: axum::response::Response) -> anyhow::Result<String> {
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    #[tokio::test]
    async fn score_returns_forecasts() -> anyhow::Result<()> {
        let body = Bytes::from_static(br#"{"data": {"WeekStarting": ["2021-01-03"], "feature1": [5]}}"#);
        let response = score(state(), body).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await?, "[4.2]");
        Ok(())
    }

    #[tokio::test]
    async fn score_maps_errors_to_plain_text_400() -> anyhow::Result<()> {
        let response = score(state(), Bytes::from_static(b"{oops")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await?.starts_with("Error: "));

        let response = score(state(), Bytes::from_static(&[0xff, 0xfe])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await?.contains("not UTF-8"));
        Ok(())
    }

    #[tokio::test]
    async fn liveness_reports_loaded_model() {
        let body = liveness(state()).await.0;
        assert_eq!(body["status"], "alive");
        assert_eq!(body["model"], "constant");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn blocking_prediction_leaves_the_runtime_free() -> anyhow::Result<()> {
        let (open, gate) = mpsc::channel();
        let state = State(AppState {
            scorer: ScoringService::new(Arc::new(Gate(Mutex::new(gate)))),
        });
        let pending = tokio::spawn(score(
            state,
            Bytes::from_static(br#"{"data": {"feature1": [1, 2]}}"#),
        ));
        tokio::task::yield_now().await;
        open.send(())?;

        let response = pending.await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await?, "[1.0,1.0]");
        Ok(())
    }
}
