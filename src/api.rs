//! ==============================================================================
//! api.rs - read-only history api
//! ==============================================================================
//!
//! routes:
//!     GET /data  ->  200 [{id, bpm, spo2, timestamp}, ...]   (id ascending)
//!                    500 {"error": "..."} if the store cannot be read
//!
//! acquisition failures never reach this module; it only depends on the store.
//!
//! ==============================================================================

use crate::domain::Reading;
use crate::error::StoreError;
use crate::store::ReadingStore;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::future::Future;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub fn router(store: ReadingStore) -> Router {
    Router::new()
        .route("/data", get(data_handler))
        .layer(CorsLayer::permissive())
        .with_state(store)
}

/// serve the api on `bind` until `shutdown` resolves
pub async fn run_server(
    bind: &str,
    store: ReadingStore,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;
    info!(addr = %listener.local_addr()?, "history api listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown)
        .await
        .context("history api server failed")?;
    Ok(())
}

async fn data_handler(State(store): State<ReadingStore>) -> Result<Json<Vec<Reading>>, ApiError> {
    let readings = store.read_all().await?;
    Ok(Json(readings))
}

/// store failure surfaced to the caller as a 500
struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "failed to read reading history");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": self.0.to_string() })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    async fn spawn_api(store: ReadingStore) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(store)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn empty_store_returns_empty_array() {
        let base = spawn_api(ReadingStore::open_in_memory().unwrap()).await;

        let response = reqwest::get(format!("{}/data", base)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn returns_readings_in_id_order() {
        let store = ReadingStore::open_in_memory().unwrap();
        store.append(72.0, 98.0, None).await.unwrap();
        store.append(74.5, 97.0, None).await.unwrap();
        let base = spawn_api(store).await;

        let readings: Vec<Reading> = reqwest::get(format!("{}/data", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].id, 1);
        assert_eq!(readings[0].bpm, 72.0);
        assert_eq!(readings[1].id, 2);
        assert_eq!(readings[1].spo2, 97.0);
    }

    #[tokio::test]
    async fn each_entry_has_exactly_the_four_fields() {
        let store = ReadingStore::open_in_memory().unwrap();
        store.append(60.0, 99.0, None).await.unwrap();
        let base = spawn_api(store).await;

        let body: Value = reqwest::get(format!("{}/data", base)).await.unwrap().json().await.unwrap();
        let entry = body[0].as_object().unwrap();
        let mut keys: Vec<&str> = entry.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["bpm", "id", "spo2", "timestamp"]);
        assert!(entry["timestamp"].is_string());
    }

    #[tokio::test]
    async fn unreadable_store_is_500() {
        let store = ReadingStore::open_in_memory().unwrap();
        store.drop_schema().await.unwrap();
        let base = spawn_api(store).await;

        let response = reqwest::get(format!("{}/data", base)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("database error"));
    }

    #[tokio::test]
    async fn no_write_route() {
        let base = spawn_api(ReadingStore::open_in_memory().unwrap()).await;

        let response = reqwest::Client::new()
            .post(format!("{}/data", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn server_stops_on_shutdown_signal() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let store = ReadingStore::open_in_memory().unwrap();

        let server = tokio::spawn(async move {
            run_server("127.0.0.1:0", store, async {
                let _ = rx.await;
            })
            .await
        });

        tx.send(()).unwrap();
        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .expect("server ignored shutdown")
            .unwrap();
        assert!(result.is_ok());
    }
}
