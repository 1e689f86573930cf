use axum::{
    extract::{Request, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use super::AppState;
use crate::error::ProviderError;
use crate::library::{ItemQuery, LibraryEntry, LibraryProvider};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(receive_webhook))
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub should_sync: bool,
    pub keys: Vec<String>,
    pub entries: usize,
}

fn error_response(e: ProviderError) -> (StatusCode, String) {
    let status = match e {
        ProviderError::Webhook(_) => StatusCode::BAD_REQUEST,
        ProviderError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

/// POST /webhook - Parse a Jellyfin webhook and resolve the entries it touches
async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Json<WebhookResponse>, (StatusCode, String)> {
    let provider = &state.provider;
    let trigger = provider
        .parse_webhook(request)
        .await
        .map_err(|e| {
            tracing::warn!("Rejected webhook: {}", e);
            error_response(e)
        })?;

    if !trigger.should_sync {
        return Ok(Json(WebhookResponse {
            should_sync: false,
            keys: Vec::new(),
            entries: 0,
        }));
    }

    let query = ItemQuery::default().with_keys(trigger.keys.clone());
    let mut matched = 0;

    for section in provider.get_sections().await {
        let entries = provider
            .list_items(&section, &query)
            .await
            .map_err(error_response)?;

        for entry in &entries {
            match entry.mapping_descriptors().await {
                Ok(descriptors) => {
                    tracing::info!(
                        "Sync {} '{}' ({}) in section '{}': {:?}",
                        entry.media_kind(),
                        entry.title(),
                        entry.key(),
                        section.title(),
                        descriptors
                    );
                }
                Err(e) => {
                    tracing::warn!("Failed to resolve mappings for {}: {}", entry.key(), e);
                }
            }
        }
        matched += entries.len();
    }

    Ok(Json(WebhookResponse {
        should_sync: true,
        keys: trigger.keys,
        entries: matched,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::library::JellyfinLibraryProvider;
    use axum::body::{self, Body};
    use tower::ServiceExt;

    fn app() -> Router {
        let provider =
            JellyfinLibraryProvider::new(ProviderConfig::new("http://127.0.0.1:9", "token", "demo"))
                .unwrap();
        crate::api::router(Arc::new(AppState { provider }))
    }

    async fn post_json(body: &str) -> (StatusCode, Vec<u8>) {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_health() {
        let request = axum::http::Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_item_added_triggers_sync() {
        let (status, body) =
            post_json(r#"{"NotificationType":"ItemAdded","ItemType":"Movie","ItemId":"m1"}"#).await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["should_sync"], true);
        assert_eq!(json["keys"][0], "m1");
        assert_eq!(json["entries"], 0);
    }

    #[tokio::test]
    async fn test_user_event_ignored_without_user() {
        let (status, body) = post_json(
            r#"{"NotificationType":"PlaybackStop","ItemType":"Movie","ItemId":"m1","UserId":"u1"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["should_sync"], false);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_bad_request() {
        let (status, _) = post_json("[1, 2, 3]").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post_json(r#"{"ItemId":"m1"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
