// Jellyfin webhook payload parsing
// Payloads come from the Jellyfin webhook plugin as JSON, urlencoded forms or
// multipart forms (optionally wrapping the JSON in a `payload` field).

use axum::body;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header;
use axum::Form;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{ProviderError, Result};
use crate::library::{LibraryUser, SyncTrigger};

/// Upper bound for webhook bodies.
pub const MAX_WEBHOOK_BODY_BYTES: usize = 1024 * 1024;

/// Notification types relevant for library sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    ItemAdded,
    PlaybackStop,
    UserDataSaved,
}

impl NotificationType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ItemAdded" => Some(Self::ItemAdded),
            "PlaybackStop" => Some(Self::PlaybackStop),
            "UserDataSaved" => Some(Self::UserDataSaved),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ItemAdded => "ItemAdded",
            Self::PlaybackStop => "PlaybackStop",
            Self::UserDataSaved => "UserDataSaved",
        }
    }

    /// Events tied to a user's watch state rather than the catalog.
    pub fn is_user_scoped(&self) -> bool {
        !matches!(self, Self::ItemAdded)
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Jellyfin webhook event. Keys are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct WebhookPayload {
    data: HashMap<String, String>,
}

impl WebhookPayload {
    pub fn from_map(map: Map<String, Value>) -> Self {
        let data = map
            .into_iter()
            .filter_map(|(key, value)| {
                let text = match value {
                    Value::Null => return None,
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Some((key.to_lowercase(), text))
            })
            .collect();
        Self { data }
    }

    pub fn from_fields<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let data = fields
            .into_iter()
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect();
        Self { data }
    }

    /// Accepts an object, or a string holding a JSON object.
    pub fn from_json_value(value: Value) -> Result<Self> {
        let value = match value {
            Value::String(text) => serde_json::from_str(&text)
                .map_err(|e| ProviderError::Webhook(format!("Invalid JSON payload: {}", e)))?,
            other => other,
        };

        match value {
            Value::Object(map) => Ok(Self::from_map(map)),
            _ => Err(ProviderError::Webhook(
                "Invalid payload structure: expected a JSON object".to_string(),
            )),
        }
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ProviderError::Webhook(format!("Invalid JSON body: {}", e)))?;
        Self::from_json_value(value)
    }

    /// Form fields, unwrapping a JSON `payload` field when present.
    pub fn from_form(fields: Vec<(String, String)>) -> Result<Self> {
        let payload = fields
            .iter()
            .find(|(key, _)| key == "payload")
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty());

        match payload {
            Some(raw) => {
                let value: Value = serde_json::from_str(raw)
                    .map_err(|e| ProviderError::Webhook(format!("Invalid payload JSON: {}", e)))?;
                Self::from_json_value(value)
            }
            None => Ok(Self::from_fields(fields)),
        }
    }

    pub async fn from_request(request: Request) -> Result<Self> {
        let content_type = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let mut multipart = Multipart::from_request(request, &())
                .await
                .map_err(|e| ProviderError::Webhook(e.to_string()))?;

            let mut fields = Vec::new();
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| ProviderError::Webhook(e.to_string()))?
            {
                let name = field.name().unwrap_or_default().to_string();
                let text = field
                    .text()
                    .await
                    .map_err(|e| ProviderError::Webhook(e.to_string()))?;
                fields.push((name, text));
            }
            return Self::from_form(fields);
        }

        if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(fields) = Form::<Vec<(String, String)>>::from_request(request, &())
                .await
                .map_err(|e| ProviderError::Webhook(e.to_string()))?;
            return Self::from_form(fields);
        }

        let bytes = body::to_bytes(request.into_body(), MAX_WEBHOOK_BODY_BYTES)
            .await
            .map_err(|e| ProviderError::Webhook(format!("Unable to read body: {}", e)))?;
        Self::from_json_slice(&bytes)
    }

    fn value(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn notification_type(&self) -> Option<&str> {
        self.value("notificationtype")
    }

    pub fn user_id(&self) -> Option<&str> {
        self.value("userid")
    }

    pub fn username(&self) -> Option<&str> {
        self.value("notificationusername")
            .or_else(|| self.value("username"))
    }

    pub fn item_type(&self) -> Option<&str> {
        self.value("itemtype")
    }

    pub fn item_id(&self) -> Option<&str> {
        self.value("itemid")
    }

    pub fn series_id(&self) -> Option<&str> {
        self.value("seriesid")
    }

    /// Id of the top-level library item, used as the sync key.
    pub fn top_level_item_id(&self) -> Option<&str> {
        let item_type = self.item_type().unwrap_or_default().to_lowercase();
        if matches!(item_type.as_str(), "episode" | "season") {
            if let Some(series_id) = self.series_id() {
                return Some(series_id);
            }
        }
        self.item_id().or_else(|| self.series_id())
    }

    /// Decide whether this event should trigger a sync for `user`.
    pub fn sync_trigger(&self, user: Option<&LibraryUser>) -> Result<SyncTrigger> {
        let Some(raw_type) = self.notification_type() else {
            tracing::debug!("Webhook: No notification type found in payload");
            return Err(ProviderError::Webhook(
                "No notification type found in webhook payload".to_string(),
            ));
        };

        let Some(key) = self.top_level_item_id() else {
            tracing::debug!("Webhook: No item ID found in payload");
            return Err(ProviderError::Webhook(
                "No item ID found in webhook payload".to_string(),
            ));
        };

        let Some(notification) = NotificationType::parse(raw_type) else {
            tracing::debug!("Webhook: Ignoring unsupported event type {}", raw_type);
            return Ok(SyncTrigger::ignore());
        };

        if notification.is_user_scoped() {
            let Some(user) = user else {
                tracing::debug!("Webhook: Provider user has not been initialized");
                return Ok(SyncTrigger::ignore());
            };

            let id_match = self.user_id().map_or(false, |id| ids_match(id, &user.key));
            let name_match = self
                .username()
                .map_or(false, |name| name.to_lowercase() == user.title.to_lowercase());

            if !(id_match || name_match) {
                tracing::debug!(
                    "Webhook: Ignoring event {} for user ID {:?}",
                    notification,
                    self.user_id()
                );
                return Ok(SyncTrigger::ignore());
            }
        }

        tracing::info!(
            "Webhook: Matched webhook event {} for sync key {}",
            notification,
            key
        );
        Ok(SyncTrigger::sync(vec![key.to_string()]))
    }
}

/// Jellyfin ids are GUIDs that may arrive with or without dashes.
pub(crate) fn ids_match(left: &str, right: &str) -> bool {
    match (Uuid::parse_str(left), Uuid::parse_str(right)) {
        (Ok(a), Ok(b)) => a == b,
        _ => left.eq_ignore_ascii_case(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde_json::json;

    const USER_ID: &str = "5f1c9a2e3b4d4e6f8a9b0c1d2e3f4a5b";

    fn user() -> LibraryUser {
        LibraryUser {
            key: USER_ID.to_string(),
            title: "Demo User".to_string(),
        }
    }

    fn payload(value: Value) -> WebhookPayload {
        WebhookPayload::from_json_value(value).unwrap()
    }

    fn request(content_type: &str, body: impl Into<Body>) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri("/webhook")
            .header(header::CONTENT_TYPE, content_type)
            .body(body.into())
            .unwrap()
    }

    #[test]
    fn test_keys_are_case_insensitive_and_values_trimmed() {
        let p = payload(json!({
            "NotificationType": "PlaybackStop",
            "USERID": "  ",
            "Username": "Demo User",
            "ItemId": 42,
            "SeriesId": null
        }));
        assert_eq!(p.notification_type(), Some("PlaybackStop"));
        assert_eq!(p.user_id(), None);
        assert_eq!(p.username(), Some("Demo User"));
        assert_eq!(p.item_id(), Some("42"));
        assert_eq!(p.series_id(), None);
    }

    #[test]
    fn test_top_level_item_prefers_series_for_episodes() {
        let episode = payload(json!({"ItemType": "Episode", "ItemId": "ep", "SeriesId": "show"}));
        assert_eq!(episode.top_level_item_id(), Some("show"));

        let season = payload(json!({"ItemType": "Season", "ItemId": "s1"}));
        assert_eq!(season.top_level_item_id(), Some("s1"));

        let movie = payload(json!({"ItemType": "Movie", "ItemId": "m", "SeriesId": "ignored"}));
        assert_eq!(movie.top_level_item_id(), Some("m"));

        let only_series = payload(json!({"ItemType": "Movie", "SeriesId": "show"}));
        assert_eq!(only_series.top_level_item_id(), Some("show"));
    }

    #[test]
    fn test_double_encoded_and_non_object_payloads() {
        let nested = WebhookPayload::from_json_slice(br#""{\"NotificationType\":\"ItemAdded\"}""#)
            .unwrap();
        assert_eq!(nested.notification_type(), Some("ItemAdded"));

        assert!(matches!(
            WebhookPayload::from_json_slice(b"[1, 2]"),
            Err(ProviderError::Webhook(_))
        ));
        assert!(WebhookPayload::from_json_slice(b"not json").is_err());
    }

    #[test]
    fn test_sync_trigger_decisions() {
        let user = user();

        let added = payload(json!({"NotificationType": "ItemAdded", "ItemId": "m"}));
        let trigger = added.sync_trigger(None).unwrap();
        assert!(trigger.should_sync);
        assert_eq!(trigger.keys, vec!["m"]);

        let stop_by_dashed_id = payload(json!({
            "NotificationType": "PlaybackStop",
            "ItemType": "Episode",
            "ItemId": "ep",
            "SeriesId": "show",
            "UserId": "5F1C9A2E-3B4D-4E6F-8A9B-0C1D2E3F4A5B"
        }));
        let trigger = stop_by_dashed_id.sync_trigger(Some(&user)).unwrap();
        assert!(trigger.should_sync);
        assert_eq!(trigger.keys, vec!["show"]);

        let saved_by_name = payload(json!({
            "NotificationType": "UserDataSaved",
            "ItemId": "m",
            "NotificationUsername": "demo user"
        }));
        assert!(saved_by_name.sync_trigger(Some(&user)).unwrap().should_sync);

        let other_user = payload(json!({
            "NotificationType": "UserDataSaved",
            "ItemId": "m",
            "UserId": "someone-else"
        }));
        assert_eq!(other_user.sync_trigger(Some(&user)).unwrap(), SyncTrigger::ignore());
        assert!(!saved_by_name.sync_trigger(None).unwrap().should_sync);

        let unsupported = payload(json!({"NotificationType": "PlaybackStart", "ItemId": "m"}));
        assert_eq!(unsupported.sync_trigger(Some(&user)).unwrap(), SyncTrigger::ignore());
    }

    #[test]
    fn test_sync_trigger_requires_type_and_item() {
        let no_type = payload(json!({"ItemId": "m"}));
        assert!(matches!(no_type.sync_trigger(None), Err(ProviderError::Webhook(_))));

        let no_item = payload(json!({"NotificationType": "ItemAdded"}));
        assert!(matches!(no_item.sync_trigger(None), Err(ProviderError::Webhook(_))));
    }

    #[tokio::test]
    async fn test_from_request_json_body() {
        let req = request(
            "application/json",
            r#"{"NotificationType": "ItemAdded", "ItemId": "m"}"#,
        );
        let p = WebhookPayload::from_request(req).await.unwrap();
        assert_eq!(p.item_id(), Some("m"));
    }

    #[tokio::test]
    async fn test_from_request_urlencoded_payload_field() {
        let body = format!(
            "payload={}",
            urlencoding::encode(r#"{"NotificationType":"PlaybackStop","ItemId":"m"}"#)
        );
        let req = request("application/x-www-form-urlencoded", body);
        let p = WebhookPayload::from_request(req).await.unwrap();
        assert_eq!(p.notification_type(), Some("PlaybackStop"));
    }

    #[tokio::test]
    async fn test_from_request_urlencoded_plain_fields() {
        let req = request(
            "application/x-www-form-urlencoded",
            "NotificationType=ItemAdded&ItemId=abc",
        );
        let p = WebhookPayload::from_request(req).await.unwrap();
        assert_eq!(p.notification_type(), Some("ItemAdded"));
        assert_eq!(p.item_id(), Some("abc"));
    }

    #[tokio::test]
    async fn test_from_request_multipart_payload() {
        let body = concat!(
            "--XBOUNDARY\r\n",
            "Content-Disposition: form-data; name=\"payload\"\r\n",
            "\r\n",
            "{\"NotificationType\":\"UserDataSaved\",\"ItemId\":\"m\"}\r\n",
            "--XBOUNDARY--\r\n"
        );
        let req = request("multipart/form-data; boundary=XBOUNDARY", body);
        let p = WebhookPayload::from_request(req).await.unwrap();
        assert_eq!(p.notification_type(), Some("UserDataSaved"));
    }

    #[tokio::test]
    async fn test_from_request_invalid_payload_field() {
        let req = request("application/x-www-form-urlencoded", "payload=%7Bbroken");
        assert!(matches!(
            WebhookPayload::from_request(req).await,
            Err(ProviderError::Webhook(_))
        ));
    }
}
