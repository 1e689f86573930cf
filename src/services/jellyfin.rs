// Jellyfin REST client
// Authenticates with an API token, resolves the configured user and wraps the
// item/view/library endpoints the provider needs.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::RwLock;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::library::ItemQuery;
use crate::models::{BaseItem, ItemKind, ItemsResponse, UserDto, VirtualFolderInfo};
use crate::services::webhook::ids_match;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Fields requested for every item query.
pub const ITEM_FIELDS: &[&str] = &[
    "Path",
    "Genres",
    "SortName",
    "Taglines",
    "DateCreated",
    "DateLastSaved",
    "Overview",
    "ProviderIds",
    "ParentId",
];

const PAGE_SIZE: u32 = 200;
const ACTIVITY_LOOKUP_CONCURRENCY: usize = 4;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const IMAGE_TIMEOUT: Duration = Duration::from_secs(3);

/// State discovered by [`JellyfinClient::initialize`].
#[derive(Debug, Clone)]
struct Session {
    user_id: String,
    user_name: String,
    sections: Vec<BaseItem>,
    show_fetchers: HashMap<String, String>,
}

/// Jellyfin HTTP API client used by the library provider.
pub struct JellyfinClient {
    http: Client,
    base_url: String,
    token: String,
    user: String,
    section_filter: Vec<String>,
    genre_filter: Vec<String>,
    session: RwLock<Option<Session>>,
}

impl JellyfinClient {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        let auth = header::HeaderValue::from_str(&format!(r#"MediaBrowser Token="{}""#, config.token))
            .map_err(|_| ProviderError::Config("token contains invalid characters".to_string()))?;
        headers.insert(header::AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            user: config.user.clone(),
            section_filter: config.sections.iter().map(|s| s.to_lowercase()).collect(),
            genre_filter: config.genres.iter().map(|g| g.to_lowercase()).collect(),
            session: RwLock::new(None),
        })
    }

    /// Resolve the user and discover sections and their metadata fetchers.
    pub async fn initialize(&self) -> Result<()> {
        let users: Vec<UserDto> = self.get_json("/Users", &[]).await?;
        let user = select_user(users, &self.user)?;
        let user_name = user.name.clone().unwrap_or_else(|| user.id.clone());
        tracing::debug!("Resolved Jellyfin user '{}' ({})", user_name, user.id);

        let views: ItemsResponse = self
            .get_json("/UserViews", &[("userId", user.id.clone())])
            .await?;
        let sections = select_sections(views.items, &self.section_filter);

        let folders: Vec<VirtualFolderInfo> =
            self.get_json("/Library/VirtualFolders", &[]).await?;
        let show_fetchers = show_metadata_fetchers(&folders);

        tracing::info!(
            "Connected to Jellyfin at {} as '{}': {} sections",
            self.base_url,
            user_name,
            sections.len()
        );

        *self.session.write() = Some(Session {
            user_id: user.id,
            user_name,
            sections,
            show_fetchers,
        });
        Ok(())
    }

    /// Forget everything learned during initialization.
    pub fn close(&self) {
        *self.session.write() = None;
    }

    pub fn user_id(&self) -> Result<String> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.user_id.clone())
            .ok_or(ProviderError::NotInitialized)
    }

    pub fn user_name(&self) -> Result<String> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.user_name.clone())
            .ok_or(ProviderError::NotInitialized)
    }

    /// Headers for calls made outside the default client (image downloads).
    pub fn auth_headers(&self) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        if let Ok(value) = header::HeaderValue::from_str(&self.token) {
            headers.insert("X-Emby-Token", value);
        }
        headers
    }

    pub fn sections(&self) -> Vec<BaseItem> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.sections.clone())
            .unwrap_or_default()
    }

    /// Top-priority TV metadata fetcher of a section, if known.
    pub fn show_metadata_fetcher_for_section(&self, section_id: &str) -> Option<String> {
        self.session
            .read()
            .as_ref()
            .and_then(|s| s.show_fetchers.get(section_id).cloned())
    }

    /// Items of a section with the query's filters applied.
    pub async fn list_section_items(
        &self,
        section: &BaseItem,
        query: &ItemQuery,
    ) -> Result<Vec<BaseItem>> {
        let kind = if section.collection() == "movies" {
            ItemKind::Movie
        } else {
            ItemKind::Series
        };
        let mut items = self.query_items(&section.id, kind).await?;

        if !self.genre_filter.is_empty() {
            items.retain(|item| item.matches_any_genre(&self.genre_filter));
        }

        if let Some(min_last_modified) = query.min_last_modified {
            items.retain(|item| {
                item.last_modified()
                    .map_or(true, |modified| modified >= min_last_modified)
            });
        }

        if let Some(keys) = &query.keys {
            let allowed: HashSet<&str> = keys.iter().map(String::as_str).collect();
            items.retain(|item| allowed.contains(item.id.as_str()));
        }

        if query.require_watched {
            items = self.retain_with_activity(items).await?;
        }

        tracing::debug!(
            "Section '{}' yielded {} items",
            section.title(),
            items.len()
        );
        Ok(items)
    }

    pub async fn list_show_seasons(&self, show_id: &str) -> Result<Vec<BaseItem>> {
        self.query_items(show_id, ItemKind::Season).await
    }

    /// Episodes of a season when given, otherwise of the whole show.
    pub async fn list_show_episodes(
        &self,
        show_id: &str,
        season_id: Option<&str>,
    ) -> Result<Vec<BaseItem>> {
        self.query_items(season_id.unwrap_or(show_id), ItemKind::Episode)
            .await
    }

    pub async fn get_item(&self, item_id: &str) -> Result<BaseItem> {
        let user_id = self.user_id()?;
        let path = format!("/Items/{}", urlencoding::encode(item_id));
        self.get_json(&path, &[("userId", user_id)]).await
    }

    /// Whether the item, or failing that any of its episodes, has been played.
    pub async fn has_user_activity(&self, item: &BaseItem) -> Result<bool> {
        if item.has_user_activity() {
            return Ok(true);
        }

        let episodes = match item.item_type {
            ItemKind::Series => self.list_show_episodes(&item.id, None).await?,
            ItemKind::Season => {
                let show_id = item.series_id.as_deref().unwrap_or(&item.id);
                self.list_show_episodes(show_id, Some(&item.id)).await?
            }
            _ => return Ok(false),
        };

        Ok(episodes.iter().any(BaseItem::has_user_activity))
    }

    /// Play history as `(item id, last played)` pairs.
    pub async fn fetch_history(&self, item: &BaseItem) -> Result<Vec<(String, DateTime<Utc>)>> {
        let history = match item.item_type {
            ItemKind::Series | ItemKind::Season => {
                let season_id = (item.item_type == ItemKind::Season).then_some(item.id.as_str());
                self.list_show_episodes(&item.id, season_id)
                    .await?
                    .into_iter()
                    .filter_map(|episode| episode.last_played().map(|at| (episode.id, at)))
                    .collect()
            }
            _ => item
                .last_played()
                .map(|at| vec![(item.id.clone(), at)])
                .unwrap_or_default(),
        };
        Ok(history)
    }

    /// Started but not finished.
    pub fn is_on_continue_watching(&self, item: &BaseItem) -> bool {
        match &item.user_data {
            Some(data) if !data.played => data.playback_position_ticks.unwrap_or(0) > 0,
            _ => false,
        }
    }

    /// Favorites double as the watchlist.
    pub fn is_on_watchlist(&self, item: &BaseItem) -> bool {
        item.user_data.as_ref().map_or(false, |d| d.is_favorite)
    }

    pub fn build_image_url(&self, item_id: &str, image_type: &str, tag: Option<&str>) -> String {
        let mut url = format!(
            "{}/Items/{}/Images/{}?maxHeight=400&maxWidth=300&quality=90&api_key={}",
            self.base_url,
            urlencoding::encode(item_id),
            urlencoding::encode(image_type),
            urlencoding::encode(&self.token)
        );
        if let Some(tag) = tag.filter(|t| !t.is_empty()) {
            url.push_str("&tag=");
            url.push_str(&urlencoding::encode(tag));
        }
        url
    }

    /// Jellyfin web UI details page.
    pub fn build_item_url(&self, item_id: &str) -> String {
        format!(
            "{}/web/#/details?id={}",
            self.base_url,
            urlencoding::encode(item_id)
        )
    }

    /// Download an image, returning its content type and bytes.
    pub async fn fetch_image(&self, url: &str) -> Result<(String, Vec<u8>)> {
        let response = self
            .http
            .get(url)
            .headers(self.auth_headers())
            .timeout(IMAGE_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status,
                path: url.to_string(),
                body: String::new(),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = response.bytes().await?;
        Ok((content_type, bytes.to_vec()))
    }

    /// Nothing is cached on the Jellyfin side.
    pub fn clear_cache(&self) {}

    /// Recursive `/Items` query for one item kind under a parent, all pages.
    async fn query_items(&self, parent_id: &str, kind: ItemKind) -> Result<Vec<BaseItem>> {
        let user_id = self.user_id()?;
        let fields = ITEM_FIELDS.join(",");
        let mut items = Vec::new();
        let mut start_index: u32 = 0;

        loop {
            let query = [
                ("userId", user_id.clone()),
                ("parentId", parent_id.to_string()),
                ("includeItemTypes", kind.to_string()),
                ("recursive", "true".to_string()),
                ("fields", fields.clone()),
                ("enableUserData", "true".to_string()),
                ("enableImages", "true".to_string()),
                ("startIndex", start_index.to_string()),
                ("limit", PAGE_SIZE.to_string()),
            ];
            let page: ItemsResponse = self.get_json("/Items", &query).await?;

            let received = page.items.len() as u32;
            items.extend(page.items);
            start_index += received;

            let total = page.total_record_count.unwrap_or(u32::MAX);
            if received < PAGE_SIZE || start_index >= total {
                break;
            }
        }

        Ok(items)
    }

    async fn retain_with_activity(&self, items: Vec<BaseItem>) -> Result<Vec<BaseItem>> {
        let checked: Vec<Result<Option<BaseItem>>> = stream::iter(items)
            .map(|item| async move {
                let active = self.has_user_activity(&item).await?;
                Ok::<_, ProviderError>(active.then_some(item))
            })
            .buffered(ACTIVITY_LOOKUP_CONCURRENCY)
            .collect()
            .await;

        checked.into_iter().filter_map(Result::transpose).collect()
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {}", path);

        let response = self.http.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("GET {} failed with status {}", path, status);
            return Err(ProviderError::Status {
                status,
                path: path.to_string(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

/// Match the configured user value against user ids and names.
fn select_user(users: Vec<UserDto>, wanted: &str) -> Result<UserDto> {
    let target = wanted.trim();
    if target.is_empty() {
        return Err(ProviderError::Config(
            "Jellyfin provider requires a non-empty user value".to_string(),
        ));
    }

    users
        .into_iter()
        .find(|user| {
            ids_match(&user.id, target)
                || user
                    .name
                    .as_deref()
                    .map_or(false, |name| name.to_lowercase() == target.to_lowercase())
        })
        .ok_or_else(|| ProviderError::UserNotFound(wanted.to_string()))
}

/// Movie and show views, restricted to the configured section names.
fn select_sections(views: Vec<BaseItem>, section_filter: &[String]) -> Vec<BaseItem> {
    views
        .into_iter()
        .filter(|view| matches!(view.collection().as_str(), "movies" | "tvshows"))
        .filter(|view| {
            section_filter.is_empty()
                || section_filter.contains(&view.title().to_lowercase())
        })
        .collect()
}

/// Preferred `Series` metadata fetcher for each TV virtual folder.
fn show_metadata_fetchers(folders: &[VirtualFolderInfo]) -> HashMap<String, String> {
    let mut fetchers = HashMap::new();

    for folder in folders {
        let Some(section_id) = folder.item_id.as_deref().filter(|id| !id.is_empty()) else {
            continue;
        };
        if !folder
            .collection_type
            .as_deref()
            .map_or(false, |c| c.eq_ignore_ascii_case("tvshows"))
        {
            continue;
        }

        let type_options = folder
            .library_options
            .as_ref()
            .and_then(|o| o.type_options.as_deref())
            .unwrap_or_default();

        let preferred = type_options
            .iter()
            .filter(|option| option.type_name.as_deref() == Some("Series"))
            .find_map(|option| option.preferred_metadata_fetcher());

        if let Some(fetcher) = preferred {
            fetchers.insert(section_id.to_string(), fetcher.to_string());
        }
    }

    fetchers
}
