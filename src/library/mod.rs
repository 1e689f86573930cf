//! Library provider contract shared with the host sync application.
//!
//! The host enumerates sections, lists entries and asks each entry for its
//! mapping descriptors and watch state. Webhooks are turned into a
//! [`SyncTrigger`] naming the library keys to refresh.

use async_trait::async_trait;
use axum::extract::Request;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::error::Result;

mod entry;
mod provider;

pub use entry::{
    JellyfinEntry, JellyfinEpisode, JellyfinMovie, JellyfinSeason, JellyfinSection, JellyfinShow,
    ShowMappingPolicy,
};
pub use provider::{strict_provider_for_fetcher, JellyfinLibraryProvider, NAMESPACE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Movie,
    Show,
    Season,
    Episode,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaKind::Movie => "movie",
            MediaKind::Show => "show",
            MediaKind::Season => "season",
            MediaKind::Episode => "episode",
        };
        f.write_str(name)
    }
}

/// The account whose watch state the provider reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryUser {
    pub key: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub library_key: String,
    pub viewed_at: DateTime<Utc>,
}

/// Cross-reference into an external metadata provider.
///
/// `scope` narrows the mapping inside the target entry: `s<N>` for a season,
/// or the AniDB `R` (regular) / `S` (special) episode groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingDescriptor {
    pub provider: &'static str,
    pub entry_id: String,
    pub scope: Option<String>,
}

impl MappingDescriptor {
    pub fn new(provider: &'static str, entry_id: impl Into<String>, scope: Option<String>) -> Self {
        Self {
            provider,
            entry_id: entry_id.into(),
            scope,
        }
    }
}

/// Filters for [`LibraryProvider::list_items`].
#[derive(Debug, Clone, Default)]
pub struct ItemQuery {
    /// Skip items not modified since this instant.
    pub min_last_modified: Option<DateTime<Utc>>,
    /// Only items the user has watched, fully or partially.
    pub require_watched: bool,
    /// Restrict to these item keys.
    pub keys: Option<Vec<String>>,
}

impl ItemQuery {
    pub fn modified_since(mut self, at: DateTime<Utc>) -> Self {
        self.min_last_modified = Some(at);
        self
    }

    pub fn watched_only(mut self) -> Self {
        self.require_watched = true;
        self
    }

    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }
}

/// Outcome of a webhook: whether to sync, and which library keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncTrigger {
    pub should_sync: bool,
    pub keys: Vec<String>,
}

impl SyncTrigger {
    pub fn ignore() -> Self {
        Self::default()
    }

    pub fn sync(keys: Vec<String>) -> Self {
        Self {
            should_sync: true,
            keys,
        }
    }
}

/// A media item exposed to the host.
#[async_trait]
pub trait LibraryEntry: Send + Sync {
    fn key(&self) -> &str;
    fn title(&self) -> &str;
    fn media_kind(&self) -> MediaKind;
    fn section_key(&self) -> &str;

    async fn mapping_descriptors(&self) -> Result<Vec<MappingDescriptor>>;

    /// Partially watched.
    fn on_watching(&self) -> bool;
    fn on_watchlist(&self) -> bool;
    /// 0-100 scale.
    fn user_rating(&self) -> Option<i32>;
    fn view_count(&self) -> u32;

    async fn history(&self) -> Result<Vec<HistoryEntry>>;
    async fn poster_image(&self) -> Option<String>;
    fn external_url(&self) -> Option<String>;

    async fn review(&self) -> Option<String> {
        None
    }
}

/// A media server adapted for the host application.
#[async_trait]
pub trait LibraryProvider: Send + Sync {
    type Section: Send + Sync;
    type Entry: Send + Sync;

    fn namespace(&self) -> &'static str;

    async fn initialize(&self) -> Result<()>;
    async fn close(&self);

    fn user(&self) -> Option<LibraryUser>;

    async fn get_sections(&self) -> Vec<Self::Section>;
    async fn list_items(&self, section: &Self::Section, query: &ItemQuery)
        -> Result<Vec<Self::Entry>>;

    async fn parse_webhook(&self, request: Request) -> Result<SyncTrigger>;
    async fn clear_cache(&self);
}
