// Jellyfin library provider
// Glues the Jellyfin client, the entry types and the webhook parser into the
// host-facing `LibraryProvider` contract.

use async_trait::async_trait;
use axum::extract::Request;
use parking_lot::RwLock;
use std::sync::Arc;

use super::entry::{history_entries, JellyfinEntry, JellyfinSection, ShowMappingPolicy};
use super::{HistoryEntry, ItemQuery, LibraryProvider, LibraryUser, MediaKind, SyncTrigger};
use crate::config::ProviderConfig;
use crate::error::Result;
use crate::models::BaseItem;
use crate::services::jellyfin::JellyfinClient;
use crate::services::webhook::WebhookPayload;

pub const NAMESPACE: &str = "jellyfin";

/// Jellyfin metadata fetcher name to the show mapping provider it implies.
const STRICT_FETCHER_PROVIDERS: &[(&str, &str)] = &[
    ("AniDB", "anidb"),
    ("AniList", "anilist"),
    ("TheTVDB", "tvdb_show"),
    ("TheMovieDb", "tmdb_show"),
    ("IMDb", "imdb_show"),
];

/// Mapping provider matching a Jellyfin metadata fetcher name.
pub fn strict_provider_for_fetcher(fetcher: &str) -> Option<&'static str> {
    STRICT_FETCHER_PROVIDERS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(fetcher.trim()))
        .map(|(_, provider)| *provider)
}

#[derive(Default)]
struct ProviderState {
    user: Option<LibraryUser>,
    sections: Vec<Arc<JellyfinSection>>,
}

pub struct JellyfinLibraryProvider {
    client: Arc<JellyfinClient>,
    strict: bool,
    state: RwLock<ProviderState>,
}

impl JellyfinLibraryProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        config.validate()?;
        let client = JellyfinClient::new(&config)?;
        Ok(Self {
            client: Arc::new(client),
            strict: config.strict,
            state: RwLock::new(ProviderState::default()),
        })
    }

    pub fn client(&self) -> &Arc<JellyfinClient> {
        &self.client
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Look up a section by its Jellyfin view id.
    pub fn section(&self, key: &str) -> Option<Arc<JellyfinSection>> {
        self.state
            .read()
            .sections
            .iter()
            .find(|section| section.key() == key)
            .cloned()
    }

    pub async fn get_history(&self, item: &BaseItem) -> Result<Vec<HistoryEntry>> {
        history_entries(&self.client, item).await
    }

    pub fn is_on_continue_watching(&self, item: &BaseItem) -> bool {
        self.client.is_on_continue_watching(item)
    }

    pub fn is_on_watchlist(&self, item: &BaseItem) -> bool {
        self.client.is_on_watchlist(item)
    }

    /// Sections holding the given kind of media.
    pub fn sections_of_kind(&self, kind: MediaKind) -> Vec<Arc<JellyfinSection>> {
        self.state
            .read()
            .sections
            .iter()
            .filter(|section| section.media_kind() == kind)
            .cloned()
            .collect()
    }

    fn show_policy(&self, raw: &BaseItem) -> ShowMappingPolicy {
        if !self.strict || raw.collection() != "tvshows" {
            return ShowMappingPolicy::Any;
        }

        let fetcher = self.client.show_metadata_fetcher_for_section(&raw.id);
        match fetcher.as_deref().and_then(strict_provider_for_fetcher) {
            Some(provider) => ShowMappingPolicy::Only(provider),
            None => {
                tracing::debug!(
                    "Section '{}' has no recognised metadata fetcher ({:?}), show mappings disabled",
                    raw.title(),
                    fetcher
                );
                ShowMappingPolicy::Suppress
            }
        }
    }
}

#[async_trait]
impl LibraryProvider for JellyfinLibraryProvider {
    type Section = Arc<JellyfinSection>;
    type Entry = JellyfinEntry;

    fn namespace(&self) -> &'static str {
        NAMESPACE
    }

    async fn initialize(&self) -> Result<()> {
        self.client.initialize().await?;

        let user = LibraryUser {
            key: self.client.user_id()?,
            title: self.client.user_name()?,
        };
        let sections: Vec<Arc<JellyfinSection>> = self
            .client
            .sections()
            .into_iter()
            .map(|raw| {
                let policy = self.show_policy(&raw);
                Arc::new(JellyfinSection::new(raw, policy))
            })
            .collect();

        for section in &sections {
            tracing::debug!(
                "Section '{}' ({}, {}) mapping policy {:?}",
                section.title(),
                section.key(),
                section.media_kind(),
                section.show_policy()
            );
        }

        *self.state.write() = ProviderState {
            user: Some(user),
            sections,
        };
        self.clear_cache().await;
        Ok(())
    }

    async fn close(&self) {
        self.client.close();
        *self.state.write() = ProviderState::default();
        tracing::debug!("Jellyfin provider closed");
    }

    fn user(&self) -> Option<LibraryUser> {
        self.state.read().user.clone()
    }

    async fn get_sections(&self) -> Vec<Self::Section> {
        self.state.read().sections.clone()
    }

    async fn list_items(
        &self,
        section: &Self::Section,
        query: &ItemQuery,
    ) -> Result<Vec<Self::Entry>> {
        let items = self.client.list_section_items(section.raw(), query).await?;
        items
            .into_iter()
            .map(|item| JellyfinEntry::wrap(self.client.clone(), section.clone(), item))
            .collect()
    }

    async fn parse_webhook(&self, request: Request) -> Result<SyncTrigger> {
        let payload = WebhookPayload::from_request(request).await?;
        let trigger = payload.sync_trigger(self.user().as_ref())?;
        tracing::debug!(
            "Webhook {:?}: sync={} keys={:?}",
            payload.notification_type(),
            trigger.should_sync,
            trigger.keys
        );
        Ok(trigger)
    }

    async fn clear_cache(&self) {
        self.client.clear_cache();
    }
}
