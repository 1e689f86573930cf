// Library entries wrapping Jellyfin items
// Movies, shows, seasons and episodes share an `EntryCore`; seasons and
// episodes resolve their parents lazily and cache them.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::{HistoryEntry, LibraryEntry, MappingDescriptor, MediaKind};
use crate::error::{ProviderError, Result};
use crate::models::{BaseItem, ItemKind};
use crate::services::jellyfin::JellyfinClient;

/// Jellyfin provider id key (lower-cased) to mapping provider, for movies.
const MOVIE_PROVIDERS: &[(&str, &str)] = &[
    ("anidb", "anidb"),
    ("anilist", "anilist"),
    ("imdb", "imdb_movie"),
    ("tmdb", "tmdb_movie"),
    ("tvdb", "tvdb_movie"),
];

/// Jellyfin provider id key (lower-cased) to mapping provider, for shows.
const SHOW_PROVIDERS: &[(&str, &str)] = &[
    ("anidb", "anidb"),
    ("anilist", "anilist"),
    ("imdb", "imdb_show"),
    ("tmdb", "tmdb_show"),
    ("tvdb", "tvdb_show"),
];

/// Which show mappings a section exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowMappingPolicy {
    /// Every known provider id.
    Any,
    /// Only the provider matching the section's metadata fetcher.
    Only(&'static str),
    /// Strict mode without a recognised fetcher: no mappings at all.
    Suppress,
}

/// A Jellyfin library view exposed as a host section.
#[derive(Debug, Clone)]
pub struct JellyfinSection {
    key: String,
    title: String,
    kind: MediaKind,
    show_policy: ShowMappingPolicy,
    raw: BaseItem,
}

impl JellyfinSection {
    pub(crate) fn new(raw: BaseItem, show_policy: ShowMappingPolicy) -> Self {
        let kind = if raw.collection() == "tvshows" {
            MediaKind::Show
        } else {
            MediaKind::Movie
        };
        Self {
            key: raw.id.clone(),
            title: raw.title(),
            kind,
            show_policy,
            raw,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn media_kind(&self) -> MediaKind {
        self.kind
    }

    pub fn show_policy(&self) -> ShowMappingPolicy {
        self.show_policy
    }

    pub fn raw(&self) -> &BaseItem {
        &self.raw
    }
}

#[derive(Clone)]
struct EntryCore {
    client: Arc<JellyfinClient>,
    section: Arc<JellyfinSection>,
    item: BaseItem,
    kind: MediaKind,
    title: String,
}

impl EntryCore {
    fn new(
        client: Arc<JellyfinClient>,
        section: Arc<JellyfinSection>,
        item: BaseItem,
        kind: MediaKind,
    ) -> Self {
        let title = item.title();
        Self {
            client,
            section,
            item,
            kind,
            title,
        }
    }

    /// Another item from the same section.
    fn sibling(&self, item: BaseItem, kind: MediaKind) -> Self {
        Self::new(self.client.clone(), self.section.clone(), item, kind)
    }

    fn provider_descriptors(&self, table: &[(&str, &'static str)]) -> Vec<MappingDescriptor> {
        self.item
            .provider_ids
            .iter()
            .flatten()
            .filter_map(|(key, value)| {
                let value = value.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
                let key = key.to_lowercase();
                let provider = table
                    .iter()
                    .find(|(jellyfin_key, _)| *jellyfin_key == key)
                    .map(|(_, provider)| *provider)?;
                Some(MappingDescriptor::new(provider, value, None))
            })
            .collect()
    }

    fn user_rating(&self) -> Option<i32> {
        self.item
            .user_data
            .as_ref()
            .and_then(|d| d.rating)
            .and_then(rating_score)
    }

    fn view_count(&self) -> u32 {
        self.item
            .user_data
            .as_ref()
            .and_then(|d| d.play_count)
            .unwrap_or(0)
            .max(0) as u32
    }

    async fn poster_image(&self) -> Option<String> {
        let tag = self.item.primary_image_tag()?;
        let url = self.client.build_image_url(&self.item.id, "Primary", Some(tag));

        match self.client.fetch_image(&url).await {
            Ok((content_type, bytes)) => Some(format!(
                "data:{};base64,{}",
                content_type,
                STANDARD.encode(bytes)
            )),
            Err(e) => {
                tracing::debug!("Failed to fetch Jellyfin poster for {}: {}", self.item.id, e);
                None
            }
        }
    }
}

/// Jellyfin's 0-10 user rating on a 0-100 scale.
fn rating_score(rating: f64) -> Option<i32> {
    rating
        .is_finite()
        .then(|| ((rating * 10.0).round() as i32).clamp(0, 100))
}

/// History entries for an item, via the client.
pub(crate) async fn history_entries(
    client: &JellyfinClient,
    item: &BaseItem,
) -> Result<Vec<HistoryEntry>> {
    Ok(client
        .fetch_history(item)
        .await?
        .into_iter()
        .map(|(library_key, viewed_at)| HistoryEntry {
            library_key,
            viewed_at,
        })
        .collect())
}

#[derive(Clone)]
pub struct JellyfinMovie {
    core: EntryCore,
}

impl JellyfinMovie {
    async fn descriptors(&self) -> Result<Vec<MappingDescriptor>> {
        // AniDB movies always map to the regular episode group
        Ok(self
            .core
            .provider_descriptors(MOVIE_PROVIDERS)
            .into_iter()
            .map(|d| match d.provider {
                "anidb" => MappingDescriptor {
                    scope: Some("R".to_string()),
                    ..d
                },
                _ => d,
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct JellyfinShow {
    core: EntryCore,
}

impl JellyfinShow {
    fn show_descriptors(&self) -> Vec<MappingDescriptor> {
        let descriptors = self.core.provider_descriptors(SHOW_PROVIDERS);
        match self.core.section.show_policy() {
            ShowMappingPolicy::Any => descriptors,
            ShowMappingPolicy::Only(required) => descriptors
                .into_iter()
                .filter(|d| d.provider == required)
                .collect(),
            ShowMappingPolicy::Suppress => Vec::new(),
        }
    }

    async fn descriptors(&self) -> Result<Vec<MappingDescriptor>> {
        Ok(self.show_descriptors())
    }

    pub async fn seasons(&self) -> Result<Vec<JellyfinSeason>> {
        let seasons = self.core.client.list_show_seasons(&self.core.item.id).await?;
        Ok(seasons
            .into_iter()
            .map(|raw| {
                JellyfinSeason::new(
                    self.core.sibling(raw, MediaKind::Season),
                    Some(self.clone()),
                )
            })
            .collect())
    }

    pub async fn episodes(&self) -> Result<Vec<JellyfinEpisode>> {
        let episodes = self
            .core
            .client
            .list_show_episodes(&self.core.item.id, None)
            .await?;
        Ok(episodes
            .into_iter()
            .map(|raw| {
                JellyfinEpisode::new(
                    self.core.sibling(raw, MediaKind::Episode),
                    None,
                    Some(self.clone()),
                )
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct JellyfinSeason {
    core: EntryCore,
    index: i32,
    show: OnceCell<JellyfinShow>,
}

impl JellyfinSeason {
    fn new(core: EntryCore, show: Option<JellyfinShow>) -> Self {
        let index = core.item.index_number.unwrap_or(0);
        Self {
            core,
            index,
            show: OnceCell::new_with(show),
        }
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub async fn show(&self) -> Result<&JellyfinShow> {
        self.show
            .get_or_try_init(|| async {
                let show_id = self.core.item.series_id.as_deref().ok_or(
                    ProviderError::MissingParent {
                        kind: "Season",
                        field: "SeriesId",
                    },
                )?;
                let raw = self.core.client.get_item(show_id).await?;
                Ok::<_, ProviderError>(JellyfinShow {
                    core: self.core.sibling(raw, MediaKind::Show),
                })
            })
            .await
    }

    pub async fn episodes(&self) -> Result<Vec<JellyfinEpisode>> {
        let show_id = self
            .core
            .item
            .series_id
            .as_deref()
            .unwrap_or(&self.core.item.id);
        let episodes = self
            .core
            .client
            .list_show_episodes(show_id, Some(&self.core.item.id))
            .await?;
        Ok(episodes
            .into_iter()
            .map(|raw| {
                JellyfinEpisode::new(
                    self.core.sibling(raw, MediaKind::Episode),
                    Some(self.clone()),
                    self.show.get().cloned(),
                )
            })
            .collect())
    }

    /// The show's mappings, scoped to this season.
    async fn descriptors(&self) -> Result<Vec<MappingDescriptor>> {
        let show = self.show().await?;
        Ok(show
            .show_descriptors()
            .into_iter()
            .map(|d| {
                let scope = match d.provider {
                    "anilist" => None,
                    // AniDB only knows specials (season 0) and regular episodes
                    "anidb" if self.index == 0 => Some("S".to_string()),
                    "anidb" => Some("R".to_string()),
                    _ => Some(format!("s{}", self.index)),
                };
                MappingDescriptor { scope, ..d }
            })
            .collect())
    }
}

#[derive(Clone)]
pub struct JellyfinEpisode {
    core: EntryCore,
    index: i32,
    season_index: i32,
    season: OnceCell<JellyfinSeason>,
    show: OnceCell<JellyfinShow>,
}

impl JellyfinEpisode {
    fn new(core: EntryCore, season: Option<JellyfinSeason>, show: Option<JellyfinShow>) -> Self {
        let index = core.item.index_number.unwrap_or(0);
        let season_index = core.item.parent_index_number.unwrap_or(0);
        Self {
            core,
            index,
            season_index,
            season: OnceCell::new_with(season),
            show: OnceCell::new_with(show),
        }
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn season_index(&self) -> i32 {
        self.season_index
    }

    pub async fn show(&self) -> Result<&JellyfinShow> {
        self.show
            .get_or_try_init(|| async {
                let show_id = self.core.item.series_id.as_deref().ok_or(
                    ProviderError::MissingParent {
                        kind: "Episode",
                        field: "SeriesId",
                    },
                )?;
                let raw = self.core.client.get_item(show_id).await?;
                Ok::<_, ProviderError>(JellyfinShow {
                    core: self.core.sibling(raw, MediaKind::Show),
                })
            })
            .await
    }

    pub async fn season(&self) -> Result<&JellyfinSeason> {
        self.season
            .get_or_try_init(|| async {
                let season_id = self.core.item.season_id.as_deref().ok_or(
                    ProviderError::MissingParent {
                        kind: "Episode",
                        field: "SeasonId",
                    },
                )?;
                let raw = self.core.client.get_item(season_id).await?;
                let show = self.show().await?.clone();
                Ok::<_, ProviderError>(JellyfinSeason::new(
                    self.core.sibling(raw, MediaKind::Season),
                    Some(show),
                ))
            })
            .await
    }

    async fn descriptors(&self) -> Result<Vec<MappingDescriptor>> {
        self.season().await?.descriptors().await
    }
}

macro_rules! impl_library_entry {
    ($ty:ty) => {
        impl $ty {
            /// The underlying Jellyfin item.
            pub fn item(&self) -> &BaseItem {
                &self.core.item
            }

            pub fn section(&self) -> &Arc<JellyfinSection> {
                &self.core.section
            }
        }

        #[async_trait]
        impl LibraryEntry for $ty {
            fn key(&self) -> &str {
                &self.core.item.id
            }

            fn title(&self) -> &str {
                &self.core.title
            }

            fn media_kind(&self) -> MediaKind {
                self.core.kind
            }

            fn section_key(&self) -> &str {
                self.core.section.key()
            }

            async fn mapping_descriptors(&self) -> Result<Vec<MappingDescriptor>> {
                self.descriptors().await
            }

            fn on_watching(&self) -> bool {
                self.core.client.is_on_continue_watching(&self.core.item)
            }

            fn on_watchlist(&self) -> bool {
                self.core.client.is_on_watchlist(&self.core.item)
            }

            fn user_rating(&self) -> Option<i32> {
                self.core.user_rating()
            }

            fn view_count(&self) -> u32 {
                self.core.view_count()
            }

            async fn history(&self) -> Result<Vec<HistoryEntry>> {
                history_entries(&self.core.client, &self.core.item).await
            }

            async fn poster_image(&self) -> Option<String> {
                self.core.poster_image().await
            }

            fn external_url(&self) -> Option<String> {
                Some(self.core.client.build_item_url(&self.core.item.id))
            }
        }
    };
}

impl_library_entry!(JellyfinMovie);
impl_library_entry!(JellyfinShow);
impl_library_entry!(JellyfinSeason);
impl_library_entry!(JellyfinEpisode);

/// Any entry the provider can list.
#[derive(Clone)]
pub enum JellyfinEntry {
    Movie(JellyfinMovie),
    Show(JellyfinShow),
    Season(JellyfinSeason),
    Episode(JellyfinEpisode),
}

impl JellyfinEntry {
    /// Wrap an item according to its Jellyfin type.
    pub(crate) fn wrap(
        client: Arc<JellyfinClient>,
        section: Arc<JellyfinSection>,
        item: BaseItem,
    ) -> Result<Self> {
        let entry = match item.item_type {
            ItemKind::Movie => JellyfinEntry::Movie(JellyfinMovie {
                core: EntryCore::new(client, section, item, MediaKind::Movie),
            }),
            ItemKind::Series => JellyfinEntry::Show(JellyfinShow {
                core: EntryCore::new(client, section, item, MediaKind::Show),
            }),
            ItemKind::Season => JellyfinEntry::Season(JellyfinSeason::new(
                EntryCore::new(client, section, item, MediaKind::Season),
                None,
            )),
            ItemKind::Episode => JellyfinEntry::Episode(JellyfinEpisode::new(
                EntryCore::new(client, section, item, MediaKind::Episode),
                None,
                None,
            )),
            other => return Err(ProviderError::UnsupportedItem(other.to_string())),
        };
        Ok(entry)
    }

    pub fn as_entry(&self) -> &dyn LibraryEntry {
        match self {
            JellyfinEntry::Movie(movie) => movie,
            JellyfinEntry::Show(show) => show,
            JellyfinEntry::Season(season) => season,
            JellyfinEntry::Episode(episode) => episode,
        }
    }

    pub fn as_show(&self) -> Option<&JellyfinShow> {
        match self {
            JellyfinEntry::Show(show) => Some(show),
            _ => None,
        }
    }

    pub fn item(&self) -> &BaseItem {
        match self {
            JellyfinEntry::Movie(movie) => movie.item(),
            JellyfinEntry::Show(show) => show.item(),
            JellyfinEntry::Season(season) => season.item(),
            JellyfinEntry::Episode(episode) => episode.item(),
        }
    }
}

#[async_trait]
impl LibraryEntry for JellyfinEntry {
    fn key(&self) -> &str {
        self.as_entry().key()
    }

    fn title(&self) -> &str {
        self.as_entry().title()
    }

    fn media_kind(&self) -> MediaKind {
        self.as_entry().media_kind()
    }

    fn section_key(&self) -> &str {
        self.as_entry().section_key()
    }

    async fn mapping_descriptors(&self) -> Result<Vec<MappingDescriptor>> {
        self.as_entry().mapping_descriptors().await
    }

    fn on_watching(&self) -> bool {
        self.as_entry().on_watching()
    }

    fn on_watchlist(&self) -> bool {
        self.as_entry().on_watchlist()
    }

    fn user_rating(&self) -> Option<i32> {
        self.as_entry().user_rating()
    }

    fn view_count(&self) -> u32 {
        self.as_entry().view_count()
    }

    async fn history(&self) -> Result<Vec<HistoryEntry>> {
        self.as_entry().history().await
    }

    async fn poster_image(&self) -> Option<String> {
        self.as_entry().poster_image().await
    }

    fn external_url(&self) -> Option<String> {
        self.as_entry().external_url()
    }
}
