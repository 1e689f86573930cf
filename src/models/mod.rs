// Jellyfin REST API data transfer objects
// Only the fields the provider reads are modelled; everything else is ignored.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Jellyfin `BaseItemKind`, reduced to the kinds the provider distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Movie,
    Series,
    Season,
    Episode,
    CollectionFolder,
    UserView,
    #[serde(other)]
    Other,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Movie => "Movie",
            ItemKind::Series => "Series",
            ItemKind::Season => "Season",
            ItemKind::Episode => "Episode",
            ItemKind::CollectionFolder => "CollectionFolder",
            ItemKind::UserView => "UserView",
            ItemKind::Other => "Other",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-user state attached to an item (`UserItemDataDto`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserItemData {
    #[serde(default)]
    pub played: bool,
    #[serde(default)]
    pub play_count: Option<i32>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub playback_position_ticks: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_date")]
    pub last_played_date: Option<DateTime<Utc>>,
}

impl UserItemData {
    /// Played at least once, either flagged or counted.
    pub fn has_activity(&self) -> bool {
        self.played || self.play_count.unwrap_or(0) > 0
    }
}

/// A library item as returned by `/Items` and `/UserViews` (`BaseItemDto`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BaseItem {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "Type")]
    pub item_type: ItemKind,
    #[serde(default)]
    pub collection_type: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub series_id: Option<String>,
    #[serde(default)]
    pub season_id: Option<String>,
    #[serde(default)]
    pub index_number: Option<i32>,
    #[serde(default)]
    pub parent_index_number: Option<i32>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub sort_name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    #[serde(default)]
    pub provider_ids: Option<BTreeMap<String, Option<String>>>,
    #[serde(default)]
    pub image_tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub user_data: Option<UserItemData>,
    #[serde(default, deserialize_with = "deserialize_date")]
    pub date_created: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_date")]
    pub date_last_media_added: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_date")]
    pub date_last_saved: Option<DateTime<Utc>>,
}

impl BaseItem {
    pub fn title(&self) -> String {
        self.name.clone().unwrap_or_default()
    }

    /// Lower-cased collection type of a library view (`movies`, `tvshows`, ...).
    pub fn collection(&self) -> String {
        self.collection_type
            .as_deref()
            .unwrap_or_default()
            .to_lowercase()
    }

    /// Timestamp used for "modified since" filtering.
    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.date_last_media_added.or(self.date_created)
    }

    pub fn has_user_activity(&self) -> bool {
        self.user_data
            .as_ref()
            .map(UserItemData::has_activity)
            .unwrap_or(false)
    }

    pub fn last_played(&self) -> Option<DateTime<Utc>> {
        self.user_data.as_ref().and_then(|d| d.last_played_date)
    }

    /// Tag of the primary image, accepting either key casing.
    pub fn primary_image_tag(&self) -> Option<&str> {
        let tags = self.image_tags.as_ref()?;
        tags.get("Primary")
            .or_else(|| tags.get("primary"))
            .map(String::as_str)
            .filter(|tag| !tag.is_empty())
    }

    pub fn matches_any_genre(&self, genres: &[String]) -> bool {
        self.genres
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|genre| genres.contains(&genre.to_lowercase()))
    }
}

/// Paged result wrapper used by `/Items` and `/UserViews`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ItemsResponse {
    #[serde(default)]
    pub items: Vec<BaseItem>,
    #[serde(default)]
    pub total_record_count: Option<u32>,
    #[serde(default)]
    pub start_index: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserDto {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Entry of `/Library/VirtualFolders`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VirtualFolderInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub collection_type: Option<String>,
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub library_options: Option<LibraryOptions>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LibraryOptions {
    #[serde(default)]
    pub type_options: Option<Vec<TypeOptions>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TypeOptions {
    #[serde(rename = "Type", default)]
    pub type_name: Option<String>,
    /// Enabled fetchers.
    #[serde(default)]
    pub metadata_fetchers: Option<Vec<String>>,
    /// Priority order across all fetchers, enabled or not.
    #[serde(default)]
    pub metadata_fetcher_order: Option<Vec<String>>,
}

impl TypeOptions {
    /// Highest-priority fetcher that is also enabled.
    pub fn preferred_metadata_fetcher(&self) -> Option<&str> {
        let enabled: Vec<&str> = self
            .metadata_fetchers
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect();

        if enabled.is_empty() {
            return None;
        }

        let ordered = self
            .metadata_fetcher_order
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|f| f.trim())
            .find(|f| enabled.contains(f));

        ordered.or_else(|| enabled.first().copied())
    }
}

/// Parse a Jellyfin timestamp. Naive timestamps are taken as local time.
pub fn parse_jellyfin_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
}

fn deserialize_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_jellyfin_date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_item_with_ticks_precision_dates() {
        let json = r#"{
            "Id": "a1b2",
            "Name": "Beck",
            "Type": "Series",
            "DateCreated": "2025-01-05T12:00:00.1234567Z",
            "ProviderIds": {"Tvdb": "55", "AniDB": null},
            "ImageTags": {"Primary": "abc"},
            "UserData": {"Played": false, "PlayCount": 0, "IsFavorite": true}
        }"#;
        let item: BaseItem = serde_json::from_str(json).unwrap();

        assert_eq!(item.item_type, ItemKind::Series);
        assert_eq!(item.title(), "Beck");
        let created = item.date_created.unwrap();
        assert_eq!(created.hour(), 12);
        assert_eq!(item.last_modified(), Some(created));
        assert_eq!(item.primary_image_tag(), Some("abc"));
        assert!(!item.has_user_activity());
        assert!(item.user_data.unwrap().is_favorite);
    }

    #[test]
    fn test_unknown_item_type_is_other() {
        let item: BaseItem =
            serde_json::from_str(r#"{"Id": "x", "Type": "BoxSet", "Genres": null}"#).unwrap();
        assert_eq!(item.item_type, ItemKind::Other);
        assert!(!item.matches_any_genre(&["anime".to_string()]));
    }

    #[test]
    fn test_naive_date_is_local_time() {
        let parsed = parse_jellyfin_date("2025-01-05T12:00:00").unwrap();
        let expected = Local
            .with_ymd_and_hms(2025, 1, 5, 12, 0, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parsed, expected);
        assert!(parse_jellyfin_date("  ").is_none());
        assert!(parse_jellyfin_date("yesterday").is_none());
    }

    #[test]
    fn test_preferred_fetcher_respects_order_and_enabled() {
        let options = TypeOptions {
            type_name: Some("Series".to_string()),
            metadata_fetchers: Some(vec!["AniList".to_string()]),
            metadata_fetcher_order: Some(vec!["AniDb".to_string(), "AniList".to_string()]),
        };
        assert_eq!(options.preferred_metadata_fetcher(), Some("AniList"));

        let no_order = TypeOptions {
            metadata_fetcher_order: None,
            metadata_fetchers: Some(vec!["AniDb".to_string(), "AniList".to_string()]),
            ..Default::default()
        };
        assert_eq!(no_order.preferred_metadata_fetcher(), Some("AniDb"));

        let nothing_enabled = TypeOptions {
            metadata_fetcher_order: Some(vec!["AniDb".to_string()]),
            ..Default::default()
        };
        assert_eq!(nothing_enabled.preferred_metadata_fetcher(), None);
    }
}
