// Shared wiremock fixtures for a small Jellyfin server
#![allow(dead_code)]

use jellyfin_provider::ProviderConfig;
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USER_ID: &str = "4c0f3e6e9b2a4d1f8e7a6b5c4d3e2f10";
pub const USER_ID_DASHED: &str = "4c0f3e6e-9b2a-4d1f-8e7a-6b5c4d3e2f10";

pub fn config(server: &MockServer) -> ProviderConfig {
    ProviderConfig::new(server.uri(), "secret-token", "demo")
}

pub fn page(items: Value) -> Value {
    let count = items.as_array().map_or(0, Vec::len);
    json!({ "Items": items, "TotalRecordCount": count, "StartIndex": 0 })
}

pub async fn mount_get(server: &MockServer, route: &str, params: &[(&str, &str)], body: Value) {
    let mut mock = Mock::given(method("GET")).and(path(route));
    for (key, value) in params {
        mock = mock.and(query_param(*key, *value));
    }
    mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Children of `parent` of one item type, as returned by `/Items`.
pub async fn mount_items(server: &MockServer, parent: &str, item_type: &str, items: Value) {
    mount_get(
        server,
        "/Items",
        &[("parentId", parent), ("includeItemTypes", item_type)],
        page(items),
    )
    .await;
}

/// Users, views and virtual folders. `series_fetchers` are the enabled
/// `Series` metadata fetchers of the anime library, in priority order.
pub async fn mount_server(server: &MockServer, series_fetchers: &[&str]) {
    mount_get(
        server,
        "/Users",
        &[],
        json!([
            { "Id": "0000aaaa0000aaaa0000aaaa0000aaaa", "Name": "Someone" },
            { "Id": USER_ID, "Name": "Demo" }
        ]),
    )
    .await;

    mount_get(
        server,
        "/UserViews",
        &[("userId", USER_ID)],
        page(json!([
            { "Id": "lib-movies", "Name": "Movies", "Type": "CollectionFolder", "CollectionType": "movies" },
            { "Id": "lib-anime", "Name": "Anime", "Type": "CollectionFolder", "CollectionType": "tvshows" },
            { "Id": "lib-music", "Name": "Music", "Type": "CollectionFolder", "CollectionType": "music" }
        ])),
    )
    .await;

    mount_get(
        server,
        "/Library/VirtualFolders",
        &[],
        json!([
            {
                "Name": "Anime",
                "CollectionType": "tvshows",
                "ItemId": "lib-anime",
                "LibraryOptions": {
                    "TypeOptions": [
                        { "Type": "Season", "MetadataFetchers": ["TheTVDB"], "MetadataFetcherOrder": ["TheTVDB"] },
                        { "Type": "Series", "MetadataFetchers": series_fetchers, "MetadataFetcherOrder": series_fetchers }
                    ]
                }
            },
            { "Name": "Movies", "CollectionType": "movies", "ItemId": "lib-movies" }
        ]),
    )
    .await;
}

pub fn movies() -> Value {
    json!([
        {
            "Id": "m1",
            "Name": "Akira",
            "Type": "Movie",
            "Genres": ["Animation", "Science Fiction"],
            "DateCreated": "2024-01-01T00:00:00Z",
            "ProviderIds": { "AniDB": "28", "Imdb": "tt0094625", "Tmdb": "149", "Zap2It": "" },
            "ImageTags": { "Primary": "tag1" },
            "UserData": {
                "Played": true,
                "PlayCount": 2,
                "IsFavorite": true,
                "Rating": 8.5,
                "PlaybackPositionTicks": 0,
                "LastPlayedDate": "2024-01-02T03:04:05Z"
            }
        },
        {
            "Id": "m2",
            "Name": "Unwatched",
            "Type": "Movie",
            "Genres": ["Drama"],
            "DateCreated": "2020-01-01T00:00:00Z",
            "ImageTags": { "Primary": "tag2" },
            "UserData": { "Played": false, "PlayCount": 0, "PlaybackPositionTicks": 1200 }
        }
    ])
}

pub fn show() -> Value {
    json!({
        "Id": "s1",
        "Name": "Frieren",
        "Type": "Series",
        "ProviderIds": { "AniDB": "17617", "AniList": "154587", "Tmdb": "209867", "Tvdb": "424536" }
    })
}

pub fn seasons() -> Value {
    json!([
        { "Id": "se0", "Name": "Specials", "Type": "Season", "IndexNumber": 0, "SeriesId": "s1" },
        { "Id": "se1", "Name": "Season 1", "Type": "Season", "IndexNumber": 1, "SeriesId": "s1" }
    ])
}

pub fn season_one_episodes() -> Value {
    json!([
        {
            "Id": "e1",
            "Name": "The Journey's End",
            "Type": "Episode",
            "IndexNumber": 1,
            "ParentIndexNumber": 1,
            "SeriesId": "s1",
            "SeasonId": "se1",
            "UserData": { "Played": true, "PlayCount": 1, "LastPlayedDate": "2024-03-01T10:00:00Z" }
        }
    ])
}

pub fn show_episodes() -> Value {
    json!([
        {
            "Id": "e1",
            "Name": "The Journey's End",
            "Type": "Episode",
            "IndexNumber": 1,
            "ParentIndexNumber": 1,
            "SeriesId": "s1",
            "SeasonId": "se1",
            "UserData": { "Played": true, "PlayCount": 1, "LastPlayedDate": "2024-03-01T10:00:00Z" }
        },
        {
            "Id": "e2",
            "Name": "Orphaned",
            "Type": "Episode",
            "IndexNumber": 2,
            "ParentIndexNumber": 1,
            "SeriesId": "s1",
            "UserData": { "Played": false }
        }
    ])
}

/// A full library: movies, one show with two seasons and its episodes.
pub async fn mount_library(server: &MockServer) {
    mount_items(server, "lib-movies", "Movie", movies()).await;
    mount_items(server, "lib-anime", "Series", json!([show()])).await;
    mount_items(server, "s1", "Season", seasons()).await;
    mount_items(server, "se1", "Episode", season_one_episodes()).await;
    mount_items(server, "s1", "Episode", show_episodes()).await;

    mount_get(server, "/Items/s1", &[("userId", USER_ID)], show()).await;
    mount_get(
        server,
        "/Items/se1",
        &[("userId", USER_ID)],
        seasons()[1].clone(),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/Items/m1/Images/Primary"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8, 2, 3], "image/png"))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Items/m2/Images/Primary"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
}
