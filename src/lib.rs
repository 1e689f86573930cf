//! Jellyfin library provider.
//!
//! Exposes a Jellyfin server's movie and show libraries to a list-sync host:
//! sections, entries with external id mappings and watch state, and webhook
//! parsing that names the items to re-sync.

pub mod api;
pub mod config;
pub mod error;
pub mod library;
pub mod models;
pub mod services;

pub use config::ProviderConfig;
pub use error::{ProviderError, Result};
pub use library::{
    ItemQuery, JellyfinEntry, JellyfinLibraryProvider, JellyfinSection, LibraryEntry,
    LibraryProvider, LibraryUser, MappingDescriptor, MediaKind, SyncTrigger,
};
