// Services module - Jellyfin API access and webhook payload handling

pub mod jellyfin;
pub mod webhook;
