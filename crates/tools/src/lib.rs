//! Media tools for mediaclaw.
//!
//! The agent can search for and download movies (Radarr) and series
//! (Sonarr), inspect download queues and torrents (qBittorrent), manage
//! the libraries, and ask the user a clarifying question.
//!
//! The set of tools is closed: see [`ToolName`]. Every call goes through
//! [`ToolRegistry::invoke`], which validates arguments before any service
//! is contacted.

pub mod arr;
pub mod catalog;
pub mod collaborator;
pub mod observation;
pub mod qbittorrent;
pub mod radarr;
pub mod registry;
pub mod sonarr;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::sync::Arc;
use std::time::Duration;

use mediaclaw_config::ServicesConfig;

pub use catalog::{ToolName, ToolRequest};
pub use collaborator::{AddOutcome, LibraryItem, MediaLibrary, QueueItem, SearchHit, TorrentClient, TorrentInfo};
pub use qbittorrent::QbittorrentClient;
pub use radarr::RadarrClient;
pub use registry::ToolRegistry;
pub use sonarr::SonarrClient;

/// Build the registry against the configured Radarr, Sonarr and qBittorrent.
pub fn registry_from_config(services: &ServicesConfig) -> ToolRegistry {
    let timeout = Duration::from_secs(services.request_timeout_secs);
    ToolRegistry::new(
        Arc::new(RadarrClient::new(&services.radarr, timeout)),
        Arc::new(SonarrClient::new(&services.sonarr, timeout)),
        Arc::new(QbittorrentClient::new(&services.qbittorrent, timeout)),
    )
}
