//! Narrow interfaces over the external media services.
//!
//! The registry only ever talks to these traits. The concrete REST clients
//! live in [`crate::radarr`], [`crate::sonarr`] and [`crate::qbittorrent`];
//! tests substitute in-memory fakes.

use async_trait::async_trait;
use mediaclaw_core::{SeasonSelection, ServiceError};
use serde::{Deserialize, Serialize};

/// One search result from a library lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub year: Option<u32>,
    /// TMDB id for movies, TVDB id for series.
    pub external_id: u64,
}

/// Result of adding a title to a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added { title: String },
    AlreadyExists { title: String },
}

/// One entry of a download queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub title: String,
    pub state: String,
    pub eta: Option<String>,
    /// Percentage in `0.0..=100.0`, when the service reports sizes.
    pub progress: Option<f64>,
}

/// One title already in a library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub title: String,
    pub id: u64,
    pub monitored: bool,
    pub downloaded: bool,
}

/// A torrent known to the download client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentInfo {
    pub name: String,
    pub state: String,
    /// Fraction in `0.0..=1.0`.
    pub progress: f64,
}

/// A media manager such as Radarr (movies) or Sonarr (series).
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Service name for logs and messages.
    fn name(&self) -> &'static str;

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ServiceError>;

    /// Add the title with `external_id` and start searching for downloads.
    /// `selection` only matters for series.
    async fn add_and_download(
        &self,
        external_id: u64,
        selection: &SeasonSelection,
    ) -> Result<AddOutcome, ServiceError>;

    async fn queue(&self) -> Result<Vec<QueueItem>, ServiceError>;

    async fn library(&self) -> Result<Vec<LibraryItem>, ServiceError>;

    /// Remove a title by its library id. Files on disk are kept.
    async fn delete(&self, id: u64) -> Result<(), ServiceError>;

    async fn health(&self) -> Result<(), ServiceError>;
}

/// A torrent download client such as qBittorrent.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn torrents(&self) -> Result<Vec<TorrentInfo>, ServiceError>;

    async fn health(&self) -> Result<(), ServiceError>;
}
