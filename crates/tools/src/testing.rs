//! In-memory collaborators for tests, here and in the crates above.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mediaclaw_core::{SeasonSelection, ServiceError};

use crate::collaborator::{
    AddOutcome, LibraryItem, MediaLibrary, QueueItem, SearchHit, TorrentClient, TorrentInfo,
};

fn locked<T: Clone>(m: &Mutex<T>) -> T {
    m.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

/// A media library that answers from fixed data and records every call.
pub struct FakeLibrary {
    service: &'static str,
    hits: Vec<SearchHit>,
    items: Vec<LibraryItem>,
    queue: Vec<QueueItem>,
    fail: bool,
    latency: Option<Duration>,
    calls: AtomicUsize,
    added: Mutex<Vec<(u64, SeasonSelection)>>,
    deleted: Mutex<Vec<u64>>,
}

impl FakeLibrary {
    fn new(service: &'static str) -> Self {
        Self {
            service,
            hits: Vec::new(),
            items: Vec::new(),
            queue: Vec::new(),
            fail: false,
            latency: None,
            calls: AtomicUsize::new(0),
            added: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    pub fn movies() -> Self {
        Self::new("Radarr")
    }

    pub fn series() -> Self {
        Self::new("Sonarr")
    }

    pub fn with_hit(mut self, title: &str, year: u32, external_id: u64) -> Self {
        self.hits.push(SearchHit {
            title: title.into(),
            year: Some(year),
            external_id,
        });
        self
    }

    pub fn with_library_item(mut self, title: &str, id: u64) -> Self {
        self.items.push(LibraryItem {
            title: title.into(),
            id,
            monitored: true,
            downloaded: false,
        });
        self
    }

    pub fn with_queue_item(mut self, title: &str, state: &str, progress: f64) -> Self {
        self.queue.push(QueueItem {
            title: title.into(),
            state: state.into(),
            eta: None,
            progress: Some(progress),
        });
        self
    }

    /// Every call fails as if the service were down.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Every call sleeps first.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of calls that reached this library.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn added(&self) -> Vec<(u64, SeasonSelection)> {
        locked(&self.added)
    }

    pub fn deleted(&self) -> Vec<u64> {
        locked(&self.deleted)
    }

    async fn enter(&self) -> Result<(), ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.fail {
            return Err(ServiceError::Network {
                service: self.service,
                reason: "connection refused".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MediaLibrary for FakeLibrary {
    fn name(&self) -> &'static str {
        self.service
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ServiceError> {
        self.enter().await?;
        let needle = query.to_lowercase();
        Ok(self
            .hits
            .iter()
            .filter(|h| h.title.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn add_and_download(
        &self,
        external_id: u64,
        selection: &SeasonSelection,
    ) -> Result<AddOutcome, ServiceError> {
        self.enter().await?;
        let hit = self
            .hits
            .iter()
            .find(|h| h.external_id == external_id)
            .ok_or_else(|| ServiceError::Payload {
                service: self.service,
                reason: format!("no title with id {external_id}"),
            })?;

        let mut added = self.added.lock().unwrap_or_else(|e| e.into_inner());
        if added.iter().any(|(id, _)| *id == external_id) {
            return Ok(AddOutcome::AlreadyExists {
                title: hit.title.clone(),
            });
        }
        added.push((external_id, selection.clone()));
        Ok(AddOutcome::Added {
            title: hit.title.clone(),
        })
    }

    async fn queue(&self) -> Result<Vec<QueueItem>, ServiceError> {
        self.enter().await?;
        Ok(self.queue.clone())
    }

    async fn library(&self) -> Result<Vec<LibraryItem>, ServiceError> {
        self.enter().await?;
        let deleted = self.deleted();
        Ok(self
            .items
            .iter()
            .filter(|i| !deleted.contains(&i.id))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: u64) -> Result<(), ServiceError> {
        self.enter().await?;
        if !self.items.iter().any(|i| i.id == id) {
            return Err(ServiceError::Http {
                service: self.service,
                status: 404,
                message: "NotFound".into(),
            });
        }
        self.deleted.lock().unwrap_or_else(|e| e.into_inner()).push(id);
        Ok(())
    }

    async fn health(&self) -> Result<(), ServiceError> {
        self.enter().await
    }
}

/// A torrent client with a fixed torrent list.
#[derive(Default)]
pub struct FakeTorrents {
    items: Vec<TorrentInfo>,
}

impl FakeTorrents {
    pub fn with(name: &str, state: &str, progress: f64) -> Self {
        Self {
            items: vec![TorrentInfo {
                name: name.into(),
                state: state.into(),
                progress,
            }],
        }
    }
}

#[async_trait]
impl TorrentClient for FakeTorrents {
    fn name(&self) -> &'static str {
        "qBittorrent"
    }

    async fn torrents(&self) -> Result<Vec<TorrentInfo>, ServiceError> {
        Ok(self.items.clone())
    }

    async fn health(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
