//! qBittorrent Web API client.
//!
//! Authentication is cookie based: `auth/login` sets an `SID` cookie that
//! the client's cookie store replays on later calls. A 403 means the
//! session expired, so the client logs in once more and retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mediaclaw_config::QbittorrentConfig;
use mediaclaw_core::ServiceError;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::collaborator::{TorrentClient, TorrentInfo};

const SERVICE: &str = "qBittorrent";

pub struct QbittorrentClient {
    client: Client,
    host: String,
    username: String,
    password: String,
    logged_in: AtomicBool,
}

#[derive(Debug, Deserialize)]
struct Torrent {
    #[serde(default)]
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    progress: f64,
}

impl QbittorrentClient {
    pub fn new(config: &QbittorrentConfig, timeout: Duration) -> Self {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            logged_in: AtomicBool::new(false),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2/{path}", self.host)
    }

    async fn login(&self) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(self.url("auth/login"))
            .header("Referer", &self.host)
            .form(&[("username", self.username.as_str()), ("password", self.password.as_str())])
            .send()
            .await
            .map_err(network)?;

        if response.status() == StatusCode::FORBIDDEN {
            return Err(ServiceError::Unauthorized { service: SERVICE });
        }
        let response = check(response).await?;
        let body = response.text().await.map_err(network)?;
        if body.trim() != "Ok." {
            return Err(ServiceError::Unauthorized { service: SERVICE });
        }

        info!(host = %self.host, "Logged in to qBittorrent");
        self.logged_in.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// GET an authenticated endpoint, logging in first if needed.
    async fn get(&self, path: &str) -> Result<Response, ServiceError> {
        if !self.logged_in.load(Ordering::SeqCst) {
            self.login().await?;
        }

        let response = self.client.get(self.url(path)).send().await.map_err(network)?;
        if response.status() != StatusCode::FORBIDDEN {
            return check(response).await;
        }

        debug!("qBittorrent session expired, logging in again");
        self.logged_in.store(false, Ordering::SeqCst);
        self.login().await?;
        let response = self.client.get(self.url(path)).send().await.map_err(network)?;
        if response.status() == StatusCode::FORBIDDEN {
            return Err(ServiceError::Unauthorized { service: SERVICE });
        }
        check(response).await
    }
}

fn network(e: reqwest::Error) -> ServiceError {
    ServiceError::Network {
        service: SERVICE,
        reason: e.to_string(),
    }
}

async fn check(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ServiceError::Http {
        service: SERVICE,
        status: status.as_u16(),
        message: message.trim().to_string(),
    })
}

#[async_trait]
impl TorrentClient for QbittorrentClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn torrents(&self) -> Result<Vec<TorrentInfo>, ServiceError> {
        let torrents: Vec<Torrent> = self
            .get("torrents/info")
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::Payload {
                service: SERVICE,
                reason: e.to_string(),
            })?;

        Ok(torrents
            .into_iter()
            .map(|t| TorrentInfo {
                name: t.name,
                state: t.state,
                progress: t.progress,
            })
            .collect())
    }

    async fn health(&self) -> Result<(), ServiceError> {
        let version = self.get("app/version").await?.text().await.map_err(network)?;
        debug!(version = %version.trim(), "qBittorrent is up");
        Ok(())
    }
}
