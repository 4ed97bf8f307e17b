//! Shared HTTP plumbing for the Radarr and Sonarr v3 APIs.

use std::time::Duration;

use mediaclaw_core::ServiceError;
use reqwest::{Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

const ERROR_BODY_LIMIT: usize = 200;

/// A thin client over `{host}/api/v3` authenticated with `X-Api-Key`.
#[derive(Clone)]
pub struct ArrClient {
    client: Client,
    service: &'static str,
    base_url: String,
    api_key: Option<String>,
}

impl ArrClient {
    pub fn new(service: &'static str, host: &str, api_key: Option<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            service,
            base_url: format!("{}/api/v3", host.trim_end_matches('/')),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ServiceError> {
        let response = self.send(Method::GET, path, query, None).await?;
        self.json(response).await
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T, ServiceError> {
        let response = self.send(Method::POST, path, &[], Some(body)).await?;
        self.json(response).await
    }

    pub async fn delete(&self, path: &str, query: &[(&str, &str)]) -> Result<(), ServiceError> {
        self.send(Method::DELETE, path, query, None).await.map(|_| ())
    }

    /// Path of the first configured root folder.
    pub async fn root_folder(&self) -> Result<String, ServiceError> {
        let folders: Vec<RootFolder> = self.get("rootfolder", &[]).await?;
        folders
            .into_iter()
            .next()
            .map(|f| f.path)
            .ok_or_else(|| self.setup("no root folder is configured"))
    }

    /// Id of the first quality profile.
    pub async fn quality_profile(&self) -> Result<u64, ServiceError> {
        let profiles: Vec<Profile> = self.get("qualityprofile", &[]).await?;
        profiles
            .into_iter()
            .next()
            .map(|p| p.id)
            .ok_or_else(|| self.setup("no quality profile is configured"))
    }

    pub async fn health(&self) -> Result<(), ServiceError> {
        let _: serde_json::Value = self.get("system/status", &[]).await?;
        Ok(())
    }

    pub fn setup(&self, reason: &str) -> ServiceError {
        ServiceError::Setup {
            service: self.service,
            reason: reason.into(),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<Response, ServiceError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| self.setup("api_key is not set"))?;
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(service = self.service, %method, %url, "Calling service");

        let mut request = self.client.request(method, &url).header("X-Api-Key", api_key);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| ServiceError::Network {
            service: self.service,
            reason: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ServiceError::Unauthorized { service: self.service });
        }

        let text = response.text().await.unwrap_or_default();
        Err(ServiceError::Http {
            service: self.service,
            status: status.as_u16(),
            message: truncate(text.trim(), ERROR_BODY_LIMIT),
        })
    }

    async fn json<T: DeserializeOwned>(&self, response: Response) -> Result<T, ServiceError> {
        response.json::<T>().await.map_err(|e| ServiceError::Payload {
            service: self.service,
            reason: e.to_string(),
        })
    }
}

/// True when the service refused an add because the title is already there.
pub fn is_already_added(err: &ServiceError) -> bool {
    match err {
        ServiceError::Http { status: 400, message, .. } => {
            let message = message.to_lowercase();
            message.contains("already been added") || message.contains("already exists")
        }
        _ => false,
    }
}

#[derive(Debug, Deserialize)]
struct RootFolder {
    path: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Profile {
    pub id: u64,
}

/// `GET queue` response. Only the first page is read.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct QueuePage {
    #[serde(default)]
    pub records: Vec<QueueRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueueRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub timeleft: Option<String>,
    #[serde(default)]
    pub size: f64,
    #[serde(default)]
    pub sizeleft: f64,
}

impl QueueRecord {
    pub fn into_item(self) -> crate::collaborator::QueueItem {
        let progress = (self.size > 0.0).then(|| (self.size - self.sizeleft) / self.size * 100.0);
        crate::collaborator::QueueItem {
            title: self.title,
            state: self.status,
            eta: self.timeleft,
            progress,
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_strips_trailing_slash() {
        let client = ArrClient::new("Radarr", "http://nas:7878/", Some("k".into()), Duration::from_secs(5));
        assert_eq!(client.base_url(), "http://nas:7878/api/v3");
    }

    #[tokio::test]
    async fn missing_api_key_is_a_setup_error() {
        let client = ArrClient::new("Sonarr", "http://127.0.0.1:1", Some(String::new()), Duration::from_secs(1));
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, ServiceError::Setup { service: "Sonarr", .. }));
    }

    #[test]
    fn already_added_detection() {
        let err = ServiceError::Http {
            service: "Radarr",
            status: 400,
            message: r#"[{"errorMessage":"This movie has already been added"}]"#.into(),
        };
        assert!(is_already_added(&err));

        let other = ServiceError::Http {
            service: "Radarr",
            status: 500,
            message: "already exists".into(),
        };
        assert!(!is_already_added(&other));
    }

    #[test]
    fn queue_progress_from_sizes() {
        let page: QueuePage = serde_json::from_value(serde_json::json!({
            "records": [
                {"title": "Dune.2021", "status": "downloading", "timeleft": "00:10:00", "size": 200.0, "sizeleft": 50.0},
                {"title": "Pending", "status": "queued"}
            ]
        }))
        .unwrap();
        let items: Vec<_> = page.records.into_iter().map(QueueRecord::into_item).collect();
        assert_eq!(items[0].progress, Some(75.0));
        assert_eq!(items[0].eta.as_deref(), Some("00:10:00"));
        assert_eq!(items[1].progress, None);
    }

    #[test]
    fn long_error_bodies_are_cut() {
        let body = "x".repeat(500);
        assert_eq!(truncate(&body, 10), "xxxxxxxxxx...");
        assert_eq!(truncate("short", 10), "short");
    }
}
