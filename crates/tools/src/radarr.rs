//! Radarr (movies) client.

use std::time::Duration;

use async_trait::async_trait;
use mediaclaw_config::ArrConfig;
use mediaclaw_core::{SeasonSelection, ServiceError};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::arr::{ArrClient, QueuePage, QueueRecord, is_already_added};
use crate::collaborator::{AddOutcome, LibraryItem, MediaLibrary, QueueItem, SearchHit};

pub struct RadarrClient {
    api: ArrClient,
}

impl RadarrClient {
    pub fn new(config: &ArrConfig, timeout: Duration) -> Self {
        Self {
            api: ArrClient::new("Radarr", &config.host, config.api_key.clone(), timeout),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MovieLookup {
    title: String,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default)]
    tmdb_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Movie {
    id: u64,
    title: String,
    #[serde(default)]
    monitored: bool,
    #[serde(default)]
    has_file: bool,
}

/// Body for `POST movie`, built from a lookup result.
fn add_movie_body(lookup: &Value, root_folder: &str, quality_profile_id: u64) -> Value {
    json!({
        "title": lookup["title"],
        "tmdbId": lookup["tmdbId"],
        "year": lookup["year"],
        "titleSlug": lookup["titleSlug"],
        "images": lookup.get("images").cloned().unwrap_or_else(|| json!([])),
        "qualityProfileId": quality_profile_id,
        "rootFolderPath": root_folder,
        "monitored": true,
        "addOptions": {
            "monitor": "movieOnly",
            "searchForMovie": true
        }
    })
}

/// A lookup hit with a positive `id` is already in the library.
fn in_library(lookup: &Value) -> bool {
    lookup.get("id").and_then(Value::as_u64).is_some_and(|id| id > 0)
}

#[async_trait]
impl MediaLibrary for RadarrClient {
    fn name(&self) -> &'static str {
        self.api.service()
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ServiceError> {
        let movies: Vec<MovieLookup> = self.api.get("movie/lookup", &[("term", query)]).await?;
        Ok(movies
            .into_iter()
            .map(|m| SearchHit {
                title: m.title,
                year: m.year.filter(|y| *y > 0),
                external_id: m.tmdb_id,
            })
            .collect())
    }

    async fn add_and_download(&self, tmdb_id: u64, _: &SeasonSelection) -> Result<AddOutcome, ServiceError> {
        let term = format!("tmdb:{tmdb_id}");
        let hits: Vec<Value> = self.api.get("movie/lookup", &[("term", &term)]).await?;
        let lookup = hits.into_iter().next().ok_or_else(|| ServiceError::Payload {
            service: self.api.service(),
            reason: format!("no movie with TMDB ID {tmdb_id}"),
        })?;
        let title = lookup["title"].as_str().unwrap_or_default().to_string();

        if in_library(&lookup) {
            return Ok(AddOutcome::AlreadyExists { title });
        }

        let root_folder = self.api.root_folder().await?;
        let quality_profile_id = self.api.quality_profile().await?;
        let body = add_movie_body(&lookup, &root_folder, quality_profile_id);

        info!(tmdb_id, title = %title, "Adding movie to Radarr");
        match self.api.post::<Value>("movie", &body).await {
            Ok(_) => Ok(AddOutcome::Added { title }),
            Err(e) if is_already_added(&e) => Ok(AddOutcome::AlreadyExists { title }),
            Err(e) => Err(e),
        }
    }

    async fn queue(&self) -> Result<Vec<QueueItem>, ServiceError> {
        let page: QueuePage = self.api.get("queue", &[]).await?;
        Ok(page.records.into_iter().map(QueueRecord::into_item).collect())
    }

    async fn library(&self) -> Result<Vec<LibraryItem>, ServiceError> {
        let movies: Vec<Movie> = self.api.get("movie", &[]).await?;
        Ok(movies
            .into_iter()
            .map(|m| LibraryItem {
                title: m.title,
                id: m.id,
                monitored: m.monitored,
                downloaded: m.has_file,
            })
            .collect())
    }

    async fn delete(&self, id: u64) -> Result<(), ServiceError> {
        info!(id, "Deleting movie from Radarr");
        self.api
            .delete(&format!("movie/{id}"), &[("deleteFiles", "false")])
            .await
    }

    async fn health(&self) -> Result<(), ServiceError> {
        self.api.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(host: String) -> RadarrClient {
        RadarrClient::new(
            &ArrConfig {
                host,
                api_key: Some("secret".into()),
            },
            Duration::from_secs(5),
        )
    }

    #[test]
    fn add_body_carries_lookup_fields() {
        let lookup = json!({"title": "Interstellar", "tmdbId": 157336, "year": 2014, "titleSlug": "interstellar-157336"});
        let body = add_movie_body(&lookup, "/movies", 4);
        assert_eq!(body["tmdbId"], 157336);
        assert_eq!(body["rootFolderPath"], "/movies");
        assert_eq!(body["qualityProfileId"], 4);
        assert_eq!(body["addOptions"]["monitor"], "movieOnly");
        assert_eq!(body["addOptions"]["searchForMovie"], true);
        assert_eq!(body["images"], json!([]));
    }

    #[test]
    fn lookup_with_id_is_in_library() {
        assert!(in_library(&json!({"id": 12})));
        assert!(!in_library(&json!({"id": 0})));
        assert!(!in_library(&json!({"title": "x"})));
    }

    #[tokio::test]
    async fn search_sends_key_and_term() {
        let app = Router::new().route(
            "/api/v3/movie/lookup",
            get(|headers: HeaderMap, Query(q): Query<HashMap<String, String>>| async move {
                if headers.get("X-Api-Key").and_then(|v| v.to_str().ok()) != Some("secret") {
                    return Err(StatusCode::UNAUTHORIZED);
                }
                Ok(Json(json!([{"title": q["term"].clone(), "year": 2014, "tmdbId": 157336}])))
            }),
        );
        let radarr = client(serve(app).await);

        let hits = radarr.search("Interstellar").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Interstellar");
        assert_eq!(hits[0].external_id, 157336);
    }

    #[tokio::test]
    async fn unauthorized_is_mapped() {
        let app = Router::new().route("/api/v3/queue", get(|| async { StatusCode::UNAUTHORIZED }));
        let radarr = client(serve(app).await);
        let err = radarr.queue().await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized { service: "Radarr" }));
    }

    #[tokio::test]
    async fn existing_movie_is_not_posted_again() {
        let app = Router::new().route(
            "/api/v3/movie/lookup",
            get(|| async { Json(json!([{"id": 3, "title": "Dune", "tmdbId": 438631}])) }),
        );
        let radarr = client(serve(app).await);
        let outcome = radarr.add_and_download(438631, &SeasonSelection::All).await.unwrap();
        assert_eq!(outcome, AddOutcome::AlreadyExists { title: "Dune".into() });
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let radarr = client("http://127.0.0.1:1".into());
        let err = radarr.library().await.unwrap_err();
        assert!(matches!(err, ServiceError::Network { service: "Radarr", .. }));
    }
}
