//! Sonarr (series) client.

use std::time::Duration;

use async_trait::async_trait;
use mediaclaw_config::ArrConfig;
use mediaclaw_core::{SeasonSelection, ServiceError};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::arr::{ArrClient, Profile, QueuePage, QueueRecord, is_already_added};
use crate::collaborator::{AddOutcome, LibraryItem, MediaLibrary, QueueItem, SearchHit};

pub struct SonarrClient {
    api: ArrClient,
}

impl SonarrClient {
    pub fn new(config: &ArrConfig, timeout: Duration) -> Self {
        Self {
            api: ArrClient::new("Sonarr", &config.host, config.api_key.clone(), timeout),
        }
    }

    /// First language profile. Sonarr v4 dropped the endpoint, so a
    /// missing one is not an error.
    async fn language_profile(&self) -> Option<u64> {
        match self.api.get::<Vec<Profile>>("languageprofile", &[]).await {
            Ok(profiles) => profiles.into_iter().next().map(|p| p.id),
            Err(e) => {
                debug!(error = %e, "No language profile available");
                None
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeriesLookup {
    title: String,
    #[serde(default)]
    year: Option<u32>,
    #[serde(default)]
    tvdb_id: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    #[serde(default)]
    percent_of_episodes: f64,
}

#[derive(Debug, Deserialize)]
struct Series {
    id: u64,
    title: String,
    #[serde(default)]
    monitored: bool,
    #[serde(default)]
    statistics: Statistics,
}

/// Turn a lookup result into the `POST series` body, monitoring only the
/// selected seasons.
fn add_series_body(
    mut lookup: Value,
    root_folder: &str,
    quality_profile_id: u64,
    language_profile_id: Option<u64>,
    selection: &SeasonSelection,
) -> Value {
    if let Some(seasons) = lookup.get_mut("seasons").and_then(Value::as_array_mut) {
        for season in seasons {
            let number = season["seasonNumber"].as_u64().unwrap_or(0) as u32;
            season["monitored"] = Value::Bool(selection.includes(number));
        }
    }

    lookup["rootFolderPath"] = json!(root_folder);
    lookup["qualityProfileId"] = json!(quality_profile_id);
    if let Some(id) = language_profile_id {
        lookup["languageProfileId"] = json!(id);
    }
    lookup["monitored"] = json!(true);
    lookup["seasonFolder"] = json!(true);
    lookup["tags"] = json!([]);
    lookup["addOptions"] = json!({
        "monitor": "missing",
        "searchForMissingEpisodes": true
    });
    lookup
}

#[async_trait]
impl MediaLibrary for SonarrClient {
    fn name(&self) -> &'static str {
        self.api.service()
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ServiceError> {
        let series: Vec<SeriesLookup> = self.api.get("series/lookup", &[("term", query)]).await?;
        Ok(series
            .into_iter()
            .map(|s| SearchHit {
                title: s.title,
                year: s.year.filter(|y| *y > 0),
                external_id: s.tvdb_id,
            })
            .collect())
    }

    async fn add_and_download(&self, tvdb_id: u64, selection: &SeasonSelection) -> Result<AddOutcome, ServiceError> {
        let term = format!("tvdb:{tvdb_id}");
        let hits: Vec<Value> = self.api.get("series/lookup", &[("term", &term)]).await?;
        let lookup = hits.into_iter().next().ok_or_else(|| ServiceError::Payload {
            service: self.api.service(),
            reason: format!("no series with TVDB ID {tvdb_id}"),
        })?;
        let title = lookup["title"].as_str().unwrap_or_default().to_string();

        if lookup.get("id").and_then(Value::as_u64).is_some_and(|id| id > 0) {
            return Ok(AddOutcome::AlreadyExists { title });
        }

        let root_folder = self.api.root_folder().await?;
        let quality_profile_id = self.api.quality_profile().await?;
        let language_profile_id = self.language_profile().await;
        let body = add_series_body(lookup, &root_folder, quality_profile_id, language_profile_id, selection);

        info!(tvdb_id, title = %title, seasons = %selection, "Adding series to Sonarr");
        match self.api.post::<Value>("series", &body).await {
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
        let series: Vec<Series> = self.api.get("series", &[]).await?;
        Ok(series
            .into_iter()
            .map(|s| LibraryItem {
                title: s.title,
                id: s.id,
                monitored: s.monitored,
                downloaded: s.statistics.percent_of_episodes >= 100.0,
            })
            .collect())
    }

    async fn delete(&self, id: u64) -> Result<(), ServiceError> {
        info!(id, "Deleting series from Sonarr");
        self.api
            .delete(&format!("series/{id}"), &[("deleteFiles", "false")])
            .await
    }

    async fn health(&self) -> Result<(), ServiceError> {
        self.api.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup() -> Value {
        json!({
            "title": "Breaking Bad",
            "tvdbId": 81189,
            "seasons": [
                {"seasonNumber": 0, "monitored": true},
                {"seasonNumber": 1, "monitored": true},
                {"seasonNumber": 2, "monitored": true},
                {"seasonNumber": 3, "monitored": true}
            ]
        })
    }

    fn monitored(body: &Value) -> Vec<bool> {
        body["seasons"]
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["monitored"].as_bool().unwrap())
            .collect()
    }

    #[test]
    fn only_selected_seasons_are_monitored() {
        let body = add_series_body(lookup(), "/tv", 1, Some(2), &SeasonSelection::only(vec![2, 1]));
        assert_eq!(monitored(&body), vec![false, true, true, false]);
        assert_eq!(body["languageProfileId"], 2);
        assert_eq!(body["seasonFolder"], true);
        assert_eq!(body["addOptions"]["monitor"], "missing");
        assert_eq!(body["addOptions"]["searchForMissingEpisodes"], true);
    }

    #[test]
    fn all_monitors_every_season() {
        let body = add_series_body(lookup(), "/tv", 1, None, &SeasonSelection::All);
        assert_eq!(monitored(&body), vec![true, true, true, true]);
        assert!(body.get("languageProfileId").is_none());
        assert_eq!(body["rootFolderPath"], "/tv");
    }

    #[test]
    fn statistics_decide_downloaded() {
        let series: Vec<Series> = serde_json::from_value(json!([
            {"id": 1, "title": "Done", "monitored": true, "statistics": {"percentOfEpisodes": 100.0}},
            {"id": 2, "title": "Partial", "statistics": {"percentOfEpisodes": 40.0}},
            {"id": 3, "title": "Fresh"}
        ]))
        .unwrap();
        let downloaded: Vec<bool> = series.iter().map(|s| s.statistics.percent_of_episodes >= 100.0).collect();
        assert_eq!(downloaded, vec![true, false, false]);
    }
}
