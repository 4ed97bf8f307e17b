//! Tool registry and dispatch.

use std::sync::Arc;

use mediaclaw_core::{SeasonSelection, ToolDescriptor, ToolError};
use tracing::{debug, warn};

use crate::catalog::{ToolName, ToolRequest};
use crate::collaborator::{MediaLibrary, TorrentClient};
use crate::observation::{self, Media};

/// The fixed tool catalog bound to its collaborators.
///
/// Cheap to share: the collaborators are stateless request/response clients
/// behind `Arc`, so concurrent cycles dispatch without locking.
pub struct ToolRegistry {
    movies: Arc<dyn MediaLibrary>,
    series: Arc<dyn MediaLibrary>,
    torrents: Arc<dyn TorrentClient>,
    descriptors: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new(
        movies: Arc<dyn MediaLibrary>,
        series: Arc<dyn MediaLibrary>,
        torrents: Arc<dyn TorrentClient>,
    ) -> Self {
        Self {
            movies,
            series,
            torrents,
            descriptors: ToolName::ALL.into_iter().map(ToolName::descriptor).collect(),
        }
    }

    /// Every registered tool, in catalog order.
    pub fn list_descriptors(&self) -> &[ToolDescriptor] {
        &self.descriptors
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn is_terminal(&self, name: &str) -> bool {
        self.descriptor(name).is_some_and(|d| d.terminal)
    }

    pub fn movies(&self) -> &Arc<dyn MediaLibrary> {
        &self.movies
    }

    pub fn series(&self) -> &Arc<dyn MediaLibrary> {
        &self.series
    }

    pub fn torrents(&self) -> &Arc<dyn TorrentClient> {
        &self.torrents
    }

    /// Validate and run one tool call.
    ///
    /// Returns `Err` only for unknown tools and invalid arguments, before any
    /// collaborator is contacted. Collaborator failures come back as `Ok`
    /// observation text.
    pub async fn invoke(&self, tool_name: &str, arguments: &serde_json::Value) -> Result<String, ToolError> {
        let request = ToolRequest::parse(tool_name, arguments)?;
        debug!(tool = %tool_name, "Dispatching tool");
        Ok(self.dispatch(request).await)
    }

    /// Run an already validated request.
    pub async fn dispatch(&self, request: ToolRequest) -> String {
        let tool = request.tool();
        let result = match request {
            ToolRequest::SearchMovie { query } => self
                .movies
                .search(&query)
                .await
                .map(|hits| observation::search_results(Media::Movie, &query, &hits))
                .map_err(|e| observation::failure("搜索电影", &e.to_string())),
            ToolRequest::DownloadMovie { tmdb_id } => self
                .movies
                .add_and_download(tmdb_id, &SeasonSelection::All)
                .await
                .map(|outcome| observation::movie_added(&outcome))
                .map_err(|e| observation::failure("添加电影", &e.to_string())),
            ToolRequest::SearchSeries { query } => self
                .series
                .search(&query)
                .await
                .map(|hits| observation::search_results(Media::Series, &query, &hits))
                .map_err(|e| observation::failure("搜索电视剧", &e.to_string())),
            ToolRequest::DownloadSeries { tvdb_id, seasons } => self
                .series
                .add_and_download(tvdb_id, &seasons)
                .await
                .map(|outcome| observation::series_added(&outcome, &seasons))
                .map_err(|e| observation::failure("添加电视剧", &e.to_string())),
            ToolRequest::GetRadarrQueue => self
                .movies
                .queue()
                .await
                .map(|items| observation::queue(Media::Movie, &items))
                .map_err(|e| observation::failure("获取Radarr队列", &e.to_string())),
            ToolRequest::GetSonarrQueue => self
                .series
                .queue()
                .await
                .map(|items| observation::queue(Media::Series, &items))
                .map_err(|e| observation::failure("获取Sonarr队列", &e.to_string())),
            ToolRequest::GetTorrents => self
                .torrents
                .torrents()
                .await
                .map(|items| observation::torrents(&items))
                .map_err(|e| observation::failure("获取种子列表", &e.to_string())),
            ToolRequest::ListMovies => self
                .movies
                .library()
                .await
                .map(|items| observation::library(Media::Movie, &items))
                .map_err(|e| observation::failure("获取电影库", &e.to_string())),
            ToolRequest::ListSeries => self
                .series
                .library()
                .await
                .map(|items| observation::library(Media::Series, &items))
                .map_err(|e| observation::failure("获取电视剧库", &e.to_string())),
            ToolRequest::DeleteMovie { id } => self
                .movies
                .delete(id)
                .await
                .map(|()| observation::deleted(Media::Movie, id))
                .map_err(|e| observation::failure("删除电影", &e.to_string())),
            ToolRequest::DeleteSeries { id } => self
                .series
                .delete(id)
                .await
                .map(|()| observation::deleted(Media::Series, id))
                .map_err(|e| observation::failure("删除电视剧", &e.to_string())),
            ToolRequest::AskUserForClarification { question } => Ok(question),
        };

        result.unwrap_or_else(|text| {
            warn!(tool = %tool, observation = %text, "Collaborator call failed");
            text
        })
    }
}
