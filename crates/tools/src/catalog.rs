//! The closed tool catalog.
//!
//! Every tool the agent can use is a [`ToolName`] variant. Raw model output
//! is turned into a typed [`ToolRequest`] by [`ToolRequest::parse`], which
//! validates the arguments against the tool's [`ToolDescriptor`] first.

use std::fmt;
use std::str::FromStr;

use mediaclaw_core::{ParamSpec, ParamType, SeasonSelection, ToolDescriptor, ToolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    SearchMovie,
    DownloadMovie,
    SearchSeries,
    DownloadSeries,
    GetRadarrQueue,
    GetSonarrQueue,
    GetTorrents,
    ListMovies,
    ListSeries,
    DeleteMovie,
    DeleteSeries,
    AskUserForClarification,
}

impl ToolName {
    pub const ALL: [ToolName; 12] = [
        ToolName::SearchMovie,
        ToolName::DownloadMovie,
        ToolName::SearchSeries,
        ToolName::DownloadSeries,
        ToolName::GetRadarrQueue,
        ToolName::GetSonarrQueue,
        ToolName::GetTorrents,
        ToolName::ListMovies,
        ToolName::ListSeries,
        ToolName::DeleteMovie,
        ToolName::DeleteSeries,
        ToolName::AskUserForClarification,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SearchMovie => "search_movie",
            Self::DownloadMovie => "download_movie",
            Self::SearchSeries => "search_series",
            Self::DownloadSeries => "download_series",
            Self::GetRadarrQueue => "get_radarr_queue",
            Self::GetSonarrQueue => "get_sonarr_queue",
            Self::GetTorrents => "get_torrents",
            Self::ListMovies => "list_movies",
            Self::ListSeries => "list_series",
            Self::DeleteMovie => "delete_movie",
            Self::DeleteSeries => "delete_series",
            Self::AskUserForClarification => "ask_user_for_clarification",
        }
    }

    /// Ends the cycle instead of producing an observation.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AskUserForClarification)
    }

    pub fn descriptor(self) -> ToolDescriptor {
        let (description, parameters, result_contract) = match self {
            Self::SearchMovie => (
                "Search for a movie by its title.",
                vec![ParamSpec::required("query", ParamType::String, "The movie title to search for.")],
                "Up to 5 lines of '电影: <title>, 年份: <year>, TMDB ID: <id>', or a not-found message.",
            ),
            Self::DownloadMovie => (
                "Add a movie to Radarr by its TMDB ID and start downloading it.",
                vec![ParamSpec::required("tmdb_id", ParamType::Integer, "The TMDB ID from search_movie.")],
                "A confirmation, an already-exists notice, or an error message.",
            ),
            Self::SearchSeries => (
                "Search for a TV series by its title.",
                vec![ParamSpec::required("query", ParamType::String, "The series title to search for.")],
                "Up to 5 lines of '电视剧: <title>, 年份: <year>, TVDB ID: <id>', or a not-found message.",
            ),
            Self::DownloadSeries => (
                "Add a TV series to Sonarr by its TVDB ID and download the chosen seasons.",
                vec![
                    ParamSpec::required("tvdb_id", ParamType::Integer, "The TVDB ID from search_series."),
                    ParamSpec::required(
                        "seasons",
                        ParamType::SeasonSelection,
                        "\"all\" or a list of season numbers, e.g. [1, 2]. Season 0 holds the specials.",
                    ),
                ],
                "A confirmation, an already-exists notice, or an error message.",
            ),
            Self::GetRadarrQueue => (
                "Show the Radarr download queue (movies currently downloading).",
                vec![],
                "Up to 5 queue lines with title, state, time left and progress, or an empty-queue message.",
            ),
            Self::GetSonarrQueue => (
                "Show the Sonarr download queue (series currently downloading).",
                vec![],
                "Up to 5 queue lines with title, state, time left and progress, or an empty-queue message.",
            ),
            Self::GetTorrents => (
                "List the torrents in qBittorrent with their state and progress.",
                vec![],
                "Up to 10 lines of '种子: <name>, 状态: <state>, 进度: <percent>%', or a no-torrents message.",
            ),
            Self::ListMovies => (
                "List the movies already in the Radarr library.",
                vec![],
                "One line per movie with title, library ID, monitored and downloaded flags.",
            ),
            Self::ListSeries => (
                "List the series already in the Sonarr library.",
                vec![],
                "One line per series with title, library ID, monitored and downloaded flags.",
            ),
            Self::DeleteMovie => (
                "Remove a movie from the Radarr library by its library ID (from list_movies).",
                vec![ParamSpec::required("id", ParamType::Integer, "The Radarr library ID.")],
                "A confirmation or an error message.",
            ),
            Self::DeleteSeries => (
                "Remove a series from the Sonarr library by its library ID (from list_series).",
                vec![ParamSpec::required("id", ParamType::Integer, "The Sonarr library ID.")],
                "A confirmation or an error message.",
            ),
            Self::AskUserForClarification => (
                "Ask the user a question when the request is ambiguous, e.g. movie or series. Ends your turn.",
                vec![ParamSpec::required("question", ParamType::String, "The question to show the user.")],
                "Nothing; the question is shown to the user as your answer.",
            ),
        };

        ToolDescriptor {
            name: self.as_str().into(),
            description: description.into(),
            parameters,
            result_contract: result_contract.into(),
            terminal: self.is_terminal(),
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ToolError::NotFound(s.to_string()))
    }
}

/// A validated, typed tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolRequest {
    SearchMovie { query: String },
    DownloadMovie { tmdb_id: u64 },
    SearchSeries { query: String },
    DownloadSeries { tvdb_id: u64, seasons: SeasonSelection },
    GetRadarrQueue,
    GetSonarrQueue,
    GetTorrents,
    ListMovies,
    ListSeries,
    DeleteMovie { id: u64 },
    DeleteSeries { id: u64 },
    AskUserForClarification { question: String },
}

impl ToolRequest {
    /// Resolve `name` and validate `arguments` against its descriptor.
    ///
    /// Fails with [`ToolError::NotFound`] or [`ToolError::InvalidArguments`];
    /// nothing external is touched either way.
    pub fn parse(name: &str, arguments: &serde_json::Value) -> Result<Self, ToolError> {
        let tool: ToolName = name.parse()?;
        let args = tool.descriptor().validate(arguments)?;

        let text = |key: &str| {
            args.text(key)
                .map(str::to_string)
                .ok_or_else(|| ToolError::invalid(name, format!("missing parameter '{key}'")))
        };
        let integer = |key: &str| {
            args.integer(key)
                .ok_or_else(|| ToolError::invalid(name, format!("missing parameter '{key}'")))
        };

        Ok(match tool {
            ToolName::SearchMovie => Self::SearchMovie { query: text("query")? },
            ToolName::DownloadMovie => Self::DownloadMovie { tmdb_id: integer("tmdb_id")? },
            ToolName::SearchSeries => Self::SearchSeries { query: text("query")? },
            ToolName::DownloadSeries => Self::DownloadSeries {
                tvdb_id: integer("tvdb_id")?,
                seasons: args
                    .seasons("seasons")
                    .cloned()
                    .ok_or_else(|| ToolError::invalid(name, "missing parameter 'seasons'"))?,
            },
            ToolName::GetRadarrQueue => Self::GetRadarrQueue,
            ToolName::GetSonarrQueue => Self::GetSonarrQueue,
            ToolName::GetTorrents => Self::GetTorrents,
            ToolName::ListMovies => Self::ListMovies,
            ToolName::ListSeries => Self::ListSeries,
            ToolName::DeleteMovie => Self::DeleteMovie { id: integer("id")? },
            ToolName::DeleteSeries => Self::DeleteSeries { id: integer("id")? },
            ToolName::AskUserForClarification => Self::AskUserForClarification {
                question: text("question")?,
            },
        })
    }

    pub fn tool(&self) -> ToolName {
        match self {
            Self::SearchMovie { .. } => ToolName::SearchMovie,
            Self::DownloadMovie { .. } => ToolName::DownloadMovie,
            Self::SearchSeries { .. } => ToolName::SearchSeries,
            Self::DownloadSeries { .. } => ToolName::DownloadSeries,
            Self::GetRadarrQueue => ToolName::GetRadarrQueue,
            Self::GetSonarrQueue => ToolName::GetSonarrQueue,
            Self::GetTorrents => ToolName::GetTorrents,
            Self::ListMovies => ToolName::ListMovies,
            Self::ListSeries => ToolName::ListSeries,
            Self::DeleteMovie { .. } => ToolName::DeleteMovie,
            Self::DeleteSeries { .. } => ToolName::DeleteSeries,
            Self::AskUserForClarification { .. } => ToolName::AskUserForClarification,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn names_round_trip() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>().unwrap(), tool);
            assert_eq!(tool.descriptor().name, tool.as_str());
        }
    }

    #[test]
    fn only_clarification_is_terminal() {
        let terminal: Vec<_> = ToolName::ALL.into_iter().filter(|t| t.is_terminal()).collect();
        assert_eq!(terminal, vec![ToolName::AskUserForClarification]);
        assert!(ToolName::AskUserForClarification.descriptor().terminal);
    }

    #[test]
    fn unknown_name_is_not_found() {
        let err = ToolRequest::parse("download_films", &json!({})).unwrap_err();
        assert_eq!(err, ToolError::NotFound("download_films".into()));
    }

    #[test]
    fn parses_download_series() {
        let request = ToolRequest::parse("download_series", &json!({"tvdb_id": 81189, "seasons": [2, 1]})).unwrap();
        assert_eq!(
            request,
            ToolRequest::DownloadSeries {
                tvdb_id: 81189,
                seasons: SeasonSelection::Only(vec![1, 2]),
            }
        );
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let request = ToolRequest::parse("download_movie", &json!({"tmdb_id": "157336"})).unwrap();
        assert_eq!(request, ToolRequest::DownloadMovie { tmdb_id: 157336 });
    }

    #[test]
    fn non_numeric_id_is_invalid() {
        let err = ToolRequest::parse("download_series", &json!({"tvdb_id": "abc", "seasons": "all"})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { ref tool_name, .. } if tool_name == "download_series"));
        assert!(err.to_string().contains("tvdb_id"));
    }

    #[test]
    fn missing_seasons_is_invalid() {
        let err = ToolRequest::parse("download_series", &json!({"tvdb_id": 81189})).unwrap_err();
        assert!(err.to_string().contains("missing parameter 'seasons'"));
    }

    #[test]
    fn parameterless_tools_accept_null() {
        let request = ToolRequest::parse("get_torrents", &serde_json::Value::Null).unwrap();
        assert_eq!(request.tool(), ToolName::GetTorrents);
    }
}
