//! Observation text for each tool.
//!
//! These strings are what the model reads back after a tool runs, so
//! they stay short and line-oriented.

use mediaclaw_core::SeasonSelection;

use crate::collaborator::{AddOutcome, LibraryItem, QueueItem, SearchHit, TorrentInfo};

const SEARCH_LIMIT: usize = 5;
const QUEUE_LIMIT: usize = 5;
const TORRENT_LIMIT: usize = 10;
const LIBRARY_LIMIT: usize = 50;

/// Which library a message talks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Media {
    Movie,
    Series,
}

impl Media {
    fn noun(self) -> &'static str {
        match self {
            Self::Movie => "电影",
            Self::Series => "电视剧",
        }
    }

    fn queue_label(self) -> &'static str {
        match self {
            Self::Movie => "电影",
            Self::Series => "剧集",
        }
    }

    fn id_label(self) -> &'static str {
        match self {
            Self::Movie => "TMDB ID",
            Self::Series => "TVDB ID",
        }
    }

    fn service(self) -> &'static str {
        match self {
            Self::Movie => "Radarr",
            Self::Series => "Sonarr",
        }
    }
}

pub fn search_results(media: Media, query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("找不到关于 '{query}' 的{}。", media.noun());
    }

    hits.iter()
        .take(SEARCH_LIMIT)
        .map(|hit| {
            let year = hit.year.map_or_else(|| "N/A".to_string(), |y| y.to_string());
            format!(
                "{}: {}, 年份: {}, {}: {}",
                media.noun(),
                hit.title,
                year,
                media.id_label(),
                hit.external_id
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn movie_added(outcome: &AddOutcome) -> String {
    match outcome {
        AddOutcome::Added { title } => format!("成功将电影 '{title}' 添加到Radarr，并开始搜索下载。"),
        AddOutcome::AlreadyExists { title } => format!("电影 '{title}' 已存在于Radarr中。"),
    }
}

pub fn series_added(outcome: &AddOutcome, seasons: &SeasonSelection) -> String {
    match outcome {
        AddOutcome::Added { title } => match seasons {
            SeasonSelection::All => {
                format!("成功将电视剧 '{title}' 的全部季添加到Sonarr，并开始搜索下载。")
            }
            SeasonSelection::Only(_) => {
                format!("成功将电视剧 '{title}' 的第 {seasons} 季添加到Sonarr，并开始搜索下载。")
            }
        },
        AddOutcome::AlreadyExists { title } => format!("电视剧 '{title}' 已存在于Sonarr中。"),
    }
}

pub fn queue(media: Media, items: &[QueueItem]) -> String {
    if items.is_empty() {
        return format!("{}下载队列当前为空。", media.service());
    }

    let lines: Vec<String> = items
        .iter()
        .take(QUEUE_LIMIT)
        .map(|item| {
            let mut line = format!(
                "{}: {}, 状态: {}, 剩余时间: {}",
                media.queue_label(),
                item.title,
                item.state,
                item.eta.as_deref().unwrap_or("N/A")
            );
            if let Some(progress) = item.progress {
                line.push_str(&format!(", 进度: {progress:.1}%"));
            }
            line
        })
        .collect();

    format!("当前{}下载队列:\n{}", media.service(), lines.join("\n"))
}

pub fn torrents(items: &[TorrentInfo]) -> String {
    if items.is_empty() {
        return "当前没有活动的种子。".into();
    }

    let lines: Vec<String> = items
        .iter()
        .take(TORRENT_LIMIT)
        .map(|t| format!("种子: {}, 状态: {}, 进度: {:.2}%", t.name, t.state, t.progress * 100.0))
        .collect();

    format!("当前种子列表:\n{}", lines.join("\n"))
}

pub fn library(media: Media, items: &[LibraryItem]) -> String {
    if items.is_empty() {
        return format!("{}{}库当前为空。", media.service(), media.noun());
    }

    let yes_no = |b: bool| if b { "是" } else { "否" };
    let mut out = format!("{}{}库共有 {} 项:\n", media.service(), media.noun(), items.len());
    let lines: Vec<String> = items
        .iter()
        .take(LIBRARY_LIMIT)
        .map(|item| {
            format!(
                "{}: {}, ID: {}, 监控: {}, 已下载: {}",
                media.noun(),
                item.title,
                item.id,
                yes_no(item.monitored),
                yes_no(item.downloaded)
            )
        })
        .collect();
    out.push_str(&lines.join("\n"));
    if items.len() > LIBRARY_LIMIT {
        out.push_str(&format!("\n... 另有 {} 项未列出", items.len() - LIBRARY_LIMIT));
    }
    out
}

pub fn deleted(media: Media, id: u64) -> String {
    format!("已从{}中删除ID为 {id} 的{}。", media.service(), media.noun())
}

/// Text for a collaborator failure, phrased per tool.
pub fn failure(action: &str, reason: &str) -> String {
    format!("{action}时发生错误: {reason}")
}
