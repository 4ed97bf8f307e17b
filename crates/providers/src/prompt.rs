//! System prompt for the media assistant.

use mediaclaw_core::ToolDescriptor;

const ROLE: &str = "\
You are a media management assistant. You help the user find movies and TV \
series, add them to Radarr (movies) or Sonarr (series) for download, and \
report on download queues, torrents and the media library. Answer in the \
language the user writes in.";

const WORKFLOW: &str = "\
Downloading is a two-step process:
1. When the user asks to download something, call the matching search tool \
(`search_movie` or `search_series`) first. Show the user every result and ask \
which one they mean. Do not call a download tool in this step.
2. Only after the user confirms, call `download_movie` with the TMDB ID or \
`download_series` with the TVDB ID taken from the latest search results.

If a request could be either a movie or a series and the user did not say \
which, call `ask_user_for_clarification` with a short question instead of \
guessing.";

const RULES: &str = "\
Rules:
- `seasons` is either the string \"all\" or a list of season numbers such as \
[1, 2]. Season 0 holds the specials. Only whole seasons can be downloaded, \
never single episodes.
- Search tools take a plain title string as `query`.
- IDs must come from tool results in this conversation. Never invent an ID.
- Report tool results faithfully and completely; do not shorten lists.
- If a tool reports an error, tell the user what went wrong. If the error \
says your arguments were invalid, fix them and call the tool again.";

/// Build the system prompt for the given tool catalog.
pub fn system_prompt(tools: &[ToolDescriptor]) -> String {
    let mut prompt = format!("{ROLE}\n\n{WORKFLOW}\n\n{RULES}\n\nAvailable tools:\n");
    for tool in tools {
        prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_tools_and_workflow() {
        let tools = vec![ToolDescriptor {
            name: "search_movie".into(),
            description: "Search for a movie by title".into(),
            parameters: vec![],
            result_contract: "lines of title, year, TMDB ID".into(),
            terminal: false,
        }];
        let prompt = system_prompt(&tools);
        assert!(prompt.contains("- search_movie: Search for a movie by title"));
        assert!(prompt.contains("ask_user_for_clarification"));
        assert!(prompt.contains("Season 0"));
    }
}
