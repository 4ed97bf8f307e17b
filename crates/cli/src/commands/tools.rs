//! `mediaclaw tools` - List the tools the agent can call.

use mediaclaw_config::AppConfig;
use mediaclaw_core::{ParamType, ToolDescriptor};

pub fn run(config: AppConfig) -> anyhow::Result<()> {
    let registry = mediaclaw_tools::registry_from_config(&config.services);

    println!("🧰 {} tools\n", registry.list_descriptors().len());
    for descriptor in registry.list_descriptors() {
        println!("{}", describe(descriptor));
    }
    Ok(())
}

fn describe(tool: &ToolDescriptor) -> String {
    let mut out = format!("  {}", tool.name);
    if tool.terminal {
        out.push_str("  (ends the turn)");
    }
    out.push_str(&format!("\n      {}", tool.description));
    for param in &tool.parameters {
        let kind = match param.kind {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::SeasonSelection => "\"all\" | [season, ...]",
        };
        let optional = if param.required { "" } else { ", optional" };
        out.push_str(&format!("\n      - {} ({kind}{optional}): {}", param.name, param.description));
    }
    out.push_str(&format!("\n      returns: {}\n", tool.result_contract));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaclaw_tools::ToolName;

    #[test]
    fn describes_parameters_and_terminal_tools() {
        let text = describe(&ToolName::DownloadSeries.descriptor());
        assert!(text.contains("download_series"));
        assert!(text.contains("tvdb_id (integer)"));
        assert!(text.contains("seasons"));

        let text = describe(&ToolName::AskUserForClarification.descriptor());
        assert!(text.contains("(ends the turn)"));
    }
}
