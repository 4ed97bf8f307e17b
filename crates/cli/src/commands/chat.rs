//! `mediaclaw chat` - Interactive or single-message chat mode.

use std::io::Write;

use anyhow::Context;
use mediaclaw_agent::{Orchestrator, StreamEvent};
use mediaclaw_config::AppConfig;
use mediaclaw_core::SessionId;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(config: AppConfig, message: Option<String>, session: String) -> anyhow::Result<()> {
    if !config.provider_is_local() && !config.has_api_key() {
        anyhow::bail!(
            "No API key for provider '{}'. Set MEDIACLAW_API_KEY or add api_key to {}",
            config.default_provider,
            AppConfig::config_dir().join("config.toml").display()
        );
    }

    let agent = mediaclaw_agent::build_orchestrator(&config).context("Failed to build the agent")?;
    let session_id = SessionId::from(session.as_str());

    if let Some(msg) = message {
        return send(&agent, &session_id, &msg).await;
    }

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        MediaClaw - Interactive Mode          ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Session:   {session_id}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  '/reset' clears the session, 'exit' or Ctrl+C quits.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "/reset" => {
                agent.sessions().reset(&session_id).await;
                println!("  Session cleared.\n");
            }
            _ => {
                if let Err(e) = send(&agent, &session_id, line).await {
                    eprintln!("  [Error] {e:#}");
                }
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

/// Run one cycle and print its events as they arrive.
async fn send(agent: &Orchestrator, session_id: &SessionId, message: &str) -> anyhow::Result<()> {
    let mut rx = agent.run_stream(session_id.clone(), message).await?;
    let mut in_tool_call = false;

    while let Some(event) = rx.recv().await {
        // Argument fragments of one call are printed on a single line.
        let is_call = matches!(event, StreamEvent::ToolCall { .. });
        if in_tool_call && !is_call {
            println!();
        }
        if let Some(text) = render(&event, in_tool_call) {
            print!("{text}");
            std::io::stdout().flush()?;
        }
        in_tool_call = is_call;
    }
    Ok(())
}

/// Terminal rendering of one stream event. `continuing` is set when the
/// previous event was a fragment of the same tool call.
fn render(event: &StreamEvent, continuing: bool) -> Option<String> {
    match event {
        StreamEvent::Status { message } => Some(format!("  · {message}\n")),
        StreamEvent::ThinkingStep { data } => Some(format!("  💭 {data}\n")),
        StreamEvent::ToolCall {
            tool_name,
            tool_input_chunk,
        } => Some(if continuing {
            tool_input_chunk.clone()
        } else {
            format!("  🔧 {tool_name} {tool_input_chunk}")
        }),
        StreamEvent::ToolResult { observation, .. } => {
            let indented: Vec<String> = observation.lines().map(|l| format!("     {l}")).collect();
            Some(format!("  📋\n{}\n", indented.join("\n")))
        }
        StreamEvent::FinalOutput { data } => {
            let lines: Vec<String> = data.output.lines().map(|l| format!("  Assistant > {l}")).collect();
            Some(format!("\n{}\n", lines.join("\n")))
        }
        StreamEvent::Error { message } => Some(format!("  ⚠️  {message}\n")),
        StreamEvent::StreamEnd => None,
    }
}
