//! `mediaclaw onboard` - First-time setup.

use std::path::Path;

use anyhow::Context;
use mediaclaw_config::AppConfig;

pub fn run(path: Option<&Path>) -> anyhow::Result<()> {
    let config_path = super::config_path(path);

    println!("🎬 MediaClaw - First-Time Setup");
    println!("===============================\n");

    if write_default(&config_path)? {
        println!("✅ Created config at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Set the Radarr and Sonarr API keys and the qBittorrent login");
        println!("   2. Pick a model backend (default: ollama with qwen2.5:7b)");
        println!("   3. Run: mediaclaw doctor");
        println!("   4. Run: mediaclaw chat\n");
    } else {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete it and re-run onboard.\n");
    }

    Ok(())
}

/// Write the default config unless a file is already there.
/// Returns whether a file was written.
fn write_default(path: &Path) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}
