//! `mediaclaw doctor` - Diagnose config and connectivity.

use mediaclaw_config::AppConfig;
use mediaclaw_providers::router;
use mediaclaw_tools::ToolRegistry;

/// Outcome of one connectivity probe.
#[derive(Debug)]
struct Check {
    name: String,
    result: Result<(), String>,
}

pub async fn run(config: anyhow::Result<AppConfig>) -> anyhow::Result<()> {
    println!("🩺 MediaClaw Doctor - System Diagnostics");
    println!("========================================\n");

    let config = match config {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e:#}");
            println!("\n  Fix the config (or run `mediaclaw onboard`) and try again.");
            return Ok(());
        }
    };

    let mut issues = 0;
    if !config.provider_is_local() && !config.has_api_key() {
        println!("  ⚠️  No API key for provider '{}'", config.default_provider);
        issues += 1;
    }

    let mut checks = vec![check_model_backend(&config).await];
    let registry = mediaclaw_tools::registry_from_config(&config.services);
    checks.extend(check_services(&registry).await);

    for check in &checks {
        match &check.result {
            Ok(()) => println!("  ✅ {} reachable", check.name),
            Err(reason) => {
                println!("  ❌ {}: {reason}", check.name);
                issues += 1;
            }
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}

async fn check_model_backend(config: &AppConfig) -> Check {
    let name = format!("Model backend '{}'", config.default_provider);
    let result = match router::build_from_config(config).default_provider() {
        None => Err("provider is not configured".to_string()),
        Some(provider) => match provider.health_check().await {
            Ok(true) => Ok(()),
            Ok(false) => Err("health check failed".to_string()),
            Err(e) => Err(e.to_string()),
        },
    };
    Check { name, result }
}

async fn check_services(registry: &ToolRegistry) -> Vec<Check> {
    let (movies, series, torrents) = tokio::join!(
        registry.movies().health(),
        registry.series().health(),
        registry.torrents().health(),
    );

    [
        (registry.movies().name(), movies),
        (registry.series().name(), series),
        (registry.torrents().name(), torrents),
    ]
    .into_iter()
    .map(|(name, result)| Check {
        name: name.to_string(),
        result: result.map_err(|e| e.to_string()),
    })
    .collect()
}
