//! `emberchat doctor` diagnoses system health.

use std::path::Path;
use std::time::Duration;

use emberchat_config::{AppConfig, DEFAULT_SECRET_KEY};
use emberchat_core::Provider;
use emberchat_providers::AnthropicProvider;
use emberchat_store::SqliteStore;

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("🩺 Emberchat Doctor");
    println!("==================\n");

    let mut issues = 0;

    let config = match crate::load_config(config_path) {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ {e}");
            println!("\n  1 issue found. Fix the configuration and re-run.");
            return Ok(());
        }
    };

    if config.auth.secret_key == DEFAULT_SECRET_KEY {
        println!("  ⚠️  SECRET_KEY is the built-in default; tokens are forgeable");
        issues += 1;
    } else {
        println!("  ✅ Signing secret set");
    }

    if super::serve::sqlite_file_path(&config.database.url)
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .is_some_and(|dir| !dir.as_os_str().is_empty() && !dir.exists())
    {
        println!("  ⚠️  Database directory missing; `emberchat serve` will create it");
    }
    match SqliteStore::new(&config.database.url).await {
        Ok(_) => println!("  ✅ Database reachable ({})", config.database.url),
        Err(e) => {
            println!("  ❌ Database: {e}");
            issues += 1;
        }
    }

    issues += check_model(&config).await;

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}

async fn check_model(config: &AppConfig) -> usize {
    let Some(api_key) = config.api_key.as_deref().filter(|_| config.has_api_key()) else {
        println!("  ℹ️  No ANTHROPIC_API_KEY; replies will come from demo mode");
        return 0;
    };

    let provider = match AnthropicProvider::with_timeout(api_key, Duration::from_secs(10)) {
        Ok(p) => match &config.api_url {
            Some(url) => p.with_base_url(url),
            None => p,
        },
        Err(e) => {
            println!("  ❌ Model client: {e}");
            return 1;
        }
    };

    match provider.health_check().await {
        Ok(true) => {
            println!("  ✅ Model provider reachable ({})", config.model);
            0
        }
        Ok(false) => {
            println!("  ⚠️  Model provider answered but reported a problem");
            1
        }
        Err(e) => {
            println!("  ❌ Model provider: {e}");
            1
        }
    }
}
