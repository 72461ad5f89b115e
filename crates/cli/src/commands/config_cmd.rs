//! `emberchat config` prints configuration.

use std::path::Path;

use emberchat_config::AppConfig;

const REDACTED: &str = "***";

/// Print `config`, loaded from `path`, with secrets masked.
pub fn show(config: &AppConfig, path: &Path) -> anyhow::Result<()> {
    println!("{}", render(config, path)?);
    Ok(())
}

fn render(config: &AppConfig, path: &Path) -> anyhow::Result<String> {
    let toml_str = toml::to_string_pretty(&redacted(config))?;
    Ok(format!("# {}\n{toml_str}", path.display()))
}

pub fn print_default() {
    println!("{}", AppConfig::default_toml());
}

/// A copy with credentials masked, safe to print.
fn redacted(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    if config.api_key.is_some() {
        config.api_key = Some(REDACTED.into());
    }
    config.auth.secret_key = REDACTED.into();
    config
}
