//! `aria providers`: Configured providers, priorities and key presence.

use aria_config::{AppConfig, ProviderEntry};
use aria_providers::router::default_base_url;

use super::load_config;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    print!("{}", render(&config));
    Ok(())
}

fn key_status(entry: &ProviderEntry) -> String {
    if !entry.kind.requires_api_key() {
        return "not needed".into();
    }
    match (entry.resolved_api_key(), &entry.api_key_env) {
        (Some(_), _) => "set".into(),
        (None, Some(env)) => format!("missing (${env})"),
        (None, None) => "missing".into(),
    }
}

fn render(config: &AppConfig) -> String {
    let mut out = String::from("Configured Providers\n====================\n\n");

    let mut providers: Vec<&ProviderEntry> = config.providers.iter().collect();
    providers.sort_by_key(|p| p.priority);

    for p in providers {
        let base_url = p.base_url.as_deref().unwrap_or(default_base_url(p.kind));
        out.push_str(&format!(
            "  [{}] {:<28} {:<14} {}\n",
            p.priority,
            p.name,
            p.kind.as_str(),
            if p.enabled { "enabled" } else { "disabled" }
        ));
        out.push_str(&format!("      url:    {base_url}\n"));
        out.push_str(&format!("      key:    {}\n", key_status(p)));
        if !p.models.is_empty() {
            out.push_str(&format!("      models: {}\n", p.models.join(", ")));
        }
    }

    out.push_str(&format!(
        "\n  Emergency fallback: {} ({})\n",
        if config.emergency.enabled { "enabled" } else { "disabled" },
        config.emergency.model
    ));
    out
}
