//! `aria status`: Configuration summary.

use aria_config::AppConfig;

use super::load_config;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    println!("Aria Status");
    println!("===========");
    println!("  Config dir:       {}", AppConfig::config_dir().display());
    println!("  Temperature:      {}", config.default_temperature);
    println!("  Max tokens:       {}", config.default_max_tokens);
    println!("  Max iterations:   {}", config.agent.max_iterations);
    println!("  JSON retries:     {}", config.agent.max_json_retries);
    println!("  Default provider: {}", config.agent.default_provider);
    println!(
        "  Providers:        {} enabled of {}",
        config.enabled_providers().len(),
        config.providers.len()
    );
    println!(
        "  Emergency:        {}",
        if config.emergency.enabled { "enabled" } else { "disabled" }
    );
    println!(
        "  Memory:           {:?} at {}",
        config.memory.backend,
        config.memory.data_dir.display()
    );
    println!(
        "  Shell allowlist:  {}",
        if config.tools.shell_allowlist.is_empty() {
            "(all commands)".to_string()
        } else {
            config.tools.shell_allowlist.join(", ")
        }
    );

    let config_path = AppConfig::config_dir().join("config.toml");
    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file: run `aria onboard` first");
    }

    Ok(())
}
