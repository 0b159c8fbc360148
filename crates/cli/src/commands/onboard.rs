//! `aria onboard`: First-time setup.

use aria_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Aria: First-Time Setup");
    println!("=======================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    let config = AppConfig::load_from(&config_path)
        .map_err(|e| format!("Failed to read back config: {e}"))?;
    let data_dir = &config.memory.data_dir;
    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir)?;
        println!("✅ Created data directory: {}", data_dir.display());
    }

    println!("\n📝 Next steps:");
    println!("   1. Export a key for at least one provider:");
    for entry in config.enabled_providers() {
        if let Some(env) = &entry.api_key_env {
            println!("      {env:<20} {}", entry.name);
        }
    }
    println!("   2. Run: aria run");
    println!("\n🎉 Setup complete!\n");

    Ok(())
}
