pub mod alternatives;
pub mod logs;
pub mod onboard;
pub mod providers;
pub mod run;
pub mod status;

use aria_config::{AppConfig, ConfigError};
use aria_core::error::{Error, Result};

/// Load `~/.aria/config.toml` with environment overrides applied.
pub fn load_config() -> Result<AppConfig> {
    AppConfig::load().map_err(config_error)
}

fn config_error(e: ConfigError) -> Error {
    Error::Config {
        message: e.to_string(),
    }
}

/// First line of `text`, cut to `max` characters.
pub fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max {
        format!("{}…", line.chars().take(max).collect::<String>())
    } else if text.lines().nth(1).is_some() {
        format!("{line} …")
    } else {
        line.to_string()
    }
}
