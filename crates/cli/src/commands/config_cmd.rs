//! `toolgate config` — show or initialize the configuration.

use toolgate_config::AppConfig;

const REDACTED: &str = "***";

pub fn run(init: bool, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_dir().join("config.toml");

    if init {
        if path.exists() && !force {
            return Err(format!("{} already exists (use --force to overwrite)", path.display()).into());
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, AppConfig::default_toml())?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("# {}", path.display());
    println!("{}", redacted_toml(&config)?);
    Ok(())
}

/// The config as TOML with every `api_key` masked.
pub fn redacted_toml(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut value = toml::Value::try_from(config)?;
    mask_keys(&mut value);
    toml::to_string_pretty(&value)
}

fn mask_keys(value: &mut toml::Value) {
    if let toml::Value::Table(table) = value {
        for (key, v) in table.iter_mut() {
            if key == "api_key" {
                *v = toml::Value::String(REDACTED.into());
            } else {
                mask_keys(v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains(".toolgate"));
    }

    #[test]
    fn secrets_are_masked() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-or-v1-secret".into());
        config.providers.entry("anthropic".into()).or_default().api_key = Some("sk-ant-secret".into());

        let text = redacted_toml(&config).unwrap();
        assert!(!text.contains("secret"));
        assert!(text.contains(r#"api_key = "***""#));
        assert!(text.contains("default_provider"));
    }
}
