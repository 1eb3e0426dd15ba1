use std::path::{Path, PathBuf};

use super::types::AppConfig;

/// Get the default procpool data directory: ~/.procpool
pub fn get_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".procpool"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.procpool/config.toml (highest)
    let user_config = get_data_dir()?.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg = if user_config.exists() {
        load_from(&user_config)?
    } else if local_config.exists() {
        load_from(local_config)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

pub fn load_from(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))
}

/// Environment variable overrides (Priority 0: highest)
fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("PROCPOOL_WORKERS") {
        if !v.trim().is_empty() {
            let n: usize = v
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("PROCPOOL_WORKERS is not a number: {v}"))?;
            cfg.pool.workers = Some(n);
        }
    }
    if let Some(v) = lookup("PROCPOOL_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.logging.level = v;
        }
    }
    Ok(())
}
