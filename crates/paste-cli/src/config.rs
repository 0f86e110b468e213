use std::path::{Path, PathBuf};

use paste_core::{PasteConfig, StorageKind};
use secrecy::SecretString;

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_dir()?.join("config.toml"))
}

/// Resolve the configuration the way every command sees it: file first,
/// then `PASTE_*` environment variables on top.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<PasteConfig> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    let mut config = if path.exists() {
        read_config(&path)?
    } else {
        tracing::debug!(path = %path.display(), "No config file; using defaults");
        PasteConfig::default()
    };
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

pub fn read_config(path: &Path) -> anyhow::Result<PasteConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
}

/// Apply `PASTE_*` overrides. `lookup` returns a variable's value, if set.
pub fn apply_env_overrides<F>(config: &mut PasteConfig, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

    let storage = &mut config.storage;
    if let Some(value) = var("PASTE_STORAGE") {
        storage.kind = parse_kind(&value)?;
    }
    if let Some(value) = var("PASTE_STORAGE_PATH") {
        storage.path = PathBuf::from(value);
    }
    if let Some(value) = var("PASTE_DB_HOST") {
        storage.host = value;
    }
    if let Some(value) = var("PASTE_DB_PORT") {
        storage.port = parse_number("PASTE_DB_PORT", &value)?;
    }
    if let Some(value) = var("PASTE_DB_USER") {
        storage.user = value;
    }
    if let Some(value) = var("PASTE_DB_PASSWORD") {
        storage.password = Some(SecretString::from(value));
    }
    if let Some(value) = var("PASTE_DB_DATABASE") {
        storage.database = value;
    }
    if let Some(value) = var("PASTE_DOCUMENT_EXPIRE_MS") {
        storage.document_expire_ms = parse_number("PASTE_DOCUMENT_EXPIRE_MS", &value)?;
    }

    let cache = &mut config.storage.cache;
    if let Some(value) = var("PASTE_CACHE_ENABLED") {
        cache.enabled = parse_flag("PASTE_CACHE_ENABLED", &value)?;
    }
    if let Some(value) = var("PASTE_CACHE_HOST") {
        cache.host = value;
    }
    if let Some(value) = var("PASTE_CACHE_PORT") {
        cache.port = parse_number("PASTE_CACHE_PORT", &value)?;
    }
    if let Some(value) = var("PASTE_CACHE_PASSWORD") {
        cache.password = Some(SecretString::from(value));
    }
    if let Some(value) = var("PASTE_CACHE_TTL") {
        cache.ttl_secs = parse_number("PASTE_CACHE_TTL", &value)?;
    }

    let encryption = &mut config.encryption;
    if let Some(value) = var("PASTE_ENCRYPTION") {
        encryption.enabled = parse_flag("PASTE_ENCRYPTION", &value)?;
    }
    if let Some(value) = var("PASTE_ENCRYPTION_KEY") {
        encryption.key = Some(SecretString::from(value));
    }
    if let Some(value) = var("PASTE_ENCRYPTION_PASSPHRASE") {
        encryption.passphrase = Some(SecretString::from(value));
    }

    let keys = &mut config.keys;
    if let Some(value) = var("PASTE_KEY_CHARS") {
        keys.key_chars = value;
    }
    if let Some(value) = var("PASTE_KEY_LENGTH") {
        keys.key_length = parse_number("PASTE_KEY_LENGTH", &value)?;
    }
    if let Some(value) = var("PASTE_KEY_UPPERCASE") {
        keys.with_uppercase = parse_flag("PASTE_KEY_UPPERCASE", &value)?;
    }

    if let Some(value) = var("PASTE_DOCUMENT_MAX_LENGTH") {
        config.document.max_length = parse_number("PASTE_DOCUMENT_MAX_LENGTH", &value)?;
    }

    Ok(())
}

pub fn parse_kind(value: &str) -> anyhow::Result<StorageKind> {
    value.parse().map_err(|e| anyhow::anyhow!("{}", e))
}

fn parse_number<T>(name: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid {} value '{}': {}", name, value, e))
}

fn parse_flag(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "Invalid {} value '{}': expected true or false",
            name,
            value
        )),
    }
}

pub fn xdg_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("paste"));
        }
    }
    Ok(home_dir()?.join(".config").join("paste"))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME is not set; cannot resolve default paths"))?;
    Ok(PathBuf::from(home))
}
