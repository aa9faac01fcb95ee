//! Configuration file management for phasekeep.
//!
//! Provides a TOML-based config file at `~/.config/phasekeep/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use phasekeep_db::config::DbConfig;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    #[serde(default)]
    pub engine: EngineSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EngineSection {
    /// Template used by `project create` when `--template` is omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_template: Option<String>,
}

/// Return the phasekeep config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/phasekeep` or
/// `~/.config/phasekeep`, also on macOS.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("phasekeep");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("phasekeep")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    load_config_from(&config_path())
}

fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents).context("failed to parse config file")
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_to(config, &config_path())
}

/// Write `config` to `path` with 0600 permissions on Unix.
fn save_config_to(config: &ConfigFile, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct PhasekeepConfig {
    pub db_config: DbConfig,
    pub default_template: Option<String>,
}

impl PhasekeepConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config file > default.
    ///
    /// - DB URL: `cli_db_url` > `PHASEKEEP_DATABASE_URL` env > `database.url` > `DbConfig::DEFAULT_URL`
    /// - Default template: `PHASEKEEP_DEFAULT_TEMPLATE` env > `engine.default_template`
    pub fn resolve(cli_db_url: Option<&str>) -> Self {
        Self::resolve_with(cli_db_url, load_config().ok())
    }

    fn resolve_with(cli_db_url: Option<&str>, file_config: Option<ConfigFile>) -> Self {
        let db_url = if let Some(url) = cli_db_url {
            url.to_owned()
        } else if let Ok(url) = std::env::var("PHASEKEEP_DATABASE_URL") {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            DbConfig::DEFAULT_URL.to_owned()
        };

        let default_template = std::env::var("PHASEKEEP_DEFAULT_TEMPLATE")
            .ok()
            .or_else(|| file_config.and_then(|cfg| cfg.engine.default_template));

        Self {
            db_config: DbConfig::new(db_url),
            default_template,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        crate::test_util::lock_env()
    }

    fn file_config(url: &str, template: Option<&str>) -> ConfigFile {
        ConfigFile {
            database: DatabaseSection { url: url.to_owned() },
            engine: EngineSection {
                default_template: template.map(str::to_owned),
            },
        }
    }

    #[test]
    fn save_and_load_config_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("phasekeep").join("config.toml");

        let original = file_config("postgresql://testhost:5432/testdb", Some("Standard delivery"));
        save_config_to(&original, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();

        assert_eq!(loaded.database.url, original.database.url);
        assert_eq!(loaded.engine.default_template.as_deref(), Some("Standard delivery"));
    }

    #[test]
    fn engine_section_is_optional() {
        let loaded: ConfigFile =
            toml::from_str("[database]\nurl = \"postgresql://h/db\"\n").unwrap();
        assert_eq!(loaded.engine.default_template, None);
    }

    #[cfg(unix)]
    #[test]
    fn save_config_sets_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        save_config_to(&file_config("postgresql://h/db", None), &path).unwrap();

        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[test]
    fn cli_flag_overrides_everything() {
        let _lock = lock_env();
        unsafe { std::env::set_var("PHASEKEEP_DATABASE_URL", "postgresql://env:5432/envdb") };

        let config = PhasekeepConfig::resolve_with(
            Some("postgresql://cli:5432/clidb"),
            Some(file_config("postgresql://file:5432/filedb", None)),
        );
        assert_eq!(config.db_config.database_url, "postgresql://cli:5432/clidb");

        unsafe { std::env::remove_var("PHASEKEEP_DATABASE_URL") };
    }

    #[test]
    fn env_var_overrides_config_file() {
        let _lock = lock_env();
        unsafe { std::env::set_var("PHASEKEEP_DATABASE_URL", "postgresql://env:5432/envdb") };

        let config =
            PhasekeepConfig::resolve_with(None, Some(file_config("postgresql://file:5432/filedb", None)));
        assert_eq!(config.db_config.database_url, "postgresql://env:5432/envdb");

        unsafe { std::env::remove_var("PHASEKEEP_DATABASE_URL") };
    }

    #[test]
    fn config_file_supplies_url_and_default_template() {
        let _lock = lock_env();
        unsafe { std::env::remove_var("PHASEKEEP_DATABASE_URL") };
        unsafe { std::env::remove_var("PHASEKEEP_DEFAULT_TEMPLATE") };

        let config = PhasekeepConfig::resolve_with(
            None,
            Some(file_config("postgresql://file:5432/filedb", Some("Delivery"))),
        );
        assert_eq!(config.db_config.database_url, "postgresql://file:5432/filedb");
        assert_eq!(config.default_template.as_deref(), Some("Delivery"));
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let _lock = lock_env();
        unsafe { std::env::remove_var("PHASEKEEP_DATABASE_URL") };
        unsafe { std::env::remove_var("PHASEKEEP_DEFAULT_TEMPLATE") };

        let config = PhasekeepConfig::resolve_with(None, None);
        assert_eq!(config.db_config.database_url, DbConfig::DEFAULT_URL);
        assert_eq!(config.default_template, None);
    }

    #[test]
    fn config_path_ends_with_expected_filename() {
        let path = config_path();
        assert!(
            path.ends_with("phasekeep/config.toml"),
            "unexpected config path: {}",
            path.display()
        );
    }
}
