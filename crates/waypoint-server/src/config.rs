//! Configuration file management for waypoint.
//!
//! Provides a TOML-based config file at `~/.config/waypoint/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use waypoint_core::orchestrator::QuotaPolicy;
use waypoint_store::config::StoreConfig;

use crate::auth::TokenConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
    pub auth: AuthSection,
    #[serde(default)]
    pub providers: ProvidersSection,
    #[serde(default)]
    pub quota: QuotaSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthSection {
    /// Hex-encoded token secret (64 hex chars = 32 bytes).
    pub token_secret: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProvidersSection {
    /// Gemini API key; the `GEMINI_API_KEY` env var overrides.
    #[serde(default)]
    pub gemini_api_key: Option<String>,
    /// OpenRouter API key; the `OPENROUTER_API_KEY` env var overrides.
    #[serde(default)]
    pub openrouter_api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSection {
    #[serde(default = "default_summary_monthly")]
    pub summary_monthly_limit: u32,
    #[serde(default = "default_import_monthly")]
    pub import_monthly_limit: u32,
    #[serde(default = "default_import_daily")]
    pub import_daily_limit: u32,
    /// SHA-256 hex digests of allow-listed email hints.
    #[serde(default)]
    pub vip_sha256: Vec<String>,
}

fn default_summary_monthly() -> u32 {
    1
}
fn default_import_monthly() -> u32 {
    30
}
fn default_import_daily() -> u32 {
    5
}

impl Default for QuotaSection {
    fn default() -> Self {
        Self {
            summary_monthly_limit: default_summary_monthly(),
            import_monthly_limit: default_import_monthly(),
            import_daily_limit: default_import_daily(),
            vip_sha256: Vec::new(),
        }
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the waypoint config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/waypoint` or
/// `~/.config/waypoint`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("waypoint");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("waypoint")
}

/// Return the path to the waypoint config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix (it holds API keys).
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Token secret generation
// -----------------------------------------------------------------------

/// Generate a random token secret: 32 random bytes, hex-encoded (64 chars).
pub fn generate_token_secret() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct WaypointConfig {
    pub store_config: StoreConfig,
    pub token_config: TokenConfig,
    pub gemini_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub quota_policy: QuotaPolicy,
    pub vip_sha256: Vec<String>,
}

impl WaypointConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    ///
    /// - DB URL: `cli_db_url` > `WAYPOINT_DATABASE_URL` > file > default
    /// - Token secret: `WAYPOINT_TOKEN_SECRET` > file (hex-decoded) > error
    /// - Provider keys: `GEMINI_API_KEY` / `OPENROUTER_API_KEY` > file > absent
    /// - Quota limits: `WAYPOINT_*_LIMIT` env vars > file > stock defaults
    pub fn resolve(cli_db_url: Option<&str>) -> Result<Self> {
        let file_config = load_config().ok();

        let db_url = if let Some(url) = cli_db_url {
            url.to_string()
        } else if let Ok(url) = std::env::var("WAYPOINT_DATABASE_URL") {
            url
        } else if let Some(ref cfg) = file_config {
            cfg.database.url.clone()
        } else {
            StoreConfig::DEFAULT_URL.to_string()
        };
        let store_config = StoreConfig::new(db_url);

        let token_config = if let Ok(secret_hex) = std::env::var("WAYPOINT_TOKEN_SECRET") {
            let bytes = hex::decode(&secret_hex)
                .context("WAYPOINT_TOKEN_SECRET env var is not valid hex")?;
            TokenConfig::new(bytes)
        } else if let Some(ref cfg) = file_config {
            let bytes = hex::decode(&cfg.auth.token_secret)
                .context("invalid hex in config file token_secret")?;
            TokenConfig::new(bytes)
        } else {
            bail!(
                "token secret not found; set WAYPOINT_TOKEN_SECRET or run `waypoint init` to \
                 create a config file"
            );
        };

        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok().or_else(|| {
            file_config
                .as_ref()
                .and_then(|c| c.providers.gemini_api_key.clone())
        });
        let openrouter_api_key = std::env::var("OPENROUTER_API_KEY").ok().or_else(|| {
            file_config
                .as_ref()
                .and_then(|c| c.providers.openrouter_api_key.clone())
        });

        let quota_section = file_config
            .as_ref()
            .map(|c| c.quota.clone())
            .unwrap_or_default();
        let summary_monthly = env_limit("WAYPOINT_SUMMARY_MONTHLY_LIMIT")
            .unwrap_or(quota_section.summary_monthly_limit);
        let import_monthly =
            env_limit("WAYPOINT_IMPORT_MONTHLY_LIMIT").unwrap_or(quota_section.import_monthly_limit);
        let import_daily =
            env_limit("WAYPOINT_IMPORT_DAILY_LIMIT").unwrap_or(quota_section.import_daily_limit);

        Ok(Self {
            store_config,
            token_config,
            gemini_api_key,
            openrouter_api_key,
            quota_policy: QuotaPolicy::new(summary_monthly, import_monthly, import_daily),
            vip_sha256: quota_section.vip_sha256,
        })
    }
}

fn env_limit(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
