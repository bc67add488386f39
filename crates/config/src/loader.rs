use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use {
    secrecy::Secret,
    tracing::{debug, info},
};

use crate::{
    error::{Context, Error, Result},
    schema::ConciergeConfig,
};

/// Standard config file name.
const CONFIG_FILENAME: &str = "concierge.toml";

/// Load config from a TOML file.
pub fn load_config(path: &Path) -> Result<ConciergeConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(toml::from_str(&raw)?)
}

/// Load the config file (if any) and apply environment overrides.
///
/// Search order when `explicit` is `None`:
/// 1. `./concierge.toml`
/// 2. `<user config dir>/concierge.toml`
///
/// Without a file, defaults are used and the environment supplies the rest.
/// Returns the config together with the file it was read from.
pub fn discover_and_load(explicit: Option<&Path>) -> Result<(ConciergeConfig, Option<PathBuf>)> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => find_config_file(),
    };

    let mut config = match &path {
        Some(p) => {
            info!(path = %p.display(), "loading config file");
            load_config(p)?
        },
        None => {
            debug!("no config file found, using defaults and environment");
            ConciergeConfig::default()
        },
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok((config, path))
}

/// Returns the user-global config directory.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "concierge").map(|d| d.config_dir().to_path_buf())
}

fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }
    config_dir()
        .map(|dir| dir.join(CONFIG_FILENAME))
        .filter(|p| p.exists())
}

/// Override config values from environment variables.
///
/// `lookup` resolves a variable name; empty values are treated as unset.
/// The separate lookup keeps this testable without touching the process
/// environment.
pub fn apply_env_overrides(
    config: &mut ConciergeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("BUSINESS_PHONE") {
        config.business.phone = v.trim().to_string();
    }
    if let Some(v) = get("SESSION_NAME") {
        config.session.name = v;
    }
    if let Some(v) = get("HEADLESS") {
        // Only an explicit "false" turns headless mode off.
        config.session.headless = !v.trim().eq_ignore_ascii_case("false");
    }
    if let Some(v) = get("SUPABASE_URL") {
        config.backend.url = v.trim().trim_end_matches('/').to_string();
    }
    if let Some(v) = get("SUPABASE_ANON_KEY") {
        config.backend.api_key = Secret::new(v.trim().to_string());
    }
    if let Some(v) = get("PORT") {
        config.server.port = parse_var("PORT", &v)?;
    }
    if let Some(v) = get("CONCIERGE_BIND") {
        config.server.bind = v;
    }
    if let Some(v) = get("CONCIERGE_RETRIES") {
        config.backend.retries = parse_var("CONCIERGE_RETRIES", &v)?;
    }
    if let Some(v) = get("CONCIERGE_RETRY_BASE_DELAY_MS") {
        config.backend.retry_base_delay_ms = parse_var("CONCIERGE_RETRY_BASE_DELAY_MS", &v)?;
    }
    if let Some(v) = get("CONCIERGE_REPLY_TIMEOUT_SECS") {
        config.backend.reply_timeout_secs = parse_var("CONCIERGE_REPLY_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = get("CONCIERGE_LOG_TIMEOUT_SECS") {
        config.backend.log_timeout_secs = parse_var("CONCIERGE_LOG_TIMEOUT_SECS", &v)?;
    }
    if let Some(v) = get("CONCIERGE_RATE_LIMIT_MAX") {
        config.rate_limit.max_messages = parse_var("CONCIERGE_RATE_LIMIT_MAX", &v)?;
    }
    if let Some(v) = get("CONCIERGE_RATE_LIMIT_WINDOW_SECS") {
        config.rate_limit.window_secs = parse_var("CONCIERGE_RATE_LIMIT_WINDOW_SECS", &v)?;
    }
    if let Some(v) = get("CONCIERGE_SIDECAR_URL") {
        config.sidecar.url = Some(v);
    }
    if let Some(v) = get("CONCIERGE_SIDECAR_PORT") {
        config.sidecar.port = parse_var("CONCIERGE_SIDECAR_PORT", &v)?;
    }
    if let Some(v) = get("CONCIERGE_SIDECAR_DIR") {
        config.sidecar.dir = Some(PathBuf::from(v));
    }
    if let Some(v) = get("CONCIERGE_ALLOWLIST") {
        config.gating.allowlist = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(v) = get("CONCIERGE_EXIT_ON_FAILURE") {
        config.server.exit_on_transport_failure = parse_bool("CONCIERGE_EXIT_ON_FAILURE", &v)?;
    }

    Ok(())
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| Error::InvalidEnv {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidEnv {
            var,
            value: value.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}
