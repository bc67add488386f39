//! Config schema types (business, backend, rate limit, server, sidecar, replies).
use std::{path::PathBuf, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConciergeConfig {
    pub business: BusinessConfig,
    pub session: SessionConfig,
    pub backend: BackendConfig,
    pub rate_limit: RateLimitConfig,
    pub server: ServerConfig,
    pub sidecar: SidecarConfig,
    pub replies: ReplyTexts,
    pub gating: GatingConfig,
}

/// The business whose messaging channel is automated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BusinessConfig {
    /// Business phone number in international format (e.g. `+972501234567`).
    /// Sent with every backend call so the backend can find the business.
    pub phone: String,
}

/// Chat transport session settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session name; the sidecar keeps its auth tokens under this name.
    pub name: String,
    /// Run the sidecar's browser without a window.
    pub headless: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "concierge".into(),
            headless: true,
        }
    }
}

/// Remote function backend (reply generation + message logging).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://project.supabase.co`.
    pub url: String,
    /// Bearer credential sent with every call.
    pub api_key: Secret<String>,
    pub reply_function: String,
    pub log_function: String,
    /// Total attempts per call, including the first one.
    pub retries: u32,
    pub retry_base_delay_ms: u64,
    pub reply_timeout_secs: u64,
    pub log_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: Secret::new(String::new()),
            reply_function: "get-reply".into(),
            log_function: "bot-message".into(),
            retries: 3,
            retry_base_delay_ms: 1_000,
            reply_timeout_secs: 30,
            log_timeout_secs: 10,
        }
    }
}

impl BackendConfig {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.expose_secret().trim().is_empty()
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    pub fn log_timeout(&self) -> Duration {
        Duration::from_secs(self.log_timeout_secs)
    }
}

/// Per-sender sliding window admission.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_messages: usize,
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Status HTTP server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Exit the process once the transport enters the failed state so a
    /// supervisor can restart it.
    pub exit_on_transport_failure: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 3000,
            exit_on_transport_failure: false,
        }
    }
}

/// WhatsApp Web sidecar process.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SidecarConfig {
    /// WebSocket URL of an already running sidecar. When set, no process is
    /// spawned.
    pub url: Option<String>,
    /// Port the spawned sidecar listens on.
    pub port: u16,
    /// Directory containing the sidecar's `package.json`.
    pub dir: Option<PathBuf>,
    /// Program used to run the sidecar.
    pub command: String,
    pub auto_start: bool,
    pub connect_attempts: u32,
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            url: None,
            port: 3100,
            dir: None,
            command: "node".into(),
            auto_start: true,
            connect_attempts: 10,
        }
    }
}

impl SidecarConfig {
    /// URL the transport connects to.
    pub fn ws_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("ws://127.0.0.1:{}", self.port))
    }

    /// Whether this process owns the sidecar process.
    pub fn spawns_process(&self) -> bool {
        self.auto_start && self.url.is_none()
    }
}

/// Fixed texts sent to customers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplyTexts {
    /// Courtesy notice for throttled senders.
    pub throttled: String,
    /// The backend answered but produced no reply.
    pub unavailable: String,
    /// Every attempt to reach the backend failed.
    pub technical_error: String,
}

impl Default for ReplyTexts {
    fn default() -> Self {
        Self {
            throttled: "אנא המתן רגע לפני שליחת הודעה נוספת.".into(),
            unavailable: "מצטער, אני לא יכול לענות כרגע. נסה שוב מאוחר יותר.".into(),
            technical_error: "מצטער, יש בעיה טכנית. נסה שוב מאוחר יותר.".into(),
        }
    }
}

/// Inbound sender gating.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatingConfig {
    /// Phone numbers allowed to talk to the bot. Empty means everyone.
    pub allowlist: Vec<String>,
}
