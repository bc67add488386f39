//! Configuration validation.
//!
//! Collects every problem at once so start-up can report all missing or
//! inconsistent settings in a single pass.

use crate::schema::ConciergeConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "missing", "invalid", "suspicious".
    pub category: &'static str,
    /// Dotted path, e.g. "backend.url".
    pub path: &'static str,
    /// Environment variable that sets this value, if any.
    pub env_var: Option<&'static str>,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}] {}: {}", self.severity, self.category, self.path, self.message)?;
        if let Some(var) = self.env_var {
            write!(f, " (set {var})")?;
        }
        Ok(())
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &'static str,
        path: &'static str,
        env_var: Option<&'static str>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            severity,
            category,
            path,
            env_var,
            message: message.into(),
        });
    }
}

/// Validate a loaded configuration.
pub fn validate(config: &ConciergeConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    let phone = config.business.phone.trim();
    if phone.is_empty() {
        result.push(
            Severity::Error,
            "missing",
            "business.phone",
            Some("BUSINESS_PHONE"),
            "business phone number is required, e.g. +972525587933",
        );
    } else if !phone
        .trim_start_matches('+')
        .chars()
        .all(|c| c.is_ascii_digit())
    {
        result.push(
            Severity::Warning,
            "suspicious",
            "business.phone",
            Some("BUSINESS_PHONE"),
            format!("'{phone}' does not look like an international phone number"),
        );
    }

    let url = config.backend.url.trim();
    if url.is_empty() {
        result.push(
            Severity::Error,
            "missing",
            "backend.url",
            Some("SUPABASE_URL"),
            "backend base URL is required, e.g. https://your-project.supabase.co",
        );
    } else if !(url.starts_with("http://") || url.starts_with("https://")) {
        result.push(
            Severity::Error,
            "invalid",
            "backend.url",
            Some("SUPABASE_URL"),
            format!("'{url}' must start with http:// or https://"),
        );
    }

    if !config.backend.has_api_key() {
        result.push(
            Severity::Error,
            "missing",
            "backend.api_key",
            Some("SUPABASE_ANON_KEY"),
            "backend credential is required",
        );
    }

    if config.backend.retries == 0 {
        result.push(
            Severity::Error,
            "invalid",
            "backend.retries",
            Some("CONCIERGE_RETRIES"),
            "at least one attempt is required",
        );
    }
    if config.backend.reply_timeout_secs == 0 || config.backend.log_timeout_secs == 0 {
        result.push(
            Severity::Error,
            "invalid",
            "backend.*_timeout_secs",
            None,
            "per-attempt timeouts must be greater than zero",
        );
    }
    if config.backend.retry_base_delay_ms == 0 {
        result.push(
            Severity::Warning,
            "suspicious",
            "backend.retry_base_delay_ms",
            Some("CONCIERGE_RETRY_BASE_DELAY_MS"),
            "retries will be attempted without any backoff",
        );
    }

    if config.rate_limit.max_messages == 0 {
        result.push(
            Severity::Warning,
            "suspicious",
            "rate_limit.max_messages",
            Some("CONCIERGE_RATE_LIMIT_MAX"),
            "every customer message will be throttled",
        );
    }
    if config.rate_limit.window_secs == 0 {
        result.push(
            Severity::Error,
            "invalid",
            "rate_limit.window_secs",
            Some("CONCIERGE_RATE_LIMIT_WINDOW_SECS"),
            "rate limit window must be greater than zero",
        );
    }

    if config.session.name.trim().is_empty() {
        result.push(
            Severity::Error,
            "missing",
            "session.name",
            Some("SESSION_NAME"),
            "session name must not be empty",
        );
    }

    if config.sidecar.spawns_process() && config.sidecar.command.trim().is_empty() {
        result.push(
            Severity::Error,
            "missing",
            "sidecar.command",
            None,
            "a sidecar command is required when auto_start is enabled",
        );
    }

    let replies = &config.replies;
    for (path, text) in [
        ("replies.throttled", &replies.throttled),
        ("replies.unavailable", &replies.unavailable),
        ("replies.technical_error", &replies.technical_error),
    ] {
        if text.trim().is_empty() {
            result.push(
                Severity::Error,
                "missing",
                path,
                None,
                "customer-facing text must not be empty",
            );
        }
    }

    result
}
