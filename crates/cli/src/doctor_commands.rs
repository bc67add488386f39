//! `concierge doctor`: config validation and environment audit.
//!
//! Prints a report with `[ok]`, `[warn]`, `[fail]` or `[info]` per item and
//! exits non-zero when any check fails.

use std::{path::Path, time::Duration};

use {
    anyhow::Result,
    concierge_config::{ConciergeConfig, Severity, discover_and_load, validate},
    concierge_whatsapp::find_sidecar_dir,
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Info => CYAN,
        }
    }
}

struct CheckItem {
    status: Status,
    message: String,
}

struct Section {
    title: String,
    items: Vec<CheckItem>,
}

impl Section {
    fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push(CheckItem {
            status,
            message: message.into(),
        });
    }

    fn count(&self, status: Status) -> usize {
        self.items.iter().filter(|i| i.status == status).count()
    }
}

fn print_report(sections: &[Section]) -> (usize, usize) {
    let mut errors = 0usize;
    let mut warnings = 0usize;

    for section in sections {
        eprintln!("{BOLD}{}{RESET}", section.title);
        for item in &section.items {
            let color = item.status.color();
            let label = item.status.label();
            eprintln!("  [{color}{label}{RESET}]  {}", item.message);
        }
        errors += section.count(Status::Fail);
        warnings += section.count(Status::Warn);
        eprintln!();
    }

    (errors, warnings)
}

// ── Entry point ─────────────────────────────────────────────────────────────

pub async fn handle_doctor(config_path: Option<&Path>) -> Result<()> {
    eprintln!("{BOLD}concierge doctor{RESET}");
    eprintln!("{BOLD}================{RESET}\n");

    let sections = match discover_and_load(config_path) {
        Ok((config, path)) => {
            let label = path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "defaults + environment".into());
            let mut sections = vec![check_config(&config, &label)];
            sections.push(check_sidecar(&config));
            sections.push(check_backend(&config).await);
            sections
        },
        Err(e) => {
            let mut section = Section::new("Config");
            section.push(Status::Fail, format!("{e}"));
            vec![section]
        },
    };

    let (errors, warnings) = print_report(&sections);
    eprintln!("{BOLD}Summary:{RESET} {errors} error(s), {warnings} warning(s)");

    if errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

// ── 1. Config validation ────────────────────────────────────────────────────

fn check_config(config: &ConciergeConfig, label: &str) -> Section {
    let mut section = Section::new(format!("Config ({label})"));
    let result = validate(config);

    if result.diagnostics.is_empty() {
        section.push(Status::Ok, "all settings present and valid");
    }
    for d in &result.diagnostics {
        let status = match d.severity {
            Severity::Error => Status::Fail,
            Severity::Warning => Status::Warn,
        };
        let hint = d
            .env_var
            .map(|var| format!(" (set {var})"))
            .unwrap_or_default();
        section.push(status, format!("{}: {}{hint}", d.path, d.message));
    }

    section.push(
        Status::Info,
        format!(
            "rate limit: {} message(s) per {}s per sender",
            config.rate_limit.max_messages, config.rate_limit.window_secs
        ),
    );
    if config.gating.allowlist.is_empty() {
        section.push(Status::Info, "allowlist: everyone may message the bot");
    } else {
        section.push(
            Status::Info,
            format!("allowlist: {} number(s)", config.gating.allowlist.len()),
        );
    }
    section
}

// ── 2. Sidecar ──────────────────────────────────────────────────────────────

fn check_sidecar(config: &ConciergeConfig) -> Section {
    let mut section = Section::new("WhatsApp sidecar");
    let sidecar = &config.sidecar;

    if !sidecar.spawns_process() {
        section.push(
            Status::Info,
            format!("connecting to external sidecar at {}", sidecar.ws_url()),
        );
        return section;
    }

    match find_sidecar_dir(sidecar.dir.as_deref()) {
        Ok(dir) => {
            section.push(Status::Ok, format!("found at {}", dir.display()));
            if dir.join("node_modules").exists() {
                section.push(Status::Ok, "dependencies installed");
            } else {
                section.push(
                    Status::Warn,
                    "node_modules missing, `npm install` will run on first start",
                );
            }
            if !dir.join("dist/index.js").exists() {
                section.push(Status::Fail, "dist/index.js missing, build the sidecar first");
            }
        },
        Err(e) => section.push(Status::Fail, format!("{e:#}")),
    }

    if which(&sidecar.command) {
        section.push(Status::Ok, format!("'{}' is on PATH", sidecar.command));
    } else {
        section.push(Status::Fail, format!("'{}' not found on PATH", sidecar.command));
    }
    section
}

/// Whether `program` resolves to a file, directly or through `PATH`.
fn which(program: &str) -> bool {
    let path = Path::new(program);
    if path.components().count() > 1 {
        return path.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

// ── 3. Backend ──────────────────────────────────────────────────────────────

async fn check_backend(config: &ConciergeConfig) -> Section {
    let mut section = Section::new("Backend functions");
    let url = config.backend.url.trim();
    if url.is_empty() {
        section.push(Status::Fail, "no backend URL configured");
        return section;
    }

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            section.push(Status::Fail, format!("HTTP client: {e}"));
            return section;
        },
    };

    // Any HTTP answer means the host is reachable; function calls need auth.
    match client.get(url).send().await {
        Ok(resp) => section.push(
            Status::Ok,
            format!("{url} reachable (HTTP {})", resp.status().as_u16()),
        ),
        Err(e) => section.push(Status::Warn, format!("{url} unreachable: {e}")),
    }
    section.push(
        Status::Info,
        format!(
            "reply function '{}', log function '{}'",
            config.backend.reply_function, config.backend.log_function
        ),
    );
    section
}
