mod doctor_commands;
mod healthcheck;
mod serve_commands;

use std::path::PathBuf;

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "concierge",
    version,
    about = "WhatsApp auto-reply relay for a business number"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (defaults to ./concierge.toml, then the user config dir).
    #[arg(long, global = true, env = "CONCIERGE_CONFIG")]
    config: Option<PathBuf>,

    /// Address for the status server (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port for the status server (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Run the relay (default when no subcommand is provided).
    Serve,
    /// Validate configuration and check the sidecar and backend.
    Doctor,
    /// Probe a running relay's health endpoint; exits non-zero when it is down.
    Healthcheck {
        #[arg(long, default_value = "http://127.0.0.1:3000/health")]
        url: String,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    match cli.command {
        None | Some(Commands::Serve) => {
            info!(version = env!("CARGO_PKG_VERSION"), "concierge starting");
            serve_commands::handle_serve(serve_commands::ServeArgs {
                config: cli.config,
                bind: cli.bind,
                port: cli.port,
            })
            .await
        },
        Some(Commands::Doctor) => doctor_commands::handle_doctor(cli.config.as_deref()).await,
        Some(Commands::Healthcheck { url }) => healthcheck::handle_healthcheck(&url).await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_is_the_default() {
        let cli = Cli::try_parse_from(["concierge"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
        assert!(!cli.json_logs);
    }

    #[test]
    fn global_overrides_apply_to_subcommands() {
        let cli = Cli::try_parse_from([
            "concierge",
            "serve",
            "--port",
            "8080",
            "--bind",
            "127.0.0.1",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(cli.command, Some(Commands::Serve));
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1"));
        assert!(cli.json_logs);
    }

    #[test]
    fn healthcheck_has_local_default() {
        let cli = Cli::try_parse_from(["concierge", "healthcheck"]).unwrap();
        assert_eq!(
            cli.command,
            Some(Commands::Healthcheck {
                url: "http://127.0.0.1:3000/health".into()
            })
        );
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(Cli::try_parse_from(["concierge", "--port", "http"]).is_err());
    }
}
