//! Spawning and stopping the venom sidecar process.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    anyhow::{Context, Result, bail},
    concierge_config::{SessionConfig, SidecarConfig},
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        process::{Child, Command},
    },
    tracing::{debug, error, info, warn},
};

/// Grace period between SIGTERM and kill.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Sidecar entry point, relative to its directory.
const ENTRY_POINT: &str = "dist/index.js";

/// Handle to a running sidecar process.
pub struct SidecarProcess {
    child: Child,
    port: u16,
}

impl SidecarProcess {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the sidecar to close its browser session and exit.
    pub async fn stop(&mut self) -> Result<()> {
        info!("stopping WhatsApp sidecar process");

        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };

            if let Some(pid) = self.child.id()
                && let Ok(pid) = i32::try_from(pid)
            {
                let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => info!(?status, "WhatsApp sidecar process exited"),
            Ok(Err(e)) => warn!(error = %e, "error waiting for sidecar process"),
            Err(_) => {
                warn!("sidecar process did not exit in time, killing");
                self.child
                    .kill()
                    .await
                    .context("failed to kill sidecar process")?;
            },
        }
        Ok(())
    }
}

/// What to spawn.
#[derive(Debug, Clone)]
pub struct SidecarSpawn {
    pub dir: PathBuf,
    pub command: String,
    pub port: u16,
    pub session: String,
    pub headless: bool,
}

impl SidecarSpawn {
    pub fn new(dir: PathBuf, sidecar: &SidecarConfig, session: &SessionConfig) -> Self {
        Self {
            dir,
            command: sidecar.command.clone(),
            port: sidecar.port,
            session: session.name.clone(),
            headless: session.headless,
        }
    }
}

/// Find the sidecar directory.
///
/// Searches in order:
/// 1. Explicit path if provided
/// 2. Relative to the executable: `../sidecar`
/// 3. `./sidecar` and `../sidecar`
pub fn find_sidecar_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.join("package.json").exists() {
            return Ok(path.to_path_buf());
        }
        bail!(
            "sidecar directory does not exist or is missing package.json: {}",
            path.display()
        );
    }

    if let Ok(exe) = std::env::current_exe()
        && let Some(exe_dir) = exe.parent()
    {
        let candidate = exe_dir.join("../sidecar");
        if candidate.join("package.json").exists() {
            return Ok(candidate);
        }
    }

    for rel in ["sidecar", "../sidecar"] {
        let path = PathBuf::from(rel);
        if path.join("package.json").exists() {
            return Ok(path.canonicalize().unwrap_or(path));
        }
    }

    bail!("WhatsApp sidecar not found. Set CONCIERGE_SIDECAR_DIR or create ./sidecar")
}

/// Spawn the sidecar and forward its output to tracing.
pub async fn start_sidecar(spawn: &SidecarSpawn) -> Result<SidecarProcess> {
    let dir = &spawn.dir;
    if !dir.join("node_modules").exists() {
        run_npm_install(dir).await?;
    }

    info!(
        path = %dir.display(),
        port = spawn.port,
        session = %spawn.session,
        headless = spawn.headless,
        "starting WhatsApp sidecar process"
    );

    let mut child = Command::new(&spawn.command)
        .arg(ENTRY_POINT)
        .current_dir(dir)
        .env("CONCIERGE_SIDECAR_PORT", spawn.port.to_string())
        .env("SESSION_NAME", &spawn.session)
        .env("HEADLESS", spawn.headless.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn '{}'", spawn.command))?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                forward_log_line(&line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "whatsapp_sidecar", "{line}");
            }
        });
    }

    // Catch immediate crashes (missing entry point, bad node version).
    tokio::time::sleep(Duration::from_millis(500)).await;
    if let Some(status) = child
        .try_wait()
        .context("failed to check sidecar process status")?
    {
        bail!("sidecar process exited immediately with status: {status}");
    }

    info!(port = spawn.port, "WhatsApp sidecar process started");
    Ok(SidecarProcess {
        child,
        port: spawn.port,
    })
}

/// Log a sidecar output line, honouring pino JSON levels.
fn forward_log_line(line: &str) {
    if line.starts_with('{')
        && let Ok(log) = serde_json::from_str::<serde_json::Value>(line)
    {
        let level = log
            .get("level")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(30);
        let msg = log
            .get("msg")
            .and_then(serde_json::Value::as_str)
            .unwrap_or(line);
        match level {
            10 | 20 => debug!(target: "whatsapp_sidecar", "{msg}"),
            30 => info!(target: "whatsapp_sidecar", "{msg}"),
            40 => warn!(target: "whatsapp_sidecar", "{msg}"),
            _ => error!(target: "whatsapp_sidecar", "{msg}"),
        }
        return;
    }
    info!(target: "whatsapp_sidecar", "{line}");
}

async fn run_npm_install(dir: &Path) -> Result<()> {
    info!(path = %dir.display(), "running npm install for sidecar");

    let output = Command::new("npm")
        .arg("install")
        .current_dir(dir)
        .output()
        .await
        .context("failed to run npm install")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("npm install failed: {stderr}");
    }
    Ok(())
}
