//! `concierge healthcheck`: container health probe against `/health`.

use std::time::Duration;

use anyhow::{Context, Result, bail};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn handle_healthcheck(url: &str) -> Result<()> {
    let body = probe(url).await?;
    println!("{body}");
    Ok(())
}

/// Fetch `url` and require `{"ok": true}`.
async fn probe(url: &str) -> Result<serde_json::Value> {
    let client = reqwest::Client::builder()
        .timeout(PROBE_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("{url} unreachable"))?;
    let status = resp.status();
    if !status.is_success() {
        bail!("{url} answered HTTP {}", status.as_u16());
    }

    let body: serde_json::Value = resp.json().await.context("health response is not JSON")?;
    if body.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
        bail!("{url} reports not ok: {body}");
    }
    Ok(body)
}
