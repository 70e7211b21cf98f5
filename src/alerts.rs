/*!
 * Copyright (c) 2026 Ming Lyu, aka mingcheng
 *
 * This source code is licensed under the MIT License,
 * which is located in the LICENSE file in the source tree's root directory.
 *
 * File: alerts.rs
 * Author: mingcheng <mingcheng@apache.org>
 * File Created: 2026-03-05 11:02:17
 *
 * Modified By: mingcheng <mingcheng@apache.org>
 * Last Modified: 2026-03-09 18:44:02
 */

use crate::config::AlertConfig;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::Client;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertPoster: Send + Sync {
    /// Posts one operational alert. Implementations own delivery and the
    /// per-kind cooldown suppression.
    async fn post_alert(
        &self,
        alert_kind: &str,
        cooldown_seconds: u64,
        recipients: &[String],
    ) -> anyhow::Result<()>;
}

/// Remembers when each alert kind last went out so repeats inside the
/// cooldown window are dropped. A failed delivery does not reopen the window.
struct CooldownTracker {
    last_posted: Mutex<HashMap<String, Instant>>,
}

impl CooldownTracker {
    fn new() -> Self {
        Self {
            last_posted: Mutex::new(HashMap::new()),
        }
    }

    async fn should_post(&self, alert_kind: &str, cooldown_seconds: u64) -> bool {
        let mut last_posted = self.last_posted.lock().await;
        let now = Instant::now();
        if let Some(previous) = last_posted.get(alert_kind) {
            if now.duration_since(*previous) < Duration::from_secs(cooldown_seconds) {
                return false;
            }
        }
        last_posted.insert(alert_kind.to_string(), now);
        true
    }
}

fn alert_payload(alert_kind: &str, recipients: &[String]) -> serde_json::Value {
    serde_json::json!({
        "time": chrono::Utc::now().to_rfc3339(),
        "alert": alert_kind,
        "recipients": recipients,
    })
}

/// An alert sink that appends one JSON line per alert to a local file.
pub struct FileAlertPoster {
    file_path: String,
    cooldowns: CooldownTracker,
    // Prevent concurrent appends to the same file from interleaving
    write_lock: Mutex<()>,
}

impl FileAlertPoster {
    pub fn new(file_path: String) -> Self {
        Self {
            file_path,
            cooldowns: CooldownTracker::new(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AlertPoster for FileAlertPoster {
    async fn post_alert(
        &self,
        alert_kind: &str,
        cooldown_seconds: u64,
        recipients: &[String],
    ) -> anyhow::Result<()> {
        if !self.cooldowns.should_post(alert_kind, cooldown_seconds).await {
            debug!("Alert {} suppressed by cooldown", alert_kind);
            return Ok(());
        }

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .await?;

        let mut line = alert_payload(alert_kind, recipients).to_string();
        line.push('\n');
        file.write_all(line.as_bytes()).await?;

        info!("Alert {} recorded to {}", alert_kind, self.file_path);
        Ok(())
    }
}

/// An alert sink that POSTs the alert as JSON to a configured URL.
pub struct WebhookAlertPoster {
    url: String,
    client: Client,
    cooldowns: CooldownTracker,
}

impl WebhookAlertPoster {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: Client::new(),
            cooldowns: CooldownTracker::new(),
        }
    }
}

#[async_trait]
impl AlertPoster for WebhookAlertPoster {
    async fn post_alert(
        &self,
        alert_kind: &str,
        cooldown_seconds: u64,
        recipients: &[String],
    ) -> anyhow::Result<()> {
        if !self.cooldowns.should_post(alert_kind, cooldown_seconds).await {
            debug!("Alert {} suppressed by cooldown", alert_kind);
            return Ok(());
        }

        let payload = alert_payload(alert_kind, recipients);
        let response = self.client.post(&self.url).json(&payload).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            error!("Alert webhook error: {} - {}", status, text);
            return Err(anyhow::anyhow!("Alert webhook error: {}", status));
        }

        info!("Alert {} posted to webhook", alert_kind);
        Ok(())
    }
}

/// Fallback sink used when no alert delivery is configured: the alert only
/// shows up in the logs.
pub struct LogAlertPoster {
    cooldowns: CooldownTracker,
}

impl LogAlertPoster {
    pub fn new() -> Self {
        Self {
            cooldowns: CooldownTracker::new(),
        }
    }
}

#[async_trait]
impl AlertPoster for LogAlertPoster {
    async fn post_alert(
        &self,
        alert_kind: &str,
        cooldown_seconds: u64,
        recipients: &[String],
    ) -> anyhow::Result<()> {
        if !self.cooldowns.should_post(alert_kind, cooldown_seconds).await {
            return Ok(());
        }

        warn!(
            "Alert {} raised (recipients: {:?})",
            alert_kind, recipients
        );
        Ok(())
    }
}

/// Selects the alert sink for the given configuration.
pub fn create_alert_poster(config: Option<&AlertConfig>) -> Box<dyn AlertPoster> {
    match config {
        Some(AlertConfig::File { path }) => Box::new(FileAlertPoster::new(path.clone())),
        Some(AlertConfig::Webhook { url }) => Box::new(WebhookAlertPoster::new(url.clone())),
        None => Box::new(LogAlertPoster::new()),
    }
}
