use std::{fs, io::ErrorKind, path::Path, time::Duration};

use anyhow::Context;
use client_core::ControllerOptions;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "broccoli.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub poll_interval_ms: u64,
    /// `0` disables the per-request timeout.
    pub request_timeout_secs: u64,
    pub template_load_attempts: u32,
    pub template_load_retry_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000".into(),
            poll_interval_ms: 1000,
            request_timeout_secs: 10,
            template_load_attempts: 1,
            template_load_retry_delay_ms: 1000,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            template_load_attempts: self.template_load_attempts.max(1),
            template_load_retry_delay: Duration::from_millis(self.template_load_retry_delay_ms),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    base_url: Option<String>,
    poll_interval_ms: Option<u64>,
    request_timeout_secs: Option<u64>,
    template_load_attempts: Option<u32>,
    template_load_retry_delay_ms: Option<u64>,
}

/// Defaults, then the config file, then environment overrides.
///
/// A missing `broccoli.toml` is fine; a missing file named explicitly is not.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    let path = config_path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));

    match fs::read_to_string(path) {
        Ok(raw) => apply_file_overrides(&mut settings, &raw)
            .with_context(|| format!("invalid config file '{}'", path.display()))?,
        Err(err) if err.kind() == ErrorKind::NotFound && config_path.is_none() => {}
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read '{}'", path.display()))
        }
    }

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file_overrides(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.base_url {
        settings.base_url = v;
    }
    if let Some(v) = file_cfg.poll_interval_ms {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = file_cfg.template_load_attempts {
        settings.template_load_attempts = v;
    }
    if let Some(v) = file_cfg.template_load_retry_delay_ms {
        settings.template_load_retry_delay_ms = v;
    }
    Ok(())
}

fn apply_env_overrides(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("BROCCOLI_URL") {
        settings.base_url = v;
    }
    if let Some(v) = lookup("APP__BASE_URL") {
        settings.base_url = v;
    }

    if let Some(v) = lookup("APP__POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
        settings.poll_interval_ms = v;
    }
    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        settings.request_timeout_secs = v;
    }
    if let Some(v) = lookup("APP__TEMPLATE_LOAD_ATTEMPTS").and_then(|v| v.parse().ok()) {
        settings.template_load_attempts = v;
    }
    if let Some(v) = lookup("APP__TEMPLATE_LOAD_RETRY_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.template_load_retry_delay_ms = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
