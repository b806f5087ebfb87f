use std::{fs, path::Path};

use serde::Deserialize;
use status_client::{ErrorPolicy, InvokerSettings};
use tracing::warn;

pub const CONFIG_FILE: &str = "console.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub platform_url: String,
    pub status_url: String,
    pub operation_timeout_ms: u64,
    pub request_id: Option<String>,
    pub finish_on_error: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            platform_url: "http://127.0.0.1:9001".into(),
            status_url: "ws://127.0.0.1:10000/status".into(),
            operation_timeout_ms: status_client::invoker::DEFAULT_OPERATION_TIMEOUT_MS,
            request_id: None,
            finish_on_error: false,
        }
    }
}

impl Settings {
    pub fn invoker_settings(&self) -> InvokerSettings {
        InvokerSettings {
            platform_url: self.platform_url.clone(),
            timeout_ms: self.operation_timeout_ms,
            request_id: self.request_id.clone(),
        }
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        if self.finish_on_error {
            ErrorPolicy::Finish
        } else {
            ErrorPolicy::KeepOpen
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    platform_url: Option<String>,
    status_url: Option<String>,
    operation_timeout_ms: Option<u64>,
    request_id: Option<String>,
    finish_on_error: Option<bool>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the config file, then the environment.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(err) => warn!("config: ignoring {}: {err}", path.display()),
        }
    }

    if let Some(v) = env("PLATFORM_URL") {
        settings.platform_url = v;
    }
    if let Some(v) = env("APP__PLATFORM_URL") {
        settings.platform_url = v;
    }

    if let Some(v) = env("STATUS_URL") {
        settings.status_url = v;
    }
    if let Some(v) = env("APP__STATUS_URL") {
        settings.status_url = v;
    }

    if let Some(v) = env("APP__OPERATION_TIMEOUT_MS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.operation_timeout_ms = parsed,
            Err(_) => warn!("config: APP__OPERATION_TIMEOUT_MS is not a number: {v}"),
        }
    }

    if let Some(v) = env("APP__REQUEST_ID") {
        settings.request_id = non_empty(v);
    }

    if let Some(v) = env("APP__FINISH_ON_ERROR") {
        match parse_flag(&v) {
            Some(flag) => settings.finish_on_error = flag,
            None => warn!("config: APP__FINISH_ON_ERROR is not a boolean: {v}"),
        }
    }

    settings
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.platform_url {
        settings.platform_url = v;
    }
    if let Some(v) = file_cfg.status_url {
        settings.status_url = v;
    }
    if let Some(v) = file_cfg.operation_timeout_ms {
        settings.operation_timeout_ms = v;
    }
    if let Some(v) = file_cfg.request_id {
        settings.request_id = non_empty(v);
    }
    if let Some(v) = file_cfg.finish_on_error {
        settings.finish_on_error = v;
    }
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
