//! Global configuration types for QuillFlow.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls
//! workflow guards, the scheduler loop, notification delivery, and the
//! REST server.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the QuillFlow platform.
///
/// Loaded from `~/.quillflow/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub workflow: WorkflowSettings,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub notifier: NotifierSettings,

    #[serde(default)]
    pub server: ServerSettings,
}

/// Guards and defaults applied by the workflow coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// How long to wait for a per-envelope lock before reporting contention.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Upper bound for a recipient's `delay_days`.
    #[serde(default = "default_max_delay_days")]
    pub max_delay_days: u32,

    /// Reason recorded when a workflow is cancelled.
    #[serde(default = "default_cancel_reason")]
    pub cancel_reason: String,
}

fn default_lock_timeout_ms() -> u64 {
    5_000
}

fn default_max_delay_days() -> u32 {
    30
}

fn default_cancel_reason() -> String {
    "workflow cancelled".to_string()
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            lock_timeout_ms: default_lock_timeout_ms(),
            max_delay_days: default_max_delay_days(),
            cancel_reason: default_cancel_reason(),
        }
    }
}

/// The in-process scheduler loop started by `qflow serve --scheduler`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Which notifier adapter delivers access links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    /// Write a structured log line only.
    #[default]
    Log,
    /// POST a JSON payload to `url`.
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierSettings {
    #[serde(default)]
    pub kind: NotifierKind,

    /// Endpoint for the HTTP notifier.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_notifier_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_notifier_timeout_secs() -> u64 {
    10
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            kind: NotifierKind::default(),
            url: None,
            timeout_secs: default_notifier_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
