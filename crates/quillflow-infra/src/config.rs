//! Global configuration loader for QuillFlow.
//!
//! Reads `config.toml` from the data directory (`~/.quillflow/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to sensible defaults
//! when the file is missing or malformed.

use std::path::{Path, PathBuf};

use quillflow_types::config::GlobalConfig;

/// Resolve the QuillFlow data directory.
///
/// Checks `QUILLFLOW_DATA_DIR` first, then `~/.quillflow`, then `./.quillflow`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("QUILLFLOW_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".quillflow");
    }

    PathBuf::from(".quillflow")
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quillflow_types::config::NotifierKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_global_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.workflow.max_delay_days, 30);
        assert_eq!(config.notifier.kind, NotifierKind::Log);
    }

    #[tokio::test]
    async fn load_global_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[workflow]
cancel_reason = "withdrawn by sender"

[notifier]
kind = "http"
url = "https://hooks.example.com/quillflow"
timeout_secs = 3
"#,
        )
        .await
        .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.workflow.cancel_reason, "withdrawn by sender");
        assert_eq!(config.notifier.kind, NotifierKind::Http);
        assert_eq!(config.notifier.timeout_secs, 3);
        assert_eq!(config.scheduler.interval_secs, 60);
    }

    #[tokio::test]
    async fn load_global_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.workflow.lock_timeout_ms, 5_000);
        assert!(config.notifier.url.is_none());
    }
}
