//! Locating the `claude` executable and asking it for its version.

use crate::error::ConfigError;
use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};
use tokio::process::Command;
use tracing::{error, info, warn};

pub const AGENT_BINARY_NAME: &str = "claude";
pub const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
pub const UNKNOWN_VERSION: &str = "unknown";

/// The resolved agent binary, captured once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentBinary {
    pub path: PathBuf,
    pub version: String,
}

impl AgentBinary {
    pub async fn detect(configured: Option<&Path>) -> Result<Self, ConfigError> {
        let path = resolve(configured)?;
        let version = query_version(&path, VERSION_QUERY_TIMEOUT).await;
        info!(path = %path.display(), version = %version, "Claude Code ready");
        Ok(Self { path, version })
    }
}

/// A configured path wins; otherwise search PATH.
pub fn resolve(configured: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = configured {
        info!("Using configured Claude path: {}", path.display());
        return Ok(path.to_path_buf());
    }
    match which::which(AGENT_BINARY_NAME) {
        Ok(path) => {
            info!("Auto-detected Claude path: {}", path.display());
            Ok(path)
        }
        Err(e) => {
            error!("Claude Code CLI not found in PATH: {}", e);
            Err(ConfigError::AgentNotFound)
        }
    }
}

/// `<path> --version`, trimmed. Any failure yields [`UNKNOWN_VERSION`].
pub async fn query_version(path: &Path, limit: Duration) -> String {
    let output = Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(limit, output).await {
        Ok(Ok(output)) => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if version.is_empty() {
                warn!(status = ?output.status, "Claude --version printed nothing");
                UNKNOWN_VERSION.to_string()
            } else {
                version
            }
        }
        Ok(Err(e)) => {
            warn!("Failed to get Claude version: {}", e);
            UNKNOWN_VERSION.to_string()
        }
        Err(_) => {
            warn!(
                timeout_secs = limit.as_secs(),
                "Timed out waiting for Claude --version"
            );
            UNKNOWN_VERSION.to_string()
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("claude");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_configured_path_wins() {
        let path = resolve(Some(Path::new("/opt/custom/claude"))).unwrap();
        assert_eq!(path, PathBuf::from("/opt/custom/claude"));
    }

    #[tokio::test]
    async fn test_version_is_trimmed_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(&dir, "echo '  2.0.14 (Claude Code)  '");
        assert_eq!(
            query_version(&path, Duration::from_secs(5)).await,
            "2.0.14 (Claude Code)"
        );
    }

    #[tokio::test]
    async fn test_version_failures_are_unknown() {
        assert_eq!(
            query_version(Path::new("/no/such/claude"), Duration::from_secs(5)).await,
            UNKNOWN_VERSION
        );

        let dir = tempfile::tempdir().unwrap();
        let silent = script(&dir, "exit 0");
        assert_eq!(
            query_version(&silent, Duration::from_secs(5)).await,
            UNKNOWN_VERSION
        );
    }

    #[tokio::test]
    async fn test_version_query_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let slow = script(&dir, "exec sleep 30");
        let started = std::time::Instant::now();
        assert_eq!(
            query_version(&slow, Duration::from_millis(200)).await,
            UNKNOWN_VERSION
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
