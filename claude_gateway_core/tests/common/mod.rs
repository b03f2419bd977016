//! Shared helpers for gateway integration tests.
//!
//! Tests never touch the real `claude` binary. Each one writes a small
//! `/bin/sh` script into a temp dir that plays the agent's part: printing
//! stream-json lines, recording its arguments, or trapping SIGTERM.

// rustc can't see usage across test crates
#![allow(dead_code)]

use claude_gateway_core::{Gateway, GatewayConfig, OutputEvent, OutputStream};
use futures::StreamExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Upper bound for any single wait in these tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A throwaway agent script plus the directory it lives in.
pub struct FakeAgent {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl FakeAgent {
    /// `body` is the shell script minus the shebang line.
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("claude");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("Failed to write agent");
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        Self { dir, path }
    }

    /// A file path inside the agent's temp dir, for scripts to write to.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn workdir(&self) -> &Path {
        self.dir.path()
    }

    pub fn gateway(&self) -> Gateway {
        self.gateway_with(|_| {})
    }

    pub fn gateway_with(&self, tweak: impl FnOnce(&mut GatewayConfig)) -> Gateway {
        let mut config = GatewayConfig::new(&self.path);
        config.termination_grace = Duration::from_secs(2);
        tweak(&mut config);
        Gateway::new(config)
    }
}

/// Drain `output` until it ends, failing the test if that takes too long.
pub async fn collect(mut output: OutputStream) -> Vec<OutputEvent> {
    let mut events = Vec::new();
    let drained = tokio::time::timeout(TEST_TIMEOUT, async {
        while let Some(event) = output.next().await {
            events.push(event);
        }
    })
    .await;
    assert!(drained.is_ok(), "output did not finish, got so far: {events:?}");
    events
}

pub async fn next_event(output: &mut OutputStream) -> Option<OutputEvent> {
    tokio::time::timeout(TEST_TIMEOUT, output.next())
        .await
        .expect("timed out waiting for output")
}

/// Poll until `check` holds.
pub async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + TEST_TIMEOUT;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn lines(events: &[OutputEvent]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|e| match e {
            OutputEvent::Line(line) => Some(line.as_str()),
            _ => None,
        })
        .collect()
}

pub fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
