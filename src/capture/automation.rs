use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Which simulated-copy path to use. Some applications ignore the
/// character-based shortcut and only respond to the raw key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyVariant {
    /// Primary modifier + the `c` character.
    Keystroke,
    /// Primary modifier + the physical key code for `c`.
    KeyCode,
}

/// OS-level UI automation consumed by the capture protocol: simulated copy
/// commands plus clipboard access. Every operation is best-effort; failures
/// are reported as negative results, never as errors.
#[async_trait]
pub trait Automation: Send + Sync {
    /// Send a simulated copy command to the focused application.
    /// Returns false when the underlying automation facility failed.
    async fn simulate_copy(&self, variant: CopyVariant) -> bool;

    /// Current clipboard text; empty string when unavailable.
    async fn read_clipboard(&self) -> String;

    /// Replace the clipboard text. Returns false on failure.
    async fn write_clipboard(&self, text: &str) -> bool;
}

/// Automation backed by `osascript` keystroke injection and the
/// `pbpaste`/`pbcopy` clipboard tools. On platforms without these commands
/// every call fails softly, which the protocol treats as "no capture".
pub struct SystemAutomation;

impl SystemAutomation {
    pub fn new() -> Self {
        Self
    }

    async fn run_osascript(&self, script: &str) -> bool {
        match Command::new("osascript").arg("-e").arg(script).output().await {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                tracing::warn!(
                    "osascript failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                false
            }
            Err(e) => {
                tracing::warn!("osascript unavailable: {}", e);
                false
            }
        }
    }
}

impl Default for SystemAutomation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Automation for SystemAutomation {
    async fn simulate_copy(&self, variant: CopyVariant) -> bool {
        let script = match variant {
            CopyVariant::Keystroke => {
                r#"tell application "System Events" to keystroke "c" using {command down}"#
            }
            CopyVariant::KeyCode => {
                r#"tell application "System Events" to key code 8 using {command down}"#
            }
        };
        self.run_osascript(script).await
    }

    async fn read_clipboard(&self) -> String {
        match Command::new("pbpaste").output().await {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            Ok(_) => String::new(),
            Err(e) => {
                tracing::warn!("pbpaste unavailable: {}", e);
                String::new()
            }
        }
    }

    async fn write_clipboard(&self, text: &str) -> bool {
        let child = Command::new("pbcopy")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("pbcopy unavailable: {}", e);
                return false;
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            if stdin.write_all(text.as_bytes()).await.is_err() {
                return false;
            }
        }

        matches!(child.wait().await, Ok(status) if status.success())
    }
}
