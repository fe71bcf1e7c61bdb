use super::automation::{Automation, CopyVariant};
use std::sync::Arc;
use std::time::Duration;

/// Fixed delays of the capture sequence. The defaults are tuned for desktop
/// focus handoff; tests inject zeros.
#[derive(Debug, Clone, Copy)]
pub struct CaptureTiming {
    /// Wait after clearing the clipboard so OS focus settles.
    pub settle: Duration,
    /// Wait after a simulated copy for the target app to populate the clipboard.
    pub copy_wait: Duration,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(200),
            copy_wait: Duration::from_millis(400),
        }
    }
}

/// Best-effort extraction of the OS-wide text selection.
///
/// There is no direct "read current selection" API, so the protocol swaps
/// the clipboard out, issues a simulated copy against the focused
/// application and reads what lands. It always completes and returns either
/// the captured text or an empty string; an empty result is a normal
/// outcome, not an error. The clipboard is a global resource, so callers
/// must not run captures concurrently (the activation machine serializes).
pub struct SelectionCapture {
    automation: Arc<dyn Automation>,
    timing: CaptureTiming,
}

impl SelectionCapture {
    pub fn new(automation: Arc<dyn Automation>) -> Self {
        Self {
            automation,
            timing: CaptureTiming::default(),
        }
    }

    pub fn with_timing(automation: Arc<dyn Automation>, timing: CaptureTiming) -> Self {
        Self { automation, timing }
    }

    /// Run the capture sequence.
    ///
    /// On success the clipboard intentionally keeps the captured text (it
    /// mirrors what the user just copied); on a blank result the original
    /// clipboard contents are restored.
    pub async fn capture(&self) -> String {
        let original = self.automation.read_clipboard().await;
        self.automation.write_clipboard("").await;

        tokio::time::sleep(self.timing.settle).await;

        self.automation.simulate_copy(CopyVariant::Keystroke).await;
        tokio::time::sleep(self.timing.copy_wait).await;
        let mut text = self.automation.read_clipboard().await;

        if text.is_empty() {
            // Some apps only respond to the raw key-code path.
            self.automation.simulate_copy(CopyVariant::KeyCode).await;
            tokio::time::sleep(self.timing.copy_wait).await;
            text = self.automation.read_clipboard().await;
        }

        if text.trim().is_empty() {
            tracing::debug!("capture: no selection found, restoring clipboard");
            self.automation.write_clipboard(&original).await;
            return String::new();
        }

        tracing::debug!("capture: got {} chars", text.len());
        text
    }
}
