use crate::capture::SelectionCapture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

/// Visibility of the single assistant surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    Hidden,
    Visible,
}

/// What a window-close request should do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Not quitting: the surface hides and the process keeps running.
    HideInstead,
    /// Shutdown was requested; let the close proceed.
    Quit,
}

/// Events pushed to the presentation layer.
#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    /// Selection context captured during an activation; at most one per
    /// activation, only when non-empty.
    ContextCaptured(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// The floating window as the core sees it. The real adapter lives in the
/// presentation shell; headless runs use [`NullSurface`].
pub trait Surface: Send + Sync {
    fn cursor_position(&self) -> Point;
    /// Surface dimensions `(width, height)`.
    fn size(&self) -> (i32, i32);
    fn show_at(&self, x: i32, y: i32);
    fn focus(&self);
    fn hide(&self);
    fn is_focused(&self) -> bool;
    /// True while an attached inspection tool holds focus; blur is ignored then.
    fn inspector_open(&self) -> bool {
        false
    }
}

/// Hotkey-driven show/hide machine. Exactly one instance exists per
/// process; the internal lock serializes re-entrant hotkey presses, which
/// also guarantees the clipboard is never captured concurrently.
pub struct ActivationMachine {
    state: Mutex<SurfaceState>,
    surface: Arc<dyn Surface>,
    capture: SelectionCapture,
    events: broadcast::Sender<SurfaceEvent>,
    quitting: AtomicBool,
}

impl ActivationMachine {
    pub fn new(surface: Arc<dyn Surface>, capture: SelectionCapture) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(SurfaceState::Hidden),
            surface,
            capture,
            events,
            quitting: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> SurfaceState {
        *self.state.lock().await
    }

    /// Handle a global hotkey press.
    ///
    /// Visible and focused: hide. Otherwise: capture the current selection,
    /// deliver it as a one-shot context event, place the surface centered
    /// above the pointer and show it focused.
    pub async fn activate(&self) {
        let mut state = self.state.lock().await;

        if *state == SurfaceState::Visible && self.surface.is_focused() {
            self.surface.hide();
            *state = SurfaceState::Hidden;
            return;
        }

        let text = self.capture.capture().await;
        if !text.is_empty() {
            let _ = self.events.send(SurfaceEvent::ContextCaptured(text));
        }

        let point = self.surface.cursor_position();
        let (width, _) = self.surface.size();
        self.surface.show_at(point.x - width / 2, point.y - 20);
        self.surface.focus();
        *state = SurfaceState::Visible;
    }

    /// The surface lost focus. Hides unless an inspector holds focus.
    pub async fn focus_lost(&self) {
        let mut state = self.state.lock().await;
        if *state == SurfaceState::Visible && !self.surface.inspector_open() {
            self.surface.hide();
            *state = SurfaceState::Hidden;
        }
    }

    /// Explicit hide request from the presentation layer.
    pub async fn request_hide(&self) {
        let mut state = self.state.lock().await;
        self.surface.hide();
        *state = SurfaceState::Hidden;
    }

    /// Window close request. Until shutdown is requested the surface hides
    /// instead of closing.
    pub async fn close_requested(&self) -> CloseAction {
        if self.quitting.load(Ordering::SeqCst) {
            return CloseAction::Quit;
        }
        self.request_hide().await;
        CloseAction::HideInstead
    }

    /// Mark the process as quitting; subsequent close requests terminate.
    pub fn shutdown(&self) {
        self.quitting.store(true, Ordering::SeqCst);
    }
}

/// Surface for headless runs: tracks visibility and focus flags and logs
/// the calls the presentation shell would receive.
pub struct NullSurface {
    visible: AtomicBool,
    focused: AtomicBool,
}

impl NullSurface {
    pub fn new() -> Self {
        Self {
            visible: AtomicBool::new(false),
            focused: AtomicBool::new(false),
        }
    }
}

impl Default for NullSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for NullSurface {
    fn cursor_position(&self) -> Point {
        Point { x: 0, y: 0 }
    }

    fn size(&self) -> (i32, i32) {
        (800, 600)
    }

    fn show_at(&self, x: i32, y: i32) {
        tracing::debug!("surface: show at ({}, {})", x, y);
        self.visible.store(true, Ordering::SeqCst);
    }

    fn focus(&self) {
        self.focused.store(true, Ordering::SeqCst);
    }

    fn hide(&self) {
        tracing::debug!("surface: hide");
        self.visible.store(false, Ordering::SeqCst);
        self.focused.store(false, Ordering::SeqCst);
    }

    fn is_focused(&self) -> bool {
        self.focused.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::protocol::CaptureTiming;
    use crate::capture::{Automation, CopyVariant};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct FakeSurface {
        calls: StdMutex<Vec<String>>,
        focused: AtomicBool,
        inspector: bool,
    }

    impl FakeSurface {
        fn new() -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                focused: AtomicBool::new(false),
                inspector: false,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Surface for FakeSurface {
        fn cursor_position(&self) -> Point {
            Point { x: 500, y: 300 }
        }

        fn size(&self) -> (i32, i32) {
            (800, 600)
        }

        fn show_at(&self, x: i32, y: i32) {
            self.calls.lock().unwrap().push(format!("show_at({},{})", x, y));
        }

        fn focus(&self) {
            self.focused.store(true, Ordering::SeqCst);
            self.calls.lock().unwrap().push("focus".to_string());
        }

        fn hide(&self) {
            self.focused.store(false, Ordering::SeqCst);
            self.calls.lock().unwrap().push("hide".to_string());
        }

        fn is_focused(&self) -> bool {
            self.focused.load(Ordering::SeqCst)
        }

        fn inspector_open(&self) -> bool {
            self.inspector
        }
    }

    struct FixedSelection(&'static str);

    #[async_trait]
    impl Automation for FixedSelection {
        async fn simulate_copy(&self, _variant: CopyVariant) -> bool {
            true
        }

        async fn read_clipboard(&self) -> String {
            self.0.to_string()
        }

        async fn write_clipboard(&self, _text: &str) -> bool {
            true
        }
    }

    fn capture_with(text: &'static str) -> SelectionCapture {
        SelectionCapture::with_timing(
            Arc::new(FixedSelection(text)),
            CaptureTiming {
                settle: Duration::ZERO,
                copy_wait: Duration::ZERO,
            },
        )
    }

    #[tokio::test]
    async fn test_activate_from_hidden_shows_centered_above_cursor() {
        let surface = Arc::new(FakeSurface::new());
        let machine = ActivationMachine::new(surface.clone(), capture_with("picked text"));
        let mut events = machine.subscribe();

        machine.activate().await;

        assert_eq!(machine.state().await, SurfaceState::Visible);
        // 500 - 800/2 = 100, 300 - 20 = 280
        assert_eq!(surface.calls(), vec!["show_at(100,280)", "focus"]);

        match events.try_recv().unwrap() {
            SurfaceEvent::ContextCaptured(text) => assert_eq!(text, "picked text"),
        }
    }

    #[tokio::test]
    async fn test_empty_capture_emits_no_context_event() {
        let surface = Arc::new(FakeSurface::new());
        let machine = ActivationMachine::new(surface.clone(), capture_with(""));
        let mut events = machine.subscribe();

        machine.activate().await;

        assert_eq!(machine.state().await, SurfaceState::Visible);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_activate_while_visible_and_focused_hides() {
        let surface = Arc::new(FakeSurface::new());
        let machine = ActivationMachine::new(surface.clone(), capture_with(""));

        machine.activate().await;
        machine.activate().await;

        assert_eq!(machine.state().await, SurfaceState::Hidden);
        assert_eq!(surface.calls().last().unwrap(), "hide");
    }

    #[tokio::test]
    async fn test_activate_while_visible_but_unfocused_reshows() {
        let surface = Arc::new(FakeSurface::new());
        let machine = ActivationMachine::new(surface.clone(), capture_with(""));

        machine.activate().await;
        surface.focused.store(false, Ordering::SeqCst);
        machine.activate().await;

        assert_eq!(machine.state().await, SurfaceState::Visible);
    }

    #[tokio::test]
    async fn test_focus_loss_hides() {
        let surface = Arc::new(FakeSurface::new());
        let machine = ActivationMachine::new(surface.clone(), capture_with(""));

        machine.activate().await;
        machine.focus_lost().await;

        assert_eq!(machine.state().await, SurfaceState::Hidden);
    }

    #[tokio::test]
    async fn test_focus_loss_ignored_while_inspector_open() {
        let mut fake = FakeSurface::new();
        fake.inspector = true;
        let surface = Arc::new(fake);
        let machine = ActivationMachine::new(surface.clone(), capture_with(""));

        machine.activate().await;
        machine.focus_lost().await;

        assert_eq!(machine.state().await, SurfaceState::Visible);
    }

    #[tokio::test]
    async fn test_close_hides_until_shutdown() {
        let surface = Arc::new(FakeSurface::new());
        let machine = ActivationMachine::new(surface.clone(), capture_with(""));

        machine.activate().await;
        assert_eq!(machine.close_requested().await, CloseAction::HideInstead);
        assert_eq!(machine.state().await, SurfaceState::Hidden);

        machine.shutdown();
        assert_eq!(machine.close_requested().await, CloseAction::Quit);
    }
}
