//! Host surface boundary
//!
//! The control deck itself (buttons, dials, their little screens) lives
//! behind this trait. The gateway only ever pushes renders out through
//! [`SurfaceControl`] and receives lifecycle events as [`SurfaceEvent`]s;
//! everything deck-specific (transport, image encoding, layout) is the
//! host's problem.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

/// Feedback payload for a dial/encoder display
#[derive(Debug, Clone, PartialEq)]
pub struct DialFeedback {
    pub icon: String,
    pub title: String,
    pub value: String,
    /// Indicator bar position, 0–100
    pub indicator: f64,
}

/// Render target for one placed control
///
/// All methods take `&self`; implementations use interior mutability where
/// they track anything (mirrors the driver trait convention: trait objects
/// are shared as `Arc<dyn SurfaceControl>`).
#[async_trait]
pub trait SurfaceControl: Send + Sync {
    /// Opaque per-placement identifier
    fn context(&self) -> &str;

    /// True when the control is a keypad button (vs. a dial/encoder)
    fn is_key(&self) -> bool;

    async fn set_image(&self, icon: &str);
    async fn set_title(&self, title: &str);
    /// Select a discrete visual state defined by the deck profile
    async fn set_state(&self, state: u8);
    async fn set_feedback(&self, feedback: DialFeedback);
    /// Transient success flash
    async fn show_ok(&self);
    /// Transient failure flash
    async fn show_alert(&self);
    /// Push a payload to the control's settings UI
    async fn send_to_inspector(&self, payload: Value);
}

/// Lifecycle events delivered by the host surface for one control
#[derive(Debug, Clone)]
pub enum SurfaceEvent {
    KeyDown,
    DialRotate { ticks: i32 },
    DialDown,
    DialUp,
    /// Settings were rewritten by the settings UI
    SettingsChanged,
    /// Message from the settings UI (test-connection requests etc.)
    InspectorMessage { payload: Value },
}

/// Surface implementation that renders to the log
///
/// Lets the binary run without deck hardware: every render becomes a log
/// line, flashes included. Useful for development and for driving the
/// gateway from the REPL.
pub struct ConsoleControl {
    context: String,
    is_key: bool,
}

impl ConsoleControl {
    pub fn new(context: impl Into<String>, is_key: bool) -> Self {
        Self {
            context: context.into(),
            is_key,
        }
    }
}

#[async_trait]
impl SurfaceControl for ConsoleControl {
    fn context(&self) -> &str {
        &self.context
    }

    fn is_key(&self) -> bool {
        self.is_key
    }

    async fn set_image(&self, icon: &str) {
        info!("🖼  [{}] image = {}", self.context, icon);
    }

    async fn set_title(&self, title: &str) {
        info!("🏷  [{}] title = {:?}", self.context, title);
    }

    async fn set_state(&self, state: u8) {
        info!("🔢 [{}] state = {}", self.context, state);
    }

    async fn set_feedback(&self, feedback: DialFeedback) {
        info!(
            "🎛  [{}] {} {} ({}%)",
            self.context,
            feedback.title,
            feedback.value,
            feedback.indicator.round()
        );
    }

    async fn show_ok(&self) {
        info!("✅ [{}] ok", self.context);
    }

    async fn show_alert(&self) {
        info!("⚠️  [{}] alert", self.context);
    }

    async fn send_to_inspector(&self, payload: Value) {
        debug!("📤 [{}] to inspector: {}", self.context, payload);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// One recorded render call
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum RenderCall {
        Image(String),
        Title(String),
        State(u8),
        Feedback(DialFeedback),
        Ok,
        Alert,
        Inspector(Value),
    }

    /// Surface that records every render, for asserting in tests
    pub(crate) struct RecordingControl {
        context: String,
        is_key: bool,
        pub(crate) calls: Mutex<Vec<RenderCall>>,
    }

    impl RecordingControl {
        pub(crate) fn new(context: &str, is_key: bool) -> Arc<Self> {
            Arc::new(Self {
                context: context.to_string(),
                is_key,
                calls: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn titles(&self) -> Vec<String> {
            self.calls
                .lock()
                .iter()
                .filter_map(|c| match c {
                    RenderCall::Title(t) => Some(t.clone()),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn images(&self) -> Vec<String> {
            self.calls
                .lock()
                .iter()
                .filter_map(|c| match c {
                    RenderCall::Image(i) => Some(i.clone()),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn feedbacks(&self) -> Vec<DialFeedback> {
            self.calls
                .lock()
                .iter()
                .filter_map(|c| match c {
                    RenderCall::Feedback(f) => Some(f.clone()),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn ok_count(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| matches!(c, RenderCall::Ok))
                .count()
        }

        pub(crate) fn alert_count(&self) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| matches!(c, RenderCall::Alert))
                .count()
        }

        pub(crate) fn clear(&self) {
            self.calls.lock().clear();
        }
    }

    #[async_trait]
    impl SurfaceControl for RecordingControl {
        fn context(&self) -> &str {
            &self.context
        }

        fn is_key(&self) -> bool {
            self.is_key
        }

        async fn set_image(&self, icon: &str) {
            self.calls.lock().push(RenderCall::Image(icon.to_string()));
        }

        async fn set_title(&self, title: &str) {
            self.calls.lock().push(RenderCall::Title(title.to_string()));
        }

        async fn set_state(&self, state: u8) {
            self.calls.lock().push(RenderCall::State(state));
        }

        async fn set_feedback(&self, feedback: DialFeedback) {
            self.calls.lock().push(RenderCall::Feedback(feedback));
        }

        async fn show_ok(&self) {
            self.calls.lock().push(RenderCall::Ok);
        }

        async fn show_alert(&self) {
            self.calls.lock().push(RenderCall::Alert);
        }

        async fn send_to_inspector(&self, payload: Value) {
            self.calls.lock().push(RenderCall::Inspector(payload));
        }
    }
}
