//! Deck actions
//!
//! One action instance per placed control. The five behavioral patterns —
//! continuous button, continuous dial, discrete toggle, mode select and
//! status display — share the [`Action`] capability set; concrete kinds are
//! thin parameterizations of those patterns.

pub mod continuous;
pub mod mode;
pub mod poller;
pub mod registry;
pub mod status;
pub mod toggle;

use crate::surface::SurfaceControl;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Every action kind the deck profile can place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    ZoomButton,
    ZoomDial,
    ExposureButton,
    ExposureDial,
    LedToggle,
    MicToggle,
    ExposureLockToggle,
    WbLockToggle,
    AutofocusButton,
    FocusModeButton,
    WbModeButton,
    CameraSwitch,
    ConnectionStatus,
    BatteryStatus,
    StopRestart,
}

impl ActionKind {
    pub const ALL: [ActionKind; 15] = [
        ActionKind::ZoomButton,
        ActionKind::ZoomDial,
        ActionKind::ExposureButton,
        ActionKind::ExposureDial,
        ActionKind::LedToggle,
        ActionKind::MicToggle,
        ActionKind::ExposureLockToggle,
        ActionKind::WbLockToggle,
        ActionKind::AutofocusButton,
        ActionKind::FocusModeButton,
        ActionKind::WbModeButton,
        ActionKind::CameraSwitch,
        ActionKind::ConnectionStatus,
        ActionKind::BatteryStatus,
        ActionKind::StopRestart,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ZoomButton => "zoom-button",
            ActionKind::ZoomDial => "zoom-dial",
            ActionKind::ExposureButton => "exposure-button",
            ActionKind::ExposureDial => "exposure-dial",
            ActionKind::LedToggle => "led-toggle",
            ActionKind::MicToggle => "mic-toggle",
            ActionKind::ExposureLockToggle => "exposure-lock",
            ActionKind::WbLockToggle => "wb-lock",
            ActionKind::AutofocusButton => "autofocus",
            ActionKind::FocusModeButton => "focus-mode",
            ActionKind::WbModeButton => "wb-mode",
            ActionKind::CameraSwitch => "camera-switch",
            ActionKind::ConnectionStatus => "connection-status",
            ActionKind::BatteryStatus => "battery-status",
            ActionKind::StopRestart => "stop-restart",
        }
    }

    pub fn parse(s: &str) -> Option<ActionKind> {
        Self::ALL.iter().copied().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability set every action implements
///
/// All methods take `&self`: instances are shared as `Arc<dyn Action>` and
/// use interior mutability for state, same convention as the surface trait.
#[async_trait]
pub trait Action: Send + Sync {
    fn context(&self) -> &str;
    fn kind(&self) -> ActionKind;

    /// Control appeared on the deck
    async fn on_appear(&self);

    /// Control removed from the deck; release timers and registrations
    async fn on_disappear(&self);

    /// Key pressed (keypad placements)
    async fn on_key_down(&self);

    /// Dial rotated (encoder placements)
    async fn on_dial_rotate(&self, _ticks: i32) {}

    /// Dial pressed
    async fn on_dial_down(&self) {}

    /// Settings were rewritten by the settings UI
    async fn on_settings_changed(&self);

    /// Message from the settings UI
    async fn on_inspector_message(&self, _payload: &Value) {}
}

/// Icon shown by key controls while the device is unreachable
pub const ICON_DISCONNECTED: &str = "icons/disconnected";

/// Clamp into `[min, max]`; idempotent by construction
pub fn clamp(x: f64, min: f64, max: f64) -> f64 {
    x.max(min).min(max)
}

/// A continuous value with its device-reported bounds
///
/// Assignment clamps, never rejects: `min <= value <= max` holds after any
/// mutation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoteQuantity {
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl RemoteQuantity {
    pub fn new(value: f64, min: f64, max: f64) -> Self {
        Self {
            value: clamp(value, min, max),
            min,
            max,
        }
    }

    /// Assign a new value, clamped into the current bounds
    pub fn assign(&mut self, value: f64) {
        self.value = clamp(value, self.min, self.max);
    }

    /// Replace the bounds and re-clamp the current value into them
    pub fn set_bounds(&mut self, min: f64, max: f64) {
        self.min = min;
        self.max = max;
        self.value = clamp(self.value, min, max);
    }

    /// Position of the value inside its range, 0–100
    ///
    /// A zero-width range maps to 0 rather than dividing by zero.
    pub fn indicator_percent(&self) -> f64 {
        let span = self.max - self.min;
        if span <= 0.0 {
            return 0.0;
        }
        let pct = (self.value - self.min) / span * 100.0;
        if pct.is_finite() {
            pct
        } else {
            0.0
        }
    }
}

/// Connectivity as last resolved by an explicit probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

impl ConnectionState {
    pub fn from_probe(ok: bool) -> Self {
        if ok {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

/// Last icon/title/state pushed to the surface, to suppress redundant redraws
#[derive(Default)]
pub struct RenderState {
    last_image: Mutex<Option<String>>,
    last_title: Mutex<Option<String>>,
    last_state: Mutex<Option<u8>>,
}

impl RenderState {
    /// Push an image only when it differs from the last one pushed
    pub async fn apply_image(&self, surface: &Arc<dyn SurfaceControl>, icon: &str) {
        let changed = {
            let mut last = self.last_image.lock();
            if last.as_deref() == Some(icon) {
                false
            } else {
                *last = Some(icon.to_string());
                true
            }
        };
        if changed {
            surface.set_image(icon).await;
        }
    }

    pub async fn apply_title(&self, surface: &Arc<dyn SurfaceControl>, title: &str) {
        let changed = {
            let mut last = self.last_title.lock();
            if last.as_deref() == Some(title) {
                false
            } else {
                *last = Some(title.to_string());
                true
            }
        };
        if changed {
            surface.set_title(title).await;
        }
    }

    pub async fn apply_state(&self, surface: &Arc<dyn SurfaceControl>, state: u8) {
        let changed = {
            let mut last = self.last_state.lock();
            if *last == Some(state) {
                false
            } else {
                *last = Some(state);
                true
            }
        };
        if changed {
            surface.set_state(state).await;
        }
    }

    /// Forget everything pushed so far; the next render goes through
    pub fn reset(&self) {
        *self.last_image.lock() = None;
        *self.last_title.lock() = None;
        *self.last_state.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::testing::{RecordingControl, RenderCall};

    #[test]
    fn clamp_is_idempotent_and_in_range() {
        for x in [-100.0, -1.0, 0.0, 0.5, 1.0, 7.3, 8.0, 99.0] {
            let once = clamp(x, 1.0, 8.0);
            assert!((1.0..=8.0).contains(&once));
            assert_eq!(clamp(once, 1.0, 8.0), once);
        }
    }

    #[test]
    fn quantity_assign_clamps() {
        let mut q = RemoteQuantity::new(1.0, 1.0, 8.0);
        q.assign(12.0);
        assert_eq!(q.value, 8.0);
        q.assign(-3.0);
        assert_eq!(q.value, 1.0);
    }

    #[test]
    fn bounds_change_reclamps_current_value() {
        let mut q = RemoteQuantity::new(7.5, 1.0, 8.0);
        q.set_bounds(1.0, 5.0);
        assert_eq!(q.value, 5.0);
    }

    #[test]
    fn indicator_is_never_non_numeric() {
        let q = RemoteQuantity::new(4.5, 1.0, 8.0);
        assert!((q.indicator_percent() - 50.0).abs() < 1e-9);

        // Zero-width range must not divide by zero
        let degenerate = RemoteQuantity::new(3.0, 3.0, 3.0);
        let pct = degenerate.indicator_percent();
        assert!(pct.is_finite());
        assert_eq!(pct, 0.0);

        // Inverted range behaves like zero-width
        let inverted = RemoteQuantity::new(2.0, 5.0, 1.0);
        assert!(inverted.indicator_percent().is_finite());
    }

    #[test]
    fn action_kind_round_trips_through_names() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ActionKind::parse("unknown"), None);
    }

    #[tokio::test]
    async fn render_state_suppresses_redundant_redraws() {
        let control = RecordingControl::new("ctx", true);
        let surface: Arc<dyn crate::surface::SurfaceControl> = control.clone();
        let render = RenderState::default();

        render.apply_image(&surface, "icons/connected").await;
        render.apply_image(&surface, "icons/connected").await;
        render.apply_title(&surface, "UP").await;
        render.apply_title(&surface, "UP").await;
        render.apply_state(&surface, 1).await;
        render.apply_state(&surface, 1).await;

        assert_eq!(control.calls.lock().len(), 3);

        render.reset();
        render.apply_image(&surface, "icons/connected").await;
        assert_eq!(
            control.calls.lock().last(),
            Some(&RenderCall::Image("icons/connected".into()))
        );
        assert_eq!(control.calls.lock().len(), 4);
    }
}
