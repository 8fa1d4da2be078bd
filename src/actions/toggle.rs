//! Discrete toggle controls (LED, mic, exposure lock, WB lock) and the
//! one-shot autofocus trigger
//!
//! A toggle issues exactly one remote command per press and then re-renders
//! from either a confirmatory snapshot fetch or, where the device exposes no
//! state for the quantity (the mic), its own retained state. Success of the
//! command alone is never taken to imply the intended state.

use super::{Action, ActionKind, ConnectionState, ICON_DISCONNECTED};
use crate::device::{CameraInfo, DeviceClient, DeviceError, DeviceResult};
use crate::settings::{ActionSettings, SettingsHandle};
use crate::surface::SurfaceControl;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Poll interval for lock toggles that re-read their flag
const LOCK_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Which binary quantity a toggle drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleKind {
    Led,
    Mic,
    ExposureLock,
    WbLock,
}

impl ToggleKind {
    fn action_kind(&self) -> ActionKind {
        match self {
            ToggleKind::Led => ActionKind::LedToggle,
            ToggleKind::Mic => ActionKind::MicToggle,
            ToggleKind::ExposureLock => ActionKind::ExposureLockToggle,
            ToggleKind::WbLock => ActionKind::WbLockToggle,
        }
    }

    async fn send_toggle(&self, client: &DeviceClient) -> DeviceResult<()> {
        match self {
            ToggleKind::Led => client.toggle_led().await,
            ToggleKind::Mic => client.toggle_mic().await,
            ToggleKind::ExposureLock => client.toggle_exposure_lock().await,
            ToggleKind::WbLock => client.toggle_wb_lock().await,
        }
    }

    /// Read the resolved state from a snapshot, where the device exposes one
    ///
    /// The mic has no ground truth to fetch, so it returns `None` and the
    /// instance keeps its own last-known state across reconnects.
    /// `led_on` is inverted on the wire: 0 means the torch is lit.
    fn confirm(&self) -> Option<fn(&CameraInfo) -> bool> {
        match self {
            ToggleKind::Led => Some(|info| info.led_on == 0),
            ToggleKind::Mic => None,
            ToggleKind::ExposureLock => Some(|info| info.exposure_lock == 1),
            ToggleKind::WbLock => Some(|info| info.wb_lock == 1),
        }
    }

    /// Lock toggles keep a per-instance poll on their flag
    fn polls(&self) -> bool {
        matches!(self, ToggleKind::ExposureLock | ToggleKind::WbLock)
    }
}

/// A placed toggle control
pub struct ToggleControl {
    context: String,
    toggle: ToggleKind,
    surface: Arc<dyn SurfaceControl>,
    settings: SettingsHandle,
    client: RwLock<Option<DeviceClient>>,
    on: RwLock<bool>,
    connected: RwLock<ConnectionState>,
    timer: Mutex<Option<JoinHandle<()>>>,
    // Handle on ourselves for spawning the poll task from &self
    self_weak: Weak<Self>,
}

impl ToggleControl {
    pub fn new(
        context: impl Into<String>,
        toggle: ToggleKind,
        surface: Arc<dyn SurfaceControl>,
        settings: SettingsHandle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            context: context.into(),
            toggle,
            surface,
            settings,
            client: RwLock::new(None),
            on: RwLock::new(false),
            connected: RwLock::new(ConnectionState::Unknown),
            timer: Mutex::new(None),
            self_weak: weak.clone(),
        })
    }

    fn ensure_client(&self, settings: &ActionSettings) -> DeviceResult<DeviceClient> {
        let host = settings
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or(DeviceError::NotConfigured)?;

        let mut guard = self.client.write();
        match guard.as_ref() {
            Some(client) if client.matches(host, settings.port) => Ok(client.clone()),
            _ => {
                let client = DeviceClient::new(host, settings.port);
                *guard = Some(client.clone());
                Ok(client)
            }
        }
    }

    async fn render_current(&self) {
        if !self.surface.is_key() {
            return;
        }
        let on = *self.on.read();
        match self.toggle {
            ToggleKind::Led => {
                self.surface.set_state(u8::from(on)).await;
                self.surface
                    .set_image(if on {
                        "icons/led-on.svg"
                    } else {
                        "icons/led-off.svg"
                    })
                    .await;
            }
            ToggleKind::Mic => {
                self.surface.set_state(u8::from(on)).await;
                self.surface
                    .set_image(if on {
                        "icons/mic-on.svg"
                    } else {
                        "icons/mic-off.svg"
                    })
                    .await;
            }
            ToggleKind::ExposureLock => {
                self.surface.set_state(u8::from(on)).await;
                self.surface.set_image("icons/exposure-control.svg").await;
                self.surface
                    .set_title(if on { "Locked" } else { "Unlocked" })
                    .await;
            }
            ToggleKind::WbLock => {
                self.surface.set_state(u8::from(on)).await;
                self.surface.set_image("icons/wb-control.svg").await;
                self.surface
                    .set_title(if on { "Locked" } else { "Unlocked" })
                    .await;
            }
        }
    }

    async fn render_disconnected(&self) {
        if self.surface.is_key() {
            self.surface.set_image(ICON_DISCONNECTED).await;
            self.surface.set_title("").await;
        }
    }

    /// Probe and refresh the resolved state where the device exposes one
    async fn check_connection(&self) -> bool {
        let settings = self.settings.load().await;
        let client = match self.ensure_client(&settings) {
            Ok(client) => client,
            Err(_) => {
                *self.connected.write() = ConnectionState::Unknown;
                self.render_disconnected().await;
                return false;
            }
        };

        match client.probe().await {
            Ok(identity) => {
                debug!("[{}] connected to {}", self.context, identity.model);
                *self.connected.write() = ConnectionState::Connected;

                if let Some(confirm) = self.toggle.confirm() {
                    if let Ok(snapshot) = client.camera_info().await {
                        *self.on.write() = confirm(&snapshot);
                    }
                }
                // The mic keeps its retained state: nothing to fetch

                self.render_current().await;
                true
            }
            Err(e) => {
                debug!("[{}] probe failed: {}", self.context, e);
                *self.connected.write() = ConnectionState::Disconnected;
                self.render_disconnected().await;
                false
            }
        }
    }

    fn start_polling(&self) {
        if !self.toggle.polls() {
            return;
        }

        let mut timer = self.timer.lock();
        if timer.is_some() {
            return;
        }

        let weak = self.self_weak.clone();
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(LOCK_POLL_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(control) = weak.upgrade() else { break };
                control.poll_flag().await;
            }
        }));
    }

    fn stop_polling(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    /// One lock-flag poll: re-render only when the flag changed
    async fn poll_flag(&self) {
        if *self.connected.read() != ConnectionState::Connected {
            return;
        }
        let Some(client) = self.client.read().clone() else {
            return;
        };
        let Some(confirm) = self.toggle.confirm() else {
            return;
        };

        match client.camera_info().await {
            Ok(snapshot) => {
                let fetched = confirm(&snapshot);
                let changed = {
                    let mut on = self.on.write();
                    let changed = *on != fetched;
                    *on = fetched;
                    changed
                };
                if changed {
                    info!("[{}] lock state drifted to {}", self.context, fetched);
                    self.render_current().await;
                }
            }
            Err(e) => debug!("[{}] lock poll failed: {}", self.context, e),
        }
    }
}

#[async_trait]
impl Action for ToggleControl {
    fn context(&self) -> &str {
        &self.context
    }

    fn kind(&self) -> ActionKind {
        self.toggle.action_kind()
    }

    async fn on_appear(&self) {
        let settings = self.settings.load_with_defaults(self.kind()).await;

        // Show the retained state right away; a probe refines it
        self.render_current().await;

        if settings.host.is_some() {
            self.check_connection().await;
            self.start_polling();
        } else {
            *self.connected.write() = ConnectionState::Unknown;
        }
    }

    async fn on_disappear(&self) {
        self.stop_polling();
    }

    async fn on_key_down(&self) {
        let settings = self.settings.load().await;
        let client = match self.ensure_client(&settings) {
            Ok(client) => client,
            Err(_) => {
                self.surface.show_alert().await;
                return;
            }
        };

        if client.probe().await.is_err() {
            warn!("[{}] device not connected", self.context);
            *self.connected.write() = ConnectionState::Disconnected;
            self.render_disconnected().await;
            self.surface.show_alert().await;
            return;
        }

        match self.toggle.send_toggle(&client).await {
            Ok(()) => {
                *self.connected.write() = ConnectionState::Connected;

                match self.toggle.confirm() {
                    Some(confirm) => {
                        // The command went through; the snapshot says what it did
                        if let Ok(snapshot) = client.camera_info().await {
                            *self.on.write() = confirm(&snapshot);
                        }
                    }
                    None => {
                        // No ground truth: flip the retained state
                        let mut on = self.on.write();
                        *on = !*on;
                    }
                }

                info!(
                    "[{}] toggled, now {}",
                    self.context,
                    if *self.on.read() { "on" } else { "off" }
                );
                self.render_current().await;
                self.surface.show_ok().await;
            }
            Err(e) => {
                warn!("[{}] toggle failed: {}", self.context, e);
                if self.toggle == ToggleKind::Mic {
                    self.render_disconnected().await;
                }
                self.surface.show_alert().await;
            }
        }
    }

    async fn on_settings_changed(&self) {
        self.stop_polling();
        *self.client.write() = None;

        let settings = self.settings.load().await;
        if settings.host.is_some() {
            self.check_connection().await;
            self.start_polling();
        } else {
            *self.connected.write() = ConnectionState::Unknown;
            self.render_disconnected().await;
        }
    }

    async fn on_inspector_message(&self, payload: &Value) {
        if payload.get("action").and_then(Value::as_str) == Some("testConnection")
            && payload
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        {
            self.check_connection().await;
            self.start_polling();
        }
    }
}

/// One-shot autofocus trigger
pub struct AutofocusControl {
    context: String,
    surface: Arc<dyn SurfaceControl>,
    settings: SettingsHandle,
    client: RwLock<Option<DeviceClient>>,
    connected: RwLock<ConnectionState>,
}

impl AutofocusControl {
    pub fn new(
        context: impl Into<String>,
        surface: Arc<dyn SurfaceControl>,
        settings: SettingsHandle,
    ) -> Arc<Self> {
        Arc::new(Self {
            context: context.into(),
            surface,
            settings,
            client: RwLock::new(None),
            connected: RwLock::new(ConnectionState::Unknown),
        })
    }

    fn ensure_client(&self, settings: &ActionSettings) -> DeviceResult<DeviceClient> {
        let host = settings
            .host
            .as_deref()
            .filter(|h| !h.is_empty())
            .ok_or(DeviceError::NotConfigured)?;

        let mut guard = self.client.write();
        match guard.as_ref() {
            Some(client) if client.matches(host, settings.port) => Ok(client.clone()),
            _ => {
                let client = DeviceClient::new(host, settings.port);
                *guard = Some(client.clone());
                Ok(client)
            }
        }
    }
}

#[async_trait]
impl Action for AutofocusControl {
    fn context(&self) -> &str {
        &self.context
    }

    fn kind(&self) -> ActionKind {
        ActionKind::AutofocusButton
    }

    async fn on_appear(&self) {
        let settings = self.settings.load().await;

        if self.surface.is_key() {
            self.surface.set_image("icons/autofocus.svg").await;
            self.surface.set_title("").await;
        }

        if settings.host.is_some() {
            if let Ok(client) = self.ensure_client(&settings) {
                let state = ConnectionState::from_probe(client.probe().await.is_ok());
                *self.connected.write() = state;
                if state == ConnectionState::Disconnected && self.surface.is_key() {
                    self.surface.set_image(ICON_DISCONNECTED).await;
                }
            }
        }
    }

    async fn on_disappear(&self) {}

    async fn on_key_down(&self) {
        let settings = self.settings.load().await;
        let client = match self.ensure_client(&settings) {
            Ok(client) => client,
            Err(_) => {
                self.surface.show_alert().await;
                return;
            }
        };

        if client.probe().await.is_err() {
            warn!("[{}] device not connected", self.context);
            *self.connected.write() = ConnectionState::Disconnected;
            if self.surface.is_key() {
                self.surface.set_image(ICON_DISCONNECTED).await;
                self.surface.set_title("").await;
            }
            self.surface.show_alert().await;
            return;
        }

        match client.autofocus().await {
            Ok(()) => {
                info!("[{}] autofocus triggered", self.context);
                *self.connected.write() = ConnectionState::Connected;
                if self.surface.is_key() {
                    self.surface.show_ok().await;
                    self.surface.set_title("AF...").await;

                    // Brief focusing indicator, cleared out of band
                    let surface = self.surface.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        surface.set_title("").await;
                    });
                }
            }
            Err(e) => {
                warn!("[{}] autofocus failed: {}", self.context, e);
                self.surface.show_alert().await;
            }
        }
    }

    async fn on_settings_changed(&self) {
        *self.client.write() = None;
        self.on_appear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::{camera_info_with, client_for};
    use crate::settings::SettingsStore;
    use crate::surface::testing::RecordingControl;
    use tempfile::TempDir;

    struct Fixture {
        store: SettingsStore,
        _temp: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = tempfile::tempdir().unwrap();
            let store = SettingsStore::spawn(&temp.path().join("settings.sled"), 0).unwrap();
            Self { store, _temp: temp }
        }

        async fn configure(&self, context: &str, server: &mockito::ServerGuard) {
            let client = client_for(server);
            let settings = ActionSettings {
                host: Some(client.host().to_string()),
                port: client.port(),
                ..ActionSettings::default()
            };
            self.store.save(context, settings).await.unwrap();
        }

        fn toggle(
            &self,
            context: &str,
            kind: ToggleKind,
        ) -> (Arc<ToggleControl>, Arc<RecordingControl>) {
            let surface = RecordingControl::new(context, true);
            let control =
                ToggleControl::new(context, kind, surface.clone(), self.store.handle_for(context));
            (control, surface)
        }
    }

    async fn mock_probe(server: &mut mockito::ServerGuard) -> mockito::Mock {
        server
            .mock("GET", "/v1/phone/name")
            .with_status(200)
            .with_body("Pixel 8")
            .create_async()
            .await
    }

    #[tokio::test]
    async fn led_press_confirms_state_from_snapshot() {
        let mut server = mockito::Server::new_async().await;
        mock_probe(&mut server).await;
        server
            .mock("PUT", "/v1/camera/torch_toggle")
            .with_status(200)
            .create_async()
            .await;
        // led_on == 0 means the torch is lit
        server
            .mock("GET", "/v1/camera/info")
            .with_status(200)
            .with_body(camera_info_with(&[("led_on", "0")]))
            .create_async()
            .await;

        let fx = Fixture::new();
        fx.configure("led-1", &server).await;
        let (control, surface) = fx.toggle("led-1", ToggleKind::Led);

        control.on_key_down().await;

        assert!(*control.on.read());
        assert!(surface.images().contains(&"icons/led-on.svg".to_string()));
        assert_eq!(surface.ok_count(), 1);
    }

    #[tokio::test]
    async fn mic_flips_locally_and_never_fetches_a_snapshot() {
        let mut server = mockito::Server::new_async().await;
        mock_probe(&mut server).await;
        server
            .mock("PUT", "/v1/camera/mic_toggle")
            .with_status(200)
            .create_async()
            .await;
        let info_mock = server
            .mock("GET", "/v1/camera/info")
            .expect(0)
            .create_async()
            .await;

        let fx = Fixture::new();
        fx.configure("mic-1", &server).await;
        let (control, surface) = fx.toggle("mic-1", ToggleKind::Mic);

        control.on_key_down().await;

        assert!(*control.on.read(), "default muted, one press turns it on");
        assert!(surface.images().contains(&"icons/mic-on.svg".to_string()));
        info_mock.assert_async().await;
    }

    #[tokio::test]
    async fn mic_state_survives_a_reconnect_probe() {
        let mut server = mockito::Server::new_async().await;
        mock_probe(&mut server).await;

        let fx = Fixture::new();
        fx.configure("mic-1", &server).await;
        let (control, _surface) = fx.toggle("mic-1", ToggleKind::Mic);
        *control.on.write() = true;

        assert!(control.check_connection().await);
        assert!(
            *control.on.read(),
            "no ground truth for the mic: retained state must not reset"
        );
    }

    #[tokio::test]
    async fn exposure_lock_renders_confirmed_lock_state() {
        let mut server = mockito::Server::new_async().await;
        mock_probe(&mut server).await;
        server
            .mock("PUT", "/v1/camera/el_toggle")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("GET", "/v1/camera/info")
            .with_status(200)
            .with_body(camera_info_with(&[("exposure_lock", "1")]))
            .create_async()
            .await;

        let fx = Fixture::new();
        fx.configure("el-1", &server).await;
        let (control, surface) = fx.toggle("el-1", ToggleKind::ExposureLock);

        control.on_key_down().await;

        assert!(*control.on.read());
        assert_eq!(surface.titles().last().map(String::as_str), Some("Locked"));
    }

    #[tokio::test]
    async fn lock_poll_rerenders_only_on_drift() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/camera/info")
            .with_status(200)
            .with_body(camera_info_with(&[("wbLock", "1")]))
            .create_async()
            .await;

        let fx = Fixture::new();
        fx.configure("wbl-1", &server).await;
        let (control, surface) = fx.toggle("wbl-1", ToggleKind::WbLock);
        *control.connected.write() = ConnectionState::Connected;
        control
            .ensure_client(&fx.store.load("wbl-1").await.unwrap().unwrap())
            .unwrap();

        control.poll_flag().await;
        let renders_after_first = surface.calls.lock().len();
        assert!(*control.on.read());
        assert!(renders_after_first > 0);

        // Same flag again: nothing re-renders
        control.poll_flag().await;
        assert_eq!(surface.calls.lock().len(), renders_after_first);
    }

    #[tokio::test]
    async fn toggle_failure_alerts_and_keeps_state() {
        let mut server = mockito::Server::new_async().await;
        mock_probe(&mut server).await;
        server
            .mock("PUT", "/v1/camera/torch_toggle")
            .with_status(500)
            .create_async()
            .await;

        let fx = Fixture::new();
        fx.configure("led-1", &server).await;
        let (control, surface) = fx.toggle("led-1", ToggleKind::Led);

        control.on_key_down().await;

        assert!(!*control.on.read());
        assert_eq!(surface.alert_count(), 1);
        assert_eq!(surface.ok_count(), 0);
    }

    #[tokio::test]
    async fn autofocus_press_flashes_and_marks_focusing() {
        let mut server = mockito::Server::new_async().await;
        mock_probe(&mut server).await;
        server
            .mock("PUT", "/v1/camera/autofocus")
            .with_status(200)
            .create_async()
            .await;

        let fx = Fixture::new();
        fx.configure("af-1", &server).await;
        let surface = RecordingControl::new("af-1", true);
        let control =
            AutofocusControl::new("af-1", surface.clone(), fx.store.handle_for("af-1"));

        control.on_key_down().await;

        assert_eq!(surface.ok_count(), 1);
        assert!(surface.titles().contains(&"AF...".to_string()));
    }

    #[tokio::test]
    async fn unconfigured_toggle_alerts_without_network() {
        let fx = Fixture::new();
        let (control, surface) = fx.toggle("led-1", ToggleKind::Led);

        control.on_key_down().await;

        assert_eq!(surface.alert_count(), 1);
    }
}
