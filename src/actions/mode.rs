//! Mode-select controls (white balance, focus) and the camera switch
//!
//! A mode button always drives one configured target mode; pressing it asks
//! the device for that mode and, on success, broadcasts the new current
//! mode to every sibling so their caches agree. The white balance manual
//! sentinel (mode 8) goes through the manual-level endpoint instead of the
//! mode endpoint.

use super::poller::SharedPoller;
use super::registry::SyncTarget;
use super::{Action, ActionKind, ConnectionState, ICON_DISCONNECTED};
use crate::device::{CameraInfo, DeviceClient, DeviceError, DeviceResult};
use crate::settings::{ActionSettings, SettingsHandle};
use crate::surface::SurfaceControl;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// White balance manual mode sentinel
pub const WB_MANUAL_MODE: u8 = 8;

/// Display name and icon for one selectable mode
#[derive(Debug, Clone, Copy)]
pub struct ModeInfo {
    pub mode: u8,
    pub name: &'static str,
    pub icon: &'static str,
}

pub const WB_MODES: [ModeInfo; 9] = [
    ModeInfo { mode: 0, name: "Auto", icon: "icons/wb-auto.svg" },
    ModeInfo { mode: 1, name: "Incandescent", icon: "icons/wb-incandescent.svg" },
    ModeInfo { mode: 2, name: "Fluorescent", icon: "icons/wb-fluorescent.svg" },
    ModeInfo { mode: 3, name: "Warm Fluor.", icon: "icons/wb-warm-fluorescent.svg" },
    ModeInfo { mode: 4, name: "Daylight", icon: "icons/wb-daylight.svg" },
    ModeInfo { mode: 5, name: "Cloudy", icon: "icons/wb-cloudy.svg" },
    ModeInfo { mode: 6, name: "Twilight", icon: "icons/wb-twilight.svg" },
    ModeInfo { mode: 7, name: "Shade", icon: "icons/wb-shade.svg" },
    ModeInfo { mode: 8, name: "Manual", icon: "icons/wb-manual.svg" },
];

pub const FOCUS_MODES: [ModeInfo; 4] = [
    ModeInfo { mode: 0, name: "Normal", icon: "icons/focus-normal.svg" },
    ModeInfo { mode: 1, name: "Macro", icon: "icons/focus-macro.svg" },
    ModeInfo { mode: 2, name: "Continuous", icon: "icons/focus-continuous.svg" },
    ModeInfo { mode: 3, name: "Infinity", icon: "icons/focus-infinity.svg" },
];

/// Which mode family a button selects from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeFamily {
    WhiteBalance,
    Focus,
}

impl ModeFamily {
    fn action_kind(&self) -> ActionKind {
        match self {
            ModeFamily::WhiteBalance => ActionKind::WbModeButton,
            ModeFamily::Focus => ActionKind::FocusModeButton,
        }
    }

    fn table(&self) -> &'static [ModeInfo] {
        match self {
            ModeFamily::WhiteBalance => &WB_MODES,
            ModeFamily::Focus => &FOCUS_MODES,
        }
    }

    fn info_for(&self, mode: u8) -> ModeInfo {
        let table = self.table();
        table
            .iter()
            .copied()
            .find(|m| m.mode == mode)
            .unwrap_or(table[0])
    }

    fn current(&self, info: &CameraInfo) -> u8 {
        match self {
            ModeFamily::WhiteBalance => info.wb_mode as u8,
            ModeFamily::Focus => info.focus_mode as u8,
        }
    }
}

/// A placed mode-select button
pub struct ModeControl {
    context: String,
    family: ModeFamily,
    surface: Arc<dyn SurfaceControl>,
    settings: SettingsHandle,
    poller: Arc<SharedPoller>,
    client: RwLock<Option<DeviceClient>>,
    current_mode: RwLock<u8>,
    connected: RwLock<ConnectionState>,
}

impl ModeControl {
    pub fn new(
        context: impl Into<String>,
        family: ModeFamily,
        surface: Arc<dyn SurfaceControl>,
        settings: SettingsHandle,
        poller: Arc<SharedPoller>,
    ) -> Arc<Self> {
        let control = Arc::new(Self {
            context: context.into(),
            family,
            surface,
            settings,
            poller: poller.clone(),
            client: RwLock::new(None),
            current_mode: RwLock::new(0),
            connected: RwLock::new(ConnectionState::Unknown),
        });

        poller.register(control.clone() as Arc<dyn SyncTarget>);
        control
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

    /// Render this button's own target-mode face
    ///
    /// Each placement shows the mode it would select, not the device's
    /// current mode, so a wall of WB presets stays readable.
    async fn render_target(&self, settings: &ActionSettings) {
        if !self.surface.is_key() {
            return;
        }
        let target = settings.target_mode.unwrap_or(0);
        let info = self.family.info_for(target);
        self.surface.set_image(info.icon).await;
        self.surface.set_title(info.name).await;
    }

    async fn render_disconnected(&self) {
        if self.surface.is_key() {
            self.surface.set_image(ICON_DISCONNECTED).await;
            self.surface.set_title("").await;
        }
    }

    async fn check_connection(&self, settings: &ActionSettings) {
        let Ok(client) = self.ensure_client(settings) else {
            *self.connected.write() = ConnectionState::Unknown;
            return;
        };

        match client.probe().await {
            Ok(_) => {
                *self.connected.write() = ConnectionState::Connected;
                if let Ok(snapshot) = client.camera_info().await {
                    let device_mode = self.family.current(&snapshot);
                    let cached = *self.current_mode.read();
                    if cached != device_mode {
                        debug!(
                            "[{}] device mode ({}) differs from cached ({})",
                            self.context, device_mode, cached
                        );
                    }
                }
                self.render_target(settings).await;
            }
            Err(e) => {
                debug!("[{}] probe failed: {}", self.context, e);
                *self.connected.write() = ConnectionState::Disconnected;
                self.render_disconnected().await;
            }
        }
    }
}

#[async_trait]
impl Action for ModeControl {
    fn context(&self) -> &str {
        &self.context
    }

    fn kind(&self) -> ActionKind {
        self.family.action_kind()
    }

    async fn on_appear(&self) {
        let settings = self.settings.load_with_defaults(self.kind()).await;

        if settings.host.is_some() {
            self.check_connection(&settings).await;
        } else {
            self.render_target(&settings).await;
        }
    }

    async fn on_disappear(&self) {
        self.poller.unregister(&self.context);
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

        let target = settings.target_mode.unwrap_or(0);

        // The manual sentinel is set by writing a level, not a mode
        let result = if self.family == ModeFamily::WhiteBalance && target == WB_MANUAL_MODE {
            let level = settings.manual_value.unwrap_or(60.0);
            info!("[{}] manual WB selected, level {}", self.context, level);
            client.set_wb_level(level).await
        } else {
            match self.family {
                ModeFamily::WhiteBalance => client.set_wb_mode(target).await,
                ModeFamily::Focus => client.set_focus_mode(target).await,
            }
        };

        match result {
            Ok(()) => {
                *self.current_mode.write() = target;
                *self.connected.write() = ConnectionState::Connected;
                info!(
                    "[{}] mode set to {} ({})",
                    self.context,
                    target,
                    self.family.info_for(target).name
                );
                self.poller.broadcast(f64::from(target), 0.0, 0.0).await;
                if self.surface.is_key() {
                    self.surface.show_ok().await;
                }
            }
            Err(e) => {
                warn!("[{}] mode set failed: {}", self.context, e);
                if self.surface.is_key() {
                    self.surface.show_alert().await;
                }
            }
        }
    }

    async fn on_settings_changed(&self) {
        *self.client.write() = None;

        let settings = self.settings.load().await;
        if settings.host.is_some() {
            self.check_connection(&settings).await;
        } else {
            *self.connected.write() = ConnectionState::Unknown;
            self.render_target(&settings).await;
        }
    }

    async fn on_inspector_message(&self, payload: &Value) {
        if payload.get("action").and_then(Value::as_str) == Some("testConnection")
            && payload
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        {
            let settings = self.settings.load().await;
            self.check_connection(&settings).await;
        }
    }
}

#[async_trait]
impl SyncTarget for ModeControl {
    fn sync_id(&self) -> &str {
        &self.context
    }

    fn poll_client(&self) -> Option<DeviceClient> {
        self.client.read().clone()
    }

    fn cached_value(&self) -> f64 {
        f64::from(*self.current_mode.read())
    }

    async fn apply_remote_value(&self, value: f64, _min: f64, _max: f64) {
        *self.current_mode.write() = value as u8;
        let settings = self.settings.load().await;
        self.render_target(&settings).await;
    }
}

/// Front/back camera switch
///
/// The device reports the active index in its snapshot; a press flips the
/// cached index optimistically and flips it back if the switch is refused.
pub struct CameraSwitchControl {
    context: String,
    surface: Arc<dyn SurfaceControl>,
    settings: SettingsHandle,
    client: RwLock<Option<DeviceClient>>,
    current_camera: RwLock<u8>,
    connected: RwLock<ConnectionState>,
}

impl CameraSwitchControl {
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
            current_camera: RwLock::new(0),
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

    fn camera_title(index: u8) -> &'static str {
        if index == 0 {
            "Back"
        } else {
            "Front"
        }
    }

    async fn render_current(&self) {
        if !self.surface.is_key() {
            return;
        }
        let index = *self.current_camera.read();
        self.surface.set_state(index).await;
        self.surface.set_image("icons/camera-switch.svg").await;
        self.surface.set_title(Self::camera_title(index)).await;
    }

    async fn render_disconnected(&self) {
        if self.surface.is_key() {
            self.surface.set_image(ICON_DISCONNECTED).await;
            self.surface.set_title("").await;
        }
    }

    async fn check_connection(&self, settings: &ActionSettings) {
        let Ok(client) = self.ensure_client(settings) else {
            *self.connected.write() = ConnectionState::Unknown;
            self.render_disconnected().await;
            return;
        };

        match client.camera_info().await {
            Ok(snapshot) => {
                *self.connected.write() = ConnectionState::Connected;
                *self.current_camera.write() = snapshot.active.clamp(0, 1) as u8;
                self.render_current().await;
            }
            Err(e) => {
                debug!("[{}] snapshot failed: {}", self.context, e);
                *self.connected.write() = ConnectionState::Disconnected;
                self.render_disconnected().await;
            }
        }
    }
}

#[async_trait]
impl Action for CameraSwitchControl {
    fn context(&self) -> &str {
        &self.context
    }

    fn kind(&self) -> ActionKind {
        ActionKind::CameraSwitch
    }

    async fn on_appear(&self) {
        let settings = self.settings.load().await;
        if settings.host.is_some() {
            self.check_connection(&settings).await;
        } else {
            *self.connected.write() = ConnectionState::Unknown;
            self.render_disconnected().await;
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
            self.render_disconnected().await;
            self.surface.show_alert().await;
            return;
        }

        // Optimistic flip; rolled back if the device refuses
        let target = {
            let mut camera = self.current_camera.write();
            *camera = 1 - *camera;
            *camera
        };

        match client.switch_camera(target).await {
            Ok(()) => {
                info!("[{}] switched to camera {}", self.context, target);
                *self.connected.write() = ConnectionState::Connected;
                self.render_current().await;
                if self.surface.is_key() {
                    self.surface.show_ok().await;
                }
            }
            Err(e) => {
                warn!("[{}] camera switch failed: {}", self.context, e);
                {
                    let mut camera = self.current_camera.write();
                    *camera = 1 - *camera;
                }
                self.render_disconnected().await;
                if self.surface.is_key() {
                    self.surface.show_alert().await;
                }
            }
        }
    }

    async fn on_settings_changed(&self) {
        *self.client.write() = None;

        let settings = self.settings.load().await;
        if settings.host.is_some() {
            self.check_connection(&settings).await;
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
            let settings = self.settings.load().await;
            self.check_connection(&settings).await;
        }
    }
}
