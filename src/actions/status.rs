//! Status displays: connection, battery, stop/restart
//!
//! Each status control owns a per-instance timer at a user-configurable
//! interval and suppresses redundant redraws: the surface is only touched
//! when the resolved state actually changed tick-to-tick.

use super::{Action, ActionKind, ConnectionState, RenderState, ICON_DISCONNECTED};
use crate::device::{DeviceClient, DeviceError, DeviceResult};
use crate::settings::{ActionSettings, SettingsHandle};
use crate::surface::SurfaceControl;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Poll interval for the stop/restart state probe
const STOP_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Delay before re-probing after a restart request
const RESTART_SETTLE: Duration = Duration::from_secs(2);

/// Delay before settling the display after a stop request
const STOP_SETTLE: Duration = Duration::from_millis(500);

fn ensure_client(
    slot: &RwLock<Option<DeviceClient>>,
    settings: &ActionSettings,
) -> DeviceResult<DeviceClient> {
    let host = settings
        .host
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or(DeviceError::NotConfigured)?;

    let mut guard = slot.write();
    match guard.as_ref() {
        Some(client) if client.matches(host, settings.port) => Ok(client.clone()),
        _ => {
            let client = DeviceClient::new(host, settings.port);
            *guard = Some(client.clone());
            Ok(client)
        }
    }
}

/// Connectivity indicator with scheduled and manual probes
///
/// Scheduled probes are serialized by a boolean in-progress guard: a tick
/// that finds one outstanding is skipped. A manual probe bypasses the guard,
/// may interleave with an in-flight scheduled probe, and always renders a
/// terminal ok/alert flash. Both paths write the same state; the last one to
/// resolve wins.
pub struct ConnectionStatusControl {
    context: String,
    surface: Arc<dyn SurfaceControl>,
    settings: SettingsHandle,
    client: RwLock<Option<DeviceClient>>,
    connected: RwLock<ConnectionState>,
    check_in_progress: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    render: RenderState,
    self_weak: Weak<Self>,
}

impl ConnectionStatusControl {
    pub fn new(
        context: impl Into<String>,
        surface: Arc<dyn SurfaceControl>,
        settings: SettingsHandle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            context: context.into(),
            surface,
            settings,
            client: RwLock::new(None),
            connected: RwLock::new(ConnectionState::Unknown),
            check_in_progress: AtomicBool::new(false),
            timer: Mutex::new(None),
            render: RenderState::default(),
            self_weak: weak.clone(),
        })
    }

    async fn render_status(&self, connected: bool, settings: &ActionSettings) {
        if !self.surface.is_key() {
            return;
        }
        self.render
            .apply_state(&self.surface, u8::from(connected))
            .await;
        self.render
            .apply_image(
                &self.surface,
                if connected {
                    "icons/connected"
                } else {
                    ICON_DISCONNECTED
                },
            )
            .await;

        let title = settings
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or("");
        self.render.apply_title(&self.surface, title).await;
    }

    /// Run one probe and reconcile the rendered status
    pub async fn check(&self, manual: bool) {
        let settings = self.settings.load().await;
        let client = match ensure_client(&self.client, &settings) {
            Ok(client) => client,
            Err(_) => {
                *self.connected.write() = ConnectionState::Disconnected;
                self.render_status(false, &settings).await;
                if manual {
                    self.surface.show_alert().await;
                }
                return;
            }
        };

        if !manual && self.check_in_progress.load(Ordering::SeqCst) {
            debug!("[{}] probe already in flight, skipping tick", self.context);
            return;
        }
        self.check_in_progress.store(true, Ordering::SeqCst);

        let previous = *self.connected.read();
        let resolved = match client.probe().await {
            Ok(identity) => {
                debug!("[{}] connected to {}", self.context, identity.model);
                ConnectionState::Connected
            }
            Err(e) => {
                debug!("[{}] probe failed: {}", self.context, e);
                ConnectionState::Disconnected
            }
        };
        *self.connected.write() = resolved;

        // Redraw only when the resolved state flipped; the flash below is
        // the manual probe's own terminal indicator
        if resolved != previous {
            info!(
                "[{}] connection state: {:?} -> {:?}",
                self.context, previous, resolved
            );
            self.render_status(resolved == ConnectionState::Connected, &settings)
                .await;
        }

        if manual {
            if resolved == ConnectionState::Connected {
                self.surface.show_ok().await;
            } else {
                self.surface.show_alert().await;
            }
        }

        self.check_in_progress.store(false, Ordering::SeqCst);
    }

    fn start_auto_check(&self, interval_secs: u64) {
        self.stop_auto_check();

        let weak = self.self_weak.clone();
        let interval = Duration::from_secs(interval_secs.max(1));
        *self.timer.lock() = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(control) = weak.upgrade() else { break };
                control.check(false).await;
            }
        }));
    }

    fn stop_auto_check(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Action for ConnectionStatusControl {
    fn context(&self) -> &str {
        &self.context
    }

    fn kind(&self) -> ActionKind {
        ActionKind::ConnectionStatus
    }

    async fn on_appear(&self) {
        let settings = self.settings.load_with_defaults(self.kind()).await;

        if settings.host.is_some() {
            self.check(false).await;
            self.start_auto_check(settings.check_interval.unwrap_or(5));
        } else {
            self.render_status(false, &settings).await;
        }
    }

    async fn on_disappear(&self) {
        self.stop_auto_check();
    }

    async fn on_key_down(&self) {
        let settings = self.settings.load().await;
        if settings.host.is_none() {
            self.surface.show_alert().await;
            return;
        }
        self.check(true).await;
    }

    async fn on_settings_changed(&self) {
        self.stop_auto_check();
        *self.client.write() = None;

        let settings = self.settings.load().await;
        if settings.host.is_some() {
            self.check(false).await;
            self.start_auto_check(settings.check_interval.unwrap_or(5));
        } else {
            *self.connected.write() = ConnectionState::Disconnected;
            self.render_status(false, &settings).await;
        }
    }

    /// Test-connection round trip with the settings UI
    async fn on_inspector_message(&self, payload: &Value) {
        if payload.get("action").and_then(Value::as_str) != Some("testConnection") {
            return;
        }

        let settings = self.settings.load().await;
        let host = payload
            .get("host")
            .and_then(Value::as_str)
            .map(String::from)
            .or_else(|| settings.host.clone());
        let port = payload
            .get("port")
            .and_then(Value::as_u64)
            .map(|p| p as u16)
            .unwrap_or(settings.port);

        let Some(host) = host else {
            self.surface
                .send_to_inspector(json!({
                    "event": "testConnectionResult",
                    "success": false,
                    "error": "device host is required",
                }))
                .await;
            return;
        };

        let probe_client = DeviceClient::new(host, port);
        match probe_client.probe().await {
            Ok(identity) => {
                info!("[{}] test connection ok: {}", self.context, identity.model);
                self.surface
                    .send_to_inspector(json!({
                        "event": "testConnectionResult",
                        "success": true,
                        "deviceName": identity.model,
                    }))
                    .await;
                // Refresh the rendered status with the stored settings
                self.check(false).await;
            }
            Err(e) => {
                self.surface
                    .send_to_inspector(json!({
                        "event": "testConnectionResult",
                        "success": false,
                        "error": e.to_string(),
                    }))
                    .await;
            }
        }
    }
}

/// Battery tier icon; thresholds come from the control's settings
fn battery_icon(level: u8, charging: bool, warning: u8, critical: u8) -> &'static str {
    if charging {
        return "icons/battery-charging";
    }
    if level <= critical {
        "icons/battery-0"
    } else if level <= warning {
        "icons/battery-25"
    } else if level <= 60 {
        "icons/battery-50"
    } else if level <= 80 {
        "icons/battery-75"
    } else {
        "icons/battery-100"
    }
}

/// Phone battery indicator
pub struct BatteryStatusControl {
    context: String,
    surface: Arc<dyn SurfaceControl>,
    settings: SettingsHandle,
    client: RwLock<Option<DeviceClient>>,
    connected: RwLock<ConnectionState>,
    level: RwLock<u8>,
    charging: RwLock<bool>,
    timer: Mutex<Option<JoinHandle<()>>>,
    self_weak: Weak<Self>,
}

impl BatteryStatusControl {
    pub fn new(
        context: impl Into<String>,
        surface: Arc<dyn SurfaceControl>,
        settings: SettingsHandle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            context: context.into(),
            surface,
            settings,
            client: RwLock::new(None),
            connected: RwLock::new(ConnectionState::Unknown),
            level: RwLock::new(0),
            charging: RwLock::new(false),
            timer: Mutex::new(None),
            self_weak: weak.clone(),
        })
    }

    async fn render_battery(&self, connected: bool, settings: &ActionSettings) {
        if !self.surface.is_key() {
            return;
        }

        if !connected {
            self.surface.set_image(ICON_DISCONNECTED).await;
            self.surface.set_title("").await;
            return;
        }

        let level = *self.level.read();
        let charging = *self.charging.read();
        let icon = battery_icon(
            level,
            charging,
            settings.warning_level.unwrap_or(30),
            settings.critical_level.unwrap_or(15),
        );
        self.surface.set_image(icon).await;

        if let Some(title) = settings
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            self.surface.set_title(title).await;
        } else if settings.show_percentage.unwrap_or(true) {
            self.surface.set_title(&format!("{}%", level)).await;
        } else {
            self.surface.set_title("").await;
        }
    }

    /// Fetch the battery report; returns whether level or charging changed
    async fn fetch_battery(&self, client: &DeviceClient) -> DeviceResult<bool> {
        let battery = client.battery_info().await?;
        let level = battery.level.round().clamp(0.0, 100.0) as u8;
        let charging = battery.amps > 0.0;

        let changed = {
            let mut cached_level = self.level.write();
            let mut cached_charging = self.charging.write();
            let changed = *cached_level != level || *cached_charging != charging;
            *cached_level = level;
            *cached_charging = charging;
            changed
        };
        Ok(changed)
    }

    async fn check_connection(&self, settings: &ActionSettings) {
        let Ok(client) = ensure_client(&self.client, settings) else {
            *self.connected.write() = ConnectionState::Disconnected;
            self.render_battery(false, settings).await;
            return;
        };

        match client.probe().await {
            Ok(_) => {
                *self.connected.write() = ConnectionState::Connected;
                if let Err(e) = self.fetch_battery(&client).await {
                    debug!("[{}] battery fetch failed: {}", self.context, e);
                }
                self.render_battery(true, settings).await;
            }
            Err(e) => {
                debug!("[{}] probe failed: {}", self.context, e);
                *self.connected.write() = ConnectionState::Disconnected;
                self.render_battery(false, settings).await;
            }
        }
    }

    /// One poll tick: re-render only when the report changed
    async fn poll_battery(&self) {
        if *self.connected.read() != ConnectionState::Connected {
            return;
        }
        let Some(client) = self.client.read().clone() else {
            return;
        };

        match self.fetch_battery(&client).await {
            Ok(true) => {
                let settings = self.settings.load().await;
                info!(
                    "[{}] battery {}%, charging: {}",
                    self.context,
                    *self.level.read(),
                    *self.charging.read()
                );
                self.render_battery(true, &settings).await;
            }
            Ok(false) => {}
            Err(e) => debug!("[{}] battery poll failed: {}", self.context, e),
        }
    }

    fn start_polling(&self, interval_secs: u64) {
        self.stop_polling();

        let weak = self.self_weak.clone();
        let interval = Duration::from_secs(interval_secs.max(1));
        *self.timer.lock() = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(control) = weak.upgrade() else { break };
                control.poll_battery().await;
            }
        }));
    }

    fn stop_polling(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl Action for BatteryStatusControl {
    fn context(&self) -> &str {
        &self.context
    }

    fn kind(&self) -> ActionKind {
        ActionKind::BatteryStatus
    }

    async fn on_appear(&self) {
        let settings = self.settings.load_with_defaults(self.kind()).await;

        if settings.host.is_some() {
            self.check_connection(&settings).await;
            self.start_polling(settings.polling_interval.unwrap_or(10));
        } else {
            self.render_battery(false, &settings).await;
        }
    }

    async fn on_disappear(&self) {
        self.stop_polling();
    }

    async fn on_key_down(&self) {
        let settings = self.settings.load().await;
        let client = match ensure_client(&self.client, &settings) {
            Ok(client) => client,
            Err(_) => {
                self.surface.show_alert().await;
                return;
            }
        };

        match self.fetch_battery(&client).await {
            Ok(_) => {
                *self.connected.write() = ConnectionState::Connected;
                self.render_battery(true, &settings).await;
                self.surface.show_ok().await;
            }
            Err(e) => {
                warn!("[{}] battery fetch failed: {}", self.context, e);
                self.surface.show_alert().await;
            }
        }
    }

    async fn on_settings_changed(&self) {
        self.stop_polling();
        *self.client.write() = None;

        let settings = self.settings.load().await;
        if settings.host.is_some() {
            self.check_connection(&settings).await;
            self.start_polling(settings.polling_interval.unwrap_or(10));
        } else {
            *self.connected.write() = ConnectionState::Disconnected;
            self.render_battery(false, &settings).await;
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
            if self.timer.lock().is_none() {
                self.start_polling(settings.polling_interval.unwrap_or(10));
            }
        }
    }
}

/// Stop/restart control
///
/// A short-timeout probe decides which verb a press performs. The processing
/// guard swallows presses while a stop/restart sequence (including its
/// settle delay) is still in flight.
pub struct StopRestartControl {
    context: String,
    surface: Arc<dyn SurfaceControl>,
    settings: SettingsHandle,
    client: RwLock<Option<DeviceClient>>,
    connected: RwLock<ConnectionState>,
    stopped: RwLock<bool>,
    processing: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
    self_weak: Weak<Self>,
}

impl StopRestartControl {
    pub fn new(
        context: impl Into<String>,
        surface: Arc<dyn SurfaceControl>,
        settings: SettingsHandle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            context: context.into(),
            surface,
            settings,
            client: RwLock::new(None),
            connected: RwLock::new(ConnectionState::Unknown),
            stopped: RwLock::new(false),
            processing: AtomicBool::new(false),
            timer: Mutex::new(None),
            self_weak: weak.clone(),
        })
    }

    async fn render(&self, connected: bool, stopped: bool) {
        if !self.surface.is_key() {
            return;
        }
        if !connected {
            self.surface.set_image(ICON_DISCONNECTED).await;
            self.surface.set_title("").await;
        } else if stopped {
            self.surface.set_image("icons/stop-restart.svg").await;
            self.surface.set_title("START").await;
        } else {
            self.surface.set_image("icons/stop.svg").await;
            self.surface.set_title("STOP").await;
        }
    }

    async fn check_and_render(&self) {
        let settings = self.settings.load().await;
        let Ok(client) = ensure_client(&self.client, &settings) else {
            *self.connected.write() = ConnectionState::Disconnected;
            self.render(false, false).await;
            return;
        };

        let stopped = client.is_stopped().await;
        *self.stopped.write() = stopped;
        *self.connected.write() = ConnectionState::Connected;
        debug!(
            "[{}] device is {}",
            self.context,
            if stopped { "stopped" } else { "running" }
        );
        self.render(true, stopped).await;
    }

    fn start_polling(&self) {
        self.stop_polling();

        let weak = self.self_weak.clone();
        *self.timer.lock() = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(STOP_POLL_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(control) = weak.upgrade() else { break };
                control.poll_state().await;
            }
        }));
    }

    fn stop_polling(&self) {
        if let Some(handle) = self.timer.lock().take() {
            handle.abort();
        }
    }

    async fn poll_state(&self) {
        if *self.connected.read() != ConnectionState::Connected
            || self.processing.load(Ordering::SeqCst)
        {
            return;
        }
        let Some(client) = self.client.read().clone() else {
            return;
        };

        let stopped = client.is_stopped().await;
        let changed = {
            let mut cached = self.stopped.write();
            let changed = *cached != stopped;
            *cached = stopped;
            changed
        };
        if changed {
            info!(
                "[{}] state changed to {}",
                self.context,
                if stopped { "stopped" } else { "running" }
            );
            self.render(true, stopped).await;
        }
    }
}

#[async_trait]
impl Action for StopRestartControl {
    fn context(&self) -> &str {
        &self.context
    }

    fn kind(&self) -> ActionKind {
        ActionKind::StopRestart
    }

    async fn on_appear(&self) {
        let settings = self.settings.load().await;
        if settings.host.is_some() {
            self.check_and_render().await;
            self.start_polling();
        } else {
            self.render(false, false).await;
        }
    }

    async fn on_disappear(&self) {
        self.stop_polling();
    }

    async fn on_key_down(&self) {
        if self.processing.load(Ordering::SeqCst) {
            debug!("[{}] already processing, ignoring press", self.context);
            return;
        }

        let settings = self.settings.load().await;
        let client = match ensure_client(&self.client, &settings) {
            Ok(client) => client,
            Err(_) => {
                self.surface.show_alert().await;
                return;
            }
        };

        self.processing.store(true, Ordering::SeqCst);
        let stopped = client.is_stopped().await;

        if stopped {
            info!("[{}] restarting device", self.context);
            // Optimistic: show the running face while the restart lands
            self.render(true, false).await;

            match client.restart().await {
                Ok(()) => {
                    *self.stopped.write() = false;
                    self.surface.show_ok().await;

                    // Give the server a moment to come back before re-probing
                    let weak = self.self_weak.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(RESTART_SETTLE).await;
                        if let Some(control) = weak.upgrade() {
                            control.processing.store(false, Ordering::SeqCst);
                            control.check_and_render().await;
                        }
                    });
                }
                Err(e) => {
                    warn!("[{}] restart failed: {}", self.context, e);
                    self.processing.store(false, Ordering::SeqCst);
                    self.surface.show_alert().await;
                }
            }
        } else {
            info!("[{}] stopping device", self.context);
            self.render(true, true).await;

            match client.stop().await {
                Ok(()) => {
                    *self.stopped.write() = true;
                    self.surface.show_ok().await;

                    let weak = self.self_weak.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(STOP_SETTLE).await;
                        if let Some(control) = weak.upgrade() {
                            control.processing.store(false, Ordering::SeqCst);
                            control.render(true, true).await;
                        }
                    });
                }
                Err(e) => {
                    warn!("[{}] stop failed: {}", self.context, e);
                    self.processing.store(false, Ordering::SeqCst);
                    self.surface.show_alert().await;
                }
            }
        }
    }

    async fn on_settings_changed(&self) {
        self.stop_polling();
        *self.client.write() = None;

        let settings = self.settings.load().await;
        if settings.host.is_some() {
            self.check_and_render().await;
            self.start_polling();
        } else {
            *self.connected.write() = ConnectionState::Disconnected;
            self.render(false, false).await;
        }
    }

    async fn on_inspector_message(&self, payload: &Value) {
        if payload.get("action").and_then(Value::as_str) == Some("testConnection")
            && payload
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false)
        {
            self.check_and_render().await;
            if self.timer.lock().is_none() {
                self.start_polling();
            }
        }
    }
}
