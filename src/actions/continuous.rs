//! Continuous-value controls (zoom, exposure)
//!
//! One state shape, two physical forms. The button form nudges the value by
//! a configured step per press; the dial form accumulates `ticks ×
//! sensitivity` and snaps back to a neutral value when pressed. Both forms
//! of one quantity read and write the same device value, so every confirmed
//! write is broadcast to all live instances of the same concrete kind, and
//! the sibling kind converges on its next poll tick.

use super::poller::SharedPoller;
use super::registry::SyncTarget;
use super::{clamp, Action, ActionKind, ConnectionState, RemoteQuantity, ICON_DISCONNECTED};
use crate::device::{CameraInfo, DeviceClient, DeviceError, DeviceResult};
use crate::settings::{ActionSettings, SettingsHandle};
use crate::surface::{DialFeedback, SurfaceControl};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which device quantity a control drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    Zoom,
    Exposure,
}

impl Quantity {
    pub fn name(&self) -> &'static str {
        match self {
            Quantity::Zoom => "zoom",
            Quantity::Exposure => "exposure",
        }
    }

    /// Value a dial press snaps back to
    pub fn neutral(&self) -> f64 {
        match self {
            Quantity::Zoom => 1.0,
            Quantity::Exposure => 0.0,
        }
    }

    /// Bounds used until the device reports its own
    pub fn default_range(&self) -> (f64, f64) {
        match self {
            Quantity::Zoom => (1.0, 8.0),
            Quantity::Exposure => (-24.0, 24.0),
        }
    }

    fn default_step(&self, form: ControlForm) -> f64 {
        match (self, form) {
            (Quantity::Zoom, ControlForm::Button) => 0.5,
            (Quantity::Zoom, ControlForm::Dial) => 0.1,
            (Quantity::Exposure, ControlForm::Button) => 0.5,
            (Quantity::Exposure, ControlForm::Dial) => 0.5,
        }
    }

    pub fn format_value(&self, value: f64) -> String {
        match self {
            Quantity::Zoom => format!("{:.2}x", value),
            Quantity::Exposure => {
                if value == 0.0 {
                    "±0.0EV".to_string()
                } else if value > 0.0 {
                    format!("+{:.1}EV", value)
                } else {
                    format!("{:.1}EV", value)
                }
            }
        }
    }

    fn dial_icon(&self) -> &'static str {
        match self {
            Quantity::Zoom => "icons/zoom-control.svg",
            Quantity::Exposure => "icons/exposure-control.svg",
        }
    }

    fn dial_label(&self) -> &'static str {
        match self {
            Quantity::Zoom => "ZOOM",
            Quantity::Exposure => "EV",
        }
    }

    /// Button icon depends on the step direction
    fn button_icon(&self, sensitivity: f64) -> &'static str {
        match self {
            Quantity::Zoom => {
                if sensitivity >= 0.0 {
                    "icons/zoom-in.svg"
                } else {
                    "icons/zoom-out.svg"
                }
            }
            Quantity::Exposure => {
                if sensitivity >= 0.0 {
                    "icons/exposure-up.svg"
                } else {
                    "icons/exposure-down.svg"
                }
            }
        }
    }

    fn extract(&self, info: &CameraInfo) -> (f64, f64, f64) {
        match self {
            Quantity::Zoom => (info.zm_value, info.zm_min, info.zm_max),
            Quantity::Exposure => (info.ev_value, info.ev_min, info.ev_max),
        }
    }

    async fn set(&self, client: &DeviceClient, value: f64) -> DeviceResult<()> {
        match self {
            Quantity::Zoom => client.set_zoom(value).await,
            Quantity::Exposure => client.set_exposure(value).await,
        }
    }
}

/// Physical form of the control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlForm {
    Button,
    Dial,
}

/// A placed zoom/exposure control
pub struct ContinuousControl {
    context: String,
    kind: ActionKind,
    quantity: Quantity,
    form: ControlForm,
    surface: Arc<dyn SurfaceControl>,
    settings: SettingsHandle,
    poller: Arc<SharedPoller>,
    client: RwLock<Option<DeviceClient>>,
    /// Locally-optimistic cache of the device value and its bounds
    snapshot: RwLock<RemoteQuantity>,
    connected: RwLock<ConnectionState>,
}

impl ContinuousControl {
    pub fn new(
        context: impl Into<String>,
        quantity: Quantity,
        form: ControlForm,
        surface: Arc<dyn SurfaceControl>,
        settings: SettingsHandle,
        poller: Arc<SharedPoller>,
    ) -> Arc<Self> {
        let kind = match (quantity, form) {
            (Quantity::Zoom, ControlForm::Button) => ActionKind::ZoomButton,
            (Quantity::Zoom, ControlForm::Dial) => ActionKind::ZoomDial,
            (Quantity::Exposure, ControlForm::Button) => ActionKind::ExposureButton,
            (Quantity::Exposure, ControlForm::Dial) => ActionKind::ExposureDial,
        };
        let (min, max) = quantity.default_range();

        let control = Arc::new(Self {
            context: context.into(),
            kind,
            quantity,
            form,
            surface,
            settings,
            poller: poller.clone(),
            client: RwLock::new(None),
            snapshot: RwLock::new(RemoteQuantity::new(quantity.neutral(), min, max)),
            connected: RwLock::new(ConnectionState::Unknown),
        });

        poller.register(control.clone() as Arc<dyn SyncTarget>);
        control
    }

    /// Client for the configured address, rebuilding it when the address
    /// changed
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

    /// Learn `{min, max}` from the device without overwriting the cached
    /// value — a sibling may have just broadcast a value the user adjusted,
    /// and the poll will reconcile any real drift.
    async fn refresh_bounds(&self, client: &DeviceClient) -> DeviceResult<()> {
        let info = client.camera_info().await?;
        let (device_value, min, max) = self.quantity.extract(&info);

        let cached = {
            let mut snap = self.snapshot.write();
            snap.set_bounds(min, max);
            snap.value
        };

        if (cached - device_value).abs() > 0.01 {
            debug!(
                "[{}] device {} ({}) differs from shared value ({}), keeping shared state",
                self.context,
                self.quantity.name(),
                device_value,
                cached
            );
        }
        Ok(())
    }

    fn feedback_for(&self, snap: RemoteQuantity) -> DialFeedback {
        DialFeedback {
            icon: self.quantity.dial_icon().to_string(),
            title: self.quantity.dial_label().to_string(),
            value: self.quantity.format_value(snap.value),
            indicator: snap.indicator_percent(),
        }
    }

    /// Render the cached value on this control's own widget
    async fn render_value(&self) {
        let snap = *self.snapshot.read();
        match self.form {
            ControlForm::Button => {
                if self.surface.is_key() {
                    self.surface
                        .set_title(&self.quantity.format_value(snap.value))
                        .await;
                }
            }
            ControlForm::Dial => {
                self.surface.set_feedback(self.feedback_for(snap)).await;
            }
        }
    }

    async fn render_disconnected(&self) {
        if self.surface.is_key() {
            self.surface.set_image(ICON_DISCONNECTED).await;
            self.surface.set_title("").await;
        }
    }

    /// Button press: probe, then nudge by the configured step
    async fn nudge(&self) {
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

        // Bounds may have changed (camera switch etc.); the cached value
        // stays authoritative
        if let Err(e) = self.refresh_bounds(&client).await {
            debug!("[{}] bounds refresh failed: {}", self.context, e);
        }

        let step = settings
            .sensitivity
            .unwrap_or_else(|| self.quantity.default_step(self.form));
        let (proposed, min, max) = {
            let snap = self.snapshot.read();
            (clamp(snap.value + step, snap.min, snap.max), snap.min, snap.max)
        };

        match self.quantity.set(&client, proposed).await {
            Ok(()) => {
                self.snapshot.write().assign(proposed);
                *self.connected.write() = ConnectionState::Connected;
                info!(
                    "[{}] {} set to {}",
                    self.context,
                    self.quantity.name(),
                    proposed
                );
                self.poller.broadcast(proposed, min, max).await;
                if self.surface.is_key() {
                    self.surface.show_ok().await;
                }
            }
            Err(DeviceError::PaidFeatureRequired) => {
                warn!(
                    "[{}] {} control requires the paid tier",
                    self.context,
                    self.quantity.name()
                );
                if self.surface.is_key() {
                    self.surface.show_alert().await;
                }
            }
            Err(e) => {
                warn!(
                    "[{}] failed to set {} to {}: {}",
                    self.context,
                    self.quantity.name(),
                    proposed,
                    e
                );
                if self.surface.is_key() {
                    self.surface.show_alert().await;
                }
            }
        }
    }

    /// Dial rotation: optimistic local update, then confirm with the device
    ///
    /// The cache and the dial display move before the network call returns
    /// so the dial stays responsive; a failed write is left in place and
    /// reconciled by the next poll tick.
    async fn rotate(&self, ticks: i32) {
        let settings = self.settings.load().await;
        let Ok(client) = self.ensure_client(&settings) else {
            return;
        };

        let sensitivity = settings
            .sensitivity
            .unwrap_or_else(|| self.quantity.default_step(self.form));

        let (proposed, min, max) = {
            let mut snap = self.snapshot.write();
            let raw = snap.value + f64::from(ticks) * sensitivity;
            let stepped = (clamp(raw, snap.min, snap.max) * 100.0).round() / 100.0;
            snap.assign(stepped);
            (snap.value, snap.min, snap.max)
        };

        self.render_value().await;

        match self.quantity.set(&client, proposed).await {
            Ok(()) => self.poller.broadcast(proposed, min, max).await,
            Err(e) => {
                debug!(
                    "[{}] optimistic {} write failed ({}), awaiting poll reconcile",
                    self.context,
                    self.quantity.name(),
                    e
                );
            }
        }
    }

    /// Dial press: snap back to the neutral value
    async fn reset_to_neutral(&self) {
        let neutral = self.quantity.neutral();
        let (min, max) = {
            let mut snap = self.snapshot.write();
            snap.assign(neutral);
            (snap.min, snap.max)
        };
        self.render_value().await;

        let settings = self.settings.load().await;
        let Ok(client) = self.ensure_client(&settings) else {
            return;
        };

        match self.quantity.set(&client, neutral).await {
            Ok(()) => {
                self.poller.broadcast(neutral, min, max).await;
                if self.surface.is_key() {
                    self.surface.show_ok().await;
                }
            }
            Err(e) => {
                debug!("[{}] neutral reset failed: {}", self.context, e);
                if self.surface.is_key() {
                    self.surface.show_alert().await;
                }
            }
        }
    }
}

#[async_trait]
impl Action for ContinuousControl {
    fn context(&self) -> &str {
        &self.context
    }

    fn kind(&self) -> ActionKind {
        self.kind
    }

    async fn on_appear(&self) {
        let settings = self.settings.load_with_defaults(self.kind).await;

        match self.ensure_client(&settings) {
            Ok(client) => {
                let state = match self.refresh_bounds(&client).await {
                    Ok(()) => ConnectionState::Connected,
                    Err(e) => {
                        debug!("[{}] appear-time snapshot failed: {}", self.context, e);
                        ConnectionState::Disconnected
                    }
                };
                *self.connected.write() = state;
            }
            Err(DeviceError::NotConfigured) => {
                debug!("[{}] no device configured yet", self.context);
            }
            Err(_) => {}
        }

        let sensitivity = settings
            .sensitivity
            .unwrap_or_else(|| self.quantity.default_step(self.form));

        match self.form {
            ControlForm::Button => {
                if self.surface.is_key() {
                    if *self.connected.read() == ConnectionState::Disconnected {
                        self.render_disconnected().await;
                    } else {
                        self.surface
                            .set_image(self.quantity.button_icon(sensitivity))
                            .await;
                        if settings.host.is_some() {
                            self.render_value().await;
                        } else {
                            self.surface.set_title("").await;
                        }
                    }
                }
            }
            ControlForm::Dial => {
                self.surface.set_image(self.quantity.dial_icon()).await;
                if self.surface.is_key() {
                    self.surface.set_state(0).await;
                }
                self.render_value().await;
            }
        }
    }

    async fn on_disappear(&self) {
        self.poller.unregister(&self.context);
    }

    async fn on_key_down(&self) {
        match self.form {
            ControlForm::Button => self.nudge().await,
            ControlForm::Dial => self.reset_to_neutral().await,
        }
    }

    async fn on_dial_rotate(&self, ticks: i32) {
        if self.form == ControlForm::Dial {
            self.rotate(ticks).await;
        }
    }

    async fn on_dial_down(&self) {
        if self.form == ControlForm::Dial {
            self.reset_to_neutral().await;
        }
    }

    async fn on_settings_changed(&self) {
        let settings = self.settings.load().await;

        // Drop a client bound to a stale address
        {
            let mut guard = self.client.write();
            let stale = match (guard.as_ref(), settings.host.as_deref()) {
                (Some(client), Some(host)) => !client.matches(host, settings.port),
                (Some(_), None) => true,
                (None, _) => false,
            };
            if stale {
                *guard = None;
            }
        }

        match self.ensure_client(&settings) {
            Ok(client) => {
                if self.refresh_bounds(&client).await.is_ok() {
                    *self.connected.write() = ConnectionState::Connected;
                    let snap = *self.snapshot.read();
                    self.poller.broadcast(snap.value, snap.min, snap.max).await;
                } else {
                    *self.connected.write() = ConnectionState::Disconnected;
                }
            }
            Err(_) => {
                *self.connected.write() = ConnectionState::Unknown;
                if self.form == ControlForm::Button && self.surface.is_key() {
                    let sensitivity = settings
                        .sensitivity
                        .unwrap_or_else(|| self.quantity.default_step(self.form));
                    self.surface
                        .set_image(self.quantity.button_icon(sensitivity))
                        .await;
                    self.surface.set_title("").await;
                }
            }
        }

        if self.form == ControlForm::Dial {
            self.render_value().await;
        }
    }

    async fn on_inspector_message(&self, payload: &Value) {
        let action = payload.get("action").and_then(Value::as_str);

        match action {
            Some("testConnection") => {
                if payload
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false)
                {
                    self.on_settings_changed().await;
                }
            }
            Some("requestState") => {
                let snap = *self.snapshot.read();
                self.surface
                    .send_to_inspector(json!({
                        "event": "state",
                        "connected": *self.connected.read() == ConnectionState::Connected,
                        "value": snap.value,
                        "range": { "min": snap.min, "max": snap.max },
                    }))
                    .await;
            }
            _ => {}
        }
    }
}

#[async_trait]
impl SyncTarget for ContinuousControl {
    fn sync_id(&self) -> &str {
        &self.context
    }

    fn poll_client(&self) -> Option<DeviceClient> {
        self.client.read().clone()
    }

    fn cached_value(&self) -> f64 {
        self.snapshot.read().value
    }

    async fn apply_remote_value(&self, value: f64, min: f64, max: f64) {
        {
            let mut snap = self.snapshot.write();
            snap.set_bounds(min, max);
            snap.assign(value);
        }
        self.render_value().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::poller::QuantitySpec;
    use crate::device::testing::{camera_info_with, client_for};
    use crate::settings::SettingsStore;
    use crate::surface::testing::RecordingControl;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        store: SettingsStore,
        poller: Arc<SharedPoller>,
        _temp: TempDir,
    }

    impl Fixture {
        fn new(spec: QuantitySpec) -> Self {
            let temp = tempfile::tempdir().unwrap();
            let store = SettingsStore::spawn(&temp.path().join("settings.sled"), 0).unwrap();
            Self {
                store,
                poller: SharedPoller::new(spec),
                _temp: temp,
            }
        }

        fn zoom() -> Self {
            Self::new(QuantitySpec::zoom(Duration::from_secs(60)))
        }

        fn exposure() -> Self {
            Self::new(QuantitySpec::exposure(Duration::from_secs(60)))
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

        fn control(
            &self,
            context: &str,
            quantity: Quantity,
            form: ControlForm,
            is_key: bool,
        ) -> (Arc<ContinuousControl>, Arc<RecordingControl>) {
            let surface = RecordingControl::new(context, is_key);
            let control = ContinuousControl::new(
                context,
                quantity,
                form,
                surface.clone(),
                self.store.handle_for(context),
                self.poller.clone(),
            );
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

    async fn mock_info(
        server: &mut mockito::ServerGuard,
        overrides: &[(&str, &str)],
    ) -> mockito::Mock {
        server
            .mock("GET", "/v1/camera/info")
            .with_status(200)
            .with_body(camera_info_with(overrides))
            .create_async()
            .await
    }

    #[tokio::test]
    async fn three_presses_walk_the_zoom_up_in_steps() {
        let mut server = mockito::Server::new_async().await;
        mock_probe(&mut server).await;
        mock_info(&mut server, &[]).await;
        for level in ["1.5", "2", "2.5"] {
            server
                .mock("PUT", format!("/v3/camera/zoom/{}", level).as_str())
                .with_status(200)
                .create_async()
                .await;
        }

        let fx = Fixture::zoom();
        fx.configure("zb-1", &server).await;
        let (control, surface) = fx.control("zb-1", Quantity::Zoom, ControlForm::Button, true);

        for _ in 0..3 {
            control.on_key_down().await;
        }

        assert_eq!(surface.titles(), vec!["1.50x", "2.00x", "2.50x"]);
        assert_eq!(surface.ok_count(), 3);
        assert_eq!(control.cached_value(), 2.5);
    }

    #[tokio::test]
    async fn press_clamps_to_the_device_maximum() {
        let mut server = mockito::Server::new_async().await;
        mock_probe(&mut server).await;
        mock_info(&mut server, &[]).await;
        server
            .mock("PUT", "/v3/camera/zoom/8")
            .with_status(200)
            .create_async()
            .await;

        let fx = Fixture::zoom();
        fx.configure("zb-1", &server).await;
        let (control, surface) = fx.control("zb-1", Quantity::Zoom, ControlForm::Button, true);
        control.snapshot.write().assign(7.8);

        control.on_key_down().await;

        assert_eq!(control.cached_value(), 8.0);
        assert_eq!(surface.titles().last().map(String::as_str), Some("8.00x"));
    }

    #[tokio::test]
    async fn paid_tier_refusal_leaves_cached_exposure_unchanged() {
        let mut server = mockito::Server::new_async().await;
        mock_probe(&mut server).await;
        mock_info(&mut server, &[]).await;
        server
            .mock("PUT", "/v3/camera/ev/0.5")
            .with_status(550)
            .create_async()
            .await;

        let fx = Fixture::exposure();
        fx.configure("eb-1", &server).await;
        let (control, surface) =
            fx.control("eb-1", Quantity::Exposure, ControlForm::Button, true);

        control.on_key_down().await;

        assert_eq!(control.cached_value(), 0.0);
        assert_eq!(surface.alert_count(), 1);
        assert_eq!(surface.ok_count(), 0);
    }

    #[tokio::test]
    async fn successful_press_broadcasts_to_every_sibling_of_the_same_kind() {
        let mut server = mockito::Server::new_async().await;
        mock_probe(&mut server).await;
        mock_info(&mut server, &[]).await;
        server
            .mock("PUT", "/v3/camera/zoom/1.5")
            .with_status(200)
            .create_async()
            .await;

        let fx = Fixture::zoom();
        fx.configure("zb-1", &server).await;
        fx.configure("zb-2", &server).await;
        let (one, surface_one) = fx.control("zb-1", Quantity::Zoom, ControlForm::Button, true);
        let (two, surface_two) = fx.control("zb-2", Quantity::Zoom, ControlForm::Button, true);

        one.on_key_down().await;

        assert_eq!(one.cached_value(), 1.5);
        assert_eq!(two.cached_value(), 1.5, "sibling cache follows the broadcast");
        assert_eq!(surface_one.titles(), vec!["1.50x"]);
        assert_eq!(surface_two.titles(), vec!["1.50x"]);
    }

    #[tokio::test]
    async fn dial_rotation_renders_optimistically_and_poll_reconciles_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/v3/camera/zoom/1.3")
            .with_status(500)
            .create_async()
            .await;
        mock_info(&mut server, &[("zmValue", "1.0")]).await;

        let fx = Fixture::zoom();
        fx.configure("zd-1", &server).await;
        let (control, surface) = fx.control("zd-1", Quantity::Zoom, ControlForm::Dial, false);

        control.on_dial_rotate(3).await;

        // Optimistic: display and cache moved before the failed write
        let feedbacks = surface.feedbacks();
        assert_eq!(feedbacks.len(), 1);
        assert_eq!(feedbacks[0].value, "1.30x");
        assert_eq!(control.cached_value(), 1.3);

        // Next poll tick pulls the display back to the device truth
        fx.poller.tick().await;
        assert_eq!(control.cached_value(), 1.0);
        assert_eq!(surface.feedbacks().last().unwrap().value, "1.00x");
    }

    #[tokio::test]
    async fn dial_press_resets_to_neutral_and_broadcasts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/v3/camera/zoom/1")
            .with_status(200)
            .create_async()
            .await;

        let fx = Fixture::zoom();
        fx.configure("zd-1", &server).await;
        fx.configure("zd-2", &server).await;
        let (one, surface) = fx.control("zd-1", Quantity::Zoom, ControlForm::Dial, false);
        let (two, _) = fx.control("zd-2", Quantity::Zoom, ControlForm::Dial, false);
        one.snapshot.write().assign(4.0);
        two.snapshot.write().assign(4.0);

        one.on_dial_down().await;

        assert_eq!(one.cached_value(), 1.0);
        assert_eq!(two.cached_value(), 1.0);
        let fb = surface.feedbacks();
        assert_eq!(fb.first().unwrap().value, "1.00x");
        assert!((fb.first().unwrap().indicator - 0.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unconfigured_press_alerts_without_network() {
        let fx = Fixture::zoom();
        let (control, surface) = fx.control("zb-1", Quantity::Zoom, ControlForm::Button, true);

        control.on_key_down().await;

        assert_eq!(surface.alert_count(), 1);
        assert_eq!(control.cached_value(), 1.0);
    }

    #[tokio::test]
    async fn failed_probe_renders_disconnected_affordance() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/phone/name")
            .with_status(503)
            .create_async()
            .await;

        let fx = Fixture::zoom();
        fx.configure("zb-1", &server).await;
        let (control, surface) = fx.control("zb-1", Quantity::Zoom, ControlForm::Button, true);

        control.on_key_down().await;

        assert!(surface.images().contains(&ICON_DISCONNECTED.to_string()));
        assert_eq!(surface.alert_count(), 1);
        assert_eq!(control.cached_value(), 1.0);
    }

    #[tokio::test]
    async fn appear_learns_bounds_but_keeps_shared_value() {
        let mut server = mockito::Server::new_async().await;
        mock_info(&mut server, &[("zmValue", "6.0"), ("zmMax", "10.0")]).await;

        let fx = Fixture::zoom();
        fx.configure("zd-1", &server).await;
        let (control, surface) = fx.control("zd-1", Quantity::Zoom, ControlForm::Dial, false);
        // A sibling broadcast already agreed on 3.0
        control.snapshot.write().assign(3.0);

        control.on_appear().await;

        let snap = *control.snapshot.read();
        assert_eq!(snap.max, 10.0, "bounds come from the device");
        assert_eq!(snap.value, 3.0, "appear never clobbers the shared value");
        assert_eq!(surface.feedbacks().last().unwrap().value, "3.00x");
    }

    #[tokio::test]
    async fn exposure_titles_carry_sign_formatting() {
        assert_eq!(Quantity::Exposure.format_value(0.0), "±0.0EV");
        assert_eq!(Quantity::Exposure.format_value(1.5), "+1.5EV");
        assert_eq!(Quantity::Exposure.format_value(-2.0), "-2.0EV");
        assert_eq!(Quantity::Zoom.format_value(2.0), "2.00x");
    }

    #[tokio::test]
    async fn disappear_unregisters_from_the_shared_poller() {
        let fx = Fixture::zoom();
        let (control, _) = fx.control("zb-1", Quantity::Zoom, ControlForm::Button, true);

        assert!(fx.poller.is_polling());
        control.on_disappear().await;
        assert!(!fx.poller.is_polling());
        assert_eq!(fx.poller.instance_count(), 0);
    }
}
