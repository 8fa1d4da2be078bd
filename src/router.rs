//! Surface event routing and instance lifecycle
//!
//! The router owns the per-kind shared pollers (constructed once at process
//! start and injected into each instance, never reached through ambient
//! statics) and the map of live action instances. Host surface events come
//! in by placement context; renders go back out through each instance's own
//! surface handle.

use crate::actions::continuous::{ContinuousControl, ControlForm, Quantity};
use crate::actions::mode::{CameraSwitchControl, ModeControl, ModeFamily};
use crate::actions::poller::{QuantitySpec, SharedPoller};
use crate::actions::status::{BatteryStatusControl, ConnectionStatusControl, StopRestartControl};
use crate::actions::toggle::{AutofocusControl, ToggleControl, ToggleKind};
use crate::actions::{Action, ActionKind};
use crate::config::{AppConfig, DeviceConfig};
use crate::settings::SettingsStore;
use crate::surface::{SurfaceControl, SurfaceEvent};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// One shared poller per synchronized action kind
///
/// Zoom and exposure each exist as a button kind and a dial kind with their
/// own registries: same-kind instances sync synchronously on broadcast, the
/// sibling kind converges on its own poll tick.
pub struct Pollers {
    pub zoom_button: Arc<SharedPoller>,
    pub zoom_dial: Arc<SharedPoller>,
    pub exposure_button: Arc<SharedPoller>,
    pub exposure_dial: Arc<SharedPoller>,
    pub wb_mode: Arc<SharedPoller>,
    pub focus_mode: Arc<SharedPoller>,
}

impl Pollers {
    fn new(interval: Duration) -> Self {
        Self {
            zoom_button: SharedPoller::new(QuantitySpec::zoom(interval)),
            zoom_dial: SharedPoller::new(QuantitySpec::zoom(interval)),
            exposure_button: SharedPoller::new(QuantitySpec::exposure(interval)),
            exposure_dial: SharedPoller::new(QuantitySpec::exposure(interval)),
            wb_mode: SharedPoller::new(QuantitySpec::wb_mode(interval)),
            focus_mode: SharedPoller::new(QuantitySpec::focus_mode(interval)),
        }
    }
}

/// Dispatches host surface events to action instances
pub struct Router {
    pollers: Pollers,
    settings: SettingsStore,
    instances: RwLock<HashMap<String, Arc<dyn Action>>>,
    default_device: Option<DeviceConfig>,
}

impl Router {
    pub fn new(config: &AppConfig, settings: SettingsStore) -> Self {
        let interval = Duration::from_secs(config.polling.quantity_interval_secs.max(1));
        Self {
            pollers: Pollers::new(interval),
            settings,
            instances: RwLock::new(HashMap::new()),
            default_device: config.device.clone(),
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn pollers(&self) -> &Pollers {
        &self.pollers
    }

    /// A control appeared: construct its action instance and run its appear
    /// hook
    pub async fn on_appear(&self, kind: ActionKind, control: Arc<dyn SurfaceControl>) {
        let context = control.context().to_string();
        info!("[{}] {} appeared", context, kind);

        self.seed_default_device(&context).await;

        let handle = self.settings.handle_for(&context);
        let action: Arc<dyn Action> = match kind {
            ActionKind::ZoomButton => ContinuousControl::new(
                &context,
                Quantity::Zoom,
                ControlForm::Button,
                control,
                handle,
                self.pollers.zoom_button.clone(),
            ),
            ActionKind::ZoomDial => ContinuousControl::new(
                &context,
                Quantity::Zoom,
                ControlForm::Dial,
                control,
                handle,
                self.pollers.zoom_dial.clone(),
            ),
            ActionKind::ExposureButton => ContinuousControl::new(
                &context,
                Quantity::Exposure,
                ControlForm::Button,
                control,
                handle,
                self.pollers.exposure_button.clone(),
            ),
            ActionKind::ExposureDial => ContinuousControl::new(
                &context,
                Quantity::Exposure,
                ControlForm::Dial,
                control,
                handle,
                self.pollers.exposure_dial.clone(),
            ),
            ActionKind::LedToggle => {
                ToggleControl::new(&context, ToggleKind::Led, control, handle)
            }
            ActionKind::MicToggle => {
                ToggleControl::new(&context, ToggleKind::Mic, control, handle)
            }
            ActionKind::ExposureLockToggle => {
                ToggleControl::new(&context, ToggleKind::ExposureLock, control, handle)
            }
            ActionKind::WbLockToggle => {
                ToggleControl::new(&context, ToggleKind::WbLock, control, handle)
            }
            ActionKind::AutofocusButton => AutofocusControl::new(&context, control, handle),
            ActionKind::FocusModeButton => ModeControl::new(
                &context,
                ModeFamily::Focus,
                control,
                handle,
                self.pollers.focus_mode.clone(),
            ),
            ActionKind::WbModeButton => ModeControl::new(
                &context,
                ModeFamily::WhiteBalance,
                control,
                handle,
                self.pollers.wb_mode.clone(),
            ),
            ActionKind::CameraSwitch => CameraSwitchControl::new(&context, control, handle),
            ActionKind::ConnectionStatus => {
                ConnectionStatusControl::new(&context, control, handle)
            }
            ActionKind::BatteryStatus => BatteryStatusControl::new(&context, control, handle),
            ActionKind::StopRestart => StopRestartControl::new(&context, control, handle),
        };

        action.on_appear().await;

        let replaced = self.instances.write().await.insert(context, action);
        if let Some(old) = replaced {
            debug!("[{}] replacing a live instance", old.context());
            old.on_disappear().await;
        }
    }

    /// A control disappeared: tear down its instance and release its timers
    pub async fn on_disappear(&self, context: &str) {
        let removed = self.instances.write().await.remove(context);
        match removed {
            Some(action) => {
                info!("[{}] {} disappeared", context, action.kind());
                action.on_disappear().await;
            }
            None => warn!("[{}] disappear for unknown control", context),
        }
    }

    /// Route one surface event to the owning instance
    pub async fn dispatch(&self, context: &str, event: SurfaceEvent) {
        let action = self.instances.read().await.get(context).cloned();
        let Some(action) = action else {
            warn!("[{}] event {:?} for unknown control", context, event);
            return;
        };

        match event {
            SurfaceEvent::KeyDown => action.on_key_down().await,
            SurfaceEvent::DialRotate { ticks } => action.on_dial_rotate(ticks).await,
            SurfaceEvent::DialDown => action.on_dial_down().await,
            SurfaceEvent::DialUp => {}
            SurfaceEvent::SettingsChanged => action.on_settings_changed().await,
            SurfaceEvent::InspectorMessage { payload } => {
                action.on_inspector_message(&payload).await
            }
        }
    }

    /// Live placements as `(context, kind)` pairs
    pub async fn list_instances(&self) -> Vec<(String, ActionKind)> {
        let instances = self.instances.read().await;
        let mut listing: Vec<(String, ActionKind)> = instances
            .iter()
            .map(|(context, action)| (context.clone(), action.kind()))
            .collect();
        listing.sort_by(|a, b| a.0.cmp(&b.0));
        listing
    }

    /// Tear down every live instance (process shutdown)
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<dyn Action>> =
            self.instances.write().await.drain().map(|(_, a)| a).collect();
        for action in drained {
            action.on_disappear().await;
        }
    }

    /// Pre-fill a fresh placement with the configured default device
    async fn seed_default_device(&self, context: &str) {
        let Some(device) = &self.default_device else {
            return;
        };
        let handle = self.settings.handle_for(context);
        let mut settings = handle.load().await;
        if settings.host.is_none() {
            settings.host = Some(device.host.clone());
            settings.port = device.port;
            handle.save(settings).await;
            debug!(
                "[{}] seeded device {}:{} from config",
                context, device.host, device.port
            );
        }
    }
}
