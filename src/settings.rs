//! Per-control persisted settings with debounced writes
//!
//! Settings live in an embedded sled database keyed by the control's
//! placement context. Writes are debounced: rapid edits from the settings
//! UI coalesce in memory (last-write-wins per context) and flush to disk
//! once the window expires, or on explicit flush before shutdown.

use crate::actions::ActionKind;
use crate::device::DEFAULT_PORT;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace};

/// Default debounce window in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// Persisted configuration for one placed control
///
/// Fields are kind-specific; unused ones stay `None`. Absent fields are
/// populated with their documented defaults on first appearance and written
/// back (see [`apply_defaults`](Self::apply_defaults)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSettings {
    /// Device host; `None` means not configured yet
    pub host: Option<String>,
    pub port: u16,
    /// Step per press (buttons) or per tick (dials); sign flips direction
    pub sensitivity: Option<f64>,
    /// Battery poll interval, seconds
    pub polling_interval: Option<u64>,
    /// Connection check interval, seconds
    pub check_interval: Option<u64>,
    pub warning_level: Option<u8>,
    pub critical_level: Option<u8>,
    pub show_percentage: Option<bool>,
    /// User title override for status displays
    pub title: Option<String>,
    /// Target mode for mode-select buttons
    pub target_mode: Option<u8>,
    /// Manual white balance level for the manual-mode sentinel
    pub manual_value: Option<f64>,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_PORT,
            sensitivity: None,
            polling_interval: None,
            check_interval: None,
            warning_level: None,
            critical_level: None,
            show_percentage: None,
            title: None,
            target_mode: None,
            manual_value: None,
        }
    }
}

impl ActionSettings {
    /// Fill kind-specific defaults for absent fields
    ///
    /// Returns true when anything was filled, so callers know to write the
    /// settings back.
    pub fn apply_defaults(&mut self, kind: ActionKind) -> bool {
        let mut changed = false;
        let fill_f64 = |slot: &mut Option<f64>, value: f64| -> bool {
            if slot.is_none() {
                *slot = Some(value);
                true
            } else {
                false
            }
        };

        match kind {
            ActionKind::ZoomButton | ActionKind::ExposureButton => {
                changed |= fill_f64(&mut self.sensitivity, 0.5);
            }
            ActionKind::ZoomDial => {
                changed |= fill_f64(&mut self.sensitivity, 0.1);
            }
            ActionKind::ExposureDial => {
                changed |= fill_f64(&mut self.sensitivity, 0.5);
            }
            ActionKind::WbModeButton => {
                if self.target_mode.is_none() {
                    self.target_mode = Some(0);
                    changed = true;
                }
                changed |= fill_f64(&mut self.manual_value, 60.0);
            }
            ActionKind::FocusModeButton => {
                if self.target_mode.is_none() {
                    self.target_mode = Some(0);
                    changed = true;
                }
            }
            ActionKind::ConnectionStatus => {
                if self.check_interval.is_none() {
                    self.check_interval = Some(5);
                    changed = true;
                }
            }
            ActionKind::BatteryStatus => {
                if self.show_percentage.is_none() {
                    self.show_percentage = Some(true);
                    changed = true;
                }
                if self.warning_level.is_none() {
                    self.warning_level = Some(30);
                    changed = true;
                }
                if self.critical_level.is_none() {
                    self.critical_level = Some(15);
                    changed = true;
                }
                if self.polling_interval.is_none() {
                    self.polling_interval = Some(10);
                    changed = true;
                }
            }
            _ => {}
        }
        changed
    }
}

/// Commands sent to the settings actor
#[derive(Debug)]
enum SettingsCommand {
    /// Queue a write for one context (debounced)
    Save {
        context: String,
        settings: ActionSettings,
    },
    Load {
        context: String,
        reply: oneshot::Sender<Option<ActionSettings>>,
    },
    /// Force-flush every pending write
    Flush(oneshot::Sender<Result<()>>),
    Shutdown,
}

/// Handle to the settings actor; cheap to clone
#[derive(Clone)]
pub struct SettingsStore {
    cmd_tx: mpsc::Sender<SettingsCommand>,
}

struct SettingsActor {
    db: sled::Db,
    command_rx: mpsc::Receiver<SettingsCommand>,
    /// Pending writes awaiting the debounce window, last-write-wins per key
    pending: HashMap<String, ActionSettings>,
    last_write_ts: Instant,
    debounce_ms: u64,
    write_count: u64,
}

impl SettingsStore {
    /// Open the database and spawn the actor
    pub fn spawn(db_path: &Path, debounce_ms: u64) -> Result<Self> {
        let db = sled::open(db_path)
            .with_context(|| format!("Failed to open settings database at {}", db_path.display()))?;

        info!("Settings store opened at {}", db_path.display());

        let (cmd_tx, command_rx) = mpsc::channel(100);

        let actor = SettingsActor {
            db,
            command_rx,
            pending: HashMap::new(),
            last_write_ts: Instant::now(),
            debounce_ms,
            write_count: 0,
        };

        tokio::spawn(actor.run());

        Ok(Self { cmd_tx })
    }

    /// Queue a settings write (debounced)
    pub async fn save(&self, context: &str, settings: ActionSettings) -> Result<()> {
        self.cmd_tx
            .send(SettingsCommand::Save {
                context: context.to_string(),
                settings,
            })
            .await
            .context("Failed to send save command: settings actor shut down")
    }

    /// Load settings for a context; pending (unflushed) writes are visible
    pub async fn load(&self, context: &str) -> Result<Option<ActionSettings>> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SettingsCommand::Load {
                context: context.to_string(),
                reply: tx,
            })
            .await
            .context("Failed to send load command: settings actor shut down")?;
        rx.await.context("Failed to receive load response")
    }

    /// Flush every pending write to disk immediately
    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(SettingsCommand::Flush(tx))
            .await
            .context("Failed to send flush command: settings actor shut down")?;
        rx.await.context("Failed to receive flush response")?
    }

    /// Signal shutdown; the actor flushes pending writes before exiting
    pub fn shutdown(&self) {
        let _ = self.cmd_tx.try_send(SettingsCommand::Shutdown);
    }

    /// Bind this store to one control's context
    pub fn handle_for(&self, context: &str) -> SettingsHandle {
        SettingsHandle {
            store: self.clone(),
            context: context.to_string(),
        }
    }
}

/// A [`SettingsStore`] scoped to one placement context
#[derive(Clone)]
pub struct SettingsHandle {
    store: SettingsStore,
    context: String,
}

impl SettingsHandle {
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Load settings, falling back to the empty default
    pub async fn load(&self) -> ActionSettings {
        match self.store.load(&self.context).await {
            Ok(Some(settings)) => settings,
            Ok(None) => ActionSettings::default(),
            Err(e) => {
                error!("[{}] settings load failed: {:#}", self.context, e);
                ActionSettings::default()
            }
        }
    }

    /// Load settings, fill kind defaults and write them back if anything
    /// was absent
    pub async fn load_with_defaults(&self, kind: ActionKind) -> ActionSettings {
        let mut settings = self.load().await;
        if settings.apply_defaults(kind) {
            self.save(settings.clone()).await;
        }
        settings
    }

    pub async fn save(&self, settings: ActionSettings) {
        if let Err(e) = self.store.save(&self.context, settings).await {
            error!("[{}] settings save failed: {:#}", self.context, e);
        }
    }
}

impl SettingsActor {
    async fn run(mut self) {
        debug!("Settings actor started (debounce: {}ms)", self.debounce_ms);

        let tick_ms = if self.debounce_ms > 0 {
            self.debounce_ms
        } else {
            1000
        };
        let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SettingsCommand::Save { context, settings } => {
                            trace!("Queuing settings write for {}", context);
                            self.pending.insert(context, settings);
                            self.last_write_ts = Instant::now();

                            if self.debounce_ms == 0 {
                                self.flush_pending().await;
                            }
                        }
                        SettingsCommand::Load { context, reply } => {
                            let _ = reply.send(self.load_one(&context));
                        }
                        SettingsCommand::Flush(reply) => {
                            self.flush_pending().await;
                            let _ = reply.send(Ok(()));
                        }
                        SettingsCommand::Shutdown => {
                            info!("Settings actor shutting down, flushing pending writes");
                            self.flush_pending().await;
                            debug!("Settings actor done (total writes: {})", self.write_count);
                            return;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if !self.pending.is_empty()
                        && self.debounce_ms > 0
                        && self.last_write_ts.elapsed() >= Duration::from_millis(self.debounce_ms)
                    {
                        self.flush_pending().await;
                    }
                }
            }
        }
    }

    /// Pending writes are visible to loads before they hit disk
    fn load_one(&self, context: &str) -> Option<ActionSettings> {
        if let Some(pending) = self.pending.get(context) {
            return Some(pending.clone());
        }

        match self.db.get(context.as_bytes()) {
            Ok(Some(raw)) => match serde_json::from_slice(&raw) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    error!("Corrupt settings entry for {}: {}", context, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                error!("Settings read failed for {}: {}", context, e);
                None
            }
        }
    }

    async fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let batch: Vec<(String, ActionSettings)> = self.pending.drain().collect();
        let db = self.db.clone();

        let result = tokio::task::spawn_blocking(move || {
            for (context, settings) in &batch {
                let raw = serde_json::to_vec(settings)?;
                db.insert(context.as_bytes(), raw)?;
            }
            db.flush()?;
            Ok::<usize, anyhow::Error>(batch.len())
        })
        .await;

        match result {
            Ok(Ok(count)) => {
                self.write_count += count as u64;
                trace!("Flushed {} settings entries (total {})", count, self.write_count);
            }
            Ok(Err(e)) => error!("Settings flush failed: {:#}", e),
            Err(e) => error!("Settings flush task panicked: {}", e),
        }
    }
}
