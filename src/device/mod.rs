//! HTTP client for the smartphone webcam server
//!
//! Thin typed wrapper over the device's local HTTP control surface. The
//! client keeps no state beyond its configured host/port: every operation is
//! a single request with a bounded timeout, and retry policy belongs to the
//! caller (usually: none, the poll interval is the retry).

use once_cell::sync::Lazy;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Default control port of the webcam server
pub const DEFAULT_PORT: u16 = 4747;

/// Timeout for standard control operations
const REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Short timeout for the stopped/running probe
const PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Status code the server uses for features gated behind the paid tier
const PAID_TIER_STATUS: u16 = 550;

// One shared connection pool for every client instance
static HTTP: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("invariant: default reqwest client builds")
});

/// Failures a device operation can produce
///
/// Expected network failures are values, never panics: callers render a
/// disconnected/error affordance and move on.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("request timed out")]
    Timeout,
    #[error("device unreachable")]
    Unreachable,
    #[error("device returned HTTP {0}")]
    Http(u16),
    #[error("feature requires the paid tier")]
    PaidFeatureRequired,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no device host configured")]
    NotConfigured,
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Identity reported by the phone, used for connection probing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub model: String,
}

/// Full camera state snapshot from `GET /v1/camera/info`
///
/// Field names mirror the wire format. Note `led_on` is inverted on the
/// wire: 0 means the torch is on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CameraInfo {
    pub active: i64,
    pub led_on: i64,
    #[serde(rename = "wbMode")]
    pub wb_mode: i64,
    #[serde(rename = "wbLock")]
    pub wb_lock: i64,
    #[serde(rename = "wbValue")]
    pub wb_value: f64,
    #[serde(rename = "wbMin")]
    pub wb_min: f64,
    #[serde(rename = "wbMax")]
    pub wb_max: f64,
    #[serde(rename = "focusMode")]
    pub focus_mode: i64,
    #[serde(rename = "mfValue")]
    pub mf_value: f64,
    #[serde(rename = "mfMin")]
    pub mf_min: f64,
    #[serde(rename = "mfMax")]
    pub mf_max: f64,
    #[serde(rename = "zmValue")]
    pub zm_value: f64,
    #[serde(rename = "zmMin")]
    pub zm_min: f64,
    #[serde(rename = "zmMax")]
    pub zm_max: f64,
    #[serde(rename = "evValue")]
    pub ev_value: f64,
    #[serde(rename = "evMin")]
    pub ev_min: f64,
    #[serde(rename = "evMax")]
    pub ev_max: f64,
    pub exposure_lock: i64,
    pub mute_sound: i64,
}

/// Battery report from `GET /v1/phone/battery_info`
///
/// `amps` is signed: positive means charging.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BatteryInfo {
    pub level: f64,
    pub amps: f64,
}

/// Stateless client bound to one device address
#[derive(Debug, Clone)]
pub struct DeviceClient {
    host: String,
    port: u16,
}

impl DeviceClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// True when this client is already bound to the given address
    pub fn matches(&self, host: &str, port: u16) -> bool {
        self.host == host && self.port == port
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, path)
    }

    /// Probe the device identity (`GET /v1/phone/name`)
    pub async fn probe(&self) -> DeviceResult<DeviceIdentity> {
        let url = self.url("/v1/phone/name");
        debug!("Probing device at {}", url);

        let resp = HTTP.get(&url).send().await.map_err(map_transport)?;
        check_status(resp.status())?;

        let name = resp.text().await.map_err(map_transport)?;
        Ok(DeviceIdentity {
            model: name.trim().to_string(),
        })
    }

    /// Fetch the full camera state snapshot
    pub async fn camera_info(&self) -> DeviceResult<CameraInfo> {
        let resp = HTTP
            .get(self.url("/v1/camera/info"))
            .send()
            .await
            .map_err(map_transport)?;
        check_status(resp.status())?;

        resp.json::<CameraInfo>()
            .await
            .map_err(|e| DeviceError::Malformed(e.to_string()))
    }

    /// Fetch the phone battery report
    pub async fn battery_info(&self) -> DeviceResult<BatteryInfo> {
        let resp = HTTP
            .get(self.url("/v1/phone/battery_info"))
            .send()
            .await
            .map_err(map_transport)?;
        check_status(resp.status())?;

        resp.json::<BatteryInfo>()
            .await
            .map_err(|e| DeviceError::Malformed(e.to_string()))
    }

    /// Set absolute zoom level (paid-tier gated on some devices)
    pub async fn set_zoom(&self, level: f64) -> DeviceResult<()> {
        self.put(&format!("/v3/camera/zoom/{}", level)).await
    }

    /// Set absolute exposure compensation (paid-tier gated on some devices)
    pub async fn set_exposure(&self, level: f64) -> DeviceResult<()> {
        self.put(&format!("/v3/camera/ev/{}", level)).await
    }

    /// Switch the active camera (0 = back, 1 = front)
    pub async fn switch_camera(&self, index: u8) -> DeviceResult<()> {
        self.put(&format!("/v1/camera/active/{}", index)).await
    }

    pub async fn toggle_led(&self) -> DeviceResult<()> {
        self.put("/v1/camera/torch_toggle").await
    }

    pub async fn toggle_mic(&self) -> DeviceResult<()> {
        self.put("/v1/camera/mic_toggle").await
    }

    pub async fn toggle_exposure_lock(&self) -> DeviceResult<()> {
        self.put("/v1/camera/el_toggle").await
    }

    pub async fn toggle_wb_lock(&self) -> DeviceResult<()> {
        self.put("/v1/camera/wbl_toggle").await
    }

    /// Trigger one-shot autofocus
    pub async fn autofocus(&self) -> DeviceResult<()> {
        self.put("/v1/camera/autofocus").await
    }

    /// Set the focus mode (0 = normal, 1 = macro, 2 = continuous, 3 = infinity)
    pub async fn set_focus_mode(&self, mode: u8) -> DeviceResult<()> {
        self.put(&format!("/v1/camera/autofocus_mode/{}", mode)).await
    }

    /// Set the white balance mode (0..=7; manual is driven via [`set_wb_level`])
    ///
    /// [`set_wb_level`]: Self::set_wb_level
    pub async fn set_wb_mode(&self, mode: u8) -> DeviceResult<()> {
        self.put(&format!("/v1/camera/wb_mode/{}", mode)).await
    }

    /// Set a manual white balance level; the device switches to manual mode
    pub async fn set_wb_level(&self, value: f64) -> DeviceResult<()> {
        self.put(&format!("/v2/camera/wb_level/{}", value)).await
    }

    /// Stop the webcam server on the phone
    pub async fn stop(&self) -> DeviceResult<()> {
        self.put("/v1/stop").await
    }

    /// Restart a stopped webcam server
    pub async fn restart(&self) -> DeviceResult<()> {
        self.put("/v1/restart").await
    }

    /// Check whether the device is stopped
    ///
    /// Uses a short timeout: while stopped the info endpoint does not answer,
    /// so any failure counts as stopped.
    pub async fn is_stopped(&self) -> bool {
        let url = self.url("/v1/camera/info");
        match HTTP.get(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(resp) => !resp.status().is_success(),
            Err(_) => true,
        }
    }

    async fn put(&self, path: &str) -> DeviceResult<()> {
        let url = self.url(path);
        let resp = HTTP.put(&url).send().await.map_err(|e| {
            warn!("PUT {} failed: {}", url, e);
            map_transport(e)
        })?;
        check_status(resp.status())
    }
}

fn check_status(status: reqwest::StatusCode) -> DeviceResult<()> {
    if status.as_u16() == PAID_TIER_STATUS {
        return Err(DeviceError::PaidFeatureRequired);
    }
    if !status.is_success() {
        return Err(DeviceError::Http(status.as_u16()));
    }
    Ok(())
}

fn map_transport(err: reqwest::Error) -> DeviceError {
    if err.is_timeout() {
        DeviceError::Timeout
    } else if err.is_decode() {
        DeviceError::Malformed(err.to_string())
    } else {
        DeviceError::Unreachable
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Client pointed at a mockito server (`host:port` form)
    pub(crate) fn client_for(server: &mockito::ServerGuard) -> DeviceClient {
        let addr = server.host_with_port();
        let (host, port) = addr
            .rsplit_once(':')
            .expect("mockito address has host:port form");
        DeviceClient::new(host, port.parse().expect("numeric port"))
    }

    pub(crate) const CAMERA_INFO_JSON: &str = r#"{
        "active": 0,
        "led_on": 1,
        "wbMode": 0,
        "wbLock": 0,
        "wbValue": 50,
        "wbMin": 0,
        "wbMax": 100,
        "focusMode": 0,
        "mfValue": 0,
        "mfMin": 0,
        "mfMax": 100,
        "zmValue": 1.0,
        "zmMin": 1.0,
        "zmMax": 8.0,
        "evValue": 0.0,
        "evMin": -24.0,
        "evMax": 24.0,
        "exposure_lock": 0,
        "mute_sound": 0
    }"#;

    /// Camera info JSON with selected fields overridden
    pub(crate) fn camera_info_with(overrides: &[(&str, &str)]) -> String {
        let mut value: serde_json::Value =
            serde_json::from_str(CAMERA_INFO_JSON).expect("fixture parses");
        for (key, raw) in overrides {
            value[key] = serde_json::from_str(raw).expect("override parses");
        }
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{camera_info_with, client_for, CAMERA_INFO_JSON};
    use super::*;

    #[tokio::test]
    async fn probe_returns_trimmed_model() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/phone/name")
            .with_status(200)
            .with_body("Pixel 8\n")
            .create_async()
            .await;

        let client = client_for(&server);
        let identity = client.probe().await.unwrap();

        assert_eq!(identity.model, "Pixel 8");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn probe_maps_http_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/phone/name")
            .with_status(503)
            .create_async()
            .await;

        let client = client_for(&server);
        match client.probe().await {
            Err(DeviceError::Http(503)) => {}
            other => panic!("expected Http(503), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_a_value_not_a_panic() {
        // Port 9 (discard) is about as unbound as it gets locally
        let client = DeviceClient::new("127.0.0.1", 9);
        assert!(matches!(
            client.probe().await,
            Err(DeviceError::Unreachable | DeviceError::Timeout)
        ));
    }

    #[tokio::test]
    async fn camera_info_parses_full_snapshot() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/camera/info")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(CAMERA_INFO_JSON)
            .create_async()
            .await;

        let client = client_for(&server);
        let info = client.camera_info().await.unwrap();

        assert_eq!(info.zm_value, 1.0);
        assert_eq!(info.zm_max, 8.0);
        assert_eq!(info.ev_min, -24.0);
        assert_eq!(info.led_on, 1);
        assert_eq!(info.wb_mode, 0);
    }

    #[tokio::test]
    async fn camera_info_rejects_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/camera/info")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.camera_info().await,
            Err(DeviceError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn set_zoom_hits_versioned_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/v3/camera/zoom/2.5")
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(&server);
        client.set_zoom(2.5).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn paid_tier_status_is_distinguished() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/v3/camera/ev/2")
            .with_status(550)
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(matches!(
            client.set_exposure(2.0).await,
            Err(DeviceError::PaidFeatureRequired)
        ));
    }

    #[tokio::test]
    async fn is_stopped_reads_health_from_info_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/camera/info")
            .with_status(200)
            .with_body(CAMERA_INFO_JSON)
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(!client.is_stopped().await);
        mock.assert_async().await;

        // Unreachable server counts as stopped
        let dead = DeviceClient::new("127.0.0.1", 9);
        assert!(dead.is_stopped().await);
    }

    #[tokio::test]
    async fn battery_info_parses_level_and_current() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/phone/battery_info")
            .with_status(200)
            .with_body(r#"{"level": 85, "amps": 0.5}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let battery = client.battery_info().await.unwrap();
        assert_eq!(battery.level, 85.0);
        assert!(battery.amps > 0.0);
    }

    #[test]
    fn camera_info_override_helper_produces_valid_json() {
        let body = camera_info_with(&[("zmValue", "3.5"), ("wbMode", "8")]);
        let info: CameraInfo = serde_json::from_str(&body).unwrap();
        assert_eq!(info.zm_value, 3.5);
        assert_eq!(info.wb_mode, 8);
    }
}
