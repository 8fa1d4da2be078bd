//! CamDeck GW
//!
//! Gateway bridging a button/dial control deck to a smartphone webcam
//! server over its local HTTP API. Each placed control maps to one camera
//! operation; the gateway polls the device, keeps every sibling control's
//! cached state converged, and forwards presses and dial turns as HTTP
//! requests.

pub mod actions;
pub mod cli;
pub mod config;
pub mod device;
pub mod paths;
pub mod router;
pub mod settings;
pub mod surface;
