//! BLE session manager for the GestureControlForRunners glove.
//!
//! Scans for the glove by advertised name, connects, discovers its gesture
//! service, subscribes to the value characteristic, and dispatches decoded
//! gesture words to consumer-bound handlers. All progress is published on a
//! session event channel so any front end (or the bundled headless binary)
//! can render it.

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use domain::gestures::{Gesture, GestureDispatcher};
pub use domain::models::{
    DeviceAddress, DiscoveredDevice, MessageSeverity, SessionCommand, SessionConfig, SessionEvent,
    SessionState, StatusMessage, TargetDevice,
};
pub use domain::settings::{Settings, SettingsService};
pub use error::BleError;
pub use infrastructure::bluetooth::transport::{GattCharacteristic, GattService};
pub use infrastructure::bluetooth::{BleSessionManager, BleTransport, BtleplugTransport, TransportEvent};
