//! Core session types shared between the state machine, the transport
//! backends, and consumers.

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::domain::gestures::Gesture;
use crate::error::BleError;

/// Lifecycle of one BLE session.
///
/// `Disconnected` is reachable from every state, via an explicit command or
/// a transport failure. A new scan or connect is accepted from `Idle` or
/// `Disconnected` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Scanning,
    Connecting,
    ServiceDiscovery,
    Subscribed,
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "Idle",
            Self::Scanning => "Scanning",
            Self::Connecting => "Connecting",
            Self::ServiceDiscovery => "Discovering services",
            Self::Subscribed => "Subscribed",
            Self::Disconnected => "Disconnected",
        };
        f.write_str(label)
    }
}

/// Opaque peripheral address, as rendered by the transport backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}

/// One advertisement sighting during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: DeviceAddress,
    pub rssi: Option<i16>,
}

/// The peripheral this session is looking for: advertised name plus the
/// GATT service/characteristic pair carrying gesture payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDevice {
    pub name: String,
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
}

/// Timeout knobs for one session. `scan_timeout: None` keeps the scan alive
/// until explicitly stopped.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    pub scan_timeout: Option<Duration>,
    pub connect_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Some(Duration::from_secs(60)),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

/// Human-readable progress line for whatever front end is listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

impl StatusMessage {
    pub fn new(message: impl Into<String>, severity: MessageSeverity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

/// Commands accepted by the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    StartScan,
    StopScan,
    /// Connect directly to a previously seen address, skipping the scan.
    Connect(DeviceAddress),
    Disconnect,
    Shutdown,
}

/// Events published by the session manager. This channel is the status sink:
/// it carries every state transition with a display message, plus discovery,
/// notification, and failure reports.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged {
        state: SessionState,
        message: String,
    },
    DeviceFound(DiscoveredDevice),
    /// A decoded notification payload. `gesture` is `None` for payloads
    /// outside the vocabulary (the glove reports `idle` between gestures).
    Notification {
        gesture: Option<Gesture>,
        raw: String,
    },
    Failed(BleError),
    LogMessage(StatusMessage),
}
