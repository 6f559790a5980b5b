//! Transport abstraction consumed by the session state machine.
//!
//! The platform BLE stack is reduced to a command sink (this trait) plus an
//! asynchronous event source (a [`TransportEvent`] channel handed to the
//! backend at construction). The state machine never touches backend types;
//! service discovery results cross the boundary as a plain-data GATT tree so
//! lookups stay explicit and testable.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::models::{DeviceAddress, DiscoveredDevice};
use crate::error::BleError;

/// Unsolicited events pushed by a transport backend.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// An advertisement was seen while scanning.
    DeviceFound(DiscoveredDevice),
    /// The peer closed or lost an established connection.
    PeerDisconnected { address: DeviceAddress },
    /// A characteristic-change notification arrived on the subscribed
    /// characteristic.
    Notification { value: Vec<u8> },
}

/// One characteristic of a discovered service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub notifiable: bool,
}

/// One service of a discovered peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

/// Command sink half of a BLE central transport.
///
/// Implementations hold at most one connection; `disconnect` is idempotent
/// and must release the underlying handle on every path. Preconditions such
/// as a missing adapter or denied permission surface as
/// [`BleError::RadioDisabled`] / [`BleError::PermissionDenied`] from
/// `start_scan`, never as a silent no-op.
#[async_trait]
pub trait BleTransport: Send {
    /// Begin an unfiltered platform-level scan. Matching against the target
    /// name is the caller's job.
    async fn start_scan(&mut self) -> Result<(), BleError>;

    async fn stop_scan(&mut self) -> Result<(), BleError>;

    /// Open a connection to a previously discovered address.
    async fn connect(&mut self, address: &DeviceAddress) -> Result<(), BleError>;

    /// Enumerate the connected peripheral's GATT tree.
    async fn discover_services(&mut self) -> Result<Vec<GattService>, BleError>;

    /// Enable notifications on the given characteristic (writes the
    /// client-characteristic-configuration value on the wire).
    async fn subscribe(&mut self, service: Uuid, characteristic: Uuid) -> Result<(), BleError>;

    /// Close the connection if one is open. Safe to call at any time.
    async fn disconnect(&mut self) -> Result<(), BleError>;
}
