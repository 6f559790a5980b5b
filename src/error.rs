//! Error taxonomy for the BLE session.
//!
//! Every variant is terminal for the current attempt: the session manager
//! reports it on the event channel, releases the transport, and ends up in
//! `Disconnected`, ready for a fresh attempt. Nothing here is retried by the
//! core; retry is caller policy.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::DeviceAddress;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BleError {
    /// The platform refused Bluetooth access (missing permission or entitlement).
    #[error("bluetooth permission denied: {0}")]
    PermissionDenied(String),

    /// No usable adapter, or the local radio is powered off.
    #[error("bluetooth radio disabled or no adapter available")]
    RadioDisabled,

    /// The bounded scan expired without an advertised-name match.
    #[error("no matching device found within {0:?}")]
    ScanTimeout(Duration),

    /// Opening the transport-layer connection failed.
    #[error("failed to connect to {address}: {reason}")]
    ConnectFailed {
        address: DeviceAddress,
        reason: String,
    },

    /// The connected peripheral does not expose the target service.
    #[error("gatt service {0} not found on device")]
    ServiceNotFound(Uuid),

    /// The target service exists but lacks the value characteristic.
    #[error("characteristic {0} not found in target service")]
    CharacteristicNotFound(Uuid),

    /// Writing the enable-notifications configuration value was rejected.
    #[error("failed to enable notifications: {0}")]
    DescriptorWriteFailed(String),

    /// The peripheral dropped an established connection.
    #[error("connection lost: {0}")]
    TransportDropped(String),

    /// OS-level transport failure that maps to no more specific condition.
    #[error("bluetooth backend error: {0}")]
    Backend(String),
}
