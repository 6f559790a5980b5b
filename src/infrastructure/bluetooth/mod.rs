//! Bluetooth Module
//!
//! BLE session handling for the gesture glove.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                   BleSessionManager                      │
//! │   (state machine - commands in, session events out)      │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │ BleTransport trait
//!         ┌─────────────┴─────────────┐
//!         ▼                           ▼
//! ┌─────────────────┐        ┌─────────────────┐
//! │ BtleplugTransport│        │  test transports │
//! │                 │        │  (scripted mocks)│
//! │ ┌──────────┐    │        └─────────────────┘
//! │ │ Scanner  │    │
//! │ ├──────────┤    │
//! │ │Connection│    │
//! │ └──────────┘    │
//! └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Glove protocol definitions: advertised name, UUIDs, payload decoding
//! - [`transport`] - Transport trait, transport events, plain-data GATT tree
//! - [`scanner`] - BLE device discovery (btleplug)
//! - [`connection`] - Device connection, GATT access, notification forwarding (btleplug)
//! - [`backend`] - The btleplug transport composing scanner and connection
//! - [`service`] - The session state machine

pub mod backend;
pub mod connection;
pub mod protocol;
pub mod scanner;
pub mod service;
pub mod transport;

// Re-export the pieces most consumers need
pub use backend::BtleplugTransport;
pub use service::BleSessionManager;
pub use transport::{BleTransport, TransportEvent};
