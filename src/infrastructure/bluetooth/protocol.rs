//! Gesture Glove Protocol
//!
//! Protocol definitions for the GestureControlForRunners glove: the
//! advertised name to match during discovery, the GATT service and value
//! characteristic carrying gesture payloads, and payload decoding.
//!
//! The glove pushes one short UTF-8 word per notification (a gesture from
//! the vocabulary in [`crate::domain::gestures`], or `idle` between
//! gestures). It only sends when the gesture state changes.

use uuid::Uuid;

use crate::domain::models::TargetDevice;

/// Name the glove advertises during discovery.
pub const DEVICE_NAME: &str = "GestureControlForRunners";

/// Gesture service UUID.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x66df5109_edde_4f8a_a5e1_02e02a69cbd5);

/// Value characteristic UUID - where gesture strings are received.
pub const VALUE_CHAR_UUID: Uuid = Uuid::from_u128(0x741c12b9_e13c_4992_8a5e_fce46dec0bff);

/// Standard Client Characteristic Configuration descriptor; writing the
/// enable-notifications value here turns the gesture stream on.
pub const CLIENT_CHARACTERISTIC_CONFIG_UUID: Uuid =
    Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// Default target descriptor for the glove.
pub fn default_target() -> TargetDevice {
    TargetDevice {
        name: DEVICE_NAME.to_string(),
        service_uuid: SERVICE_UUID,
        characteristic_uuid: VALUE_CHAR_UUID,
    }
}

/// Decode a notification payload into the gesture word.
///
/// Payloads are UTF-8; some firmware revisions pad with a trailing NUL.
/// Invalid byte sequences are replaced rather than dropped so the catch-all
/// gesture slot still sees something inspectable.
pub fn decode_payload(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_matches(char::from(0))
        .trim()
        .to_string()
}
