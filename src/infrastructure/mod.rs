//! Infrastructure layer: platform Bluetooth transport and logging.

pub mod bluetooth;
pub mod logging;
