//! Domain layer: session vocabulary, gesture dispatch, and settings.

pub mod gestures;
pub mod models;
pub mod settings;
