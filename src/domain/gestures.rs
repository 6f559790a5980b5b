use std::collections::HashMap;
use std::fmt;

/// Gesture vocabulary reported by the glove, one word per notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    PalmLeft,
    PalmRight,
    PalmUp,
    PalmDown,
    PalmCenter,
    FistLeft,
    FistRight,
    FistUp,
    FistDown,
    FistCenter,
}

impl Gesture {
    pub const ALL: [Gesture; 10] = [
        Gesture::PalmLeft,
        Gesture::PalmRight,
        Gesture::PalmUp,
        Gesture::PalmDown,
        Gesture::PalmCenter,
        Gesture::FistLeft,
        Gesture::FistRight,
        Gesture::FistUp,
        Gesture::FistDown,
        Gesture::FistCenter,
    ];

    pub fn parse(payload: &str) -> Option<Gesture> {
        match payload {
            "palm_left" => Some(Gesture::PalmLeft),
            "palm_right" => Some(Gesture::PalmRight),
            "palm_up" => Some(Gesture::PalmUp),
            "palm_down" => Some(Gesture::PalmDown),
            "palm_center" => Some(Gesture::PalmCenter),
            "fist_left" => Some(Gesture::FistLeft),
            "fist_right" => Some(Gesture::FistRight),
            "fist_up" => Some(Gesture::FistUp),
            "fist_down" => Some(Gesture::FistDown),
            "fist_center" => Some(Gesture::FistCenter),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gesture::PalmLeft => "palm_left",
            Gesture::PalmRight => "palm_right",
            Gesture::PalmUp => "palm_up",
            Gesture::PalmDown => "palm_down",
            Gesture::PalmCenter => "palm_center",
            Gesture::FistLeft => "fist_left",
            Gesture::FistRight => "fist_right",
            Gesture::FistUp => "fist_up",
            Gesture::FistDown => "fist_down",
            Gesture::FistCenter => "fist_center",
        }
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type GestureHandler = Box<dyn FnMut(&str) + Send>;

/// Routes decoded notification payloads to consumer-bound handlers.
///
/// One slot per vocabulary word plus a catch-all slot for anything else
/// (unknown words, the `idle` filler the glove sends between gestures).
/// Unbound slots drop the payload silently.
#[derive(Default)]
pub struct GestureDispatcher {
    handlers: HashMap<Gesture, GestureHandler>,
    unrecognized: Option<GestureHandler>,
}

impl GestureDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(
        &mut self,
        gesture: Gesture,
        handler: impl FnMut(&str) + Send + 'static,
    ) -> &mut Self {
        self.handlers.insert(gesture, Box::new(handler));
        self
    }

    pub fn bind_unrecognized(&mut self, handler: impl FnMut(&str) + Send + 'static) -> &mut Self {
        self.unrecognized = Some(Box::new(handler));
        self
    }

    /// Dispatch one payload, returning the recognized gesture if any.
    pub fn dispatch(&mut self, payload: &str) -> Option<Gesture> {
        match Gesture::parse(payload) {
            Some(gesture) => {
                if let Some(handler) = self.handlers.get_mut(&gesture) {
                    handler(payload);
                }
                Some(gesture)
            }
            None => {
                if let Some(handler) = self.unrecognized.as_mut() {
                    handler(payload);
                }
                None
            }
        }
    }
}

impl fmt::Debug for GestureDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GestureDispatcher")
            .field("bound", &self.handlers.len())
            .field("has_unrecognized", &self.unrecognized.is_some())
            .finish()
    }
}
