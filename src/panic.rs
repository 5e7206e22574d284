//! Formatting of panic payloads caught from handlers and connection tasks.

use std::{any::Any, fmt};

/// Displays a panic payload.
///
/// `String` and `&'static str` payloads print as-is; anything else falls
/// back to `Debug`.
///
/// ```
/// use wsgate::panic::format_panic;
/// assert_eq!(format_panic(Box::new("boom")).to_string(), "boom");
/// assert_eq!(format_panic(Box::new(String::from("bang"))).to_string(), "bang");
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (
            self.0.downcast_ref::<String>(),
            self.0.downcast_ref::<&'static str>(),
        ) {
            (Some(message), _) => f.write_str(message),
            (None, Some(message)) => f.write_str(message),
            (None, None) => write!(f, "{:?}", self.0),
        }
    }
}

/// Wrap a payload returned by `catch_unwind`.
pub fn format_panic(panic: Box<dyn Any + Send>) -> PanicMessage { PanicMessage(panic) }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_payload_uses_debug() {
        let rendered = format_panic(Box::new(7_u8)).to_string();
        assert!(rendered.contains("Any"));
    }
}
