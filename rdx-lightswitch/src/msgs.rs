//! Message types carried over the transport.

/// A single signed integer payload.
///
/// The light switch uses it to carry a light range; receivers treat it as an
/// opaque value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Int {
    pub data: i32,
}

impl Int {
    pub fn new(data: i32) -> Self {
        Self { data }
    }
}

impl From<i32> for Int {
    fn from(data: i32) -> Self {
        Self { data }
    }
}
