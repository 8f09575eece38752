//! The two plugins of the light switcher.
//!
//! - `publisher`: decides when the light switches and announces it.
//! - `subscriber`: applies announced ranges to a scene light.

pub mod publisher;
pub mod subscriber;
