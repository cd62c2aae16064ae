//! Submission screening.
//!
//! Detects adversarial patterns in text payloads before they are queued.

mod input_screen;

pub use input_screen::{InputScreen, ScreenMatch, ScreenVerdict};
