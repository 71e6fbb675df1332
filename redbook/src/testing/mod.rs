//! Testing utilities for code built on the engines.
//!
//! This module provides:
//! - [`ScriptedDriver`], an in-memory page whose script answers are set up
//!   by the test
//! - page fixtures shaped like the real site

mod fixtures;
mod mocks;

pub use fixtures::{
    image_entry, login_wall_signals, note_signals, note_state, page_with_state, publish_signals,
    LOGIN_ADDRESS, NOTE_ADDRESS, PUBLISH_ADDRESS,
};
pub use mocks::{DialogBehavior, ScriptedDriver};
