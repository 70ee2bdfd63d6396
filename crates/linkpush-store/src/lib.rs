//! # linkpush-store
//!
//! In-memory state owned by the server:
//!
//! - [`ShortcodeStore`]: append-only bidirectional URL ↔ code map
//! - [`SessionRegistry`]: session rows, their bound channel, and the
//!   pending notification with its delivery state
//!
//! Neither survives a restart.

#![deny(unsafe_code)]

pub mod sessions;
pub mod shortcodes;

pub use sessions::{Claim, SessionRegistry};
pub use shortcodes::{
    CodeGenerator, DEFAULT_CODE_LENGTH, MIN_CODE_LENGTH, ShortcodeStore, random_code,
};
