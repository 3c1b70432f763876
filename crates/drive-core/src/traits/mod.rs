//! Core trait definitions implemented by other Drive crates.

pub mod blob;
pub mod events;
