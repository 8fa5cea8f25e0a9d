//! Shared engine for the swipe radio player.
//!
//! Everything here is host-agnostic: the gesture tracker, spring solver and
//! navigation state machine are synchronous and pure, and the crossfade
//! engine talks to audio through the `AudioChannel` / `AudioGraph` traits.

pub mod audio;
pub mod carousel;
pub mod catalog;
pub mod config;
pub mod error;
pub mod gesture;
pub mod navigation;
pub mod platform;
pub mod presence;
pub mod protocol;
pub mod spring;
pub mod video;
pub mod wheel;
