//! # UI Module
//!
//! Discord-facing building blocks: button rows, embeds and the per-channel
//! control panel that keeps exactly one live message per channel.

pub mod buttons;
pub mod embeds;
pub mod panel;
