//! Pixie, a Discord music bot.
//!
//! - [`audio`]: per-guild playback orchestration and the Songbird backend
//! - [`bot`]: Discord event handling and prefix commands
//! - [`config`]: environment configuration

pub mod audio;
pub mod bot;
pub mod config;
